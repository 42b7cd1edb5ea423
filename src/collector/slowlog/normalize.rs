//! Normalization of SQL statements into fingerprints for grouping.
//!
//! Loosely follows pt-query-digest's fingerprinting: literals, comments,
//! value lists and whitespace differences are abstracted away so that
//! `SELECT * FROM t WHERE id=1` and `select * from t where id = 42` land in
//! the same bucket.
//!
//! The passes run in a fixed order and each one relies on the previous:
//! lowercasing first lets every later pass match keywords literally, and
//! whitespace collapsing runs before the `in (...)` / `offset` passes.

use tracing::trace;

use crate::storage::model::FingerprintKey;

/// Normalize a raw statement into its fingerprint.
pub fn fingerprint(statement: &str) -> String {
    // 1. Lowercase
    let s = statement.to_lowercase();

    // 2. `insert ... values (...), (...)` → `insert ... values (?)`
    let s = collapse_insert_values(&s);

    // 3. Comments
    let s = strip_block_comment(&s);
    let s = strip_line_comment(&s);

    // 4. Right-hand side of comparisons: 'str', `ident`, then bare literals
    let s = replace_each(&s, |b, i| comparison(b, i, single_quoted));
    let s = replace_each(&s, |b, i| comparison(b, i, backtick_quoted));
    let s = replace_each(&s, |b, i| comparison(b, i, bare_literal));

    // 5. [not] like 'pattern'
    let s = replace_each(&s, like_pattern);

    // 6. Whitespace
    let s = collapse_whitespace(&s);

    // 7. in (...) lists and offsets
    let s = replace_each(&s, in_list);
    let s = replace_each(&s, offset);

    trace!(raw = statement, normalized = %s, "fingerprint");
    s
}

/// Fingerprint plus its aggregation key.
pub fn fingerprint_with_key(statement: &str) -> (String, FingerprintKey) {
    let fp = fingerprint(statement);
    let key = FingerprintKey::of(&fp);
    (fp, key)
}

/// Cut everything after the last ` values` of an insert and put a single
/// placeholder list there.
fn collapse_insert_values(s: &str) -> String {
    const INSERT: &str = "insert ";
    let Some(start) = s.find(INSERT) else {
        return s.to_string();
    };
    let body = start + INSERT.len();
    match s[body..].rfind(" values") {
        Some(pos) => format!("{} values (?)", &s[..body + pos]),
        None => s.to_string(),
    }
}

/// Remove the span from the last `/*` to the last `*/`.
fn strip_block_comment(s: &str) -> String {
    let Some(close) = s.rfind("*/") else {
        return s.to_string();
    };
    match s[..close].rfind("/*") {
        Some(open) => format!("{}{}", &s[..open], &s[close + 2..]),
        None => s.to_string(),
    }
}

/// Drop a trailing ` --` comment.
fn strip_line_comment(s: &str) -> String {
    match s.rfind(" --") {
        Some(pos) => s[..pos].to_string(),
        None => s.to_string(),
    }
}

/// Run `matcher` at every byte offset, left to right, replacing each match.
///
/// `matcher` returns the exclusive end of the match and its replacement.
/// Matches always start and end on ASCII bytes, so slicing stays on char
/// boundaries.
fn replace_each<F>(s: &str, mut matcher: F) -> String
where
    F: FnMut(&[u8], usize) -> Option<(usize, String)>,
{
    let bytes = s.as_bytes();
    let mut result = String::with_capacity(s.len());
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        match matcher(bytes, i) {
            Some((end, replacement)) => {
                result.push_str(&s[last..i]);
                result.push_str(&replacement);
                last = end;
                i = end;
            }
            None => i += 1,
        }
    }
    result.push_str(&s[last..]);

    result
}

fn skip_ws(b: &[u8], mut i: usize) -> usize {
    while i < b.len() && b[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn is_operator(c: u8) -> bool {
    matches!(c, b'!' | b'<' | b'>' | b'=')
}

fn is_word(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// `\s* <op> \s* <literal>` where op is one or two of `!<>=`.
fn comparison(b: &[u8], start: usize, literal: fn(&[u8], usize) -> Option<usize>) -> Option<(usize, String)> {
    let op_start = skip_ws(b, start);
    let run = b[op_start..]
        .iter()
        .take(2)
        .take_while(|c| is_operator(**c))
        .count();

    // Prefer the two-character operator, fall back to one.
    for len in (1..=run).rev() {
        let lit_start = skip_ws(b, op_start + len);
        if let Some(end) = literal(b, lit_start) {
            let op = String::from_utf8_lossy(&b[op_start..op_start + len]);
            return Some((end, format!(" {} ?", op)));
        }
    }
    None
}

/// Non-empty run between two `quote` characters.
fn quoted(b: &[u8], i: usize, quote: u8) -> Option<usize> {
    if b.get(i) != Some(&quote) {
        return None;
    }
    let len = b[i + 1..].iter().position(|&c| c == quote)?;
    if len == 0 {
        return None;
    }
    Some(i + 1 + len + 1)
}

fn single_quoted(b: &[u8], i: usize) -> Option<usize> {
    quoted(b, i, b'\'')
}

fn backtick_quoted(b: &[u8], i: usize) -> Option<usize> {
    quoted(b, i, b'`')
}

/// Numbers, identifiers, dotted names, negative numbers.
fn bare_literal(b: &[u8], i: usize) -> Option<usize> {
    let len = b[i.min(b.len())..]
        .iter()
        .take_while(|&&c| c.is_ascii_alphanumeric() || matches!(c, b'.' | b'_' | b'-'))
        .count();
    (len > 0).then_some(i + len)
}

/// `\s* [not \s+] like \s+ 'pattern'` with at least one space before `like`.
fn like_pattern(b: &[u8], start: usize) -> Option<(usize, String)> {
    let j = skip_ws(b, start);

    let (negated, like_at) = if b[j..].starts_with(b"not") && skip_ws(b, j + 3) > j + 3 {
        (true, skip_ws(b, j + 3))
    } else if j > start {
        (false, j)
    } else {
        return None;
    };

    if !b[like_at..].starts_with(b"like") {
        return None;
    }
    let after = like_at + 4;
    let lit_start = skip_ws(b, after);
    if lit_start == after {
        return None;
    }
    let end = single_quoted(b, lit_start)?;

    let replacement = if negated { " not like ?" } else { " like ?" };
    Some((end, replacement.to_string()))
}

/// Word-bounded `in` followed by a parenthesised list.
fn in_list(b: &[u8], start: usize) -> Option<(usize, String)> {
    if !b[start..].starts_with(b"in") || (start > 0 && is_word(b[start - 1])) {
        return None;
    }
    let open = skip_ws(b, start + 2);
    if b.get(open) != Some(&b'(') {
        return None;
    }
    let len = b[open + 1..].iter().position(|&c| c == b')')?;
    if len == 0 {
        return None;
    }
    Some((open + 1 + len + 1, "in (?)".to_string()))
}

/// `offset <digits>`.
fn offset(b: &[u8], start: usize) -> Option<(usize, String)> {
    const OFFSET: &[u8] = b"offset";
    if !b[start..].starts_with(OFFSET) || (start > 0 && is_word(b[start - 1])) {
        return None;
    }
    let after = start + OFFSET.len();
    let digits_start = skip_ws(b, after);
    if digits_start == after {
        return None;
    }
    let digits = b[digits_start..]
        .iter()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    Some((digits_start + digits, "offset ?".to_string()))
}

/// Collapse every whitespace run into one space and trim the end.
fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_ascii_whitespace() {
            if !prev_space {
                result.push(' ');
            }
            prev_space = true;
        } else {
            result.push(ch);
            prev_space = false;
        }
    }
    let trimmed = result.trim_end_matches(|c: char| c.is_ascii_whitespace()).len();
    result.truncate(trimmed);
    result
}
