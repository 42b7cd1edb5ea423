//! qdigest - slow-query log digest.
//!
//! Reads a slow-query log (file or stdin), groups statements by fingerprint
//! and prints the costliest ones.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use qdigest::collector::slowlog::Follower;
use qdigest::collector::{IngestError, Pipeline};
use qdigest::config::{DEFAULT_LIMIT, DigestConfig, SortKey, SortSpec};
use qdigest::output::OutputFormat;
use qdigest::storage::model::Snapshot;

/// Slow-query log digest.
#[derive(Parser)]
#[command(name = "qdigest", about = "Slow-query log digest", version)]
struct Args {
    /// Slow-query log to analyse. `-` or nothing reads stdin.
    file: Option<PathBuf>,

    /// Report format.
    #[arg(short, long, env = "QDIGEST_OUTPUT", default_value_t = OutputFormat::Terminal)]
    output: OutputFormat,

    /// List available report formats and exit.
    #[arg(long)]
    list_outputs: bool,

    /// Number of fingerprints to show.
    #[arg(short, long, env = "QDIGEST_LIMIT", default_value_t = DEFAULT_LIMIT)]
    limit: usize,

    /// Ranking key: time, count, bytes, lock[time], [rows]sent,
    /// [rows]examined, [rows]affected.
    #[arg(short, long, env = "QDIGEST_SORT", default_value_t = SortKey::Time)]
    sort: SortKey,

    /// Rank ascending instead of descending.
    #[arg(short, long)]
    reverse: bool,

    /// Parser threads. Defaults to the number of available cores.
    #[arg(short, long, env = "QDIGEST_WORKERS")]
    workers: Option<usize>,

    /// Interval between partial reports in milliseconds (0 disables them).
    #[arg(long, env = "QDIGEST_REFRESH", default_value = "0")]
    refresh: u64,

    /// Neither read nor write the `<file>.cache` sidecar.
    #[arg(long, env = "QDIGEST_NO_CACHE")]
    no_cache: bool,

    /// Keep reading the file as it grows (implies --no-cache). Stop with Ctrl-C.
    #[arg(short, long)]
    follow: bool,

    /// Show a progress bar on stderr while digesting a file.
    #[arg(long, env = "QDIGEST_PROGRESS")]
    progress: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Input path, `None` for stdin.
    fn path(&self) -> Option<&PathBuf> {
        self.file.as_ref().filter(|p| p.as_os_str() != "-")
    }

    fn digest_config(&self) -> DigestConfig {
        DigestConfig {
            workers: self.workers,
            refresh: Duration::from_millis(self.refresh),
            sort: SortSpec::new(self.sort, self.reverse),
            limit: self.limit,
            cache: !self.no_cache,
            follow: self.follow || self.path().is_none(),
            progress: self.progress,
        }
    }
}

/// Initializes the tracing subscriber with the given verbosity level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("qdigest={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn render(format: OutputFormat, snapshot: &Snapshot, limit: usize) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = format.render(snapshot, limit, &mut out).and_then(|_| out.flush()) {
        warn!("failed to write report: {}", e);
    }
}

fn run(args: &Args) -> Result<Snapshot, IngestError> {
    let config = args.digest_config();
    let pipeline = Pipeline::new(config.clone());
    let (output, limit) = (args.output, config.limit);
    let mut sink = |snapshot: &Snapshot| render(output, snapshot, limit);

    match args.path() {
        None => {
            info!("reading from stdin");
            pipeline.run(BufReader::new(io::stdin()), &mut sink)
        }
        Some(path) if config.follow => {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = stop.clone();
            if let Err(e) = ctrlc::set_handler(move || {
                info!("Received shutdown signal");
                flag.store(true, Ordering::SeqCst);
            }) {
                warn!("Failed to set Ctrl-C handler: {}", e);
            }

            info!(path = %path.display(), "following");
            let follower = Follower::new(path.clone())?.with_stop_flag(stop);
            pipeline.run(BufReader::new(follower), &mut sink)
        }
        Some(path) => pipeline.run_file(path, &mut sink),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.list_outputs {
        for output in OutputFormat::ALL {
            println!("{}", output);
        }
        return ExitCode::SUCCESS;
    }

    init_logging(args.verbose, args.quiet);
    info!("qdigest {} starting", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(snapshot) => {
            render(args.output, &snapshot, args.limit);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
