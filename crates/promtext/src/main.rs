//! promtext - runs commands and writes their results as text exposition metrics.
//!
//! Single-shot: every invocation loads the configuration, collects each
//! metric once and atomically replaces the output file. Scheduling is left
//! to cron or a systemd timer.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use promtext_core::config::Config;
use promtext_core::exporter::{Destination, run_once};

/// Command output to text exposition metrics.
#[derive(Parser)]
#[command(name = "promtext", about = "Command output to text exposition metrics", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Execute metric collection.
    Run {
        /// Path to configuration file.
        #[arg(short, long, default_value = "./config.yaml")]
        config: PathBuf,

        /// Output directory.
        #[arg(short, long, default_value = "/tmp")]
        output_dir: PathBuf,

        /// Output file name inside the output directory.
        #[arg(long, default_value = "promtext.prom")]
        output_file: String,

        /// Command execution timeout in seconds.
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Print metrics to stdout instead of writing a file.
        #[arg(long)]
        stdout: bool,
    },
    /// Validate configuration file.
    Validate {
        /// Path to configuration file.
        #[arg(short, long, default_value = "./config.yaml")]
        config: PathBuf,
    },
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
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
    for target in ["promtext", "promtext_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(config_path: PathBuf, destination: Destination, timeout: Duration) {
    info!("Loading configuration from: {}", config_path.display());
    let config = load_config(&config_path);
    info!(
        "Config: {} metrics, timeout={:?}",
        config.metrics.len(),
        timeout
    );

    let report = match run_once(&config, timeout, &destination) {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Collected {} metrics in {:?}",
        report.metrics.len(),
        report.elapsed
    );
    if report.had_warnings {
        warn!("Some warnings occurred during collection, but metrics were still generated");
    }
    if report.had_errors {
        warn!("Some errors occurred during collection, not all metrics were generated");
    }
}

fn validate(config_path: PathBuf) {
    info!("Validating configuration in: {}", config_path.display());
    let config = load_config(&config_path);
    if let Err(e) = config.validate_strict() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    println!("Configuration is valid.");
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    match args.command {
        Command::Run {
            config,
            output_dir,
            output_file,
            timeout,
            stdout,
        } => {
            let destination = if stdout {
                Destination::Stdout
            } else {
                Destination::File(output_dir.join(output_file))
            };
            run(config, destination, Duration::from_secs(timeout));
        }
        Command::Validate { config } => validate(config),
    }
}
