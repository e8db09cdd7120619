//! mctx CLI
//!
//! Command-line tools that drive the transaction engine against an
//! in-memory storage engine.
//!
//! # Commands
//!
//! - `scenarios` - Run the reference transaction scenarios
//! - `stress` - Run the concurrent counter workload and check for lost updates

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// mctx transaction engine tools.
#[derive(Parser)]
#[command(name = "mctx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reference transaction scenarios
    Scenarios {
        /// Run only the scenario with this name
        #[arg(short, long)]
        name: Option<String>,

        /// List scenarios without running them
        #[arg(short, long)]
        list: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run the concurrent read-modify-write counter workload
    Stress {
        /// Number of worker threads
        #[arg(short, long, default_value = "4")]
        threads: usize,

        /// Increments per thread
        #[arg(short, long, default_value = "1000")]
        ops: usize,

        /// Number of distinct counters
        #[arg(short, long, default_value = "16")]
        keys: usize,

        /// Retries per increment before giving up
        #[arg(long, default_value = "1000")]
        max_retries: usize,

        /// Lock timeout in milliseconds (waits forever if omitted)
        #[arg(long)]
        lock_timeout_ms: Option<u64>,

        /// Transaction hints as JSON, e.g. '{"no_usage_lock":true}'
        #[arg(long)]
        hints: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Scenarios { name, list, format } => {
            if list {
                commands::scenarios::list(&format)?;
            } else if !commands::scenarios::run(name.as_deref(), &format)? {
                std::process::exit(1);
            }
        }
        Commands::Stress {
            threads,
            ops,
            keys,
            max_retries,
            lock_timeout_ms,
            hints,
            format,
        } => {
            let options = commands::stress::StressOptions {
                threads,
                ops,
                keys,
                max_retries,
                lock_timeout_ms,
                hints,
            };
            if !commands::stress::run(&options, &format)? {
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("mctx CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("mctx core v{}", mctx_core::VERSION);
        }
    }

    Ok(())
}
