//! CLI frontend for the Kulisse robot-simulation kernel.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kulisse",
    about = "Kulisse: a discrete-time 2D robot simulator",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example world description
    Init {
        /// Path of the world file to create
        path: PathBuf,
    },

    /// Load a world description and report configuration errors
    Check {
        /// World description (JSON)
        file: PathBuf,
    },

    /// Run a world for a number of update cycles and print every model's reading
    Run {
        /// World description (JSON)
        file: PathBuf,

        /// Number of completed update cycles to run
        #[arg(short, long, default_value = "10")]
        cycles: u64,

        /// Ignore wall-clock pacing and run cycles back to back
        #[arg(short, long)]
        fast: bool,

        /// Show the kernel event log
        #[arg(short, long)]
        verbose: bool,
    },

    /// Load a world and save it back through every model
    Save {
        /// World description (JSON)
        file: PathBuf,

        /// Write to this path instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { path } => commands::init::run(&path),
        Commands::Check { file } => commands::check::run(&file),
        Commands::Run {
            file,
            cycles,
            fast,
            verbose,
        } => commands::run::run(&file, cycles, fast, verbose),
        Commands::Save { file, output } => commands::save::run(&file, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
