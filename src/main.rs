mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Expose a tape drive as a random-access network block device
#[derive(Parser)]
#[command(name = "tapisk", version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tape over NBD
    Serve(commands::serve::ServeArgs),

    /// Inspect or edit the location index
    Index(commands::index::IndexCommand),

    /// Write and read back test messages through the remapping layer
    Probe(commands::probe::ProbeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args),
        Commands::Index(args) => commands::index::run(args),
        Commands::Probe(args) => commands::probe::run(args),
    }
}
