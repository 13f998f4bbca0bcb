//! rollcall: inspect connection-manager descriptions.
//!
//! # Usage
//!
//! ```text
//! rollcall inspect <file> [--json]
//! rollcall list [--json]
//! rollcall show <name> [--json]
//! rollcall check-name <name> [--protocol]
//! rollcall --config <path> <command>
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check_name::CheckNameArgs, inspect::InspectArgs, list::ListArgs, show::ShowArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "rollcall",
    version,
    about = "Inspect installed connection managers and their protocols",
    long_about = None,
)]
struct Cli {
    /// Configuration file (defaults to <config dir>/rollcall/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a .manager cache file and print its protocols.
    Inspect(InspectArgs),

    /// List managers installed in the data directories.
    List(ListArgs),

    /// Prepare one manager the way a client would and print what it offers.
    Show(ShowArgs),

    /// Check whether a manager or protocol name is valid.
    CheckName(CheckNameArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect(args) => args.run(),
        Commands::List(args) => args.run(&commands::load_config(cli.config.as_deref())?),
        Commands::Show(args) => args.run(commands::load_config(cli.config.as_deref())?),
        Commands::CheckName(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
