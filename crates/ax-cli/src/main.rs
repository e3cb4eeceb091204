//! The AX command line.
//!
//! `serve` runs the trusted host; `chat` and `send` are thin clients over
//! the host's Unix-socket API; `configure` writes a starter setup.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod client;
mod commands;

#[derive(Parser)]
#[command(name = "ax")]
#[command(author, version, about = "AX personal agent host", long_about = None)]
struct Cli {
    /// Path to the state root (default `~/.ax`, or `$AX_HOME`).
    #[arg(long, global = true)]
    state_root: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the host.
    Serve,

    /// Interactive chat against a running host.
    Chat {
        /// Resume a specific session.
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Send one message and print the reply.
    Send {
        /// The message.
        message: String,

        /// Session to run under.
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Write a starter configuration.
    Configure,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let state_root = match cli.state_root {
        Some(root) => root,
        None => ax_config::default_state_root()?,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = match cli.command {
        Commands::Serve => runtime.block_on(commands::serve::run(&state_root)),
        Commands::Chat { session } => {
            runtime.block_on(commands::chat::run(&state_root, session))
        },
        Commands::Send { message, session } => {
            runtime.block_on(commands::send::run(&state_root, &message, session))
        },
        Commands::Configure => commands::configure::run(&state_root),
    };

    if let Err(ref e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
