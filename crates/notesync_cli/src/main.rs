//! notesync CLI
//!
//! Command-line client for syncing a local notes directory.
//!
//! # Commands
//!
//! - `sync` - Run one sync pass against a remote
//! - `status` - Display sync metadata
//! - `conflicts` - List conflicts awaiting resolution
//! - `resolve` - Resolve a stored conflict
//! - `add` - Create a note locally
//! - `listen` - Follow pushed remote events over WebSocket

mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::RemoteTarget;
use notesync_protocol::ResolutionStrategy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// notesync command-line client.
#[derive(Parser)]
#[command(name = "notesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local notes directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the remote lives.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct RemoteArgs {
    /// Directory of a remote simulated on local files
    #[arg(long)]
    remote_dir: Option<PathBuf>,

    /// Base URL of an HTTP notes API
    #[arg(long)]
    remote_url: Option<String>,
}

impl RemoteArgs {
    fn target(self, token: Option<String>) -> RemoteTarget {
        match (self.remote_dir, self.remote_url) {
            (Some(dir), _) => RemoteTarget::Dir(dir),
            (None, Some(url)) => RemoteTarget::Url { url, token },
            // clap enforces exactly one of the two
            (None, None) => RemoteTarget::Dir(PathBuf::from(".")),
        }
    }
}

/// Side kept when resolving a conflict.
#[derive(Clone, Copy, ValueEnum)]
enum Side {
    /// Keep the local copy
    Local,
    /// Keep the remote copy
    Remote,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass
    Sync {
        /// Conflict resolution strategy (local, remote, manual)
        #[arg(short, long, default_value = "local")]
        strategy: ResolutionStrategy,

        #[command(flatten)]
        remote: RemoteArgs,

        /// Bearer token for the remote
        #[arg(long)]
        token: Option<String>,
    },

    /// Display sync metadata
    Status,

    /// List conflicts awaiting resolution
    Conflicts,

    /// Resolve a stored conflict
    Resolve {
        /// Note ID
        note_id: String,

        /// Copy to keep
        #[arg(short, long, value_enum)]
        keep: Side,

        #[command(flatten)]
        remote: RemoteArgs,

        /// Bearer token for the remote
        #[arg(long)]
        token: Option<String>,
    },

    /// Create a note locally
    Add {
        /// Note title
        #[arg(short, long)]
        title: String,

        /// Note body
        #[arg(short, long, default_value = "")]
        content: String,

        /// Tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Follow pushed remote events until interrupted
    Listen {
        /// WebSocket address of the event channel
        address: String,

        /// Auth token for the event channel and the remote
        #[arg(long)]
        token: Option<String>,

        /// Conflict resolution strategy for requested passes
        #[arg(short, long, default_value = "local")]
        strategy: ResolutionStrategy,

        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = cli.path.ok_or("Notes directory required (--path)")?;

    match cli.command {
        Commands::Sync {
            strategy,
            remote,
            token,
        } => {
            commands::sync::run(&path, remote.target(token), strategy).await?;
        }
        Commands::Status => {
            commands::status::run(&path)?;
        }
        Commands::Conflicts => {
            commands::conflicts::run(&path)?;
        }
        Commands::Resolve {
            note_id,
            keep,
            remote,
            token,
        } => {
            let keep_local = matches!(keep, Side::Local);
            commands::resolve::run(&path, remote.target(token), &note_id, keep_local).await?;
        }
        Commands::Add {
            title,
            content,
            tags,
        } => {
            commands::add::run(&path, &title, &content, tags)?;
        }
        Commands::Listen {
            address,
            token,
            strategy,
            remote,
        } => {
            let target = remote.target(token.clone());
            commands::listen::run(&path, target, &address, token.as_deref(), strategy).await?;
        }
    }

    Ok(())
}
