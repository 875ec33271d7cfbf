use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mooring_core::{EntityKind, QueueStatus};

#[derive(Parser)]
#[command(name = "mooring")]
#[command(about = "Offline-first records with a queued sync to a remote authority")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for remote configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Treat the remote as reachable: drain the queue now and push after each write
    #[arg(long, global = true)]
    pub online: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an entity from key=value fields
    #[command(alias = "new")]
    Add {
        /// Entity type (task, project, alert, report, post)
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        /// Fields as key=value; values are parsed as JSON when possible
        fields: Vec<String>,
        /// Use this id instead of generating one
        #[arg(long, value_name = "ID")]
        id: Option<String>,
    },
    /// Merge key=value changes into an entity
    Update {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,
        /// Changes as key=value
        #[arg(required = true)]
        changes: Vec<String>,
    },
    /// Delete an entity
    Delete {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,
    },
    /// List entities of one type, most recently updated first
    List {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        /// Number of entities to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one entity
    Show {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,
        /// Include the local change history
        #[arg(long)]
        history: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and manage the sync queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Manage items the remote rejected with a version conflict
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Show queue counts, last sync and remote
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Seed the local store from the remote (first run only)
    Bootstrap,
    /// Fetch remote changes since the last sync
    Pull {
        /// Override the stored watermark
        #[arg(long, value_name = "TIMESTAMP")]
        since: Option<String>,
    },
    /// Send pending queue items to the remote
    Push,
    /// Bootstrap or pull, then push
    Sync,
    /// Show recent local changes
    Log {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queue items in push order
    List {
        /// Only items in this status (pending, synced, conflict, failed)
        #[arg(long, value_parser = parse_status)]
        status: Option<QueueStatus>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a failed item back to pending
    Retry { id: i64 },
    /// Drop a failed or conflicting item
    Discard { id: i64 },
    /// Delete synced items older than the given age
    Prune {
        /// Minimum age in days
        #[arg(long, default_value = "7")]
        older_than_days: u32,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List conflicting items
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-send the local state as a fresh mutation
    KeepLocal { id: i64 },
    /// Overwrite the local copy with the remote state
    AcceptRemote { id: i64 },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Remote base URL serving /sync/*
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
        /// Bearer token for the remote
        #[arg(long, value_name = "TOKEN")]
        auth_token: Option<String>,
        /// Request timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved remote configuration
    Show,
}

pub fn parse_kind(value: &str) -> Result<EntityKind, String> {
    value.parse().map_err(|error: mooring_core::Error| error.to_string())
}

pub fn parse_status(value: &str) -> Result<QueueStatus, String> {
    value.parse().map_err(|error: mooring_core::Error| error.to_string())
}
