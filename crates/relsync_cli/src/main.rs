//! relsync CLI
//!
//! Command-line tools for relsync schemas and blob stores.
//!
//! # Commands
//!
//! - `commands` - Print the synthesized commands of a table
//! - `inspect` - Summarize a schema file
//! - `blob` - Put, get or remove blobs in a filesystem blob store
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use relsync_core::DialectKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// relsync command-line tools.
#[derive(Parser)]
#[command(name = "relsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Backend dialect names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DialectArg {
    Postgres,
    Sqlite,
    Sqlserver,
}

impl From<DialectArg> for DialectKind {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => DialectKind::Postgres,
            DialectArg::Sqlite => DialectKind::Sqlite,
            DialectArg::Sqlserver => DialectKind::SqlServer,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print insert, update, delete and select commands of a table
    Commands {
        /// Schema file (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Table name
        #[arg(short, long)]
        table: String,

        /// Backend dialect
        #[arg(short, long, value_enum, default_value = "postgres")]
        dialect: DialectArg,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Summarize the tables, keys and references of a schema file
    Inspect {
        /// Schema file (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Filesystem blob store operations
    Blob {
        /// Root directory of the blob store
        #[arg(short, long, global = true)]
        root: Option<PathBuf>,

        #[command(subcommand)]
        action: BlobAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum BlobAction {
    /// Store a file (or stdin) under an id
    Put {
        /// Blob id
        #[arg(short, long)]
        id: u64,

        /// Input file; stdin when omitted
        file: Option<PathBuf>,
    },

    /// Write a blob to a file (or stdout)
    Get {
        /// Blob id
        #[arg(short, long)]
        id: u64,

        /// Output file; stdout when omitted
        file: Option<PathBuf>,
    },

    /// Remove a blob
    Rm {
        /// Blob id
        #[arg(short, long)]
        id: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so blob data on stdout stays clean.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Commands {
            schema,
            table,
            dialect,
            format,
        } => {
            commands::synth::run(&schema, &table, dialect.into(), format)?;
        }
        Commands::Inspect { schema, format } => {
            commands::inspect::run(&schema, format)?;
        }
        Commands::Blob { root, action } => {
            let root = root.ok_or("--root is required for blob commands")?;
            match action {
                BlobAction::Put { id, file } => commands::blob::put(&root, id, file.as_deref())?,
                BlobAction::Get { id, file } => commands::blob::get(&root, id, file.as_deref())?,
                BlobAction::Rm { id } => commands::blob::rm(&root, id)?,
            }
        }
        Commands::Version => {
            println!("relsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
