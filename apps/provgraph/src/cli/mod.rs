//! # provgraph CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show entity and edge counts
//! - `init` - Initialize a new database
//! - `import` - Load a dataset file into the database
//! - `query` - Execute a query from a file or inline JSON
//! - `explain` - Show the compiled plan of a query
//! - `schema` - Print the query language registry

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand, ValueEnum};
use provgraph_core::ProvGraphError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// provgraph - provenance-aware graph query engine
///
/// Declarative graph patterns over evidence-weighted biomedical claims.
#[derive(Parser, Debug)]
#[command(name = "provgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the graph database (redb file, or dataset JSON for the memory backend)
    #[arg(short = 'D', long, global = true, default_value = "provgraph.redb")]
    pub database: PathBuf,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// TOML configuration file (overrides PROVGRAPH_CONFIG)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Storage backend selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// ACID redb database file
    Redb,
    /// In-memory graph loaded from a dataset JSON file
    Memory,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (default from config, then 127.0.0.1)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (default from config, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show entity and edge counts
    Status,

    /// Initialize a new empty database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Import entities and edges from a dataset JSON file
    Import {
        /// Dataset file ({"entities": [...], "edges": [...]})
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Execute a query
    Query {
        /// Query JSON file
        #[arg(short, long, conflicts_with = "inline", required_unless_present = "inline")]
        file: Option<PathBuf>,

        /// Query JSON given on the command line
        #[arg(long)]
        inline: Option<String>,
    },

    /// Show the compiled plan of a query without reading the store
    Explain {
        /// Query JSON file
        #[arg(short, long, conflicts_with = "inline", required_unless_present = "inline")]
        file: Option<PathBuf>,

        /// Query JSON given on the command line
        #[arg(long)]
        inline: Option<String>,
    },

    /// Print the fields, operators and vocabularies queries may use
    Schema,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), ProvGraphError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let store = StoreLocation {
        path: cli.database,
        backend: cli.backend,
    };
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            cmd_server(&store, &config, &host, port).await
        }
        Some(Commands::Status) | None => cmd_status(&store, &config, json_mode),
        Some(Commands::Init { force }) => cmd_init(&store, &config, force),
        Some(Commands::Import { file }) => cmd_import(&store, &config, &file, json_mode),
        Some(Commands::Query { file, inline }) => {
            let text = read_query(file.as_deref(), inline)?;
            cmd_query(&store, &config, &text, json_mode)
        }
        Some(Commands::Explain { file, inline }) => {
            let text = read_query(file.as_deref(), inline)?;
            cmd_explain(&config, &text)
        }
        Some(Commands::Schema) => cmd_schema(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse() {
        let cli = Cli::try_parse_from([
            "provgraph", "-D", "g.json", "-B", "memory", "--json-mode", "status",
        ])
        .expect("parse");
        assert_eq!(cli.backend, Backend::Memory);
        assert!(cli.json_mode);
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn query_needs_exactly_one_source() {
        assert!(Cli::try_parse_from(["provgraph", "query"]).is_err());
        assert!(
            Cli::try_parse_from(["provgraph", "query", "-f", "q.json", "--inline", "{}"]).is_err()
        );
        assert!(Cli::try_parse_from(["provgraph", "query", "--inline", "{}"]).is_ok());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(Cli::try_parse_from(["provgraph", "-B", "file", "status"]).is_err());
    }
}
