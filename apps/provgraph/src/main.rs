//! # provgraph - Provenance-Aware Graph Query Server
//!
//! The binary around `provgraph-core`.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for store management and queries
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               apps/provgraph (THE BINARY)            │
//! │                                                      │
//! │   ┌─────────────┐            ┌─────────────┐         │
//! │   │    CLI      │            │  HTTP API   │         │
//! │   │   (clap)    │            │   (axum)    │         │
//! │   └──────┬──────┘            └──────┬──────┘         │
//! │          └──────────────┬───────────┘                │
//! │                         ▼                            │
//! │                ┌─────────────────┐                   │
//! │                │  provgraph-core │                   │
//! │                │   (THE ENGINE)  │                   │
//! │                └─────────────────┘                   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! provgraph init
//! provgraph import -f dataset.json
//! provgraph query --inline '{"find": "nodes", "node_pattern": {"type": "drug"}}'
//! provgraph server --host 0.0.0.0 --port 8080
//! ```

use clap::Parser;
use provgraph::cli;
use provgraph_core::ErrorBody;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "provgraph=info,provgraph_core=info,tower_http=debug";
const VERBOSE_FILTER: &str = "provgraph=debug,provgraph_core=debug,tower_http=debug";

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);

    let json_mode = cli.json_mode;
    let show_banner = !cli.quiet
        && !json_mode
        && matches!(cli.command, Some(cli::Commands::Server { .. }));
    if show_banner {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        if json_mode {
            println!(
                "{}",
                serde_json::to_string_pretty(&ErrorBody::from(&e)).unwrap_or_default()
            );
        }
        tracing::error!(code = e.code(), "Error: {}", e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; `PROVGRAPH_LOG_FORMAT=json` enables machine-parseable output.
fn init_tracing(verbose: bool) {
    let log_format = std::env::var("PROVGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn print_banner() {
    println!(
        r#"
  provgraph v{}
  provenance-aware graph query engine

  Evidence-weighted • Bounded • Deterministic
"#,
        env!("CARGO_PKG_VERSION")
    );
}
