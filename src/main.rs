//! # Context Recall CLI (`recall`)
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite content store and apply the schema |
//! | `recall ingest <file>` | Chunk, embed, and store one document |
//! | `recall search "<query>"` | Run a retrieval and print the response as JSON |
//! | `recall delete --app <id>` | Remove an app's content, optionally narrowed |
//! | `recall serve` | Start the HTTP retrieval endpoint |

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use context_recall::config::{self, Config};
use context_recall::ingest::{delete_scope, ingest_document};
use context_recall::migrate;
use context_recall::server;
use context_recall::services::Services;
use context_recall_core::models::{Metadata, RetrievalRequest, SourceDocument, TemporalConstraint};
use context_recall_core::store::DeleteScope;

/// Context Recall: retrieval over a user's own content.
#[derive(Parser)]
#[command(name = "recall", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the content store schema. Safe to run repeatedly.
    Init,

    /// Ingest a text file as one document.
    Ingest {
        file: PathBuf,
        #[arg(long)]
        app: String,
        #[arg(long)]
        user: String,
        /// Source type, e.g. `twitter`, `notion`, `memory`.
        #[arg(long)]
        source: String,
        /// Document id; a random UUID when omitted.
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        link: Option<String>,
        /// RFC 3339 timestamp or YYYY-MM-DD; defaults to now.
        #[arg(long)]
        created_at: Option<String>,
    },

    /// Run a retrieval and print the response as JSON.
    Search {
        query: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        app: Option<String>,
        /// Defaults to `[retrieval].final_limit`.
        #[arg(long)]
        limit: Option<usize>,
        /// Only content created on or after this date (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        since: Option<String>,
        /// Only content created on or before this date.
        #[arg(long)]
        until: Option<String>,
        /// Boost recent content.
        #[arg(long)]
        recent: bool,
        /// Restrict to these source types.
        #[arg(long = "source")]
        sources: Vec<String>,
    },

    /// Delete an app's content from both stores.
    Delete {
        #[arg(long)]
        app: String,
        #[arg(long, conflicts_with = "link")]
        source: Option<String>,
        #[arg(long)]
        link: Option<String>,
        /// Delete these vector ids only.
        #[arg(long, num_args = 1.., conflicts_with_all = ["source", "link"])]
        ids: Vec<String>,
    },

    /// Start the HTTP retrieval endpoint.
    Serve,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse `YYYY-MM-DD` (start of day, UTC) or an RFC 3339 timestamp.
fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}': expected YYYY-MM-DD or RFC 3339", value))?;
    match date.and_hms_opt(0, 0, 0) {
        Some(naive) => Ok(naive.and_utc()),
        None => bail!("invalid date '{}'", value),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!(
                "Content store initialized at {}",
                cfg.content_store.path.display()
            );
        }
        Commands::Ingest {
            file,
            app,
            user,
            source,
            id,
            link,
            created_at,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let created_at = match created_at {
                Some(value) => parse_date(&value)?,
                None => Utc::now(),
            };
            let doc = SourceDocument {
                id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                user_id: user,
                app_id: app,
                source_type: source,
                link,
                created_at,
                text,
                metadata: Metadata::new(),
            };

            let services = Services::build(cfg).await?;
            let report = ingest_document(
                &doc,
                &services.config.chunking.options(),
                &services.vectors,
                services.content.as_ref(),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Search {
            query,
            user,
            app,
            limit,
            since,
            until,
            recent,
            sources,
        } => {
            let start_date = since.as_deref().map(parse_date).transpose()?;
            let end_date = until.as_deref().map(parse_date).transpose()?;
            let temporal_constraint = (start_date.is_some() || end_date.is_some() || recent)
                .then_some(TemporalConstraint {
                    start_date,
                    end_date,
                    recency: recent,
                });

            let mut request = RetrievalRequest::new(query, user)
                .with_max_results(limit.unwrap_or(cfg.retrieval.final_limit));
            request.app_id = app;
            request.temporal_constraint = temporal_constraint;
            request.source_types = (!sources.is_empty()).then_some(sources);

            let services = Services::build(cfg).await?;
            let response = services.orchestrator.retrieve(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Delete {
            app,
            source,
            link,
            ids,
        } => {
            let services = Services::build(cfg).await?;
            if !ids.is_empty() {
                services.vectors.delete_by_ids(&ids).await;
                println!("Deleted {} vector ids", ids.len());
                return Ok(());
            }
            let scope = DeleteScope {
                app_id: app,
                source_type: source,
                link,
            };
            let content = Arc::clone(&services.content);
            let removed = delete_scope(&scope, &services.vectors, &content).await?;
            println!("Deleted {} content items", removed);
        }
        Commands::Serve => {
            let services = Services::build(cfg).await?;
            server::run_server(services).await?;
        }
    }

    Ok(())
}
