use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use pgbm25::config::Config;
use pgbm25::logging;
use pgbm25::store::DynamicRow;
use pgbm25::{Bm25Store, FilterRequest, ScoredRows, SearchRequest};

#[derive(Parser)]
#[command(name = "pgbm25", version, about = "BM25 relevance search against PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// PostgreSQL URL (overrides database_url from config)
    #[arg(long, global = true)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether the server has the extension, access method and version needed
    Check,
    /// Rank rows by BM25 score, best match first
    Search {
        /// Table to search (name or schema.name)
        #[arg(long)]
        table: String,
        /// Text column to score
        #[arg(long)]
        field: String,
        /// Query text; empty returns no rows
        #[arg(long)]
        query: String,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<u32>,
        /// Secondary sort column for equal scores
        #[arg(long)]
        then_by: Option<String>,
    },
    /// Return rows whose score is at or below a threshold (lower is better)
    Filter {
        /// Table to search (name or schema.name)
        #[arg(long)]
        table: String,
        /// Text column to score
        #[arg(long)]
        field: String,
        /// Query text
        #[arg(long)]
        query: String,
        /// Score threshold, e.g. -0.5
        #[arg(long, allow_negative_numbers = true)]
        threshold: f64,
        /// bm25 index to score through
        #[arg(long)]
        index: Option<String>,
    },
}

/// Print each decoded row as one JSON line; undecodable rows are logged and skipped.
fn print_rows(rows: ScoredRows<DynamicRow>) -> Result<()> {
    let (rows, errors) = rows.partition();
    for row in &rows {
        println!("{}", serde_json::to_string(row)?);
    }
    for e in &errors {
        tracing::warn!(error = %e, "Skipped row");
    }
    tracing::info!(rows = rows.len(), skipped = errors.len(), "Done");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args
    let cli = Cli::parse();

    // 2. Load configuration
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    // 3. Initialize logging before any other output
    logging::init_logging(&config);

    let store = Bm25Store::connect_lazy(
        &config.database_url,
        config.max_connections,
        Duration::from_secs(config.acquire_timeout_secs),
        config.requirements(),
    )?;

    match cli.command {
        Commands::Check => {
            let report = store.capability_report().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.supported {
                anyhow::bail!("server does not support bm25 search");
            }
        }

        Commands::Search { table, field, query, limit, then_by } => {
            let table = store.table(&table).await?;
            let mut request = SearchRequest::new(query, field);
            if let Some(limit) = limit {
                request = request.limit(limit)?;
            }
            if let Some(column) = then_by {
                request = request.then_by(column);
            }
            let rows = store.search::<DynamicRow>(&table, &request).await?;
            print_rows(rows)?;
        }

        Commands::Filter { table, field, query, threshold, index } => {
            let table = store.table(&table).await?;
            let mut request = FilterRequest::new(query, field, threshold);
            if let Some(index) = index {
                request = request.index(index);
            }
            let rows = store.filter::<DynamicRow>(&table, &request).await?;
            print_rows(rows)?;
        }
    }

    Ok(())
}
