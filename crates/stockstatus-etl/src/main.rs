//! Stock Status ETL - scrape the portal's stock sheet into the database

use clap::Parser;
use std::process;
use stockstatus_common::logging::{init_logging, LogConfig, LogLevel};
use stockstatus_etl::{
    ConfigArgs, EtlConfig, EtlError, Pipeline, RunSummary, StockFetcher, StockStore,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "stockstatus-etl")]
#[command(author, version, about = "Scrape portal stock status and merge it into the database")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Fetch and parse only; report what would be staged
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("stockstatus-etl")
        .build();

    // Environment variables take precedence over flags
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    match execute(cli).await {
        Ok(summary) => info!(run_id = %summary.run_id, staged = summary.staged(), "Finished"),
        Err(e) => {
            error!(stage = %e.stage(), kind = e.kind(), error = %e, "Run failed");
            eprintln!("Error [{} at {}]: {}", e.kind(), e.stage(), e);
            process::exit(e.exit_code());
        },
    }
}

async fn execute(cli: Cli) -> Result<RunSummary, EtlError> {
    if cli.dry_run {
        let source = EtlConfig::source_from_args(cli.config)?;
        let fetcher = StockFetcher::new(source)?;
        let summary = Pipeline::dry_run(&fetcher).run().await?;
        report(&summary, cli.json);
        return Ok(summary);
    }

    let config = EtlConfig::from_args(cli.config)?;
    info!(
        source = %config.source.url,
        database = %config.database.redacted_url(),
        table = %config.database.table,
        policy = ?config.load.reject_policy,
        "Configuration loaded"
    );

    let fetcher = StockFetcher::new(config.source.clone())?;
    let store = StockStore::connect_lazy(
        &config.database.url(),
        config.database.max_connections,
        &config.database.table,
    )
    .map_err(|e| EtlError::config(format!("database settings rejected: {}", e)))?;

    let result = Pipeline::new(&fetcher, &store, config.load).run().await;
    store.close().await;

    let summary = result?;
    report(&summary, cli.json);
    Ok(summary)
}

fn report(summary: &RunSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!(error = %e, "Could not serialize run summary"),
        }
        return;
    }

    match (&summary.load, &summary.merge) {
        (Some(load), Some(merge)) => println!(
            "Staged {} records ({} rejected); merged {} codes: {} inserted, {} updated",
            load.staged,
            load.rejected.len(),
            merge.distinct_codes,
            merge.inserted,
            merge.updated
        ),
        _ => println!(
            "Dry run: {} records extracted from {} table rows ({} bytes)",
            summary.extraction.records, summary.extraction.rows_seen, summary.document_bytes
        ),
    }
}
