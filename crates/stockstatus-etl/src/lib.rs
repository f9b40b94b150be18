//! Stock Status ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Scrapes the stock-status table from the inventory portal and merges it
//! into a durable database table keyed by product code.
//!
//! # Run stages
//!
//! 1. **Fetch** ([`fetcher`]): one authenticated form POST returns the page
//! 2. **Parse** ([`extractor`]): table rows become [`StockRecord`]s, header
//!    and short rows are skipped
//! 3. **Stage** ([`staging`]): records are written to a freshly recreated
//!    staging table with integer quantities
//! 4. **Merge** ([`reconciler`]): staging is upserted into the durable table
//!    in one transaction, then staging is dropped
//!
//! # Example
//!
//! ```no_run
//! use stockstatus_etl::{EtlConfig, Pipeline, StockFetcher, StockStore};
//!
//! async fn run(config: EtlConfig) -> stockstatus_etl::Result<()> {
//!     let fetcher = StockFetcher::new(config.source.clone())?;
//!     let store = StockStore::connect_lazy(
//!         &config.database.url(),
//!         config.database.max_connections,
//!         &config.database.table,
//!     )
//!     .map_err(|e| stockstatus_etl::EtlError::config(e.to_string()))?;
//!
//!     let summary = Pipeline::new(&fetcher, &store, config.load).run().await?;
//!     println!("staged {} records", summary.staged());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod reconciler;
pub mod staging;
pub mod store;

pub use config::{ConfigArgs, DatabaseConfig, EtlConfig, LoadConfig, RejectPolicy, SourceConfig};
pub use error::{EtlError, FetchError, LoadError, MergeError, Result, RunStage};
pub use extractor::{MarkupNode, RowOutcome, StockDocument};
pub use fetcher::StockFetcher;
pub use models::{DurableRow, LoadReport, MergeReport, RunSummary, StockRecord};
pub use pipeline::Pipeline;
pub use reconciler::Reconciler;
pub use staging::StagingSession;
pub use store::StockStore;
