//! One fetch -> parse -> stage -> merge run
//!
//! Stages run strictly in sequence. A failure in any stage moves the run to
//! `Failed`, skips everything after it and is returned to the caller; there
//! is no resumption, a new run starts again from fetching.

use crate::config::LoadConfig;
use crate::error::{EtlError, Result, RunStage};
use crate::extractor::StockDocument;
use crate::fetcher::StockFetcher;
use crate::models::{ExtractionStats, RunSummary, StockRecord};
use crate::reconciler::Reconciler;
use crate::staging::StagingSession;
use crate::store::StockStore;
use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives a single run through its stages
pub struct Pipeline<'a> {
    fetcher: &'a StockFetcher,
    store: Option<&'a StockStore>,
    load: LoadConfig,
    stage: RunStage,
    run_id: Uuid,
}

impl<'a> Pipeline<'a> {
    pub fn new(fetcher: &'a StockFetcher, store: &'a StockStore, load: LoadConfig) -> Self {
        Self {
            fetcher,
            store: Some(store),
            load,
            stage: RunStage::Idle,
            run_id: Uuid::new_v4(),
        }
    }

    /// A pipeline that stops after parsing and never touches a database.
    pub fn dry_run(fetcher: &'a StockFetcher) -> Self {
        Self {
            fetcher,
            store: None,
            load: LoadConfig::default(),
            stage: RunStage::Idle,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn advance(&mut self, next: RunStage) {
        debug_assert!(self.stage.can_advance_to(next), "{} -> {}", self.stage, next);
        info!(from = %self.stage, to = %next, "Run stage changed");
        self.stage = next;
    }

    fn fail(&mut self, err: EtlError) -> EtlError {
        error!(stage = %self.stage, kind = err.kind(), error = %err, "Run failed");
        self.advance(RunStage::Failed);
        err
    }

    /// Execute the run.
    ///
    /// Calling this again after a run has finished starts a fresh run from
    /// fetching under a new run id.
    pub async fn run(&mut self) -> Result<RunSummary> {
        if self.stage != RunStage::Idle {
            self.stage = RunStage::Idle;
            self.run_id = Uuid::new_v4();
        }

        let span = info_span!("etl_run", run_id = %self.run_id);
        self.run_stages().instrument(span).await
    }

    async fn run_stages(&mut self) -> Result<RunSummary> {
        let started_at = Utc::now();

        self.advance(RunStage::Fetching);
        let body = match self.fetcher.fetch().await {
            Ok(body) => body,
            Err(err) => return Err(self.fail(err.into())),
        };

        self.advance(RunStage::Parsing);
        let (records, extraction) = match parse(&body) {
            Ok(parsed) => parsed,
            Err(err) => return Err(self.fail(err)),
        };
        info!(
            rows_seen = extraction.rows_seen,
            records = extraction.records,
            short_rows = extraction.short_rows,
            header_rows = extraction.header_rows,
            blank_code_rows = extraction.blank_code_rows,
            "Document parsed"
        );

        let mut summary = RunSummary {
            run_id: self.run_id,
            started_at,
            finished_at: started_at,
            document_bytes: body.len(),
            extraction,
            load: None,
            merge: None,
        };

        let Some(store) = self.store else {
            info!("Dry run: skipping staging and merge");
            summary.finished_at = Utc::now();
            return Ok(summary);
        };

        self.advance(RunStage::Staging);
        let session = match StagingSession::open(store).await {
            Ok(session) => session,
            Err(err) => return Err(self.fail(err.into())),
        };

        let loaded = session.load(records, self.load.reject_policy).await;
        let load = match loaded {
            Ok(load) => load,
            Err(err) => {
                let err = self.fail(err.into());
                self.abandon(session).await;
                return Err(err);
            },
        };
        info!(staged = load.staged, rejected = load.rejected.len(), "Records staged");

        self.advance(RunStage::Merging);
        let merged = Reconciler::new(&session).merge().await;
        let merge = match merged {
            Ok(merge) => merge,
            Err(err) => {
                let err = self.fail(err.into());
                self.abandon(session).await;
                return Err(err);
            },
        };

        // The merge is committed at this point; a failed drop only leaves a
        // staging table behind for the next run to recreate.
        if let Err(err) = session.release().await {
            warn!(error = %err, "Could not drop staging table after merge");
        }

        self.advance(RunStage::Done);

        summary.load = Some(load);
        summary.merge = Some(merge);
        summary.finished_at = Utc::now();

        info!(
            staged = summary.staged(),
            inserted = merge.inserted,
            updated = merge.updated,
            elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
            "Run complete"
        );

        Ok(summary)
    }

    async fn abandon(&self, session: StagingSession<'_>) {
        if let Err(err) = session.discard(self.load.keep_staging_on_failure).await {
            warn!(error = %err, "Could not drop staging table after failure");
        }
    }
}

/// Parse the document and collect its records. The HTML tree does not
/// outlive this call, which keeps it away from any await point.
fn parse(body: &str) -> Result<(Vec<StockRecord>, ExtractionStats)> {
    let document = StockDocument::parse(body)?;
    Ok(document.scan())
}
