//! Error types for the stock-status ETL run
//!
//! Every failure is fatal to the run. The variant tells the operator which
//! stage stopped and why; nothing in the pipeline retries.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Position of a run in its state machine.
///
/// `Idle -> Fetching -> Parsing -> Staging -> Merging -> Done`, with any stage
/// able to move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    Idle,
    Fetching,
    Parsing,
    Staging,
    Merging,
    Done,
    Failed,
}

impl RunStage {
    /// Whether `next` is a legal transition from this stage.
    pub fn can_advance_to(self, next: RunStage) -> bool {
        use RunStage::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Parsing)
                | (Parsing, Staging)
                | (Staging, Merging)
                | (Merging, Done)
                | (Idle | Fetching | Parsing | Staging | Merging, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStage::Done | RunStage::Failed)
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Idle => "idle",
            RunStage::Fetching => "fetching",
            RunStage::Parsing => "parsing",
            RunStage::Staging => "staging",
            RunStage::Merging => "merging",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Top-level error for one ETL run
#[derive(Error, Debug)]
pub enum EtlError {
    /// Required configuration missing or invalid; nothing was contacted
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The document could not be treated as the stock-status page at all
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),
}

impl EtlError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Taxonomy name reported to operators
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::Config(_) => "ConfigError",
            EtlError::Fetch(_) => "FetchError",
            EtlError::Parse(_) => "ParseError",
            EtlError::Load(_) => "LoadError",
            EtlError::Merge(_) => "MergeError",
        }
    }

    /// Stage at which a run fails with this error
    pub fn stage(&self) -> RunStage {
        match self {
            EtlError::Config(_) => RunStage::Idle,
            EtlError::Fetch(_) => RunStage::Fetching,
            EtlError::Parse(_) => RunStage::Parsing,
            EtlError::Load(_) => RunStage::Staging,
            EtlError::Merge(_) => RunStage::Merging,
        }
    }

    /// Process exit code for this failure kind
    pub fn exit_code(&self) -> i32 {
        match self {
            EtlError::Config(_) => 2,
            EtlError::Fetch(_) => 3,
            EtlError::Parse(_) => 4,
            EtlError::Load(_) => 5,
            EtlError::Merge(_) => 6,
        }
    }
}

/// Upstream portal could not be read
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("response body from {url} could not be read: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A record could not be written to staging
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("row {row_no} (code '{code}'): {field} '{value}' is not an integer")]
    InvalidQuantity {
        row_no: i64,
        code: String,
        field: &'static str,
        value: String,
    },

    #[error("staging table write failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Staging could not be merged into the durable table; nothing was applied
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("merge statement failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("merge verification failed: expected {expected} durable rows for staged codes, found {found}")]
    Verification { expected: i64, found: i64 },
}
