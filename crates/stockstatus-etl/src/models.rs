//! Stock-status records as they move through a run

use crate::error::LoadError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of positional cells a row must expose to carry a record.
pub const RECORD_CELL_COUNT: usize = 8;

/// First-cell text of the portal's column header row.
pub const HEADER_LABEL: &str = "NC CODE";

/// One scraped row, trimmed but otherwise untyped.
///
/// Quantities stay as text here; they are only parsed when the record is
/// written to staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub code: String,
    pub company: String,
    pub brand: String,
    pub balance: String,
    pub comments: String,
    pub allocation: String,
    pub size: String,
    pub cases_per_pallet: String,
}

impl StockRecord {
    /// Build a record from the first eight trimmed cells, in portal column order.
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> Option<Self> {
        if cells.len() < RECORD_CELL_COUNT {
            return None;
        }
        let cell = |i: usize| cells[i].as_ref().trim().to_string();

        Some(Self {
            code: cell(0),
            company: cell(1),
            brand: cell(2),
            balance: cell(3),
            comments: cell(4),
            allocation: cell(5),
            size: cell(6),
            cases_per_pallet: cell(7),
        })
    }

    /// Parse quantities into a row ready for the staging table.
    ///
    /// `row_no` is the record's position in the scrape (1-based).
    pub fn to_staged(&self, row_no: i64) -> Result<StagedRow, LoadError> {
        Ok(StagedRow {
            row_no,
            code: self.code.clone(),
            company: self.company.clone(),
            brand: self.brand.clone(),
            balance: self.quantity(row_no, "balance", &self.balance)?,
            comments: self.comments.clone(),
            allocation: self.quantity(row_no, "allocation", &self.allocation)?,
            size: self.size.clone(),
            cases_per_pallet: self.quantity(row_no, "cases_per_pallet", &self.cases_per_pallet)?,
        })
    }

    fn quantity(&self, row_no: i64, field: &'static str, value: &str) -> Result<i64, LoadError> {
        value.parse::<i64>().map_err(|_| LoadError::InvalidQuantity {
            row_no,
            code: self.code.clone(),
            field,
            value: value.to_string(),
        })
    }
}

/// A record with typed quantities, as written to staging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRow {
    pub row_no: i64,
    pub code: String,
    pub company: String,
    pub brand: String,
    pub balance: i64,
    pub comments: String,
    pub allocation: i64,
    pub size: String,
    pub cases_per_pallet: i64,
}

/// A row of the durable table.
///
/// `import_date` is read back as text so the same struct decodes from every
/// engine the store supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DurableRow {
    pub code: String,
    pub company: String,
    pub brand: String,
    pub balance: i64,
    pub comments: String,
    pub allocation: i64,
    pub size: String,
    pub cases_per_pallet: i64,
    pub import_date: String,
}

/// How each table row of a document was treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub rows_seen: usize,
    pub records: usize,
    pub short_rows: usize,
    pub header_rows: usize,
    pub blank_code_rows: usize,
}

/// A record that was not staged under the skip policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub row_no: i64,
    pub code: String,
    pub reason: String,
}

/// Outcome of the staging stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Rows actually written to staging
    pub staged: usize,
    pub rejected: Vec<RejectedRow>,
}

/// Outcome of the merge stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub distinct_codes: i64,
    pub inserted: i64,
    pub updated: i64,
    /// Staged rows superseded by a later row with the same code
    pub duplicate_rows: i64,
}

/// Operator-facing summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub document_bytes: usize,
    pub extraction: ExtractionStats,
    pub load: Option<LoadReport>,
    pub merge: Option<MergeReport>,
}

impl RunSummary {
    /// Records successfully written to staging
    pub fn staged(&self) -> usize {
        self.load.as_ref().map_or(0, |load| load.staged)
    }
}
