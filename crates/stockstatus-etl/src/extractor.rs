//! Row extraction from the portal's stock-status page
//!
//! The portal renders its stock sheet as a plain HTML table whose layout we do
//! not control. Extraction is structural: every `<tr>` in the
//! document is a candidate, its `<td>` cells are trimmed, and rows that cannot
//! carry a record (too few cells, the column header, an empty code) are
//! skipped rather than treated as errors.
//!
//! Row classification only depends on [`MarkupNode`], so the scraper-backed
//! tree can be swapped for any other element tree.

use crate::error::{EtlError, Result};
use crate::models::{ExtractionStats, StockRecord, HEADER_LABEL, RECORD_CELL_COUNT};
use scraper::{ElementRef, Html};
use tracing::{debug, trace};

/// Minimal view of an element tree needed to pull rows out of a document.
pub trait MarkupNode: Sized {
    /// All descendant elements with the given tag name, in document order.
    fn find_all(&self, tag: &str) -> Vec<Self>;

    /// Concatenated text of this element and its descendants.
    fn text_content(&self) -> String;
}

impl<'a> MarkupNode for ElementRef<'a> {
    fn find_all(&self, tag: &str) -> Vec<Self> {
        self.descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .filter(|element| element.value().name().eq_ignore_ascii_case(tag))
            .collect()
    }

    fn text_content(&self) -> String {
        self.text().collect()
    }
}

/// What a single table row turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Record(StockRecord),
    TooFewCells(usize),
    Header,
    BlankCode,
}

impl RowOutcome {
    pub fn into_record(self) -> Option<StockRecord> {
        match self {
            RowOutcome::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Classify a row from its cell texts.
pub fn classify_cells<S: AsRef<str>>(cells: &[S]) -> RowOutcome {
    if cells.len() < RECORD_CELL_COUNT {
        return RowOutcome::TooFewCells(cells.len());
    }

    let code = cells[0].as_ref().trim();
    if code == HEADER_LABEL {
        return RowOutcome::Header;
    }
    if code.is_empty() {
        return RowOutcome::BlankCode;
    }

    match StockRecord::from_cells(cells) {
        Some(record) => RowOutcome::Record(record),
        None => RowOutcome::TooFewCells(cells.len()),
    }
}

/// Classify one `<tr>` element.
pub fn classify_row<N: MarkupNode>(row: &N) -> RowOutcome {
    let cells: Vec<String> = row
        .find_all("td")
        .iter()
        .map(|cell| cell.text_content().trim().to_string())
        .collect();

    classify_cells(&cells)
}

/// Every row under `root`, classified lazily in document order.
pub fn row_outcomes<N: MarkupNode>(root: &N) -> impl Iterator<Item = RowOutcome> {
    root.find_all("tr").into_iter().map(|row| classify_row(&row))
}

/// Records under `root`, lazily, in document order.
pub fn extract_records<N: MarkupNode>(root: &N) -> impl Iterator<Item = StockRecord> {
    row_outcomes(root).filter_map(RowOutcome::into_record)
}

/// A parsed stock-status page
pub struct StockDocument {
    html: Html,
}

impl StockDocument {
    /// Parse the raw page.
    ///
    /// html5ever recovers from nearly anything, so the only documents refused
    /// here are empty ones and ones without a `<table>`, which is what the
    /// portal serves when a login is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(EtlError::parse("document is empty"));
        }

        let html = Html::parse_document(raw);
        if !html.errors.is_empty() {
            debug!(errors = html.errors.len(), "HTML parser recovered from markup errors");
        }

        let document = Self { html };
        if document.root().find_all("table").is_empty() {
            return Err(EtlError::parse("document contains no <table> element"));
        }

        Ok(document)
    }

    fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// Lazy sequence of records; call again to restart from the top.
    pub fn records(&self) -> impl Iterator<Item = StockRecord> + '_ {
        extract_records(&self.root())
    }

    /// Collect all records along with per-row bookkeeping.
    pub fn scan(&self) -> (Vec<StockRecord>, ExtractionStats) {
        let mut stats = ExtractionStats::default();
        let mut records = Vec::new();

        for outcome in row_outcomes(&self.root()) {
            stats.rows_seen += 1;
            match outcome {
                RowOutcome::Record(record) => {
                    stats.records += 1;
                    records.push(record);
                },
                RowOutcome::TooFewCells(cells) => {
                    stats.short_rows += 1;
                    trace!(row = stats.rows_seen, cells, "Skipping short row");
                },
                RowOutcome::Header => {
                    stats.header_rows += 1;
                    trace!(row = stats.rows_seen, "Skipping header row");
                },
                RowOutcome::BlankCode => {
                    stats.blank_code_rows += 1;
                    debug!(row = stats.rows_seen, "Skipping row with empty code");
                },
            }
        }

        (records, stats)
    }
}
