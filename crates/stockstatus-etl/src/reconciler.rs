//! Merge of staging into the durable table
//!
//! One transaction per merge. Inside it every distinct staged code is
//! upserted with a single `INSERT ... SELECT ... ON CONFLICT` statement, then
//! the result is verified before commit. Any error drops the transaction, so
//! readers see either the whole merge or none of it.
//!
//! Durable codes that are absent from staging are never touched.

use crate::error::MergeError;
use crate::models::MergeReport;
use crate::staging::StagingSession;
use crate::store::TableNames;
use tracing::{info, instrument};

/// Merges an open staging session into its durable table
pub struct Reconciler<'a, 's> {
    session: &'a StagingSession<'s>,
}

impl<'a, 's> Reconciler<'a, 's> {
    pub fn new(session: &'a StagingSession<'s>) -> Self {
        Self { session }
    }

    #[instrument(skip(self), fields(table = %self.session.store().tables().durable))]
    pub async fn merge(&self) -> Result<MergeReport, MergeError> {
        let store = self.session.store();
        let sql = MergeSql::new(store.tables());

        let mut tx = store.pool().begin().await?;

        let staged_rows: i64 = sqlx::query_scalar(&sql.staged_rows).fetch_one(&mut *tx).await?;
        let distinct_codes: i64 = sqlx::query_scalar(&sql.distinct_codes).fetch_one(&mut *tx).await?;
        let existing: i64 = sqlx::query_scalar(&sql.existing_codes).fetch_one(&mut *tx).await?;

        sqlx::query(&sql.upsert).execute(&mut *tx).await?;

        let found: i64 = sqlx::query_scalar(&sql.verify).fetch_one(&mut *tx).await?;
        if found != distinct_codes {
            // dropping the transaction rolls the upsert back
            return Err(MergeError::Verification {
                expected: distinct_codes,
                found,
            });
        }

        tx.commit().await?;

        let report = MergeReport {
            distinct_codes,
            inserted: distinct_codes - existing,
            updated: existing,
            duplicate_rows: staged_rows - distinct_codes,
        };

        info!(
            inserted = report.inserted,
            updated = report.updated,
            duplicate_rows = report.duplicate_rows,
            "Merge committed"
        );

        Ok(report)
    }
}

/// Statements for one merge
struct MergeSql {
    staged_rows: String,
    distinct_codes: String,
    existing_codes: String,
    upsert: String,
    verify: String,
}

impl MergeSql {
    fn new(tables: &TableNames) -> Self {
        let durable = &tables.durable;
        let staging = &tables.staging;

        Self {
            staged_rows: format!("SELECT COUNT(*) FROM {staging}"),
            distinct_codes: format!("SELECT COUNT(DISTINCT code) FROM {staging}"),
            existing_codes: format!(
                "SELECT COUNT(DISTINCT s.code) FROM {staging} s \
                 WHERE EXISTS (SELECT 1 FROM {durable} d WHERE d.code = s.code)"
            ),
            // Last occurrence of a code in the scrape wins. The WHERE clause
            // also keeps SQLite from reading ON CONFLICT as a join constraint.
            upsert: format!(
                r#"
                INSERT INTO {durable} (
                    code, company, brand, balance, comments, allocation, size, cases_per_pallet, import_date
                )
                SELECT s.code, s.company, s.brand, s.balance, s.comments, s.allocation, s.size,
                       s.cases_per_pallet, CURRENT_TIMESTAMP
                FROM {staging} s
                WHERE s.row_no = (SELECT MAX(l.row_no) FROM {staging} l WHERE l.code = s.code)
                ON CONFLICT (code) DO UPDATE SET
                    company = excluded.company,
                    brand = excluded.brand,
                    balance = excluded.balance,
                    comments = excluded.comments,
                    allocation = excluded.allocation,
                    size = excluded.size,
                    cases_per_pallet = excluded.cases_per_pallet,
                    import_date = excluded.import_date
                "#
            ),
            verify: format!(
                "SELECT COUNT(*) FROM {durable} d \
                 WHERE EXISTS (SELECT 1 FROM {staging} s WHERE s.code = d.code)"
            ),
        }
    }
}
