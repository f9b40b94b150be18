//! Staging session and loader
//!
//! A [`StagingSession`] owns the staging table for the length of one run. It
//! is opened by dropping and recreating the table, so nothing left by an
//! earlier aborted run can reach the merge, and it is closed either by
//! [`StagingSession::release`] after a successful merge or by
//! [`StagingSession::discard`] on failure.

use crate::config::RejectPolicy;
use crate::error::LoadError;
use crate::models::{LoadReport, RejectedRow, StockRecord};
use crate::store::StockStore;
use tracing::{debug, info, warn};

/// The staging table of the current run
#[must_use = "a staging session must be released or discarded"]
pub struct StagingSession<'s> {
    store: &'s StockStore,
    active: bool,
}

impl<'s> StagingSession<'s> {
    /// Ensure the durable table exists and recreate staging empty.
    pub async fn open(store: &'s StockStore) -> Result<StagingSession<'s>, LoadError> {
        store.ensure_durable_table().await?;

        let mut tx = store.pool().begin().await?;
        sqlx::query(&store.drop_staging_sql()).execute(&mut *tx).await?;
        sqlx::query(&store.staging_ddl()).execute(&mut *tx).await?;
        tx.commit().await?;

        info!(table = %store.tables().staging, "Staging table recreated");
        Ok(Self { store, active: true })
    }

    pub fn store(&self) -> &'s StockStore {
        self.store
    }

    /// Write records to staging, converting quantities to integers.
    ///
    /// Rows are numbered by their position in `records` (1-based), whether or
    /// not they are staged. All inserts share one transaction: under
    /// [`RejectPolicy::Abort`] the first bad record leaves staging empty.
    pub async fn load<I>(&self, records: I, policy: RejectPolicy) -> Result<LoadReport, LoadError>
    where
        I: IntoIterator<Item = StockRecord>,
    {
        let sql = format!(
            "INSERT INTO {} (row_no, code, company, brand, balance, comments, allocation, size, cases_per_pallet) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            self.store.tables().staging
        );

        let mut report = LoadReport::default();
        let mut tx = self.store.pool().begin().await?;

        for (index, record) in records.into_iter().enumerate() {
            let row_no = index as i64 + 1;

            let row = match record.to_staged(row_no) {
                Ok(row) => row,
                Err(err) => match policy {
                    RejectPolicy::Abort => return Err(err),
                    RejectPolicy::Skip => {
                        warn!(row_no, code = %record.code, error = %err, "Rejected record");
                        report.rejected.push(RejectedRow {
                            row_no,
                            code: record.code,
                            reason: err.to_string(),
                        });
                        continue;
                    },
                },
            };

            sqlx::query(&sql)
                .bind(row.row_no)
                .bind(row.code)
                .bind(row.company)
                .bind(row.brand)
                .bind(row.balance)
                .bind(row.comments)
                .bind(row.allocation)
                .bind(row.size)
                .bind(row.cases_per_pallet)
                .execute(&mut *tx)
                .await?;

            report.staged += 1;
        }

        tx.commit().await?;

        debug!(staged = report.staged, rejected = report.rejected.len(), "Staging load committed");
        Ok(report)
    }

    /// Rows currently in staging.
    pub async fn row_count(&self) -> Result<i64, LoadError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.store.tables().staging);
        Ok(sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(self.store.pool())
            .await?)
    }

    /// Drop staging after a successful merge.
    pub async fn release(mut self) -> Result<(), sqlx::Error> {
        self.drop_table().await?;
        info!(table = %self.store.tables().staging, "Staging table released");
        Ok(())
    }

    /// Close the session after a failure, dropping staging unless `keep` is set.
    pub async fn discard(mut self, keep: bool) -> Result<(), sqlx::Error> {
        if keep {
            self.active = false;
            warn!(table = %self.store.tables().staging, "Keeping staging table after failed run");
            return Ok(());
        }

        self.drop_table().await?;
        info!(table = %self.store.tables().staging, "Staging table discarded");
        Ok(())
    }

    async fn drop_table(&mut self) -> Result<(), sqlx::Error> {
        sqlx::query(&self.store.drop_staging_sql())
            .execute(self.store.pool())
            .await?;
        self.active = false;
        Ok(())
    }
}

impl Drop for StagingSession<'_> {
    fn drop(&mut self) {
        if self.active {
            warn!(
                table = %self.store.tables().staging,
                "Staging session ended without release; the next run will recreate it"
            );
        }
    }
}
