//! Staging and merge behaviour against a real database
//!
//! Each test gets its own SQLite file; see `common::sqlite_store`.

mod common;

use common::{record, seed_durable, sqlite_store};
use stockstatus_etl::{
    DurableRow, LoadError, MergeError, Reconciler, RejectPolicy, StagingSession, StockRecord,
    StockStore,
};

const OLD_DATE: &str = "2000-01-01 00:00:00";

async fn stage_and_merge(store: &StockStore, records: Vec<StockRecord>) {
    let session = StagingSession::open(store).await.unwrap();
    session.load(records, RejectPolicy::Abort).await.unwrap();
    Reconciler::new(&session).merge().await.unwrap();
    session.release().await.unwrap();
}

/// Durable rows with the import date blanked, for value comparisons
async fn rows_without_dates(store: &StockStore) -> Vec<DurableRow> {
    store
        .all_rows()
        .await
        .unwrap()
        .into_iter()
        .map(|mut row| {
            row.import_date.clear();
            row
        })
        .collect()
}

// ============================================================================
// Merge scenarios
// ============================================================================

#[tokio::test]
async fn test_merge_into_empty_table_inserts() {
    let store = sqlite_store().await;

    stage_and_merge(&store, vec![record("X1", 5)]).await;

    let rows = store.all_rows().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].code, "X1");
    assert_eq!(rows[0].balance, 5);
    assert!(!rows[0].import_date.is_empty());
}

#[tokio::test]
async fn test_merge_overwrites_existing_code() {
    let store = sqlite_store().await;
    seed_durable(&store, "X1", 5, OLD_DATE).await;

    let session = StagingSession::open(&store).await.unwrap();
    session.load(vec![record("X1", 9)], RejectPolicy::Abort).await.unwrap();
    let report = Reconciler::new(&session).merge().await.unwrap();
    session.release().await.unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 1);

    assert_eq!(store.count().await.unwrap(), 1);
    let row = store.find("X1").await.unwrap().unwrap();
    assert_eq!(row.balance, 9);
    assert_ne!(row.import_date, OLD_DATE);
}

#[tokio::test]
async fn test_failed_merge_leaves_durable_table_unchanged() {
    let store = sqlite_store().await;
    seed_durable(&store, "X1", 5, OLD_DATE).await;
    seed_durable(&store, "K9", 1, OLD_DATE).await;
    let before = store.all_rows().await.unwrap();

    let session = StagingSession::open(&store).await.unwrap();
    session
        .load(vec![record("X1", 9), record("A0", 3)], RejectPolicy::Abort)
        .await
        .unwrap();

    // A row the durable table's NOT NULL constraint refuses, staged after valid ones
    let sql = format!(
        "INSERT INTO {} (row_no, code, company, brand, balance, comments, allocation, size, cases_per_pallet) \
         VALUES (3, 'Y2', NULL, 'B', 1, '', 0, '1L', 6)",
        store.tables().staging
    );
    sqlx::query(&sql).execute(store.pool()).await.unwrap();

    let err = Reconciler::new(&session).merge().await.unwrap_err();
    assert!(matches!(err, MergeError::Database(_)));

    assert_eq!(store.all_rows().await.unwrap(), before);
    session.discard(false).await.unwrap();
}

#[tokio::test]
async fn test_merge_is_idempotent_apart_from_import_date() {
    let store = sqlite_store().await;
    seed_durable(&store, "OLD1", 4, OLD_DATE).await;

    let session = StagingSession::open(&store).await.unwrap();
    session
        .load(vec![record("X1", 5), record("Y2", 6), record("OLD1", 7)], RejectPolicy::Abort)
        .await
        .unwrap();

    let first = Reconciler::new(&session).merge().await.unwrap();
    let after_first = rows_without_dates(&store).await;

    let second = Reconciler::new(&session).merge().await.unwrap();
    let after_second = rows_without_dates(&store).await;
    session.release().await.unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(first.inserted, 2);
    assert_eq!(first.updated, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 3);
}

#[tokio::test]
async fn test_staged_codes_match_durable_rows_exactly() {
    let store = sqlite_store().await;
    seed_durable(&store, "B2", 100, OLD_DATE).await;

    let staged = vec![record("A1", 1), record("B2", 2), record("C3", 3)];
    stage_and_merge(&store, staged.clone()).await;

    for expected in staged {
        let row = store.find(&expected.code).await.unwrap().unwrap();
        assert_eq!(row.company, expected.company);
        assert_eq!(row.brand, expected.brand);
        assert_eq!(row.balance.to_string(), expected.balance);
        assert_eq!(row.comments, expected.comments);
        assert_eq!(row.allocation.to_string(), expected.allocation);
        assert_eq!(row.size, expected.size);
        assert_eq!(row.cases_per_pallet.to_string(), expected.cases_per_pallet);
    }
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_absent_codes_are_not_pruned() {
    let store = sqlite_store().await;
    seed_durable(&store, "STALE", 42, OLD_DATE).await;
    let stale_before = store.find("STALE").await.unwrap().unwrap();

    stage_and_merge(&store, vec![record("X1", 5)]).await;

    let stale_after = store.find("STALE").await.unwrap().unwrap();
    assert_eq!(stale_after, stale_before);
    assert_eq!(stale_after.import_date, OLD_DATE);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_duplicate_codes_last_row_wins() {
    let store = sqlite_store().await;

    let session = StagingSession::open(&store).await.unwrap();
    session
        .load(vec![record("X1", 1), record("Y2", 2), record("X1", 3)], RejectPolicy::Abort)
        .await
        .unwrap();
    let report = Reconciler::new(&session).merge().await.unwrap();
    session.release().await.unwrap();

    assert_eq!(report.distinct_codes, 2);
    assert_eq!(report.duplicate_rows, 1);
    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(store.find("X1").await.unwrap().unwrap().balance, 3);
}

#[tokio::test]
async fn test_empty_staging_merges_nothing() {
    let store = sqlite_store().await;
    seed_durable(&store, "X1", 5, OLD_DATE).await;

    let session = StagingSession::open(&store).await.unwrap();
    let report = Reconciler::new(&session).merge().await.unwrap();
    session.release().await.unwrap();

    assert_eq!(report.distinct_codes, 0);
    assert_eq!(store.find("X1").await.unwrap().unwrap().import_date, OLD_DATE);
}

// ============================================================================
// Staging lifecycle
// ============================================================================

#[tokio::test]
async fn test_open_creates_durable_table() {
    let store = sqlite_store().await;

    let session = StagingSession::open(&store).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.staging_exists().await.unwrap());
    session.release().await.unwrap();
}

#[tokio::test]
async fn test_open_discards_leftover_staging_rows() {
    let store = sqlite_store().await;

    let session = StagingSession::open(&store).await.unwrap();
    session.load(vec![record("X1", 1)], RejectPolicy::Abort).await.unwrap();
    assert_eq!(session.row_count().await.unwrap(), 1);
    // simulate an aborted run that never cleaned up
    drop(session);

    let session = StagingSession::open(&store).await.unwrap();
    assert_eq!(session.row_count().await.unwrap(), 0);
    session.release().await.unwrap();
}

#[tokio::test]
async fn test_release_drops_staging() {
    let store = sqlite_store().await;

    stage_and_merge(&store, vec![record("X1", 1)]).await;
    assert!(!store.staging_exists().await.unwrap());
}

#[tokio::test]
async fn test_discard_can_keep_staging() {
    let store = sqlite_store().await;

    let session = StagingSession::open(&store).await.unwrap();
    session.discard(true).await.unwrap();
    assert!(store.staging_exists().await.unwrap());

    let session = StagingSession::open(&store).await.unwrap();
    session.discard(false).await.unwrap();
    assert!(!store.staging_exists().await.unwrap());
}

// ============================================================================
// Bad quantities
// ============================================================================

fn with_bad_balance() -> Vec<StockRecord> {
    let mut bad = record("BAD", 0);
    bad.balance = "n/a".to_string();
    vec![record("X1", 1), bad, record("Y2", 2)]
}

#[tokio::test]
async fn test_abort_policy_stops_on_bad_quantity() {
    let store = sqlite_store().await;

    let session = StagingSession::open(&store).await.unwrap();
    let err = session.load(with_bad_balance(), RejectPolicy::Abort).await.unwrap_err();

    match err {
        LoadError::InvalidQuantity { row_no, code, field, value } => {
            assert_eq!(row_no, 2);
            assert_eq!(code, "BAD");
            assert_eq!(field, "balance");
            assert_eq!(value, "n/a");
        },
        other => panic!("unexpected error: {other}"),
    }

    // nothing from the aborted load is visible
    assert_eq!(session.row_count().await.unwrap(), 0);
    session.discard(false).await.unwrap();
}

#[tokio::test]
async fn test_skip_policy_counts_only_written_rows() {
    let store = sqlite_store().await;

    let session = StagingSession::open(&store).await.unwrap();
    let report = session.load(with_bad_balance(), RejectPolicy::Skip).await.unwrap();

    assert_eq!(report.staged, 2);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].code, "BAD");
    assert_eq!(report.rejected[0].row_no, 2);
    assert_eq!(session.row_count().await.unwrap(), report.staged as i64);

    Reconciler::new(&session).merge().await.unwrap();
    session.release().await.unwrap();

    assert!(store.find("BAD").await.unwrap().is_none());
    assert_eq!(store.count().await.unwrap(), 2);
}
