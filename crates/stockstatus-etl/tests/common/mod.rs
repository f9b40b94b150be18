//! Shared helpers for stock-status integration tests
//!
//! Database tests run against a SQLite file in a temporary directory through
//! the same `Any` pool the production PostgreSQL store uses.

#![allow(dead_code)]

use stockstatus_etl::{StockRecord, StockStore};
use tempfile::TempDir;

pub const TABLE: &str = "stock_status";

/// A store backed by a throwaway SQLite database
pub struct TestStore {
    pub store: StockStore,
    _dir: TempDir,
}

impl std::ops::Deref for TestStore {
    type Target = StockStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

pub async fn sqlite_store() -> TestStore {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("stock.db").display());

    let store = StockStore::connect(&url, 1, TABLE)
        .await
        .expect("Failed to open SQLite store");

    TestStore { store, _dir: dir }
}

/// Record with every quantity set; text fields derived from the code
pub fn record(code: &str, balance: i64) -> StockRecord {
    StockRecord {
        code: code.to_string(),
        company: format!("{code} Co"),
        brand: format!("{code} Brand"),
        balance: balance.to_string(),
        comments: String::new(),
        allocation: "0".to_string(),
        size: "750ml".to_string(),
        cases_per_pallet: "24".to_string(),
    }
}

/// Put a row straight into the durable table with a fixed import date
pub async fn seed_durable(store: &StockStore, code: &str, balance: i64, import_date: &str) {
    store.ensure_durable_table().await.expect("Failed to create durable table");

    let sql = format!(
        "INSERT INTO {} (code, company, brand, balance, comments, allocation, size, cases_per_pallet, import_date) \
         VALUES ($1, $2, $3, $4, '', 0, '750ml', 24, $5)",
        store.tables().durable
    );
    sqlx::query(&sql)
        .bind(code)
        .bind(format!("{code} Co"))
        .bind(format!("{code} Brand"))
        .bind(balance)
        .bind(import_date)
        .execute(store.pool())
        .await
        .expect("Failed to seed durable row");
}

/// One `<tr>` of `<td>` cells
pub fn html_row(cells: &[&str]) -> String {
    let cells: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
    format!("<tr>{cells}</tr>")
}

/// A stock-status page shaped like the portal's: header row first
pub fn stock_page(rows: &[&[&str]]) -> String {
    let header = html_row(&[
        "NC CODE", "Company", "Brand", "Balance", "Comments", "Allocation", "Size", "Cases/Pallet",
    ]);
    let body: String = rows.iter().map(|r| html_row(r)).collect();
    format!(
        "<html><head><title>Stock Status</title></head><body>\
         <table border=1>{header}{body}</table></body></html>"
    )
}
