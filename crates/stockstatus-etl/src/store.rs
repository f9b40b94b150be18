//! Destination store
//!
//! The store talks to the database through sqlx's `Any` driver: production
//! runs against PostgreSQL and the test-suite against SQLite, selected by the
//! connection URL. All statements stick to SQL both engines accept.

use crate::models::DurableRow;
use regex::Regex;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use std::sync::OnceLock;
use tracing::info;

/// Suffix appended to the durable table name to name its staging table.
pub const STAGING_SUFFIX: &str = "_staging";

static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();

/// Whether `name` can be spliced into SQL as a bare table name.
pub fn is_plain_identifier(name: &str) -> bool {
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,54}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Durable and staging table names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub durable: String,
    pub staging: String,
}

impl TableNames {
    pub fn new(durable: &str) -> Result<Self, sqlx::Error> {
        if !is_plain_identifier(durable) {
            return Err(sqlx::Error::Configuration(
                format!("invalid table name '{}'", durable).into(),
            ));
        }

        Ok(Self {
            durable: durable.to_string(),
            staging: format!("{}{}", durable, STAGING_SUFFIX),
        })
    }
}

/// Handle on the durable and staging tables
#[derive(Debug, Clone)]
pub struct StockStore {
    pool: AnyPool,
    tables: TableNames,
}

impl StockStore {
    /// Create a lazily-connecting store; no connection is attempted until the
    /// first statement runs.
    pub fn connect_lazy(url: &str, max_connections: u32, table: &str) -> Result<Self, sqlx::Error> {
        install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)?;

        Self::from_pool(pool, table)
    }

    /// Connect eagerly, failing if the database cannot be reached.
    pub async fn connect(url: &str, max_connections: u32, table: &str) -> Result<Self, sqlx::Error> {
        install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        info!(max_connections, table, "Database connection pool created");
        Self::from_pool(pool, table)
    }

    pub fn from_pool(pool: AnyPool, table: &str) -> Result<Self, sqlx::Error> {
        Ok(Self {
            pool,
            tables: TableNames::new(table)?,
        })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Create the durable table if it does not exist yet.
    pub async fn ensure_durable_table(&self) -> Result<(), sqlx::Error> {
        sqlx::query(&self.durable_ddl()).execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn durable_ddl(&self) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                code TEXT NOT NULL PRIMARY KEY,
                company TEXT NOT NULL,
                brand TEXT NOT NULL,
                balance BIGINT NOT NULL,
                comments TEXT NOT NULL,
                allocation BIGINT NOT NULL,
                size TEXT NOT NULL,
                cases_per_pallet BIGINT NOT NULL,
                import_date TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            table = self.tables.durable
        )
    }

    /// Staging mirrors the durable columns without any constraints, plus the
    /// row's position in the scrape.
    pub(crate) fn staging_ddl(&self) -> String {
        format!(
            r#"
            CREATE TABLE {table} (
                row_no BIGINT,
                code TEXT,
                company TEXT,
                brand TEXT,
                balance BIGINT,
                comments TEXT,
                allocation BIGINT,
                size TEXT,
                cases_per_pallet BIGINT,
                import_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            table = self.tables.staging
        )
    }

    pub(crate) fn drop_staging_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.tables.staging)
    }

    /// Whether the staging table currently exists.
    pub async fn staging_exists(&self) -> Result<bool, sqlx::Error> {
        let probe = format!("SELECT COUNT(*) FROM {}", self.tables.staging);
        match sqlx::query_scalar::<_, i64>(&probe).fetch_one(&self.pool).await {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn select_durable(&self) -> String {
        format!(
            "SELECT code, company, brand, balance, comments, allocation, size, cases_per_pallet, \
             CAST(import_date AS TEXT) AS import_date FROM {}",
            self.tables.durable
        )
    }

    /// Look up one durable row by code.
    pub async fn find(&self, code: &str) -> Result<Option<DurableRow>, sqlx::Error> {
        let sql = format!("{} WHERE code = $1", self.select_durable());
        sqlx::query_as::<_, DurableRow>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
    }

    /// Every durable row, ordered by code.
    pub async fn all_rows(&self) -> Result<Vec<DurableRow>, sqlx::Error> {
        let sql = format!("{} ORDER BY code", self.select_durable());
        sqlx::query_as::<_, DurableRow>(&sql).fetch_all(&self.pool).await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.tables.durable);
        sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
