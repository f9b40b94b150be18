//! Run configuration
//!
//! Built once at startup from CLI flags, environment variables and an
//! optional `.env` file, validated as a whole, then passed by reference to
//! the fetcher and the store. Nothing here is global.

use crate::error::{EtlError, Result};
use crate::store::is_plain_identifier;
use clap::{Args, ValueEnum};
use serde::Serialize;
use stockstatus_common::Secret;

// ============================================================================
// Defaults
// ============================================================================

/// Stock-status page of the inventory portal.
pub const DEFAULT_SOURCE_URL: &str = "http://www.lbbncabc.com/views/em_abc_stockstatus.asp";

/// Form field carrying the account identifier.
pub const DEFAULT_ACCOUNT_FIELD: &str = "EMAccount";

/// Form field carrying the account password.
pub const DEFAULT_PASSWORD_FIELD: &str = "EMPassword";

pub const DEFAULT_USER_AGENT: &str = concat!("stockstatus-etl/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_DATABASE_PORT: u16 = 5432;

pub const DEFAULT_TABLE: &str = "stock_status";

/// One run at a time, one statement at a time.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 1;

// ============================================================================
// Configuration structs
// ============================================================================

/// Everything a run needs
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub load: LoadConfig,
}

/// Upstream portal endpoint and login
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub url: String,
    pub account: String,
    pub password: Secret,
    pub account_field: String,
    pub password_field: String,
    /// No timeout unless set
    pub timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl SourceConfig {
    pub fn new(url: impl Into<String>, account: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            url: url.into(),
            account: account.into(),
            password: password.into(),
            account_field: DEFAULT_ACCOUNT_FIELD.to_string(),
            password_field: DEFAULT_PASSWORD_FIELD.to_string(),
            timeout_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    fn check(&self, problems: &mut Vec<String>) {
        if self.account.trim().is_empty() {
            problems.push("source account is required (--account / STOCKSTATUS_ACCOUNT)".to_string());
        }
        if self.password.is_blank() {
            problems.push("source password is required (--password / STOCKSTATUS_PASSWORD)".to_string());
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            problems.push(format!("source url '{}' must be an http(s) URL", self.url));
        }
        if self.account_field.trim().is_empty() || self.password_field.trim().is_empty() {
            problems.push("form field names cannot be empty".to_string());
        }
        if self.timeout_secs == Some(0) {
            problems.push("timeout must be greater than 0 when set".to_string());
        }
    }

    /// Validate on its own, as the fetcher does before any request.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        self.check(&mut problems);
        into_result(problems)
    }
}

/// Destination database connection
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    pub database: String,
    /// Durable table; staging is `<table>_staging`
    pub table: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// PostgreSQL connection URL with percent-encoded credentials.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(self.password.expose()),
            self.host,
            self.port,
            urlencoding::encode(&self.database),
        )
    }

    /// Connection URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            self.password,
            self.host,
            self.port,
            urlencoding::encode(&self.database),
        )
    }

    fn check(&self, problems: &mut Vec<String>) {
        if self.host.trim().is_empty() {
            problems.push("database host is required (--db-host / STOCKSTATUS_DB_HOST)".to_string());
        }
        if self.port == 0 {
            problems.push("database port must be greater than 0".to_string());
        }
        if self.user.trim().is_empty() {
            problems.push("database user is required (--db-user / STOCKSTATUS_DB_USER)".to_string());
        }
        if self.password.is_blank() {
            problems.push(
                "database password is required (--db-password / STOCKSTATUS_DB_PASSWORD)".to_string(),
            );
        }
        if self.database.trim().is_empty() {
            problems.push("database name is required (--db-name / STOCKSTATUS_DB_NAME)".to_string());
        }
        if !is_plain_identifier(&self.table) {
            problems.push(format!(
                "table name '{}' must start with a letter or underscore and contain only letters, digits and underscores",
                self.table
            ));
        }
        if self.max_connections == 0 {
            problems.push("database max connections must be greater than 0".to_string());
        }
    }
}

/// What to do with a record whose quantity is not an integer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RejectPolicy {
    /// Fail the run on the first bad record
    #[default]
    Abort,
    /// Leave the record out and keep going
    Skip,
}

/// Staging behaviour
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadConfig {
    pub reject_policy: RejectPolicy,
    /// Leave the staging table in place after a failed run for inspection
    pub keep_staging_on_failure: bool,
}

// ============================================================================
// CLI / environment surface
// ============================================================================

/// Configuration flags, each with an environment fallback
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Stock-status page to POST the login form to
    #[arg(long, env = "STOCKSTATUS_SOURCE_URL", default_value = DEFAULT_SOURCE_URL)]
    pub source_url: String,

    /// Portal account identifier
    #[arg(long, env = "STOCKSTATUS_ACCOUNT")]
    pub account: Option<String>,

    /// Portal account password
    #[arg(long, env = "STOCKSTATUS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Form field name for the account identifier
    #[arg(long, env = "STOCKSTATUS_ACCOUNT_FIELD", default_value = DEFAULT_ACCOUNT_FIELD)]
    pub account_field: String,

    /// Form field name for the password
    #[arg(long, env = "STOCKSTATUS_PASSWORD_FIELD", default_value = DEFAULT_PASSWORD_FIELD)]
    pub password_field: String,

    /// Give up on the portal request after this many seconds
    #[arg(long, env = "STOCKSTATUS_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Destination database host
    #[arg(long, env = "STOCKSTATUS_DB_HOST")]
    pub db_host: Option<String>,

    /// Destination database port
    #[arg(long, env = "STOCKSTATUS_DB_PORT", default_value_t = DEFAULT_DATABASE_PORT)]
    pub db_port: u16,

    /// Destination database user
    #[arg(long, env = "STOCKSTATUS_DB_USER")]
    pub db_user: Option<String>,

    /// Destination database password
    #[arg(long, env = "STOCKSTATUS_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Destination database name
    #[arg(long, env = "STOCKSTATUS_DB_NAME")]
    pub db_name: Option<String>,

    /// Durable table name
    #[arg(long, env = "STOCKSTATUS_DB_TABLE", default_value = DEFAULT_TABLE)]
    pub db_table: String,

    /// Connection pool size
    #[arg(long, env = "STOCKSTATUS_DB_MAX_CONNECTIONS", default_value_t = DEFAULT_DATABASE_MAX_CONNECTIONS)]
    pub db_max_connections: u32,

    /// Handling of records with non-integer quantities
    #[arg(long, env = "STOCKSTATUS_REJECT_POLICY", value_enum, default_value_t = RejectPolicy::Abort)]
    pub reject_policy: RejectPolicy,

    /// Keep the staging table when a run fails
    #[arg(long, env = "STOCKSTATUS_KEEP_STAGING_ON_FAILURE")]
    pub keep_staging_on_failure: bool,
}

impl EtlConfig {
    /// Build and validate a configuration from parsed flags.
    ///
    /// All problems are reported together in one `ConfigError`.
    pub fn from_args(args: ConfigArgs) -> Result<Self> {
        let config = Self {
            source: SourceConfig {
                url: args.source_url,
                account: args.account.unwrap_or_default(),
                password: Secret::from(args.password.unwrap_or_default()),
                account_field: args.account_field,
                password_field: args.password_field,
                timeout_secs: args.timeout_secs,
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            database: DatabaseConfig {
                host: args.db_host.unwrap_or_default(),
                port: args.db_port,
                user: args.db_user.unwrap_or_default(),
                password: Secret::from(args.db_password.unwrap_or_default()),
                database: args.db_name.unwrap_or_default(),
                table: args.db_table,
                max_connections: args.db_max_connections,
            },
            load: LoadConfig {
                reject_policy: args.reject_policy,
                keep_staging_on_failure: args.keep_staging_on_failure,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Source settings only, for runs that never touch the database.
    pub fn source_from_args(args: ConfigArgs) -> Result<SourceConfig> {
        let source = SourceConfig {
            url: args.source_url,
            account: args.account.unwrap_or_default(),
            password: Secret::from(args.password.unwrap_or_default()),
            account_field: args.account_field,
            password_field: args.password_field,
            timeout_secs: args.timeout_secs,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        };

        source.validate()?;
        Ok(source)
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        self.source.check(&mut problems);
        self.database.check(&mut problems);
        into_result(problems)
    }
}

fn into_result(problems: Vec<String>) -> Result<()> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(EtlError::config(problems.join("; ")))
    }
}
