//! Stock Status Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pieces shared by every stock-status binary:
//!
//! - **Logging**: tracing subscriber setup driven by `LOG_*` environment variables
//! - **Secrets**: a credential wrapper that never prints its contents
//!
//! # Example
//!
//! ```no_run
//! use stockstatus_common::logging::{init_logging, LogConfig};
//! use stockstatus_common::Secret;
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!
//!     let password = Secret::new("hunter2");
//!     tracing::info!(?password, "Loaded credentials");
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod secret;

pub use secret::Secret;
