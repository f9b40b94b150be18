//! Authenticated fetch of the stock-status page
//!
//! The portal has no API: the page is returned directly in answer to its
//! login form, so one form-encoded POST with the account credentials yields
//! the document.

use crate::config::SourceConfig;
use crate::error::{FetchError, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// HTTP client for the portal
pub struct StockFetcher {
    config: SourceConfig,
    client: Client,
}

impl StockFetcher {
    /// Validates the source settings before building the client, so a missing
    /// credential never produces a request.
    pub fn new(config: SourceConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|source| FetchError::Transport {
            url: config.url.clone(),
            source,
        })?;

        Ok(Self { config, client })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// POST the login form and return the response body.
    #[instrument(skip(self), fields(url = %self.config.url, account = %self.config.account))]
    pub async fn fetch(&self) -> std::result::Result<String, FetchError> {
        let url = &self.config.url;
        let form = [
            (self.config.account_field.as_str(), self.config.account.as_str()),
            (self.config.password_field.as_str(), self.config.password.expose()),
        ];

        debug!("Posting login form");
        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Body {
            url: url.clone(),
            source,
        })?;

        info!(status = status.as_u16(), bytes = body.len(), "Fetched stock-status page");
        Ok(body)
    }
}
