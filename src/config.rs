//! Runtime settings shared by every command.
//!
//! Each setting can be given as a flag or through its `MENUFLOW_*`
//! environment variable. A `.env` file in the working directory is read first.

use crate::application::payment_client::PollPolicy;
use crate::application::poller::PollerConfig;
use crate::application::receiver::MessagingConfig;
use crate::error::{OrderFlowError, Result};
use crate::infrastructure::http::ApiClient;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Clone)]
pub struct AppConfig {
    /// Base URL of the order API
    #[arg(long, env = "MENUFLOW_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Base URL of the payment gateway API. Defaults to the order API.
    #[arg(long, env = "MENUFLOW_GATEWAY_URL", global = true)]
    pub gateway_url: Option<String>,

    /// Bearer token sent with every API request
    #[arg(long, env = "MENUFLOW_API_TOKEN", global = true, hide_env_values = true)]
    pub api_token: Option<String>,

    #[arg(long, env = "MENUFLOW_VENDOR_ID", default_value_t = 1, global = true)]
    pub vendor_id: u64,

    /// Seconds between live queue refreshes
    #[arg(long, env = "MENUFLOW_POLL_INTERVAL_SECS", default_value_t = 10, global = true)]
    pub poll_interval_secs: u64,

    #[arg(long, env = "MENUFLOW_PAGE_SIZE", default_value_t = 50, global = true)]
    pub page_size: usize,

    /// Verification attempts before giving up on a payment
    #[arg(long, env = "MENUFLOW_VERIFY_ATTEMPTS", default_value_t = 20, global = true)]
    pub verify_attempts: u32,

    #[arg(long, env = "MENUFLOW_VERIFY_INTERVAL_MS", default_value_t = 3000, global = true)]
    pub verify_interval_ms: u64,

    /// Opaque push-messaging credentials handed to the notification receiver
    #[arg(long, env = "MENUFLOW_MESSAGING_CREDENTIALS", global = true, hide_env_values = true)]
    pub messaging_credentials: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_url", &self.api_url)
            .field("gateway_url", &self.gateway_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("vendor_id", &self.vendor_id)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("page_size", &self.page_size)
            .field("verify_attempts", &self.verify_attempts)
            .field("verify_interval_ms", &self.verify_interval_ms)
            .finish_non_exhaustive()
    }
}

/// Loads `.env` if present and returns its path. Missing files are not an error.
///
/// Runs before logging is set up so that `RUST_LOG` can come from the file.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

impl AppConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            max_attempts: self.verify_attempts,
            interval: Duration::from_millis(self.verify_interval_ms),
        }
    }

    pub fn poller_config(&self) -> Result<PollerConfig> {
        if self.poll_interval_secs == 0 {
            return Err(OrderFlowError::Validation(
                "Poll interval must be at least one second".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(OrderFlowError::Validation(
                "Page size must be positive".to_string(),
            ));
        }
        Ok(PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            page_size: self.page_size,
            ..PollerConfig::new(self.vendor_id)
        })
    }

    pub fn messaging(&self) -> Option<MessagingConfig> {
        self.messaging_credentials
            .clone()
            .map(|credentials| MessagingConfig { credentials })
    }

    pub fn order_api(&self) -> Result<ApiClient> {
        let url = self.api_url.as_deref().ok_or_else(|| {
            OrderFlowError::Validation(
                "No order API configured; set --api-url or MENUFLOW_API_URL".to_string(),
            )
        })?;
        ApiClient::new(url, self.api_token.as_deref())
    }

    pub fn gateway_api(&self) -> Result<ApiClient> {
        match self.gateway_url.as_deref() {
            Some(url) => ApiClient::new(url, self.api_token.as_deref()),
            None => self.order_api(),
        }
    }
}
