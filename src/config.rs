//! Per-instance client configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PCloudError, Result};
use crate::models::Location;

/// Default credential file name, relative to the working directory.
pub const DEFAULT_TOKEN_FILE: &str = ".pcloud_credentials";

/// Default upload chunk size (10 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Saved credentials older than this many days are discarded.
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 30;

/// Settings for one SDK instance.
///
/// Nothing here is process-global: two instances built from different
/// configs never affect each other.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// OAuth2 client id. Only needed for the OAuth flow.
    pub app_key: String,
    /// OAuth2 client secret. Only needed for the OAuth flow.
    pub app_secret: String,
    /// Region used for direct logins and OAuth code exchange.
    pub location: Location,
    pub token_file: PathBuf,
    /// When false, credentials are never read from or written to disk.
    pub token_manager: bool,
    pub token_ttl_days: i64,
    pub chunk_size: u64,
    /// Whole-request timeout, including body transfer.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Overrides the regional API host for every request.
    pub api_base_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            app_secret: String::new(),
            location: Location::Us,
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            token_manager: true,
            token_ttl_days: DEFAULT_TOKEN_TTL_DAYS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: Duration::from_secs(3600),
            connect_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            api_base_url: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `PCLOUD_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(key) = std::env::var("PCLOUD_APP_KEY") {
            config.app_key = key;
        }
        if let Ok(secret) = std::env::var("PCLOUD_APP_SECRET") {
            config.app_secret = secret;
        }
        if let Ok(location) = std::env::var("PCLOUD_LOCATION") {
            let id: u8 = location.trim().parse().map_err(|_| {
                PCloudError::InvalidArgument(format!(
                    "PCLOUD_LOCATION must be 1 or 2, got {location:?}"
                ))
            })?;
            config.location = Location::try_from(id)?;
        }
        if let Ok(file) = std::env::var("PCLOUD_TOKEN_FILE") {
            config.token_file = PathBuf::from(file);
        }
        Ok(config)
    }

    pub fn with_app_credentials(
        mut self,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        self.app_key = app_key.into();
        self.app_secret = app_secret.into();
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = path.into();
        self
    }

    pub fn with_token_manager(mut self, enabled: bool) -> Self {
        self.token_manager = enabled;
        self
    }

    pub fn with_token_ttl_days(mut self, days: i64) -> Self {
        self.token_ttl_days = days;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// API root for a region, always ending in `/`.
    pub fn base_url_for(&self, location: Location) -> String {
        match &self.api_base_url {
            Some(url) if url.ends_with('/') => url.clone(),
            Some(url) => format!("{url}/"),
            None => location.api_host().to_string(),
        }
    }
}
