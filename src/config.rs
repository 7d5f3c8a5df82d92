use crate::constants::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the retrieval servlet of one archiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retrieval base URL, e.g. `http://archiver:17665/retrieval`.
    pub url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Ask the server for current metadata so enum labels are always present.
    pub fetch_latest_metadata: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            fetch_latest_metadata: true,
        }
    }
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn for_host(host: &str, port: u16) -> Self {
        Self::new(format!("http://{}:{}/retrieval", host, port))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_latest_metadata(mut self, fetch: bool) -> Self {
        self.fetch_latest_metadata = fetch;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}
