//! Remote authority configuration.
//!
//! The core never reads files or environment variables itself; shells build a
//! `RemoteConfig` from whatever source they own and hand it over.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Request timeout applied when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Where and how to reach the remote authority.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Base URL the `/sync/*` routes hang off
    pub base_url: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RemoteConfig {
    /// Create a configuration for `base_url` with the default timeout
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the bearer token
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Trim values, drop a trailing slash and reject non-HTTP URLs.
    pub fn normalized(self) -> Result<Self> {
        let base_url = normalize_text_option(Some(self.base_url))
            .ok_or_else(|| Error::Config("base_url must not be empty".to_string()))?;
        if !is_http_url(&base_url) {
            return Err(Error::Config(
                "base_url must include http:// or https://".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".to_string()));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: normalize_text_option(self.auth_token),
            timeout_secs: self.timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_trims_and_strips_trailing_slash() {
        let config = RemoteConfig::new(" https://api.example.com/ ")
            .with_auth_token("  ")
            .normalized()
            .unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.auth_token, None);
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn normalized_rejects_invalid_values() {
        assert!(RemoteConfig::new("").normalized().is_err());
        assert!(RemoteConfig::new("api.example.com").normalized().is_err());
        assert!(RemoteConfig::new("https://api.example.com")
            .with_timeout(Duration::ZERO)
            .normalized()
            .is_err());
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let error = serde_json::from_str::<RemoteConfig>(
            r#"{ "base_url": "https://api.example.com", "unexpected": true }"#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn debug_redacts_token() {
        let config = RemoteConfig::new("https://api.example.com").with_auth_token("secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
