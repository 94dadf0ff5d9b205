//! PWA Configuration

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding the configured VAPID public key
pub const VAPID_KEY_ENV: &str = "FOS_PWA_VAPID_PUBLIC_KEY";

/// Lifecycle controller configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PwaConfig {
    /// Worker script URL
    pub script_url: String,

    /// Registration scope
    pub scope: String,

    /// Application server public key (base64url)
    pub vapid_public_key: Option<String>,

    /// Notification icon
    pub notification_icon: String,

    /// Notification badge
    pub notification_badge: String,

    pub test_notification_title: String,
    pub test_notification_body: String,
    pub test_notification_tag: String,

    /// Revalidate the worker script right after registration
    pub auto_check_updates: bool,

    /// Delay before the install banner appears (ms)
    pub install_banner_delay_ms: u64,

    /// Delay before the notification opt-in dialog appears (ms)
    pub push_prompt_delay_ms: u64,

    /// How long the "reconnected" banner stays visible (ms)
    pub reconnected_window_ms: u64,

    /// How long the "connection lost" toast stays visible (ms)
    pub offline_toast_ms: u64,
}

impl Default for PwaConfig {
    fn default() -> Self {
        Self {
            script_url: "/sw.js".to_string(),
            scope: "/".to_string(),
            vapid_public_key: None,
            notification_icon: "/icons/icon-192x192.png".to_string(),
            notification_badge: "/icons/icon-72x72.png".to_string(),
            test_notification_title: "Test Notification".to_string(),
            test_notification_body: "This is a test notification from your PWA!".to_string(),
            test_notification_tag: "test-notification".to_string(),
            auto_check_updates: false,
            install_banner_delay_ms: 2000,
            push_prompt_delay_ms: 3000,
            reconnected_window_ms: 3000,
            offline_toast_ms: 5000,
        }
    }
}

impl PwaConfig {
    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse from a JSON document
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides
    pub fn with_env(mut self) -> Self {
        if let Ok(key) = std::env::var(VAPID_KEY_ENV) {
            let key = key.trim();
            if !key.is_empty() {
                tracing::debug!("VAPID key taken from {}", VAPID_KEY_ENV);
                self.vapid_public_key = Some(key.to_string());
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.script_url.is_empty() {
            return Err(ConfigError::Invalid("script_url must not be empty".into()));
        }
        if !self.scope.starts_with('/') && !self.scope.contains("://") {
            return Err(ConfigError::Invalid(format!(
                "scope must be absolute: {}",
                self.scope
            )));
        }
        Ok(())
    }

    pub fn install_banner_delay(&self) -> Duration {
        Duration::from_millis(self.install_banner_delay_ms)
    }

    pub fn push_prompt_delay(&self) -> Duration {
        Duration::from_millis(self.push_prompt_delay_ms)
    }

    pub fn reconnected_window(&self) -> Duration {
        Duration::from_millis(self.reconnected_window_ms)
    }

    pub fn offline_toast(&self) -> Duration {
        Duration::from_millis(self.offline_toast_ms)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PwaConfig::default();
        assert_eq!(config.script_url, "/sw.js");
        assert_eq!(config.scope, "/");
        assert_eq!(config.reconnected_window(), Duration::from_secs(3));
        assert_eq!(config.install_banner_delay(), Duration::from_secs(2));
        assert_eq!(config.push_prompt_delay(), Duration::from_secs(3));
        assert_eq!(config.offline_toast(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PwaConfig::from_json(r#"{ "vapid_public_key": "abc", "offline_toast_ms": 1000 }"#)
            .unwrap();
        assert_eq!(config.vapid_public_key.as_deref(), Some("abc"));
        assert_eq!(config.offline_toast_ms, 1000);
        assert_eq!(config.notification_icon, "/icons/icon-192x192.png");
    }

    #[test]
    fn test_relative_scope_rejected() {
        let err = PwaConfig::from_json(r#"{ "scope": "app/" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(PwaConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
