//! PWA Errors
//!
//! Failures surfaced by the lifecycle controllers. Platform failures are
//! converted into [`PwaError`] at the controller boundary and never panic.

/// Result alias for controller operations
pub type Result<T> = std::result::Result<T, PwaError>;

/// Guidance shown when notifications are blocked for the session
pub const PERMISSION_GUIDANCE: &str =
    "notifications are blocked; re-enable them in the browser's site settings";

/// Lifecycle controller errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PwaError {
    /// Worker script fetch, parse or install failed. Retry is permitted.
    #[error("Service worker registration failed: {0}")]
    RegistrationFailed(String),

    /// Platform could not revalidate the worker script
    #[error("Service worker update check failed: {0}")]
    UpdateCheckFailed(String),

    /// Skip-waiting message could not be delivered
    #[error("Could not activate waiting worker: {0}")]
    ActivationFailed(String),

    /// Notification permission is not granted. Terminal once denied.
    #[error("Notification permission denied: {guidance}")]
    PermissionDenied { guidance: &'static str },

    /// Permission prompt itself failed
    #[error("Notification permission request failed: {0}")]
    PermissionRequestFailed(String),

    /// No active worker registration to attach a subscription to
    #[error("No service worker registration available")]
    NoRegistration,

    /// No application server key supplied or configured
    #[error("VAPID public key is required for push subscriptions")]
    MissingKey,

    /// Application server key is not valid base64url
    #[error("Invalid VAPID public key: {0}")]
    InvalidKey(String),

    /// Platform rejected subscribe or unsubscribe
    #[error("Push subscription failed: {0}")]
    SubscriptionFailed(String),

    /// Notification could not be displayed
    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    /// Install prompt rejected by the platform
    #[error("Install prompt failed: {0}")]
    InstallPromptFailed(String),

    /// Feature not available on this platform
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl PwaError {
    pub fn permission_denied() -> Self {
        Self::PermissionDenied { guidance: PERMISSION_GUIDANCE }
    }

    /// Whether the caller may retry the same operation later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RegistrationFailed(_)
                | Self::UpdateCheckFailed(_)
                | Self::ActivationFailed(_)
                | Self::PermissionRequestFailed(_)
                | Self::SubscriptionFailed(_)
                | Self::NotificationFailed(_)
        )
    }
}

/// Failure reported by a platform capability
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_terminal() {
        let err = PwaError::permission_denied();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("site settings"));
    }

    #[test]
    fn test_platform_failures_are_recoverable() {
        assert!(PwaError::RegistrationFailed("404".into()).is_recoverable());
        assert!(PwaError::SubscriptionFailed("aborted".into()).is_recoverable());
        assert!(!PwaError::MissingKey.is_recoverable());
    }
}
