//! Platform capabilities
//!
//! Browser globals (`navigator.serviceWorker`, `Notification`, `PushManager`,
//! `navigator.connection`, `location.reload`) are injected as traits so the
//! controllers never touch ambient state. Async capabilities run on the page's
//! single thread, hence `?Send`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Platform result alias
pub type PlatformResult<T> = Result<T, PlatformError>;

// ============================================================================
// Service workers
// ============================================================================

/// Identifier of a worker instance owned by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

/// Identifier of a registration owned by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(pub u64);

/// Worker instance state as reported by `statechange`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceWorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Snapshot returned by `register()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub id: RegistrationId,
    pub scope: String,
    pub installing: Option<WorkerId>,
    pub waiting: Option<WorkerId>,
    pub active: Option<WorkerId>,
}

/// Control messages understood by the worker script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate immediately instead of waiting for old clients to close
    SkipWaiting,
}

/// `navigator.serviceWorker`
#[async_trait(?Send)]
pub trait WorkerContainer {
    fn is_supported(&self) -> bool;

    /// Whether a worker currently controls this page
    fn has_controller(&self) -> bool;

    async fn register(&self, script_url: &str, scope: &str) -> PlatformResult<RegistrationInfo>;

    /// Revalidate the worker script
    async fn update(&self, registration: RegistrationId) -> PlatformResult<()>;

    async fn unregister(&self, registration: RegistrationId) -> PlatformResult<bool>;

    fn post_message(&self, worker: WorkerId, message: &WorkerMessage) -> PlatformResult<()>;
}

/// `location.reload()`
pub trait PageReloader {
    fn reload(&self);
}

// ============================================================================
// Install
// ============================================================================

/// Outcome of the native install prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

/// The cancelable `beforeinstallprompt` event
#[async_trait(?Send)]
pub trait InstallPrompt {
    /// Suppress the platform's own install UI
    fn prevent_default(&mut self);

    /// Platforms the app can be installed to
    fn platforms(&self) -> Vec<String> {
        vec!["web".to_string()]
    }

    /// Show the native prompt and wait for the user's choice.
    /// Only the first call is valid.
    async fn prompt(&mut self) -> PlatformResult<InstallOutcome>;
}

/// Display-mode and referrer probes used for installed detection
pub trait DisplayProbe {
    /// `matchMedia('(display-mode: standalone)')`
    fn is_standalone(&self) -> bool;

    /// iOS `navigator.standalone`
    fn ios_standalone(&self) -> bool {
        false
    }

    /// `document.referrer`
    fn referrer(&self) -> Option<String> {
        None
    }
}

// ============================================================================
// Notifications and push
// ============================================================================

/// Notification permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Default,
    Granted,
    Denied,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }
}

/// `Notification.permission` / `Notification.requestPermission()`
#[async_trait(?Send)]
pub trait NotificationPermissions {
    fn is_supported(&self) -> bool;

    fn current(&self) -> Permission;

    async fn request(&self) -> PlatformResult<Permission>;
}

/// Keys of a push subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Push subscription issued by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    pub expiration_time: Option<i64>,
    pub keys: SubscriptionKeys,
}

impl PushSubscription {
    /// JSON body for the application server
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Options for `pushManager.subscribe()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub user_visible_only: bool,
    pub application_server_key: Vec<u8>,
}

/// Notification options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationOptions {
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    pub require_interaction: bool,
    pub silent: bool,
}

/// `registration.pushManager` plus `registration.showNotification()`
#[async_trait(?Send)]
pub trait PushService {
    fn is_supported(&self) -> bool;

    async fn get_subscription(
        &self,
        registration: RegistrationId,
    ) -> PlatformResult<Option<PushSubscription>>;

    async fn subscribe(
        &self,
        registration: RegistrationId,
        options: &SubscribeOptions,
    ) -> PlatformResult<PushSubscription>;

    /// `Ok(false)` when the platform declined without raising
    async fn unsubscribe(&self, subscription: &PushSubscription) -> PlatformResult<bool>;

    async fn show_notification(
        &self,
        registration: RegistrationId,
        title: &str,
        options: &NotificationOptions,
    ) -> PlatformResult<()>;
}

// ============================================================================
// Network
// ============================================================================

/// Connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionType {
    #[default]
    Unknown,
    Ethernet,
    Wifi,
    Cellular,
    Bluetooth,
    Wimax,
    Other,
    None,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
            Self::Bluetooth => "bluetooth",
            Self::Wimax => "wimax",
            Self::Other => "other",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ethernet" => Self::Ethernet,
            "wifi" => Self::Wifi,
            "cellular" => Self::Cellular,
            "bluetooth" => Self::Bluetooth,
            "wimax" => Self::Wimax,
            "other" => Self::Other,
            "none" => Self::None,
            _ => Self::Unknown,
        }
    }
}

/// Effective connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveType {
    Slow2G,
    TwoG,
    ThreeG,
    FourG,
}

impl EffectiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slow2G => "slow-2g",
            Self::TwoG => "2g",
            Self::ThreeG => "3g",
            Self::FourG => "4g",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slow-2g" => Some(Self::Slow2G),
            "2g" => Some(Self::TwoG),
            "3g" => Some(Self::ThreeG),
            "4g" => Some(Self::FourG),
            _ => None,
        }
    }
}

/// `navigator.connection`. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Mbps
    pub downlink: Option<f64>,
    pub effective_type: Option<EffectiveType>,
    /// Round-trip time in ms
    pub rtt: Option<u32>,
    pub save_data: Option<bool>,
    pub connection_type: Option<ConnectionType>,
}

/// `navigator.onLine` and the connection-information object
pub trait NetworkProbe {
    fn on_line(&self) -> bool;

    /// `None` when the platform exposes no connection API
    fn connection(&self) -> Option<ConnectionInfo>;
}

// ============================================================================
// Time
// ============================================================================

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_waiting_wire_format() {
        let json = serde_json::to_string(&WorkerMessage::SkipWaiting).unwrap();
        assert_eq!(json, r#"{"type":"SKIP_WAITING"}"#);

        let parsed: WorkerMessage = serde_json::from_str(r#"{ "type": "SKIP_WAITING" }"#).unwrap();
        assert_eq!(parsed, WorkerMessage::SkipWaiting);
    }

    #[test]
    fn test_subscription_json_shape() {
        let sub = PushSubscription {
            endpoint: "https://push.example/abc".into(),
            expiration_time: None,
            keys: SubscriptionKeys { p256dh: "p".into(), auth: "a".into() },
        };
        let value: serde_json::Value = serde_json::from_str(&sub.to_json()).unwrap();
        assert_eq!(value["endpoint"], "https://push.example/abc");
        assert!(value["expirationTime"].is_null());
        assert_eq!(value["keys"]["auth"], "a");
    }

    #[test]
    fn test_connection_strings() {
        assert_eq!(EffectiveType::parse("slow-2g"), Some(EffectiveType::Slow2G));
        assert_eq!(EffectiveType::parse("5g"), None);
        assert_eq!(ConnectionType::parse("wifi").as_str(), "wifi");
        assert_eq!(ConnectionType::parse("satellite"), ConnectionType::Unknown);
    }
}
