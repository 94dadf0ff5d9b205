//! fOS PWA - Progressive Web App lifecycle
//!
//! Controllers for the parts of a PWA that hold platform state:
//! - **Worker lifecycle**: register the service worker, detect new versions,
//!   activate them and reload exactly once
//! - **Install capture**: hold the one-shot `beforeinstallprompt` and replay it
//! - **Push subscription**: notification permission and the push subscription
//! - **Network status**: online/offline history and link quality
//!
//! Browser globals are injected through the traits in [`platform`]; the
//! [`sim`] module provides in-memory stand-ins.
//!
//! # Example
//! ```rust,ignore
//! use fos_pwa::{PwaConfig, PwaProvider, sim::SimPlatform};
//!
//! let sim = SimPlatform::new();
//! let provider = PwaProvider::new(sim.platform(), PwaConfig::default());
//! smol::block_on(provider.mount());
//! provider.post(fos_pwa::PlatformEvent::Offline);
//! provider.drain();
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod install;
pub mod network;
pub mod platform;
pub mod provider;
pub mod push;
pub mod sim;
pub mod vapid;
pub mod worker;

pub use config::{ConfigError, PwaConfig};
pub use error::{PlatformError, PwaError, Result};
pub use events::{LifecycleNotice, Notifier, PlatformEvent};
pub use install::{InstallCaptureController, InstallPhase, InstallSnapshot, OpportunityOutcome};
pub use network::{LinkQuality, NetworkState, NetworkStatusTracker, Transition};
pub use platform::{
    ConnectionInfo, ConnectionType, EffectiveType, InstallOutcome, NotificationOptions, Permission,
    PushSubscription, ServiceWorkerState, WorkerId, WorkerMessage,
};
pub use provider::{MountReport, Platform, PwaProvider};
pub use push::{PushSnapshot, PushSubscriptionController};
pub use worker::{RegistrationHandle, WorkerLifecycleController, WorkerSnapshot, WorkerStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
