//! Platform events and lifecycle notices
//!
//! Platform callbacks (`online`, `offline`, `updatefound`, `statechange`,
//! `controllerchange`, `beforeinstallprompt`, `appinstalled`) arrive as
//! [`PlatformEvent`] messages on the provider's inbox. Controllers report
//! state changes outward as [`LifecycleNotice`] values.

use std::fmt;

use chrono::{DateTime, Utc};
use smol::channel::{Receiver, Sender, TrySendError};

use crate::platform::{InstallOutcome, InstallPrompt, Permission, ServiceWorkerState, WorkerId};

/// Message delivered by the platform adapter
pub enum PlatformEvent {
    Online,
    Offline,
    /// `navigator.connection` fired `change`
    ConnectionChange,
    /// A new worker started installing
    UpdateFound { installing: WorkerId },
    /// A worker instance changed state
    WorkerStateChange { worker: WorkerId, state: ServiceWorkerState },
    /// A new worker took control of the page
    ControllerChange,
    /// Install opportunity with its single-use prompt
    BeforeInstallPrompt(Box<dyn InstallPrompt>),
    AppInstalled,
    /// Permission changed outside the app (site settings)
    PermissionChange(Permission),
}

impl PlatformEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::ConnectionChange => "connectionchange",
            Self::UpdateFound { .. } => "updatefound",
            Self::WorkerStateChange { .. } => "statechange",
            Self::ControllerChange => "controllerchange",
            Self::BeforeInstallPrompt(_) => "beforeinstallprompt",
            Self::AppInstalled => "appinstalled",
            Self::PermissionChange(_) => "permissionchange",
        }
    }
}

impl fmt::Debug for PlatformEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdateFound { installing } => {
                f.debug_struct("UpdateFound").field("installing", installing).finish()
            }
            Self::WorkerStateChange { worker, state } => f
                .debug_struct("WorkerStateChange")
                .field("worker", worker)
                .field("state", state)
                .finish(),
            Self::PermissionChange(p) => f.debug_tuple("PermissionChange").field(p).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// State change reported to UI consumers
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleNotice {
    WorkerRegistered,
    UpdateAvailable { waiting: WorkerId },
    Reloading,
    Installable,
    InstallResolved(InstallOutcome),
    Installed,
    Online { at: DateTime<Utc> },
    Offline { at: DateTime<Utc> },
    PermissionChanged(Permission),
    Subscribed { endpoint: String },
    Unsubscribed,
}

/// Outbound side of the notice channel. Sending never blocks and a closed or
/// absent receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<Sender<LifecycleNotice>>,
}

impl Notifier {
    /// Notifier that drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Notifier with its receiving end
    pub fn channel() -> (Self, Receiver<LifecycleNotice>) {
        let (tx, rx) = smol::channel::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, notice: LifecycleNotice) {
        let Some(tx) = &self.tx else { return };
        if let Err(TrySendError::Closed(notice) | TrySendError::Full(notice)) = tx.try_send(notice) {
            tracing::trace!("Notice dropped: {:?}", notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_delivers_in_order() {
        let (notifier, rx) = Notifier::channel();
        notifier.emit(LifecycleNotice::Installable);
        notifier.emit(LifecycleNotice::Installed);

        assert_eq!(rx.try_recv().unwrap(), LifecycleNotice::Installable);
        assert_eq!(rx.try_recv().unwrap(), LifecycleNotice::Installed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_notifier_tolerates_closed_receiver() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.emit(LifecycleNotice::Reloading);
        Notifier::disabled().emit(LifecycleNotice::Reloading);
    }

    #[test]
    fn test_event_debug_names() {
        assert_eq!(format!("{:?}", PlatformEvent::ControllerChange), "controllerchange");
        let event = PlatformEvent::UpdateFound { installing: WorkerId(2) };
        assert_eq!(event.name(), "updatefound");
        assert!(format!("{:?}", event).contains("WorkerId(2)"));
    }
}
