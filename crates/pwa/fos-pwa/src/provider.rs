//! PWA Provider
//!
//! Composes the four controllers, mounts them at application start and owns
//! the single inbox through which platform events are delivered in order.

use std::rc::Rc;

use smol::channel::{Receiver, Sender};

use crate::config::PwaConfig;
use crate::error::Result;
use crate::events::{LifecycleNotice, Notifier, PlatformEvent};
use crate::install::InstallCaptureController;
use crate::network::NetworkStatusTracker;
use crate::platform::{
    Clock, DisplayProbe, NetworkProbe, NotificationPermissions, PageReloader, PushService,
    PushSubscription, WorkerContainer,
};
use crate::push::PushSubscriptionController;
use crate::worker::{RegistrationHandle, WorkerLifecycleController};

/// Injected platform capabilities
#[derive(Clone)]
pub struct Platform {
    pub workers: Rc<dyn WorkerContainer>,
    pub reloader: Rc<dyn PageReloader>,
    pub display: Rc<dyn DisplayProbe>,
    pub permissions: Rc<dyn NotificationPermissions>,
    pub push: Rc<dyn PushService>,
    pub network: Rc<dyn NetworkProbe>,
    pub clock: Rc<dyn Clock>,
}

/// Result of mounting
#[derive(Debug, Clone, PartialEq)]
pub struct MountReport {
    pub registration: Option<RegistrationHandle>,
    pub online: bool,
    pub installed: bool,
    pub push_supported: bool,
}

/// Lifecycle provider
pub struct PwaProvider {
    config: PwaConfig,
    worker: WorkerLifecycleController,
    install: InstallCaptureController,
    push: PushSubscriptionController,
    network: NetworkStatusTracker,
    inbox_tx: Sender<PlatformEvent>,
    inbox_rx: Receiver<PlatformEvent>,
    notices: Option<Receiver<LifecycleNotice>>,
}

impl PwaProvider {
    pub fn new(platform: Platform, config: PwaConfig) -> Self {
        let (notifier, notices) = Notifier::channel();
        let (inbox_tx, inbox_rx) = smol::channel::unbounded();

        let worker = WorkerLifecycleController::new(
            platform.workers.clone(),
            platform.reloader.clone(),
            &config,
            notifier.clone(),
        );
        let install = InstallCaptureController::new(platform.display.clone(), notifier.clone());
        let push = PushSubscriptionController::new(
            platform.permissions.clone(),
            platform.push.clone(),
            &config,
            notifier.clone(),
        );
        let network = NetworkStatusTracker::new(platform.network.clone(), platform.clock.clone(), notifier);

        Self {
            config,
            worker,
            install,
            push,
            network,
            inbox_tx,
            inbox_rx,
            notices: Some(notices),
        }
    }

    pub fn config(&self) -> &PwaConfig {
        &self.config
    }

    pub fn worker(&self) -> &WorkerLifecycleController {
        &self.worker
    }

    pub fn install(&self) -> &InstallCaptureController {
        &self.install
    }

    pub fn push(&self) -> &PushSubscriptionController {
        &self.push
    }

    pub fn network(&self) -> &NetworkStatusTracker {
        &self.network
    }

    /// Sender handed to the platform adapter
    pub fn inbox(&self) -> Sender<PlatformEvent> {
        self.inbox_tx.clone()
    }

    /// Receiver of lifecycle notices. Can be taken once.
    pub fn take_notices(&mut self) -> Option<Receiver<LifecycleNotice>> {
        self.notices.take()
    }

    /// Mount every controller. Failures degrade the affected feature and are
    /// logged; they never fail the mount.
    pub async fn mount(&self) -> MountReport {
        self.network.mount();
        let installed = self.install.refresh_installed();

        let registration = match self.worker.register().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Service worker unavailable: {}", e);
                None
            }
        };

        if let Err(e) = self.push.refresh(registration.as_ref()).await {
            tracing::warn!("Push state unavailable: {}", e);
        }

        let report = MountReport {
            registration,
            online: self.network.is_online(),
            installed,
            push_supported: self.push.is_supported(),
        };
        tracing::info!(
            "PWA lifecycle mounted (registered: {}, online: {}, installed: {})",
            report.registration.is_some(),
            report.online,
            report.installed
        );
        report
    }

    /// Post an event to the inbox
    pub fn post(&self, event: PlatformEvent) {
        if let Err(e) = self.inbox_tx.try_send(event) {
            tracing::warn!("Platform event dropped: {:?}", e.into_inner());
        }
    }

    /// Route one event to the controller that owns it
    pub fn dispatch(&self, event: PlatformEvent) {
        tracing::trace!("Dispatching {:?}", event);
        match event {
            PlatformEvent::Online => self.network.on_online(),
            PlatformEvent::Offline => self.network.on_offline(),
            PlatformEvent::ConnectionChange => self.network.on_connection_change(),
            PlatformEvent::UpdateFound { installing } => self.worker.on_update_found(installing),
            PlatformEvent::WorkerStateChange { worker, state } => {
                self.worker.on_worker_state(worker, state)
            }
            PlatformEvent::ControllerChange => {
                self.worker.on_controller_change();
            }
            PlatformEvent::BeforeInstallPrompt(prompt) => {
                self.install.on_before_install_prompt(prompt);
            }
            PlatformEvent::AppInstalled => self.install.on_app_installed(),
            PlatformEvent::PermissionChange(permission) => self.push.on_permission_change(permission),
        }
    }

    /// Process every queued event in arrival order. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.inbox_rx.try_recv() {
            self.dispatch(event);
            processed += 1;
        }
        processed
    }

    /// Process events until every sender is gone. The provider keeps one
    /// sender itself, so this runs until the caller's future is dropped.
    pub async fn run(&self) {
        while let Ok(event) = self.inbox_rx.recv().await {
            self.dispatch(event);
        }
    }

    // === UI actions that need the registration ===

    /// Subscribe using the current worker registration
    pub async fn subscribe_push(&self, server_key: Option<&str>) -> Result<PushSubscription> {
        let registration = self.worker.registration();
        self.push.subscribe(registration.as_ref(), server_key).await
    }

    /// Permission prompt followed by subscribe
    pub async fn enable_notifications(&self) -> Result<PushSubscription> {
        let registration = self.worker.registration();
        self.push.enable_notifications(registration.as_ref(), None).await
    }

    pub async fn show_test_notification(&self) -> Result<()> {
        let registration = self.worker.registration();
        self.push.show_test_notification(registration.as_ref()).await
    }
}
