//! Service Worker Lifecycle
//!
//! Registers the worker script, follows new versions through install, and
//! negotiates activation.
//!
//! ## States
//! ```text
//! unregistered -> registering -> registered -> update-found -> update-ready
//!                      |                                           |
//!                      +-> failed (retry allowed)      SKIP_WAITING, controllerchange
//!                                                                  |
//!                                                               reload (once)
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use crate::config::PwaConfig;
use crate::error::{PwaError, Result};
use crate::events::{LifecycleNotice, Notifier};
use crate::platform::{
    PageReloader, RegistrationId, ServiceWorkerState, WorkerContainer, WorkerId, WorkerMessage,
};

/// Registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerStatus {
    #[default]
    Unregistered,
    Registering,
    Registered,
    UpdateFound,
    UpdateReady,
    Failed,
}

impl WorkerStatus {
    /// A registration handle exists
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered | Self::UpdateFound | Self::UpdateReady)
    }
}

/// Opaque handle to a live registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationHandle {
    id: RegistrationId,
}

impl RegistrationHandle {
    pub(crate) fn new(id: RegistrationId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

/// Read-only view for UI consumers
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub status: WorkerStatus,
    pub registration: Option<RegistrationHandle>,
    pub active: Option<WorkerId>,
    pub waiting: Option<WorkerId>,
    pub installing: Option<WorkerId>,
    pub update_available: bool,
    pub activation_requested: bool,
    pub reload_requested: bool,
    pub last_error: Option<PwaError>,
}

#[derive(Debug, Default)]
struct WorkerInner {
    status: WorkerStatus,
    registration: Option<RegistrationHandle>,
    active: Option<WorkerId>,
    waiting: Option<WorkerId>,
    installing: Option<WorkerId>,
    banner_dismissed: bool,
    last_error: Option<PwaError>,
    /// Bumped on unregister so in-flight registrations are discarded
    epoch: u64,
}

/// Worker lifecycle controller
pub struct WorkerLifecycleController {
    container: Rc<dyn WorkerContainer>,
    reloader: Rc<dyn PageReloader>,
    script_url: String,
    scope: String,
    auto_check_updates: bool,
    inner: RefCell<WorkerInner>,
    /// SKIP_WAITING already posted to the current waiting worker
    skip_sent: Cell<bool>,
    /// Reload already triggered; never reset for the life of the page
    reload_requested: Cell<bool>,
    notifier: Notifier,
}

impl WorkerLifecycleController {
    pub fn new(
        container: Rc<dyn WorkerContainer>,
        reloader: Rc<dyn PageReloader>,
        config: &PwaConfig,
        notifier: Notifier,
    ) -> Self {
        Self {
            container,
            reloader,
            script_url: config.script_url.clone(),
            scope: config.scope.clone(),
            auto_check_updates: config.auto_check_updates,
            inner: RefCell::new(WorkerInner::default()),
            skip_sent: Cell::new(false),
            reload_requested: Cell::new(false),
            notifier,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.container.is_supported()
    }

    pub fn status(&self) -> WorkerStatus {
        self.inner.borrow().status
    }

    /// Current registration, if any
    pub fn registration(&self) -> Option<RegistrationHandle> {
        let inner = self.inner.borrow();
        if inner.status.is_registered() {
            inner.registration
        } else {
            None
        }
    }

    /// Whether the "update available" banner should be shown
    pub fn update_available(&self) -> bool {
        let inner = self.inner.borrow();
        inner.status == WorkerStatus::UpdateReady && !inner.banner_dismissed && !self.skip_sent.get()
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let inner = self.inner.borrow();
        WorkerSnapshot {
            status: inner.status,
            registration: inner.registration,
            active: inner.active,
            waiting: inner.waiting,
            installing: inner.installing,
            update_available: inner.status == WorkerStatus::UpdateReady
                && !inner.banner_dismissed
                && !self.skip_sent.get(),
            activation_requested: self.skip_sent.get(),
            reload_requested: self.reload_requested.get(),
            last_error: inner.last_error.clone(),
        }
    }

    /// Register the worker script.
    ///
    /// Returns the existing handle when already registered. Returns `Ok(None)`
    /// while another registration is in flight, or when that registration was
    /// superseded by `unregister()` before the platform answered.
    pub async fn register(&self) -> Result<Option<RegistrationHandle>> {
        if !self.container.is_supported() {
            tracing::debug!("Service workers unsupported; skipping registration");
            return Err(PwaError::Unsupported("Service workers"));
        }

        let epoch = {
            let mut inner = self.inner.borrow_mut();
            match inner.status {
                WorkerStatus::Registering => {
                    tracing::debug!("Registration already in flight");
                    return Ok(None);
                }
                WorkerStatus::Registered | WorkerStatus::UpdateFound | WorkerStatus::UpdateReady => {
                    return Ok(inner.registration);
                }
                WorkerStatus::Unregistered | WorkerStatus::Failed => {}
            }
            inner.status = WorkerStatus::Registering;
            inner.last_error = None;
            inner.epoch
        };

        tracing::debug!("Registering service worker {} (scope {})", self.script_url, self.scope);
        let result = self.container.register(&self.script_url, &self.scope).await;

        let (superseded, idle) = {
            let inner = self.inner.borrow();
            (inner.epoch != epoch, inner.status == WorkerStatus::Unregistered)
        };
        if superseded {
            tracing::debug!("Discarding registration result superseded by unregister");
            // Leave the scope alone if a newer register() is under way
            if let (Ok(info), true) = (result, idle) {
                match self.container.unregister(info.id).await {
                    Ok(_) => tracing::debug!("Late registration {:?} removed", info.id),
                    Err(e) => tracing::warn!("Failed to remove late registration: {}", e),
                }
            }
            return Ok(None);
        }

        let mut inner = self.inner.borrow_mut();

        let info = match result {
            Ok(info) => info,
            Err(e) => {
                let err = PwaError::RegistrationFailed(e.to_string());
                tracing::warn!("ServiceWorker registration failed: {}", e);
                inner.status = WorkerStatus::Failed;
                inner.last_error = Some(err.clone());
                return Err(err);
            }
        };

        let handle = RegistrationHandle::new(info.id);
        let controlled = self.container.has_controller();
        inner.registration = Some(handle);
        inner.active = info.active;
        inner.installing = info.installing;
        inner.waiting = None;
        inner.banner_dismissed = false;
        inner.status = WorkerStatus::Registered;

        let mut update_ready = None;
        match (info.waiting, info.installing) {
            (Some(waiting), _) if controlled => {
                inner.waiting = Some(waiting);
                inner.status = WorkerStatus::UpdateReady;
                update_ready = Some(waiting);
            }
            (_, Some(_)) if controlled => inner.status = WorkerStatus::UpdateFound,
            _ => {}
        }
        let status = inner.status;
        drop(inner);

        tracing::info!("ServiceWorker registered (scope {}, status {:?})", info.scope, status);
        self.notifier.emit(LifecycleNotice::WorkerRegistered);
        if let Some(waiting) = update_ready {
            self.skip_sent.set(false);
            tracing::info!("Worker {:?} already waiting; update available", waiting);
            self.notifier.emit(LifecycleNotice::UpdateAvailable { waiting });
        }

        if self.auto_check_updates && status == WorkerStatus::Registered {
            if let Err(e) = self.check_for_update().await {
                tracing::debug!("Initial update check failed: {}", e);
            }
        }

        Ok(Some(handle))
    }

    /// Ask the platform to revalidate the worker script. No-op unless registered.
    pub async fn check_for_update(&self) -> Result<()> {
        let registration = {
            let inner = self.inner.borrow();
            if inner.status != WorkerStatus::Registered {
                tracing::debug!("Update check skipped in status {:?}", inner.status);
                return Ok(());
            }
            inner.registration
        };
        let Some(registration) = registration else {
            return Ok(());
        };

        self.container.update(registration.id).await.map_err(|e| {
            tracing::warn!("ServiceWorker update failed: {}", e);
            PwaError::UpdateCheckFailed(e.to_string())
        })
    }

    /// Tell the waiting worker to activate. Sends SKIP_WAITING at most once per
    /// waiting worker; returns whether a message was sent.
    pub fn activate_waiting(&self) -> Result<bool> {
        let waiting = {
            let inner = self.inner.borrow();
            if inner.status != WorkerStatus::UpdateReady {
                tracing::debug!("activate_waiting ignored in status {:?}", inner.status);
                return Ok(false);
            }
            inner.waiting
        };
        let Some(worker) = waiting else {
            return Ok(false);
        };

        if self.skip_sent.replace(true) {
            tracing::debug!("SKIP_WAITING already sent to {:?}", worker);
            return Ok(false);
        }

        match self.container.post_message(worker, &WorkerMessage::SkipWaiting) {
            Ok(()) => {
                tracing::info!("Sent SKIP_WAITING to {:?}", worker);
                Ok(true)
            }
            Err(e) => {
                self.skip_sent.set(false);
                tracing::warn!("Failed to post SKIP_WAITING: {}", e);
                Err(PwaError::ActivationFailed(e.to_string()))
            }
        }
    }

    /// Hide the update banner ("Later") without leaving update-ready
    pub fn dismiss_update(&self) {
        self.inner.borrow_mut().banner_dismissed = true;
    }

    /// Remove the registration and return to `unregistered`
    pub async fn unregister(&self) -> Result<bool> {
        let registration = {
            let mut inner = self.inner.borrow_mut();
            match inner.status {
                WorkerStatus::Registering => {
                    inner.status = WorkerStatus::Unregistered;
                    inner.epoch += 1;
                    return Ok(false);
                }
                status if status.is_registered() => inner.registration,
                _ => return Ok(false),
            }
        };
        let Some(registration) = registration else {
            return Ok(false);
        };

        let removed = self.container.unregister(registration.id).await.map_err(|e| {
            tracing::error!("ServiceWorker unregistration failed: {}", e);
            PwaError::RegistrationFailed(e.to_string())
        })?;

        let mut inner = self.inner.borrow_mut();
        if inner.registration == Some(registration) {
            let epoch = inner.epoch + 1;
            *inner = WorkerInner { epoch, ..WorkerInner::default() };
            self.skip_sent.set(false);
            tracing::info!("ServiceWorker unregistered");
        }
        Ok(removed)
    }

    // === Platform events ===

    /// `updatefound`: a new worker started installing
    pub fn on_update_found(&self, installing: WorkerId) {
        let mut inner = self.inner.borrow_mut();
        if !inner.status.is_registered() {
            tracing::debug!("updatefound ignored in status {:?}", inner.status);
            return;
        }
        inner.installing = Some(installing);
        if inner.status == WorkerStatus::Registered {
            inner.status = WorkerStatus::UpdateFound;
        }
        tracing::debug!("Update found: worker {:?} installing", installing);
    }

    /// `statechange` of a worker instance
    pub fn on_worker_state(&self, worker: WorkerId, state: ServiceWorkerState) {
        let controlled = self.container.has_controller();
        let mut inner = self.inner.borrow_mut();
        if !inner.status.is_registered() {
            tracing::debug!("statechange for {:?} ignored in status {:?}", worker, inner.status);
            return;
        }

        if inner.installing == Some(worker) {
            match state {
                ServiceWorkerState::Installed => {
                    inner.installing = None;
                    if controlled {
                        inner.waiting = Some(worker);
                        inner.status = WorkerStatus::UpdateReady;
                        inner.banner_dismissed = false;
                        drop(inner);
                        self.skip_sent.set(false);
                        tracing::info!("New content available: worker {:?} waiting", worker);
                        self.notifier.emit(LifecycleNotice::UpdateAvailable { waiting: worker });
                    } else {
                        // First install: nothing to replace
                        if inner.status == WorkerStatus::UpdateFound {
                            inner.status = WorkerStatus::Registered;
                        }
                        tracing::debug!("Worker {:?} installed for first use", worker);
                    }
                }
                ServiceWorkerState::Redundant => {
                    inner.installing = None;
                    if inner.status == WorkerStatus::UpdateFound {
                        inner.status = WorkerStatus::Registered;
                    }
                    tracing::debug!("Installing worker {:?} became redundant", worker);
                }
                _ => {}
            }
        } else if inner.waiting == Some(worker) {
            match state {
                ServiceWorkerState::Activating | ServiceWorkerState::Activated => {
                    inner.waiting = None;
                    inner.active = Some(worker);
                    inner.status = WorkerStatus::Registered;
                    tracing::debug!("Worker {:?} activated", worker);
                }
                ServiceWorkerState::Redundant => {
                    inner.waiting = None;
                    inner.status = WorkerStatus::Registered;
                    drop(inner);
                    self.skip_sent.set(false);
                    tracing::debug!("Waiting worker {:?} became redundant", worker);
                }
                _ => {}
            }
        } else if inner.active == Some(worker) && state == ServiceWorkerState::Redundant {
            inner.active = None;
        } else {
            tracing::trace!("statechange {:?} for untracked worker {:?}", state, worker);
        }
    }

    /// `controllerchange`: reload once, ignore every later signal
    pub fn on_controller_change(&self) -> bool {
        if self.reload_requested.replace(true) {
            tracing::debug!("Reload already requested; ignoring controllerchange");
            return false;
        }
        tracing::info!("New service worker took control; reloading page");
        self.notifier.emit(LifecycleNotice::Reloading);
        self.reloader.reload();
        true
    }
}
