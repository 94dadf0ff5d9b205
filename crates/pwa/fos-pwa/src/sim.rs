//! Simulated platform
//!
//! In-memory implementations of every capability, with call counters and
//! failure switches. Used by the tests and by the `fos-pwa` binary.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::PlatformError;
use crate::platform::{
    Clock, ConnectionInfo, DisplayProbe, InstallOutcome, InstallPrompt, NetworkProbe,
    NotificationOptions, NotificationPermissions, PageReloader, Permission, PlatformResult,
    PushService, PushSubscription, RegistrationId, RegistrationInfo, SubscribeOptions,
    SubscriptionKeys, WorkerContainer, WorkerId, WorkerMessage,
};
use crate::provider::Platform;

// ============================================================================
// Service workers
// ============================================================================

/// `navigator.serviceWorker` stand-in
#[derive(Debug)]
pub struct SimWorkerContainer {
    supported: Cell<bool>,
    controller: Cell<bool>,
    waiting: Cell<Option<WorkerId>>,
    installing: Cell<Option<WorkerId>>,
    register_error: RefCell<Option<PlatformError>>,
    post_fails: Cell<bool>,
    next_id: Cell<u64>,
    register_calls: Cell<usize>,
    update_calls: Cell<usize>,
    unregister_calls: Cell<usize>,
    messages: RefCell<Vec<(WorkerId, WorkerMessage)>>,
}

impl SimWorkerContainer {
    pub fn new() -> Self {
        Self {
            supported: Cell::new(true),
            controller: Cell::new(false),
            waiting: Cell::new(None),
            installing: Cell::new(None),
            register_error: RefCell::new(None),
            post_fails: Cell::new(false),
            next_id: Cell::new(1),
            register_calls: Cell::new(0),
            update_calls: Cell::new(0),
            unregister_calls: Cell::new(0),
            messages: RefCell::new(Vec::new()),
        }
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.set(supported);
    }

    pub fn set_controller(&self, controlled: bool) {
        self.controller.set(controlled);
    }

    /// Worker reported as already waiting at registration
    pub fn set_waiting(&self, worker: Option<WorkerId>) {
        self.waiting.set(worker);
    }

    /// Worker reported as installing at registration
    pub fn set_installing(&self, worker: Option<WorkerId>) {
        self.installing.set(worker);
    }

    pub fn fail_next_register(&self, error: PlatformError) {
        *self.register_error.borrow_mut() = Some(error);
    }

    pub fn fail_post(&self, fail: bool) {
        self.post_fails.set(fail);
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.get()
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.get()
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.get()
    }

    pub fn messages(&self) -> Vec<(WorkerId, WorkerMessage)> {
        self.messages.borrow().clone()
    }
}

impl Default for SimWorkerContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl WorkerContainer for SimWorkerContainer {
    fn is_supported(&self) -> bool {
        self.supported.get()
    }

    fn has_controller(&self) -> bool {
        self.controller.get()
    }

    async fn register(&self, _script_url: &str, scope: &str) -> PlatformResult<RegistrationInfo> {
        self.register_calls.set(self.register_calls.get() + 1);
        // Let other tasks observe the in-flight registration
        smol::future::yield_now().await;

        if let Some(error) = self.register_error.borrow_mut().take() {
            return Err(error);
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Ok(RegistrationInfo {
            id: RegistrationId(id),
            scope: scope.to_string(),
            installing: self.installing.get(),
            waiting: self.waiting.get(),
            active: self.controller.get().then_some(WorkerId(0)),
        })
    }

    async fn update(&self, _registration: RegistrationId) -> PlatformResult<()> {
        self.update_calls.set(self.update_calls.get() + 1);
        Ok(())
    }

    async fn unregister(&self, _registration: RegistrationId) -> PlatformResult<bool> {
        self.unregister_calls.set(self.unregister_calls.get() + 1);
        Ok(true)
    }

    fn post_message(&self, worker: WorkerId, message: &WorkerMessage) -> PlatformResult<()> {
        if self.post_fails.get() {
            return Err(PlatformError::InvalidState("worker is redundant".into()));
        }
        self.messages.borrow_mut().push((worker, message.clone()));
        Ok(())
    }
}

/// Counts reloads instead of performing them
#[derive(Debug, Default)]
pub struct SimReloader {
    reloads: Cell<usize>,
}

impl SimReloader {
    pub fn reloads(&self) -> usize {
        self.reloads.get()
    }
}

impl PageReloader for SimReloader {
    fn reload(&self) {
        self.reloads.set(self.reloads.get() + 1);
    }
}

// ============================================================================
// Install
// ============================================================================

/// Shared view into a [`SimInstallPrompt`] after it has been handed off
#[derive(Debug, Clone, Default)]
pub struct PromptProbe {
    default_prevented: Rc<Cell<bool>>,
    prompt_calls: Rc<Cell<usize>>,
}

impl PromptProbe {
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn prompt_calls(&self) -> usize {
        self.prompt_calls.get()
    }
}

/// `beforeinstallprompt` stand-in
#[derive(Debug)]
pub struct SimInstallPrompt {
    outcome: PlatformResult<InstallOutcome>,
    probe: PromptProbe,
}

impl SimInstallPrompt {
    pub fn new(outcome: InstallOutcome) -> (Self, PromptProbe) {
        let probe = PromptProbe::default();
        (Self { outcome: Ok(outcome), probe: probe.clone() }, probe)
    }

    /// Prompt that rejects when shown
    pub fn failing() -> (Self, PromptProbe) {
        let probe = PromptProbe::default();
        let outcome = Err(PlatformError::Aborted("prompt could not be shown".into()));
        (Self { outcome, probe: probe.clone() }, probe)
    }
}

#[async_trait(?Send)]
impl InstallPrompt for SimInstallPrompt {
    fn prevent_default(&mut self) {
        self.probe.default_prevented.set(true);
    }

    async fn prompt(&mut self) -> PlatformResult<InstallOutcome> {
        let calls = self.probe.prompt_calls.get() + 1;
        self.probe.prompt_calls.set(calls);
        if calls > 1 {
            return Err(PlatformError::InvalidState("prompt() may only be called once".into()));
        }
        // The user takes a moment to decide
        smol::future::yield_now().await;
        self.outcome.clone()
    }
}

/// Display-mode probe with fixed answers
#[derive(Debug, Clone, Default)]
pub struct SimDisplay {
    pub standalone: bool,
    pub ios_standalone: bool,
    pub referrer: Option<String>,
}

impl SimDisplay {
    pub fn standalone() -> Self {
        Self { standalone: true, ..Self::default() }
    }
}

impl DisplayProbe for SimDisplay {
    fn is_standalone(&self) -> bool {
        self.standalone
    }

    fn ios_standalone(&self) -> bool {
        self.ios_standalone
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.clone()
    }
}

// ============================================================================
// Notifications and push
// ============================================================================

/// `Notification` permission store. The browser never re-prompts once denied.
#[derive(Debug)]
pub struct SimPermissions {
    supported: Cell<bool>,
    current: Cell<Permission>,
    answer: Cell<Permission>,
    request_error: RefCell<Option<PlatformError>>,
    request_calls: Cell<usize>,
}

impl SimPermissions {
    pub fn new(current: Permission) -> Self {
        Self {
            supported: Cell::new(true),
            current: Cell::new(current),
            answer: Cell::new(Permission::Granted),
            request_error: RefCell::new(None),
            request_calls: Cell::new(0),
        }
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.set(supported);
    }

    /// What the user picks at the next prompt
    pub fn answer_with(&self, permission: Permission) {
        self.answer.set(permission);
    }

    /// Change the stored permission behind the app's back
    pub fn set_current(&self, permission: Permission) {
        self.current.set(permission);
    }

    pub fn fail_request(&self, error: PlatformError) {
        *self.request_error.borrow_mut() = Some(error);
    }

    pub fn request_calls(&self) -> usize {
        self.request_calls.get()
    }
}

#[async_trait(?Send)]
impl NotificationPermissions for SimPermissions {
    fn is_supported(&self) -> bool {
        self.supported.get()
    }

    fn current(&self) -> Permission {
        self.current.get()
    }

    async fn request(&self) -> PlatformResult<Permission> {
        self.request_calls.set(self.request_calls.get() + 1);
        if let Some(error) = self.request_error.borrow_mut().take() {
            return Err(error);
        }
        if self.current.get() == Permission::Default {
            self.current.set(self.answer.get());
        }
        Ok(self.current.get())
    }
}

/// `pushManager` stand-in
#[derive(Debug)]
pub struct SimPushService {
    supported: Cell<bool>,
    subscription: RefCell<Option<PushSubscription>>,
    subscribe_error: RefCell<Option<PlatformError>>,
    unsubscribe_error: RefCell<Option<PlatformError>>,
    decline_unsubscribe: Cell<bool>,
    last_options: RefCell<Option<SubscribeOptions>>,
    subscribe_calls: Cell<usize>,
    next_endpoint: Cell<u64>,
    notifications: RefCell<Vec<(String, NotificationOptions)>>,
}

impl SimPushService {
    pub fn new() -> Self {
        Self {
            supported: Cell::new(true),
            subscription: RefCell::new(None),
            subscribe_error: RefCell::new(None),
            unsubscribe_error: RefCell::new(None),
            decline_unsubscribe: Cell::new(false),
            last_options: RefCell::new(None),
            subscribe_calls: Cell::new(0),
            next_endpoint: Cell::new(1),
            notifications: RefCell::new(Vec::new()),
        }
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.set(supported);
    }

    pub fn fail_subscribe(&self, error: Option<PlatformError>) {
        *self.subscribe_error.borrow_mut() = error;
    }

    pub fn fail_unsubscribe(&self, error: Option<PlatformError>) {
        *self.unsubscribe_error.borrow_mut() = error;
    }

    pub fn decline_unsubscribe(&self, decline: bool) {
        self.decline_unsubscribe.set(decline);
    }

    /// Pretend a subscription survived from an earlier session
    pub fn preload_subscription(&self) {
        let sub = self.issue();
        *self.subscription.borrow_mut() = Some(sub);
    }

    /// Pretend the platform expired the subscription
    pub fn clear_platform_subscription(&self) {
        self.subscription.borrow_mut().take();
    }

    pub fn platform_subscription(&self) -> Option<PushSubscription> {
        self.subscription.borrow().clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.get()
    }

    pub fn last_options(&self) -> Option<SubscribeOptions> {
        self.last_options.borrow().clone()
    }

    pub fn notifications(&self) -> Vec<(String, NotificationOptions)> {
        self.notifications.borrow().clone()
    }

    fn issue(&self) -> PushSubscription {
        let n = self.next_endpoint.get();
        self.next_endpoint.set(n + 1);
        PushSubscription {
            endpoint: format!("https://push.example.com/send/{}", n),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: format!("p256dh-{}", n),
                auth: format!("auth-{}", n),
            },
        }
    }
}

impl Default for SimPushService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl PushService for SimPushService {
    fn is_supported(&self) -> bool {
        self.supported.get()
    }

    async fn get_subscription(&self, _registration: RegistrationId) -> PlatformResult<Option<PushSubscription>> {
        Ok(self.subscription.borrow().clone())
    }

    async fn subscribe(
        &self,
        _registration: RegistrationId,
        options: &SubscribeOptions,
    ) -> PlatformResult<PushSubscription> {
        self.subscribe_calls.set(self.subscribe_calls.get() + 1);
        *self.last_options.borrow_mut() = Some(options.clone());
        smol::future::yield_now().await;

        if let Some(error) = self.subscribe_error.borrow().clone() {
            return Err(error);
        }
        if let Some(existing) = self.subscription.borrow().clone() {
            return Ok(existing);
        }
        let sub = self.issue();
        *self.subscription.borrow_mut() = Some(sub.clone());
        Ok(sub)
    }

    async fn unsubscribe(&self, subscription: &PushSubscription) -> PlatformResult<bool> {
        if let Some(error) = self.unsubscribe_error.borrow().clone() {
            return Err(error);
        }
        if self.decline_unsubscribe.get() {
            return Ok(false);
        }
        let mut current = self.subscription.borrow_mut();
        if current.as_ref() == Some(subscription) {
            *current = None;
        }
        Ok(true)
    }

    async fn show_notification(
        &self,
        _registration: RegistrationId,
        title: &str,
        options: &NotificationOptions,
    ) -> PlatformResult<()> {
        self.notifications.borrow_mut().push((title.to_string(), options.clone()));
        Ok(())
    }
}

// ============================================================================
// Network and time
// ============================================================================

/// `navigator.onLine` / `navigator.connection` stand-in
#[derive(Debug)]
pub struct SimNetwork {
    online: Cell<bool>,
    connection: RefCell<Option<ConnectionInfo>>,
}

impl SimNetwork {
    pub fn new(online: bool) -> Self {
        Self { online: Cell::new(online), connection: RefCell::new(None) }
    }

    pub fn set_online(&self, online: bool) {
        self.online.set(online);
    }

    pub fn set_connection(&self, connection: Option<ConnectionInfo>) {
        *self.connection.borrow_mut() = connection;
    }
}

impl NetworkProbe for SimNetwork {
    fn on_line(&self) -> bool {
        self.online.get()
    }

    fn connection(&self) -> Option<ConnectionInfo> {
        self.connection.borrow().clone()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self { now: Cell::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let step = chrono::TimeDelta::from_std(by).unwrap_or(chrono::TimeDelta::zero());
        self.now.set(self.now.get() + step);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default();
        Self::starting_at(start)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Every simulated capability, kept concrete so tests can steer them
#[derive(Clone)]
pub struct SimPlatform {
    pub workers: Rc<SimWorkerContainer>,
    pub reloader: Rc<SimReloader>,
    pub display: Rc<SimDisplay>,
    pub permissions: Rc<SimPermissions>,
    pub push: Rc<SimPushService>,
    pub network: Rc<SimNetwork>,
    pub clock: Rc<ManualClock>,
}

impl SimPlatform {
    /// Online, not installed, permission undecided, no controlling worker
    pub fn new() -> Self {
        Self::with_display(SimDisplay::default())
    }

    pub fn with_display(display: SimDisplay) -> Self {
        Self {
            workers: Rc::new(SimWorkerContainer::new()),
            reloader: Rc::new(SimReloader::default()),
            display: Rc::new(display),
            permissions: Rc::new(SimPermissions::new(Permission::Default)),
            push: Rc::new(SimPushService::new()),
            network: Rc::new(SimNetwork::new(true)),
            clock: Rc::new(ManualClock::default()),
        }
    }

    /// Capabilities for the provider
    pub fn platform(&self) -> Platform {
        Platform {
            workers: self.workers.clone(),
            reloader: self.reloader.clone(),
            display: self.display.clone(),
            permissions: self.permissions.clone(),
            push: self.push.clone(),
            network: self.network.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}
