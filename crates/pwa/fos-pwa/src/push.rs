//! Push Notifications
//!
//! Tracks notification permission and owns the push subscription.
//!
//! Reachable states are `(default|denied, unsubscribed)`, `(granted,
//! unsubscribed)` and `(granted, subscribed)`. A subscription never outlives
//! a granted permission.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use crate::config::PwaConfig;
use crate::error::{PwaError, Result};
use crate::events::{LifecycleNotice, Notifier};
use crate::platform::{
    NotificationOptions, NotificationPermissions, Permission, PushService, PushSubscription,
    SubscribeOptions,
};
use crate::vapid;
use crate::worker::RegistrationHandle;

/// Read-only view for UI consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushSnapshot {
    pub supported: bool,
    pub permission: Permission,
    pub subscribed: bool,
    pub subscription: Option<PushSubscription>,
}

#[derive(Debug, Default)]
struct PushInner {
    permission: Permission,
    subscription: Option<PushSubscription>,
}

/// Push subscription controller
pub struct PushSubscriptionController {
    permissions: Rc<dyn NotificationPermissions>,
    push: Rc<dyn PushService>,
    vapid_key: Option<String>,
    icon: String,
    badge: String,
    test_title: String,
    test_body: String,
    test_tag: String,
    inner: RefCell<PushInner>,
    /// Bumped whenever the subscription is replaced or dropped, so a subscribe
    /// that resolves afterwards is not adopted blindly
    epoch: Cell<u64>,
    notifier: Notifier,
}

impl PushSubscriptionController {
    pub fn new(
        permissions: Rc<dyn NotificationPermissions>,
        push: Rc<dyn PushService>,
        config: &PwaConfig,
        notifier: Notifier,
    ) -> Self {
        let initial = if permissions.is_supported() {
            permissions.current()
        } else {
            Permission::Default
        };
        Self {
            permissions,
            push,
            vapid_key: config.vapid_public_key.clone(),
            icon: config.notification_icon.clone(),
            badge: config.notification_badge.clone(),
            test_title: config.test_notification_title.clone(),
            test_body: config.test_notification_body.clone(),
            test_tag: config.test_notification_tag.clone(),
            inner: RefCell::new(PushInner { permission: initial, subscription: None }),
            epoch: Cell::new(0),
            notifier,
        }
    }

    /// Notifications, service workers and push are all available
    pub fn is_supported(&self) -> bool {
        self.permissions.is_supported() && self.push.is_supported()
    }

    pub fn permission(&self) -> Permission {
        self.inner.borrow().permission
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.borrow().subscription.is_some()
    }

    pub fn subscription(&self) -> Option<PushSubscription> {
        self.inner.borrow().subscription.clone()
    }

    pub fn snapshot(&self) -> PushSnapshot {
        let inner = self.inner.borrow();
        PushSnapshot {
            supported: self.is_supported(),
            permission: inner.permission,
            subscribed: inner.subscription.is_some(),
            subscription: inner.subscription.clone(),
        }
    }

    /// Re-read permission and the platform's subscription. Run on every mount,
    /// since the platform may have invalidated the subscription meanwhile.
    pub async fn refresh(&self, registration: Option<&RegistrationHandle>) -> Result<()> {
        if !self.is_supported() {
            return Ok(());
        }
        self.on_permission_change(self.permissions.current());

        let Some(registration) = registration else {
            self.clear_subscription();
            return Ok(());
        };

        let epoch = self.epoch.get();
        let found = self
            .push
            .get_subscription(registration.id())
            .await
            .map_err(|e| {
                tracing::error!("Error checking push subscription: {}", e);
                PwaError::SubscriptionFailed(e.to_string())
            })?;

        if self.epoch.get() != epoch {
            tracing::debug!("Subscription check superseded; ignoring result");
            return Ok(());
        }
        match found {
            Some(sub) if self.permission() == Permission::Granted => {
                tracing::debug!("Existing push subscription: {}", sub.endpoint);
                self.inner.borrow_mut().subscription = Some(sub);
            }
            Some(_) => {
                tracing::warn!("Platform holds a subscription without granted permission; ignoring it");
                self.clear_subscription();
            }
            None => self.clear_subscription(),
        }
        Ok(())
    }

    /// Ask the user for notification permission.
    ///
    /// Once denied the platform cannot re-prompt, so this returns
    /// `PermissionDenied` without contacting it.
    pub async fn request_permission(&self) -> Result<Permission> {
        if !self.is_supported() {
            return Err(PwaError::Unsupported("Push notifications"));
        }
        match self.permission() {
            Permission::Denied => return Err(PwaError::permission_denied()),
            Permission::Granted => return Ok(Permission::Granted),
            Permission::Default => {}
        }

        let result = self.permissions.request().await.map_err(|e| {
            tracing::error!("Error requesting notification permission: {}", e);
            PwaError::PermissionRequestFailed(e.to_string())
        })?;

        // A denial recorded while the prompt was open wins
        if self.permission() == Permission::Denied {
            return Err(PwaError::permission_denied());
        }
        self.set_permission(result);
        tracing::info!("Notification permission: {}", result.as_str());
        match result {
            Permission::Denied => Err(PwaError::permission_denied()),
            other => Ok(other),
        }
    }

    /// Create a push subscription scoped to the server key.
    ///
    /// `server_key` falls back to the configured VAPID key. Returns the
    /// existing subscription when already subscribed.
    pub async fn subscribe(
        &self,
        registration: Option<&RegistrationHandle>,
        server_key: Option<&str>,
    ) -> Result<PushSubscription> {
        if !self.is_supported() {
            return Err(PwaError::Unsupported("Push notifications"));
        }
        if self.permission() != Permission::Granted {
            return Err(PwaError::permission_denied());
        }
        let registration = registration.ok_or(PwaError::NoRegistration)?;
        let key = server_key
            .filter(|k| !k.trim().is_empty())
            .or(self.vapid_key.as_deref())
            .ok_or_else(|| {
                tracing::warn!("VAPID key is required for push subscriptions");
                PwaError::MissingKey
            })?;
        if let Some(existing) = self.subscription() {
            return Ok(existing);
        }

        let application_server_key = vapid::decode_server_key(key)?;
        if !vapid::is_uncompressed_p256(&application_server_key) {
            tracing::warn!(
                "VAPID key decodes to {} bytes; expected an uncompressed P-256 point",
                application_server_key.len()
            );
            return Err(PwaError::InvalidKey("not an uncompressed P-256 public key".into()));
        }
        let options = SubscribeOptions {
            user_visible_only: true,
            application_server_key,
        };

        let epoch = self.epoch.get();
        let sub = self
            .push
            .subscribe(registration.id(), &options)
            .await
            .map_err(|e| {
                tracing::error!("Error subscribing to push notifications: {}", e);
                PwaError::SubscriptionFailed(e.to_string())
            })?;

        if self.permission() != Permission::Granted {
            tracing::warn!("Permission revoked while subscribing; dropping subscription");
            if let Err(e) = self.push.unsubscribe(&sub).await {
                tracing::debug!("Cleanup unsubscribe failed: {}", e);
            }
            return Err(PwaError::permission_denied());
        }
        if self.epoch.get() != epoch {
            if let Some(current) = self.subscription() {
                tracing::debug!("Concurrent subscribe already stored a subscription");
                return Ok(current);
            }
        }

        self.epoch.set(self.epoch.get() + 1);
        self.inner.borrow_mut().subscription = Some(sub.clone());
        tracing::info!("Push subscription created: {}", sub.endpoint);
        self.notifier.emit(LifecycleNotice::Subscribed { endpoint: sub.endpoint.clone() });
        Ok(sub)
    }

    /// Cancel the subscription. On platform failure local state is kept and
    /// the error is returned.
    pub async fn unsubscribe(&self) -> Result<bool> {
        let Some(sub) = self.subscription() else {
            return Ok(false);
        };

        let removed = self.push.unsubscribe(&sub).await.map_err(|e| {
            tracing::error!("Error unsubscribing from push notifications: {}", e);
            PwaError::SubscriptionFailed(e.to_string())
        })?;
        if !removed {
            tracing::warn!("Platform declined to cancel push subscription");
            return Err(PwaError::SubscriptionFailed("platform declined unsubscribe".into()));
        }

        let mut inner = self.inner.borrow_mut();
        if inner.subscription.as_ref() == Some(&sub) {
            inner.subscription = None;
            drop(inner);
            self.epoch.set(self.epoch.get() + 1);
            tracing::info!("Push subscription cancelled");
            self.notifier.emit(LifecycleNotice::Unsubscribed);
        }
        Ok(true)
    }

    /// Request permission if still undecided, then subscribe
    pub async fn enable_notifications(
        &self,
        registration: Option<&RegistrationHandle>,
        server_key: Option<&str>,
    ) -> Result<PushSubscription> {
        if self.permission() == Permission::Default {
            self.request_permission().await?;
        }
        self.subscribe(registration, server_key).await
    }

    /// Display a notification through the worker registration
    pub async fn show_notification(
        &self,
        registration: Option<&RegistrationHandle>,
        title: &str,
        options: NotificationOptions,
    ) -> Result<()> {
        if !self.is_supported() || self.permission() != Permission::Granted {
            return Err(PwaError::permission_denied());
        }
        let registration = registration.ok_or(PwaError::NoRegistration)?;

        let options = NotificationOptions {
            icon: options.icon.or_else(|| Some(self.icon.clone())),
            badge: options.badge.or_else(|| Some(self.badge.clone())),
            ..options
        };
        self.push
            .show_notification(registration.id(), title, &options)
            .await
            .map_err(|e| {
                tracing::error!("Error showing notification: {}", e);
                PwaError::NotificationFailed(e.to_string())
            })
    }

    /// Fire the configured test notification. Does not touch subscription state.
    pub async fn show_test_notification(&self, registration: Option<&RegistrationHandle>) -> Result<()> {
        let options = NotificationOptions {
            body: Some(self.test_body.clone()),
            tag: Some(self.test_tag.clone()),
            require_interaction: false,
            ..NotificationOptions::default()
        };
        self.show_notification(registration, &self.test_title, options).await
    }

    /// Permission changed outside the app. Denied is sticky for the session.
    pub fn on_permission_change(&self, permission: Permission) {
        if self.permission() == Permission::Denied && permission != Permission::Denied {
            tracing::debug!("Ignoring permission change away from denied");
            return;
        }
        self.set_permission(permission);
        if permission != Permission::Granted {
            self.clear_subscription();
        }
    }

    fn set_permission(&self, permission: Permission) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let changed = inner.permission != permission;
            inner.permission = permission;
            changed
        };
        if changed {
            self.notifier.emit(LifecycleNotice::PermissionChanged(permission));
        }
        if permission != Permission::Granted {
            self.clear_subscription();
        }
    }

    fn clear_subscription(&self) {
        if self.inner.borrow_mut().subscription.take().is_some() {
            self.epoch.set(self.epoch.get() + 1);
            self.notifier.emit(LifecycleNotice::Unsubscribed);
        }
    }
}
