//! PWA Installation
//!
//! Captures the platform's one-shot install opportunity and replays it when
//! the application decides to. The prompt handle is moved out of the
//! opportunity on use, so it can never be invoked twice.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use crate::error::{PwaError, Result};
use crate::events::{LifecycleNotice, Notifier};
use crate::platform::{DisplayProbe, InstallOutcome, InstallPrompt};

/// Referrer prefix used by Android trusted web activities
const ANDROID_APP_REFERRER: &str = "android-app://";

/// Install capture phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallPhase {
    #[default]
    Idle,
    Captured,
    Prompting,
    Resolved,
}

/// What happened to the last opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityOutcome {
    #[default]
    Pending,
    Accepted,
    Dismissed,
    /// Discarded without a user choice (banner closed, prompt failed)
    Consumed,
}

impl From<InstallOutcome> for OpportunityOutcome {
    fn from(outcome: InstallOutcome) -> Self {
        match outcome {
            InstallOutcome::Accepted => Self::Accepted,
            InstallOutcome::Dismissed => Self::Dismissed,
        }
    }
}

/// A captured `beforeinstallprompt`
struct InstallOpportunity {
    prompt: Box<dyn InstallPrompt>,
    platforms: Vec<String>,
}

/// Read-only view for UI consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallSnapshot {
    pub phase: InstallPhase,
    pub captured: bool,
    pub outcome: OpportunityOutcome,
    pub installed: bool,
    pub installable: bool,
    pub platforms: Vec<String>,
}

/// Whether the page is running as an installed app
pub fn detect_installed(probe: &dyn DisplayProbe) -> bool {
    probe.is_standalone()
        || probe.ios_standalone()
        || probe
            .referrer()
            .is_some_and(|r| r.contains(ANDROID_APP_REFERRER))
}

/// Install capture controller
pub struct InstallCaptureController {
    display: Rc<dyn DisplayProbe>,
    opportunity: RefCell<Option<InstallOpportunity>>,
    phase: Cell<InstallPhase>,
    outcome: Cell<OpportunityOutcome>,
    installed: Cell<bool>,
    /// Bumped whenever an opportunity is discarded, so a prompt that resolves
    /// afterwards does not overwrite newer state
    epoch: Cell<u64>,
    notifier: Notifier,
}

impl InstallCaptureController {
    pub fn new(display: Rc<dyn DisplayProbe>, notifier: Notifier) -> Self {
        Self {
            display,
            opportunity: RefCell::new(None),
            phase: Cell::new(InstallPhase::Idle),
            outcome: Cell::new(OpportunityOutcome::Pending),
            installed: Cell::new(false),
            epoch: Cell::new(0),
            notifier,
        }
    }

    /// Re-run display-mode detection
    pub fn refresh_installed(&self) -> bool {
        if detect_installed(self.display.as_ref()) {
            self.installed.set(true);
        }
        self.installed.get()
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase.get()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.get()
    }

    /// An opportunity is held and may be prompted
    pub fn can_install(&self) -> bool {
        self.phase.get() == InstallPhase::Captured && self.opportunity.borrow().is_some()
    }

    /// The install banner should be offered
    pub fn is_installable(&self) -> bool {
        self.can_install() && !self.installed.get()
    }

    pub fn snapshot(&self) -> InstallSnapshot {
        let platforms = self
            .opportunity
            .borrow()
            .as_ref()
            .map(|o| o.platforms.clone())
            .unwrap_or_default();
        InstallSnapshot {
            phase: self.phase.get(),
            captured: self.can_install(),
            outcome: self.outcome.get(),
            installed: self.installed.get(),
            installable: self.is_installable(),
            platforms,
        }
    }

    /// `beforeinstallprompt`: suppress the platform UI and keep the prompt.
    /// Returns whether the opportunity was captured.
    pub fn on_before_install_prompt(&self, mut prompt: Box<dyn InstallPrompt>) -> bool {
        prompt.prevent_default();

        if self.phase.get() == InstallPhase::Prompting {
            tracing::debug!("Install opportunity arrived while prompting; dropped");
            return false;
        }

        let platforms = prompt.platforms();
        let replaced = self
            .opportunity
            .replace(Some(InstallOpportunity { prompt, platforms }))
            .is_some();
        if replaced {
            tracing::debug!("Replacing previously captured install opportunity");
        }
        self.phase.set(InstallPhase::Captured);
        self.outcome.set(OpportunityOutcome::Pending);

        if self.installed.get() {
            tracing::debug!("Install opportunity captured but app already installed");
        } else {
            tracing::info!("Install opportunity captured");
            self.notifier.emit(LifecycleNotice::Installable);
        }
        true
    }

    /// Show the native install prompt.
    ///
    /// No-op returning `Ok(None)` unless an opportunity is captured. The
    /// opportunity is discarded whatever the outcome.
    pub async fn prompt_install(&self) -> Result<Option<InstallOutcome>> {
        if self.phase.get() != InstallPhase::Captured {
            tracing::debug!("prompt_install ignored in phase {:?}", self.phase.get());
            return Ok(None);
        }
        let Some(mut opportunity) = self.opportunity.borrow_mut().take() else {
            return Ok(None);
        };

        self.phase.set(InstallPhase::Prompting);
        let epoch = self.epoch.get();

        let result = opportunity.prompt.prompt().await;
        drop(opportunity);

        let current = self.epoch.get() == epoch && self.phase.get() == InstallPhase::Prompting;
        if current {
            self.epoch.set(epoch + 1);
            self.phase.set(InstallPhase::Resolved);
        } else {
            tracing::debug!("Install prompt resolved after the opportunity was discarded");
        }

        match result {
            Ok(outcome) => {
                match outcome {
                    InstallOutcome::Accepted => tracing::info!("User accepted the install prompt"),
                    InstallOutcome::Dismissed => tracing::info!("User dismissed the install prompt"),
                }
                if current {
                    self.outcome.set(outcome.into());
                    self.notifier.emit(LifecycleNotice::InstallResolved(outcome));
                }
                Ok(Some(outcome))
            }
            Err(e) => {
                tracing::error!("Error during install prompt: {}", e);
                if current {
                    self.outcome.set(OpportunityOutcome::Consumed);
                }
                Err(PwaError::InstallPromptFailed(e.to_string()))
            }
        }
    }

    /// Discard the opportunity without prompting (banner closed)
    pub fn dismiss(&self) {
        let had = self.opportunity.borrow_mut().take().is_some();
        let was_prompting = self.phase.get() == InstallPhase::Prompting;
        if had || was_prompting {
            self.epoch.set(self.epoch.get() + 1);
            self.outcome.set(OpportunityOutcome::Consumed);
            tracing::debug!("Install opportunity dismissed");
        }
        self.phase.set(InstallPhase::Idle);
    }

    /// `appinstalled`. Repeated signals are harmless.
    pub fn on_app_installed(&self) {
        if self.installed.replace(true) {
            tracing::debug!("Duplicate appinstalled signal ignored");
            return;
        }
        if self.opportunity.borrow_mut().take().is_some() {
            self.epoch.set(self.epoch.get() + 1);
        }
        if self.phase.get() == InstallPhase::Captured {
            self.phase.set(InstallPhase::Idle);
        }
        tracing::info!("PWA was installed successfully");
        self.notifier.emit(LifecycleNotice::Installed);
    }
}
