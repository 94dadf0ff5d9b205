//! Network Status
//!
//! Online/offline projection with transition history and best-effort link
//! quality from the Network Information API.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::{LifecycleNotice, Notifier};
use crate::platform::{Clock, ConnectionInfo, EffectiveType, NetworkProbe};

/// Link quality sample. `None` fields are unknown, never zero.
pub type LinkQuality = ConnectionInfo;

/// Estimate effective type from RTT (ms) and downlink (Mbps)
pub fn estimate_effective_type(rtt: u32, downlink: f64) -> EffectiveType {
    if rtt >= 2000 || downlink < 0.05 {
        EffectiveType::Slow2G
    } else if rtt >= 1400 || downlink < 0.07 {
        EffectiveType::TwoG
    } else if rtt >= 270 || downlink < 1.5 {
        EffectiveType::ThreeG
    } else {
        EffectiveType::FourG
    }
}

/// Most recent reachability transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "at", rename_all = "lowercase")]
pub enum Transition {
    Online(DateTime<Utc>),
    Offline(DateTime<Utc>),
}

/// Network state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkState {
    pub online: bool,
    /// Sticky once an offline period was observed
    pub was_offline: bool,
    pub last_online_at: Option<DateTime<Utc>>,
    pub last_offline_at: Option<DateTime<Utc>>,
    pub link_quality: Option<LinkQuality>,
}

impl NetworkState {
    fn initial(online: bool, link_quality: Option<LinkQuality>) -> Self {
        Self {
            online,
            was_offline: false,
            last_online_at: None,
            last_offline_at: None,
            link_quality,
        }
    }

    pub fn is_offline(&self) -> bool {
        !self.online
    }

    /// The later of the two stamped transitions
    pub fn last_transition(&self) -> Option<Transition> {
        match (self.last_online_at, self.last_offline_at) {
            (Some(on), Some(off)) if off > on => Some(Transition::Offline(off)),
            (Some(on), _) => Some(Transition::Online(on)),
            (None, Some(off)) => Some(Transition::Offline(off)),
            (None, None) => None,
        }
    }

    /// Link quality with the effective type filled in from rtt/downlink when
    /// the platform did not report one
    pub fn effective_type(&self) -> Option<EffectiveType> {
        let quality = self.link_quality.as_ref()?;
        quality.effective_type.or_else(|| match (quality.rtt, quality.downlink) {
            (Some(rtt), Some(downlink)) => Some(estimate_effective_type(rtt, downlink)),
            _ => None,
        })
    }
}

/// Network status tracker
pub struct NetworkStatusTracker {
    probe: Rc<dyn NetworkProbe>,
    clock: Rc<dyn Clock>,
    state: RefCell<NetworkState>,
    notifier: Notifier,
}

impl NetworkStatusTracker {
    pub fn new(probe: Rc<dyn NetworkProbe>, clock: Rc<dyn Clock>, notifier: Notifier) -> Self {
        let state = NetworkState::initial(probe.on_line(), probe.connection());
        Self {
            probe,
            clock,
            state: RefCell::new(state),
            notifier,
        }
    }

    /// Reinitialize from the platform. Clears history, including `was_offline`.
    pub fn mount(&self) {
        let state = NetworkState::initial(self.probe.on_line(), self.probe.connection());
        tracing::debug!("Network tracker mounted (online: {})", state.online);
        *self.state.borrow_mut() = state;
    }

    pub fn state(&self) -> NetworkState {
        self.state.borrow().clone()
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().online
    }

    pub fn was_offline(&self) -> bool {
        self.state.borrow().was_offline
    }

    /// `offline` event
    pub fn on_offline(&self) {
        let now = self.clock.now();
        {
            let mut state = self.state.borrow_mut();
            state.online = false;
            state.was_offline = true;
            state.last_offline_at = Some(now);
        }
        tracing::info!("Connection lost");
        self.notifier.emit(LifecycleNotice::Offline { at: now });
    }

    /// `online` event. `was_offline` stays set.
    pub fn on_online(&self) {
        let now = self.clock.now();
        {
            let mut state = self.state.borrow_mut();
            state.online = true;
            state.last_online_at = Some(now);
        }
        self.sample_link_quality();
        tracing::info!("Connection restored");
        self.notifier.emit(LifecycleNotice::Online { at: now });
    }

    /// `change` on the connection-information object
    pub fn on_connection_change(&self) {
        self.sample_link_quality();
    }

    /// Whether a "reconnected" banner is still inside its display window
    pub fn show_reconnected(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let state = self.state.borrow();
        if !state.online || !state.was_offline {
            return false;
        }
        match state.last_transition() {
            Some(Transition::Online(at)) => {
                let elapsed = (now - at).to_std().unwrap_or(Duration::ZERO);
                elapsed < window
            }
            _ => false,
        }
    }

    fn sample_link_quality(&self) {
        let sample = self.probe.connection();
        if let Some(quality) = &sample {
            tracing::debug!(
                "Link quality: downlink {:?} Mbps, rtt {:?} ms, type {:?}",
                quality.downlink,
                quality.rtt,
                quality.effective_type.map(|t| t.as_str())
            );
        }
        self.state.borrow_mut().link_quality = sample;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ManualClock, SimNetwork};

    fn tracker(online: bool) -> (NetworkStatusTracker, Rc<SimNetwork>, Rc<ManualClock>) {
        let network = Rc::new(SimNetwork::new(online));
        let clock = Rc::new(ManualClock::default());
        let tracker = NetworkStatusTracker::new(network.clone(), clock.clone(), Notifier::disabled());
        (tracker, network, clock)
    }

    #[test]
    fn test_offline_at_load_then_online() {
        let (tracker, _, _) = tracker(false);
        let state = tracker.state();
        assert!(!state.online);
        assert!(!state.was_offline);

        tracker.on_online();
        let state = tracker.state();
        assert!(state.online);
        assert!(state.was_offline);
        assert!(state.last_online_at.is_some());
    }

    #[test]
    fn test_offline_latches_was_offline() {
        let (tracker, _, clock) = tracker(true);
        tracker.on_offline();
        clock.advance(Duration::from_secs(5));
        tracker.on_online();

        let state = tracker.state();
        assert!(state.was_offline);
        assert!(state.last_online_at > state.last_offline_at);
        assert!(matches!(state.last_transition(), Some(Transition::Online(_))));

        tracker.mount();
        assert!(!tracker.was_offline());
        assert_eq!(tracker.state().last_transition(), None);
    }

    #[test]
    fn test_every_event_is_stamped() {
        let (tracker, _, clock) = tracker(true);
        tracker.on_offline();
        let first = tracker.state().last_offline_at;
        clock.advance(Duration::from_secs(1));
        tracker.on_offline();
        assert!(tracker.state().last_offline_at > first);
    }

    #[test]
    fn test_missing_connection_api_is_unknown() {
        let (tracker, _, _) = tracker(true);
        assert_eq!(tracker.state().link_quality, None);
        assert_eq!(tracker.state().effective_type(), None);
    }

    #[test]
    fn test_connection_change_resamples() {
        let (tracker, network, _) = tracker(true);
        network.set_connection(Some(ConnectionInfo {
            downlink: Some(0.9),
            rtt: Some(300),
            ..ConnectionInfo::default()
        }));
        tracker.on_connection_change();
        assert_eq!(tracker.state().effective_type(), Some(EffectiveType::ThreeG));
    }

    #[test]
    fn test_reconnected_window() {
        let (tracker, _, clock) = tracker(true);
        let window = Duration::from_secs(3);
        assert!(!tracker.show_reconnected(clock.now(), window));

        tracker.on_offline();
        assert!(!tracker.show_reconnected(clock.now(), window));
        tracker.on_online();
        assert!(tracker.show_reconnected(clock.now(), window));
        clock.advance(Duration::from_secs(4));
        assert!(!tracker.show_reconnected(clock.now(), window));
    }

    #[test]
    fn test_estimate_effective_type() {
        assert_eq!(estimate_effective_type(2500, 10.0), EffectiveType::Slow2G);
        assert_eq!(estimate_effective_type(1500, 10.0), EffectiveType::TwoG);
        assert_eq!(estimate_effective_type(100, 1.0), EffectiveType::ThreeG);
        assert_eq!(estimate_effective_type(50, 10.0), EffectiveType::FourG);
    }
}
