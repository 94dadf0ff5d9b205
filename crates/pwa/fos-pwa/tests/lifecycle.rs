//! Lifecycle scenarios for fos-pwa
//!
//! Drives the provider through the simulated platform the way a page would.

use std::time::Duration;

use fos_pwa::platform::{Clock, Permission};
use fos_pwa::sim::{SimDisplay, SimInstallPrompt, SimPlatform};
use fos_pwa::{
    InstallOutcome, InstallPhase, LifecycleNotice, PlatformError, PlatformEvent, PwaConfig,
    PwaError, PwaProvider, ServiceWorkerState, WorkerId, WorkerMessage, WorkerStatus,
};

const KEY: &str = "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

fn provider(sim: &SimPlatform) -> PwaProvider {
    PwaProvider::new(sim.platform(), PwaConfig::default())
}

#[test]
fn test_mount_registers_once() {
    let sim = SimPlatform::new();
    let provider = provider(&sim);

    let report = smol::block_on(provider.mount());
    assert!(report.registration.is_some());
    assert!(report.online);
    assert!(!report.installed);

    smol::block_on(provider.worker().register()).unwrap();
    assert_eq!(sim.workers.register_calls(), 1);
}

#[test]
fn test_mount_survives_registration_failure() {
    let sim = SimPlatform::new();
    sim.workers.fail_next_register(PlatformError::Network("sw.js 500".into()));
    let provider = provider(&sim);

    let report = smol::block_on(provider.mount());
    assert!(report.registration.is_none());
    assert_eq!(provider.worker().status(), WorkerStatus::Failed);

    // Other features keep working
    provider.post(PlatformEvent::Offline);
    provider.drain();
    assert!(!provider.network().is_online());
}

#[test]
fn test_mount_without_service_worker_support() {
    let sim = SimPlatform::new();
    sim.workers.set_supported(false);
    let provider = provider(&sim);

    let report = smol::block_on(provider.mount());
    assert!(report.registration.is_none());
    assert_eq!(sim.workers.register_calls(), 0);
    assert_eq!(provider.worker().status(), WorkerStatus::Unregistered);
}

#[test]
fn test_offline_at_load_then_online() {
    let sim = SimPlatform::new();
    sim.network.set_online(false);
    let provider = provider(&sim);
    smol::block_on(provider.mount());

    let state = provider.network().state();
    assert!(!state.online);
    assert!(!state.was_offline);

    provider.post(PlatformEvent::Online);
    assert_eq!(provider.drain(), 1);

    let state = provider.network().state();
    assert!(state.online);
    assert!(state.was_offline);
    assert_eq!(state.last_online_at, Some(sim.clock.now()));
}

#[test]
fn test_events_processed_in_order() {
    let sim = SimPlatform::new();
    let provider = provider(&sim);
    smol::block_on(provider.mount());

    provider.post(PlatformEvent::Offline);
    provider.post(PlatformEvent::Online);
    provider.post(PlatformEvent::Offline);
    assert_eq!(provider.drain(), 3);
    assert!(!provider.network().is_online());
    assert!(provider.network().was_offline());

    sim.clock.advance(Duration::from_secs(1));
    provider.post(PlatformEvent::Online);
    provider.drain();
    let state = provider.network().state();
    assert!(matches!(state.last_transition(), Some(fos_pwa::Transition::Online(_))));
    assert!(state.last_online_at > state.last_offline_at);
    assert_eq!(provider.drain(), 0);
}

#[test]
fn test_update_activation_reloads_once() {
    let sim = SimPlatform::new();
    sim.workers.set_controller(true);
    let mut provider = provider(&sim);
    let notices = provider.take_notices().unwrap();
    smol::block_on(provider.mount());

    let next = WorkerId(5);
    provider.post(PlatformEvent::UpdateFound { installing: next });
    provider.post(PlatformEvent::WorkerStateChange { worker: next, state: ServiceWorkerState::Installed });
    provider.drain();
    assert!(provider.worker().update_available());

    assert!(provider.worker().activate_waiting().unwrap());
    assert!(!provider.worker().activate_waiting().unwrap());
    assert_eq!(sim.workers.messages(), vec![(next, WorkerMessage::SkipWaiting)]);

    for _ in 0..4 {
        provider.post(PlatformEvent::ControllerChange);
    }
    provider.drain();
    assert_eq!(sim.reloader.reloads(), 1);

    let received: Vec<_> = std::iter::from_fn(|| notices.try_recv().ok()).collect();
    assert!(received.contains(&LifecycleNotice::UpdateAvailable { waiting: next }));
    assert_eq!(received.iter().filter(|n| **n == LifecycleNotice::Reloading).count(), 1);
}

#[test]
fn test_install_prompt_single_use() {
    let sim = SimPlatform::new();
    let provider = provider(&sim);
    smol::block_on(provider.mount());

    let (prompt, probe) = SimInstallPrompt::new(InstallOutcome::Accepted);
    provider.post(PlatformEvent::BeforeInstallPrompt(Box::new(prompt)));
    provider.drain();
    assert!(probe.default_prevented());
    assert!(provider.install().is_installable());

    smol::block_on(async {
        assert_eq!(provider.install().prompt_install().await.unwrap(), Some(InstallOutcome::Accepted));
        assert_eq!(provider.install().prompt_install().await.unwrap(), None);
    });
    assert_eq!(probe.prompt_calls(), 1);

    provider.post(PlatformEvent::AppInstalled);
    provider.post(PlatformEvent::AppInstalled);
    provider.drain();
    assert!(provider.install().is_installed());
}

#[test]
fn test_dismiss_while_prompting_discards_late_outcome() {
    let sim = SimPlatform::new();
    let provider = provider(&sim);
    let (prompt, probe) = SimInstallPrompt::new(InstallOutcome::Accepted);
    provider.install().on_before_install_prompt(Box::new(prompt));

    let dismiss = async {
        // Runs while the prompt future is suspended
        assert_eq!(provider.install().phase(), InstallPhase::Prompting);
        provider.install().dismiss();
    };
    let (outcome, ()) = smol::block_on(smol::future::zip(provider.install().prompt_install(), dismiss));

    assert_eq!(outcome.unwrap(), Some(InstallOutcome::Accepted));
    assert_eq!(provider.install().phase(), InstallPhase::Idle);
    assert!(!provider.install().can_install());
    assert_eq!(probe.prompt_calls(), 1);
}

#[test]
fn test_installed_from_display_mode() {
    let sim = SimPlatform::with_display(SimDisplay { ios_standalone: true, ..SimDisplay::default() });
    let provider = provider(&sim);
    let report = smol::block_on(provider.mount());
    assert!(report.installed);

    let (prompt, _) = SimInstallPrompt::new(InstallOutcome::Accepted);
    provider.post(PlatformEvent::BeforeInstallPrompt(Box::new(prompt)));
    provider.drain();
    assert!(provider.install().can_install());
    assert!(!provider.install().is_installable());
}

#[test]
fn test_subscribe_with_default_permission_fails() {
    let sim = SimPlatform::new();
    let provider = provider(&sim);
    smol::block_on(provider.mount());

    let err = smol::block_on(provider.subscribe_push(Some(KEY))).unwrap_err();
    assert!(matches!(err, PwaError::PermissionDenied { .. }));
    assert!(provider.push().subscription().is_none());
    assert_eq!(sim.push.subscribe_calls(), 0);
}

#[test]
fn test_subscribe_without_registration() {
    let sim = SimPlatform::new();
    sim.permissions.set_current(Permission::Granted);
    sim.workers.fail_next_register(PlatformError::Security("insecure origin".into()));
    let provider = provider(&sim);
    smol::block_on(provider.mount());

    let err = smol::block_on(provider.subscribe_push(Some(KEY))).unwrap_err();
    assert_eq!(err, PwaError::NoRegistration);
}

#[test]
fn test_enable_then_disable_notifications() {
    let sim = SimPlatform::new();
    let config = PwaConfig { vapid_public_key: Some(KEY.to_string()), ..PwaConfig::default() };
    let provider = PwaProvider::new(sim.platform(), config);
    smol::block_on(provider.mount());

    let sub = smol::block_on(provider.enable_notifications()).unwrap();
    assert_eq!(provider.push().permission(), Permission::Granted);
    assert_eq!(sim.push.platform_subscription(), Some(sub));

    smol::block_on(provider.show_test_notification()).unwrap();
    assert_eq!(sim.push.notifications().len(), 1);

    assert!(smol::block_on(provider.push().unsubscribe()).unwrap());
    assert!(!provider.push().is_subscribed());
    assert_eq!(sim.push.platform_subscription(), None);
}

#[test]
fn test_remount_rechecks_subscription() {
    let sim = SimPlatform::new();
    sim.permissions.set_current(Permission::Granted);
    sim.push.preload_subscription();
    let provider = provider(&sim);

    smol::block_on(provider.mount());
    assert!(provider.push().is_subscribed());

    sim.push.clear_platform_subscription();
    smol::block_on(provider.mount());
    assert!(!provider.push().is_subscribed());
}

#[test]
fn test_subscription_never_outlives_permission() {
    let sim = SimPlatform::new();
    sim.permissions.set_current(Permission::Granted);
    let provider = provider(&sim);
    smol::block_on(provider.mount());
    smol::block_on(provider.subscribe_push(Some(KEY))).unwrap();

    let check = |p: &PwaProvider| {
        let snapshot = p.push().snapshot();
        assert!(snapshot.subscription.is_none() || snapshot.permission == Permission::Granted);
    };
    check(&provider);

    provider.post(PlatformEvent::PermissionChange(Permission::Denied));
    provider.drain();
    check(&provider);
    assert!(!provider.push().is_subscribed());

    assert!(matches!(
        smol::block_on(provider.push().request_permission()),
        Err(PwaError::PermissionDenied { .. })
    ));
    assert_eq!(sim.permissions.request_calls(), 0);
    check(&provider);
}

#[test]
fn test_denied_survives_remount() {
    let sim = SimPlatform::new();
    sim.permissions.answer_with(Permission::Denied);
    let provider = provider(&sim);
    smol::block_on(provider.mount());

    assert!(smol::block_on(provider.push().request_permission()).is_err());
    provider.post(PlatformEvent::PermissionChange(Permission::Granted));
    provider.drain();
    assert_eq!(provider.push().permission(), Permission::Denied);

    // Site settings flipped while the page stayed open
    sim.permissions.set_current(Permission::Granted);
    smol::block_on(provider.mount());
    assert_eq!(provider.push().permission(), Permission::Denied);
    assert!(matches!(
        smol::block_on(provider.subscribe_push(Some(KEY))),
        Err(PwaError::PermissionDenied { .. })
    ));
}

#[test]
fn test_run_processes_inbox_events() {
    let sim = SimPlatform::new();
    let provider = provider(&sim);
    smol::block_on(provider.mount());
    let inbox = provider.inbox();

    let feed = async {
        inbox.send(PlatformEvent::Offline).await.unwrap();
        inbox.send(PlatformEvent::ControllerChange).await.unwrap();
        smol::future::yield_now().await;
    };
    smol::block_on(smol::future::or(provider.run(), feed));

    assert!(!provider.network().is_online());
    assert_eq!(sim.reloader.reloads(), 1);
    assert_eq!(provider.drain(), 0);
}

#[test]
fn test_revocation_during_subscribe_drops_result() {
    let sim = SimPlatform::new();
    sim.permissions.set_current(Permission::Granted);
    let provider = provider(&sim);
    smol::block_on(provider.mount());

    let revoke = async {
        provider.push().on_permission_change(Permission::Denied);
    };
    let (result, ()) = smol::block_on(smol::future::zip(provider.subscribe_push(Some(KEY)), revoke));

    assert!(matches!(result, Err(PwaError::PermissionDenied { .. })));
    assert!(!provider.push().is_subscribed());
    assert_eq!(sim.push.platform_subscription(), None);
}

#[test]
fn test_config_key_from_file() {
    let dir = std::env::temp_dir().join(format!("fos-pwa-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("pwa.json");
    std::fs::write(&path, format!(r#"{{ "vapid_public_key": "{}", "scope": "/app/" }}"#, KEY)).unwrap();

    let config = PwaConfig::from_file(&path).unwrap();
    assert_eq!(config.scope, "/app/");
    assert_eq!(config.vapid_public_key.as_deref(), Some(KEY));

    std::fs::remove_dir_all(&dir).ok();
    assert!(PwaConfig::from_file(&path).is_err());
}
