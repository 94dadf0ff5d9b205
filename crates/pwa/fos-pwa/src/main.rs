//! fOS PWA - simulated session
//!
//! Mounts the lifecycle provider on the simulated platform and replays a
//! session: connectivity loss, an app update, an install prompt and a push
//! opt-in. Pass a JSON config path as the first argument.

use anyhow::Context;
use fos_pwa::platform::Clock;
use fos_pwa::sim::{SimInstallPrompt, SimPlatform};
use fos_pwa::{InstallOutcome, PlatformEvent, PwaConfig, PwaProvider, ServiceWorkerState, WorkerId};
use tracing_subscriber::EnvFilter;

/// Demo key used when none is configured
const DEMO_VAPID_KEY: &str =
    "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => PwaConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => PwaConfig::default(),
    }
    .with_env();

    tracing::info!("Starting fOS PWA session v{}", fos_pwa::VERSION);
    smol::block_on(session(config))
}

async fn session(config: PwaConfig) -> anyhow::Result<()> {
    let sim = SimPlatform::new();
    sim.workers.set_controller(true);
    sim.permissions.answer_with(fos_pwa::Permission::Granted);

    let vapid_key = config
        .vapid_public_key
        .clone()
        .unwrap_or_else(|| DEMO_VAPID_KEY.to_string());
    let mut provider = PwaProvider::new(sim.platform(), config);
    let notices = provider
        .take_notices()
        .context("notice receiver already taken")?;

    let report = provider.mount().await;
    tracing::info!("Mounted: {:?}", report);

    // Connectivity drops and comes back
    provider.post(PlatformEvent::Offline);
    provider.drain();
    sim.clock.advance(std::time::Duration::from_secs(12));
    provider.post(PlatformEvent::Online);

    // A new worker version installs behind the current one
    let next = WorkerId(2);
    provider.post(PlatformEvent::UpdateFound { installing: next });
    provider.post(PlatformEvent::WorkerStateChange { worker: next, state: ServiceWorkerState::Installed });

    // The browser offers installation
    let (prompt, _) = SimInstallPrompt::new(InstallOutcome::Accepted);
    provider.post(PlatformEvent::BeforeInstallPrompt(Box::new(prompt)));
    provider.drain();

    let network = provider.network().state();
    tracing::info!(
        "Network: online={} was_offline={} reconnected_banner={}",
        network.online,
        network.was_offline,
        provider
            .network()
            .show_reconnected(sim.clock.now(), provider.config().reconnected_window())
    );

    tracing::info!(
        "Banner timings: offline toast {:?}, install banner after {:?}, push opt-in after {:?}",
        provider.config().offline_toast(),
        provider.config().install_banner_delay(),
        provider.config().push_prompt_delay()
    );

    if provider.install().is_installable() {
        let outcome = provider.install().prompt_install().await?;
        tracing::info!("Install prompt outcome: {:?}", outcome);
        if outcome == Some(InstallOutcome::Accepted) {
            provider.post(PlatformEvent::AppInstalled);
        }
    }

    let registration = provider.worker().registration();
    match provider
        .push()
        .enable_notifications(registration.as_ref(), Some(&vapid_key))
        .await
    {
        Ok(sub) => {
            tracing::info!("Subscription for the app server: {}", sub.to_json());
            provider.show_test_notification().await?;
        }
        Err(e) => tracing::warn!("Push disabled: {}", e),
    }

    if provider.worker().update_available() {
        provider.worker().activate_waiting()?;
        // The platform answers SKIP_WAITING with controllerchange, sometimes twice
        provider.post(PlatformEvent::ControllerChange);
        provider.post(PlatformEvent::ControllerChange);
    }
    provider.drain();

    while let Ok(notice) = notices.try_recv() {
        tracing::info!("Notice: {:?}", notice);
    }
    tracing::info!(
        "Session finished: {} reload(s), {} SKIP_WAITING message(s), {} notification(s)",
        sim.reloader.reloads(),
        sim.workers.messages().len(),
        sim.push.notifications().len()
    );
    Ok(())
}
