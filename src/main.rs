//! Orbit - controller process for the radial overlay action menu
//!
//! Main entry point. The overlay rendering surface runs in a separate,
//! untrusted context and is reached exclusively through a message channel;
//! this binary owns everything else:
//! - Logging infrastructure (daily file rotation + console output)
//! - Tokio runtime (timers, watchdog, config watcher)
//! - Configuration store (load, validate, quarantine, hot reload)
//! - Overlay state machine and trigger gating
//! - Command gateway for surface intents
//! - Surface watchdog (heartbeat, bounded restart budget)
//!
//! # Execution Flow
//!
//! 1. Initialize logging -> logs/orbit.<date>
//! 2. Create the tokio runtime
//! 3. Load config (restoring defaults if the live file is unusable)
//! 4. Wire components and spawn background tasks (watchdog heartbeat,
//!    config file watcher, config observer, surface drain)
//! 5. Run until interrupted or the watchdog exhausts its retry budget
//! 6. Log metrics and shut the runtime down with a timeout

use anyhow::Result;
use orbit::config::ConfigEvent;
use orbit::{
    APP_NAME, ActionExecutor, CommandGateway, ConfigStore, Metrics, OverlayStateMachine,
    SupervisorCommand, SurfaceEvent, SurfaceLink, SurfaceWatchdog, TriggerGate, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// How often the config watcher polls the live file for external edits.
const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let _log_guard = orbit::logging::setup_logging("logs", "orbit", false, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("orbit-worker")
        .build()?;

    let metrics = Arc::new(Metrics::new());

    let result = runtime.block_on(run(Arc::clone(&metrics)));

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn run(metrics: Arc<Metrics>) -> Result<()> {
    // Config first: every other component reads from its snapshot.
    let config = ConfigStore::new(".", Arc::clone(&metrics))?;
    let snapshot = config.load()?;
    tracing::info!(
        "Loaded config v{} with {} top-level actions",
        snapshot.app_version.as_deref().unwrap_or("?"),
        snapshot.actions.len()
    );

    let (surface, mut surface_rx) = SurfaceLink::channel();
    let machine = OverlayStateMachine::new(Arc::clone(&metrics));
    machine.sync_from_config(&snapshot);

    let (supervisor_tx, mut supervisor_rx) = mpsc::unbounded_channel();
    let watchdog = SurfaceWatchdog::new(surface.clone(), supervisor_tx, Arc::clone(&metrics));
    let heartbeat = watchdog.run();

    let executor = ActionExecutor::new(Arc::clone(&metrics));
    let gateway = CommandGateway::new(
        config.clone(),
        machine.clone(),
        executor,
        surface.clone(),
        Arc::clone(&metrics),
    );

    // Inbound pump: the window layer drops (kind, payload) pairs from the
    // surface onto this channel; every one of them funnels through the
    // gateway's allow-list.
    let (intent_tx, mut intent_rx) = mpsc::unbounded_channel::<(String, serde_json::Value)>();
    let intents = tokio::spawn(async move {
        while let Some((kind, payload)) = intent_rx.recv().await {
            gateway.dispatch(&kind, payload);
        }
    });
    let _intent_handle = intent_tx;

    let trigger = TriggerGate::new(
        machine.clone(),
        surface.clone(),
        watchdog.clone(),
        Arc::clone(&metrics),
    );

    // Outbound drain: stands in for the window layer, forwarding events to
    // the renderer. It must answer heartbeats, otherwise the watchdog counts
    // every interval as a missed pong and escalates to shutdown.
    let drain = {
        let watchdog = watchdog.clone();
        tokio::spawn(async move {
            while let Some(event) = surface_rx.recv().await {
                if matches!(event, SurfaceEvent::PingHealth) {
                    watchdog.report_pong();
                }
                tracing::trace!("surface <- {event:?}");
            }
        })
    };

    // Every installed config snapshot (patch or hot reload) is mirrored to
    // the overlay state and re-pushed to the surface.
    let forwarder = spawn_config_forwarder(&config, machine.clone(), surface.clone());
    let watcher = config.spawn_watcher(CONFIG_POLL_INTERVAL);

    push_boot_snapshots(&config, &surface);
    trigger.mark_ready();
    tracing::info!("Control plane ready");

    let exit = loop {
        tokio::select! {
            cmd = supervisor_rx.recv() => match cmd {
                Some(SupervisorCommand::RestartSurface { attempt }) => {
                    tracing::warn!("Reloading display surface (attempt {attempt})");
                    // The recreated surface starts blank; hand it the
                    // current snapshots again.
                    push_boot_snapshots(&config, &surface);
                }
                Some(SupervisorCommand::Shutdown) | None => {
                    break Err(anyhow::anyhow!("display surface unrecoverable"));
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
                break Ok(());
            }
        }
    };

    heartbeat.abort();
    watcher.abort();
    forwarder.abort();
    intents.abort();
    drain.abort();

    exit
}

/// Push the snapshots a freshly started (or restarted) surface needs.
fn push_boot_snapshots(config: &ConfigStore, surface: &SurfaceLink) {
    surface.push(SurfaceEvent::ConfigUpdated {
        config: (*config.current()).clone(),
    });
    surface.push(SurfaceEvent::ThemesUpdated {
        themes: config.themes(),
    });
}

/// Mirror installed config snapshots to the overlay state and the surface.
fn spawn_config_forwarder(
    config: &ConfigStore,
    machine: OverlayStateMachine,
    surface: SurfaceLink,
) -> tokio::task::JoinHandle<()> {
    let mut rx = config.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ConfigEvent::Updated(snapshot)) => {
                    machine.sync_from_config(&snapshot);
                    surface.push(SurfaceEvent::ConfigUpdated {
                        config: (*snapshot).clone(),
                    });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("config forwarder lagged, skipped {skipped} snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
