use crate::metrics::Metrics;
use crate::surface::{SurfaceEvent, SurfaceLink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How often the surface is pinged.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How many surface failures are absorbed with a restart before the whole
/// process is taken down.
pub const RETRY_BUDGET: u32 = 3;

/// Instructions the watchdog sends to whoever owns the surface process
/// (the window layer in production, the test harness in tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCommand {
    /// Reload the display surface; `attempt` counts from 1.
    RestartSurface { attempt: u32 },

    /// The retry budget is exhausted. A surface that cannot stay alive makes
    /// the product non-functional; shut the process down.
    Shutdown,
}

/// Heartbeats and recovers the display surface.
///
/// Every interval the watchdog pushes a `ping-health` snapshot and checks
/// whether the previous ping was answered. A missed pong, or an explicit
/// failure report from the window layer, counts against a small fixed retry
/// budget; within the budget the surface is restarted, beyond it the process
/// is terminated. Each healthy session (a successful show) exonerates prior
/// failures by resetting the counter.
#[derive(Debug, Clone)]
pub struct SurfaceWatchdog {
    surface: SurfaceLink,
    supervisor: mpsc::UnboundedSender<SupervisorCommand>,
    metrics: Arc<Metrics>,

    crash_count: Arc<AtomicU32>,
    awaiting_pong: Arc<AtomicBool>,
    heartbeat: Duration,
    retry_budget: u32,
}

impl SurfaceWatchdog {
    pub fn new(
        surface: SurfaceLink,
        supervisor: mpsc::UnboundedSender<SupervisorCommand>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::with_settings(surface, supervisor, metrics, HEARTBEAT_INTERVAL, RETRY_BUDGET)
    }

    /// Construct with custom timing/budget (shortened in tests).
    pub fn with_settings(
        surface: SurfaceLink,
        supervisor: mpsc::UnboundedSender<SupervisorCommand>,
        metrics: Arc<Metrics>,
        heartbeat: Duration,
        retry_budget: u32,
    ) -> Self {
        Self {
            surface,
            supervisor,
            metrics,
            crash_count: Arc::new(AtomicU32::new(0)),
            awaiting_pong: Arc::new(AtomicBool::new(false)),
            heartbeat,
            retry_budget,
        }
    }

    /// Run the heartbeat loop. Exits once the budget is exhausted.
    pub fn run(&self) -> JoinHandle<()> {
        let watchdog = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(watchdog.heartbeat);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The immediate first tick sends the first ping; missed-pong
            // checks start from the second.
            loop {
                ticker.tick().await;

                if watchdog.awaiting_pong.swap(true, Ordering::SeqCst) {
                    tracing::warn!("Surface missed heartbeat pong");
                    if !watchdog.record_failure() {
                        break;
                    }
                }

                watchdog.surface.push(SurfaceEvent::PingHealth);
            }
        })
    }

    /// The surface answered the outstanding ping.
    pub fn report_pong(&self) {
        self.awaiting_pong.store(false, Ordering::SeqCst);
    }

    /// The window layer observed a surface failure (render/process
    /// termination, unresponsiveness).
    pub fn report_failure(&self) {
        self.record_failure();
    }

    /// A healthy session exonerates prior failures.
    pub fn note_healthy_session(&self) {
        self.crash_count.store(0, Ordering::SeqCst);
        self.awaiting_pong.store(false, Ordering::SeqCst);
    }

    pub fn crash_count(&self) -> u32 {
        self.crash_count.load(Ordering::SeqCst)
    }

    /// Count a failure against the budget. Returns false once the budget is
    /// exhausted and shutdown has been requested.
    ///
    /// Does not touch `awaiting_pong`: only a pong or a healthy session
    /// clears it, so every silent interval counts as a strike.
    fn record_failure(&self) -> bool {
        let count = self.crash_count.fetch_add(1, Ordering::SeqCst) + 1;

        if count <= self.retry_budget {
            tracing::warn!(
                "Surface failure {count}/{budget}, requesting restart",
                budget = self.retry_budget
            );
            self.metrics.record_surface_restart();
            let _ = self
                .supervisor
                .send(SupervisorCommand::RestartSurface { attempt: count });
            true
        } else {
            tracing::error!(
                "Surface failed {count} times, retry budget exhausted; shutting down"
            );
            let _ = self.supervisor.send(SupervisorCommand::Shutdown);
            false
        }
    }
}
