use crate::metrics::Metrics;
use crate::services::SurfaceWatchdog;
use crate::state::OverlayStateMachine;
use crate::surface::{SurfaceEvent, SurfaceLink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between accepted show requests. Guards against hotkey or
/// tray double-fire storms spawning overlapping animations.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(150);

/// Decides whether an external "show the overlay" request is honored.
///
/// A request is dropped (silently, logged at debug level) when the
/// controller has not finished booting, the state machine is mid-transition,
/// or the previous accepted trigger is too recent. Acceptance records the
/// cursor, requests the Expanding transition, pushes `window-shown` to the
/// surface, and marks the surface session healthy for the watchdog.
#[derive(Debug, Clone)]
pub struct TriggerGate {
    machine: OverlayStateMachine,
    surface: SurfaceLink,
    watchdog: SurfaceWatchdog,
    metrics: Arc<Metrics>,

    debounce: Duration,
    last_accepted: Arc<Mutex<Option<Instant>>>,
    ready: Arc<AtomicBool>,
}

impl TriggerGate {
    pub fn new(
        machine: OverlayStateMachine,
        surface: SurfaceLink,
        watchdog: SurfaceWatchdog,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::with_debounce(machine, surface, watchdog, metrics, DEBOUNCE_WINDOW)
    }

    /// Construct with a custom debounce window (shortened in tests).
    pub fn with_debounce(
        machine: OverlayStateMachine,
        surface: SurfaceLink,
        watchdog: SurfaceWatchdog,
        metrics: Arc<Metrics>,
        debounce: Duration,
    ) -> Self {
        Self {
            machine,
            surface,
            watchdog,
            metrics,
            debounce,
            last_accepted: Arc::new(Mutex::new(None)),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark boot wiring complete; triggers are rejected until this is set.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Request showing the overlay at the given cursor position.
    ///
    /// # Returns
    ///
    /// `true` if the request was accepted, `false` if it was suppressed.
    pub fn request_show(&self, x: i32, y: i32) -> bool {
        if !self.ready.load(Ordering::SeqCst) {
            tracing::debug!("trigger dropped: controller not yet initialized");
            self.metrics.record_trigger_suppressed();
            return false;
        }

        if self.machine.is_locked() {
            tracing::debug!("trigger dropped: overlay is mid-transition");
            self.metrics.record_trigger_suppressed();
            return false;
        }

        {
            let mut last = self.last_accepted.lock().unwrap();
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.debounce {
                    tracing::debug!("trigger dropped: within debounce window");
                    self.metrics.record_trigger_suppressed();
                    return false;
                }
            }
            *last = Some(now);
        }

        self.machine.set_cursor(x, y);
        self.machine.set_mode(crate::models::OverlayMode::Expanding);
        self.surface.push(SurfaceEvent::WindowShown { x, y });
        self.watchdog.note_healthy_session();
        self.metrics.record_trigger_accepted();

        tracing::info!("overlay shown at ({x}, {y})");
        true
    }
}
