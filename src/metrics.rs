// Performance metrics module
//
// Lightweight lock-free counters for the control plane. Collected for the
// process lifetime and logged on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Control-plane counters.
///
/// Uses atomic operations for thread-safe tracking without locks. One
/// instance is created at startup and shared (via `Arc`) with every
/// component that records into it.
#[derive(Debug)]
pub struct Metrics {
    /// Show requests accepted by the trigger gate
    pub triggers_accepted: AtomicU64,

    /// Show requests dropped by debounce or lock suppression
    pub triggers_suppressed: AtomicU64,

    /// Mode transitions applied by the state machine
    pub transitions_accepted: AtomicU64,

    /// Mode transitions rejected by the table
    pub transitions_rejected: AtomicU64,

    /// Failsafe timers that fired on a stuck transitional mode
    pub failsafe_firings: AtomicU64,

    /// Intents dispatched through the gateway
    pub intents_dispatched: AtomicU64,

    /// Intents rejected by the gateway allow-list or payload parsing
    pub intents_rejected: AtomicU64,

    /// Actions launched by the executor
    pub actions_launched: AtomicU64,

    /// Action launches refused by a security check
    pub actions_refused: AtomicU64,

    /// Config loads, including hot reloads
    pub config_loads: AtomicU64,

    /// Config files quarantined after a validation failure
    pub config_quarantines: AtomicU64,

    /// Surface restart attempts issued by the watchdog
    pub surface_restarts: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            triggers_accepted: AtomicU64::new(0),
            triggers_suppressed: AtomicU64::new(0),
            transitions_accepted: AtomicU64::new(0),
            transitions_rejected: AtomicU64::new(0),
            failsafe_firings: AtomicU64::new(0),
            intents_dispatched: AtomicU64::new(0),
            intents_rejected: AtomicU64::new(0),
            actions_launched: AtomicU64::new(0),
            actions_refused: AtomicU64::new(0),
            config_loads: AtomicU64::new(0),
            config_quarantines: AtomicU64::new(0),
            surface_restarts: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_trigger_accepted(&self) {
        self.triggers_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trigger_suppressed(&self) {
        self.triggers_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition_accepted(&self) {
        self.transitions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition_rejected(&self) {
        self.transitions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failsafe_fired(&self) {
        self.failsafe_firings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intent_dispatched(&self) {
        self.intents_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intent_rejected(&self) {
        self.intents_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_launched(&self) {
        self.actions_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_refused(&self) {
        self.actions_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config_load(&self) {
        self.config_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config_quarantine(&self) {
        self.config_quarantines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_surface_restart(&self) {
        self.surface_restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Log a summary of all counters, typically at shutdown.
    pub fn log_summary(&self) {
        tracing::info!("=== Orbit Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.start_time.elapsed().as_secs_f64());
        tracing::info!(
            "Triggers: {} accepted, {} suppressed",
            self.triggers_accepted.load(Ordering::Relaxed),
            self.triggers_suppressed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Transitions: {} accepted, {} rejected, {} failsafe firings",
            self.transitions_accepted.load(Ordering::Relaxed),
            self.transitions_rejected.load(Ordering::Relaxed),
            self.failsafe_firings.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Intents: {} dispatched, {} rejected",
            self.intents_dispatched.load(Ordering::Relaxed),
            self.intents_rejected.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Actions: {} launched, {} refused",
            self.actions_launched.load(Ordering::Relaxed),
            self.actions_refused.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Config: {} loads, {} quarantines; surface restarts: {}",
            self.config_loads.load(Ordering::Relaxed),
            self.config_quarantines.load(Ordering::Relaxed),
            self.surface_restarts.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = Metrics::new();
        assert_eq!(metrics.triggers_accepted.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.intents_rejected.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_operations() {
        let metrics = Metrics::new();

        metrics.record_trigger_accepted();
        metrics.record_trigger_suppressed();
        metrics.record_trigger_suppressed();
        metrics.record_intent_rejected();
        metrics.record_failsafe_fired();

        assert_eq!(metrics.triggers_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.triggers_suppressed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.intents_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.failsafe_firings.load(Ordering::Relaxed), 1);
    }
}
