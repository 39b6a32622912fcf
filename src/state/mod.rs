// Overlay state machine
//
// Owns OverlayState behind Arc<RwLock<T>> and is its only legal mutation
// path. Mode changes go through a strict transition table; accepted
// transitions are broadcast to observers, and transitional modes are backed
// by a failsafe timer so a slow or crashed surface can never wedge the
// overlay mid-animation.

use crate::metrics::Metrics;
use crate::models::{ActionNode, Config, CursorPosition, OverlayMode, OverlayState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

/// How long Expanding/Collapsing may be held before the failsafe forces the
/// overlay forward.
pub const FAILSAFE_DELAY: Duration = Duration::from_secs(1);

/// Change events emitted when overlay state is modified.
#[derive(Clone, Debug, PartialEq)]
pub enum StateEvent {
    /// An accepted mode transition.
    ModeChanged {
        old: OverlayMode,
        new: OverlayMode,
    },

    /// Cursor position was recorded (unguarded, outside the transition
    /// contract).
    CursorMoved { x: i32, y: i32 },

    /// A transitional mode outlived the failsafe delay and was forced
    /// forward.
    FailsafeFired {
        stuck: OverlayMode,
        forced: OverlayMode,
    },
}

/// Finite-state machine for the overlay lifecycle.
///
/// States: Idle, Expanding, Active, Collapsing. Allowed transitions:
///
/// - Idle -> Expanding
/// - Expanding -> Active | Collapsing
/// - Active -> Collapsing | Expanding (group morph)
/// - Collapsing -> Idle
///
/// Anything else is logged, counted, and dropped; the caller sees `false`
/// and the state is untouched. Setting the current mode again is a no-op.
///
/// Arming the failsafe spawns a tokio task, so `set_mode` must be called
/// from within a runtime.
#[derive(Debug)]
pub struct OverlayStateMachine {
    state: Arc<RwLock<OverlayState>>,

    /// Broadcast channel for state change events.
    events: broadcast::Sender<StateEvent>,

    metrics: Arc<Metrics>,

    failsafe_delay: Duration,

    /// Bumped on every accepted transition. A pending failsafe task compares
    /// its captured value against this to detect whether the mode moved on
    /// without it; a stale task simply exits.
    transition_seq: Arc<AtomicU64>,
}

impl OverlayStateMachine {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self::with_failsafe_delay(metrics, FAILSAFE_DELAY)
    }

    /// Construct with a custom failsafe delay (shortened in tests).
    pub fn with_failsafe_delay(metrics: Arc<Metrics>, failsafe_delay: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Arc::new(RwLock::new(OverlayState::default())),
            events,
            metrics,
            failsafe_delay,
            transition_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a read-only snapshot of the current state.
    pub fn snapshot(&self) -> OverlayState {
        self.state.read().unwrap().clone()
    }

    /// Current mode without cloning the whole state.
    pub fn mode(&self) -> OverlayMode {
        self.state.read().unwrap().mode
    }

    /// True while the overlay is mid-animation and new triggers must be
    /// suppressed.
    pub fn is_locked(&self) -> bool {
        self.mode().is_transitional()
    }

    /// Subscribe to state change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Request a mode transition.
    ///
    /// # Returns
    ///
    /// `true` if the transition was applied (or was a same-mode no-op),
    /// `false` if the table rejected it. Rejections are not errors: they are
    /// logged and dropped, matching the defensive posture of a UI-facing
    /// control surface.
    pub fn set_mode(&self, new: OverlayMode) -> bool {
        let (old, seq) = {
            let mut state = self.state.write().unwrap();
            let old = state.mode;

            if old == new {
                return true;
            }

            if !old.can_transition_to(new) {
                drop(state);
                tracing::warn!(from = %old, to = %new, "rejected illegal overlay transition");
                self.metrics.record_transition_rejected();
                return false;
            }

            state.mode = new;
            if new == OverlayMode::Idle {
                // A finished collapse discards any group nesting history.
                state.group_stack.clear();
            }

            // Bumping the sequence cancels any pending failsafe for the
            // previous transition.
            let seq = self.transition_seq.fetch_add(1, Ordering::SeqCst) + 1;
            (old, seq)
        };

        tracing::info!(from = %old, to = %new, "overlay transition");
        self.metrics.record_transition_accepted();
        let _ = self.events.send(StateEvent::ModeChanged { old, new });

        if new.is_transitional() {
            self.arm_failsafe(new, seq);
        }

        true
    }

    /// Arm the failsafe for a transitional mode just entered.
    ///
    /// If no further transition happens before the delay expires, the mode
    /// is forced forward (Expanding -> Active, Collapsing -> Idle).
    fn arm_failsafe(&self, entered: OverlayMode, seq: u64) {
        let forced = match entered.failsafe_target() {
            Some(target) => target,
            None => return,
        };

        let machine = self.clone();
        let delay = self.failsafe_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if machine.transition_seq.load(Ordering::SeqCst) != seq {
                // Mode moved on in time; this timer is stale.
                return;
            }

            tracing::warn!(stuck = %entered, forced = %forced, "overlay failsafe fired");
            machine.metrics.record_failsafe_fired();
            let _ = machine.events.send(StateEvent::FailsafeFired {
                stuck: entered,
                forced,
            });
            machine.set_mode(forced);
        });
    }

    /// Record the cursor position.
    ///
    /// Unguarded by design: cursor tracking is not part of the transition
    /// contract.
    pub fn set_cursor(&self, x: i32, y: i32) {
        {
            let mut state = self.state.write().unwrap();
            state.cursor = CursorPosition { x, y };
        }
        let _ = self.events.send(StateEvent::CursorMoved { x, y });
    }

    /// Push a nested group onto the navigation stack (paired with the
    /// Active -> Expanding morph transition).
    pub fn push_group(&self, children: Vec<ActionNode>) {
        self.state.write().unwrap().group_stack.push(children);
    }

    /// Pop the most recent group, returning it if any.
    pub fn pop_group(&self) -> Option<Vec<ActionNode>> {
        self.state.write().unwrap().group_stack.pop()
    }

    /// Depth of group nesting.
    pub fn group_depth(&self) -> usize {
        self.state.read().unwrap().group_stack.len()
    }

    /// Mirror the display-relevant config fields into the overlay state.
    pub fn sync_from_config(&self, config: &Config) {
        let mut state = self.state.write().unwrap();
        state.theme = config.active_theme.clone();
        state.dev_mode = config.dev_mode;
    }
}

impl Clone for OverlayStateMachine {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            metrics: Arc::clone(&self.metrics),
            failsafe_delay: self.failsafe_delay,
            transition_seq: Arc::clone(&self.transition_seq),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;

    fn machine() -> OverlayStateMachine {
        OverlayStateMachine::new(Arc::new(Metrics::new()))
    }

    /// Walk the machine to `target` through legal transitions only.
    fn drive_to(m: &OverlayStateMachine, target: OverlayMode) {
        let path: &[OverlayMode] = match target {
            OverlayMode::Idle => &[],
            OverlayMode::Expanding => &[OverlayMode::Expanding],
            OverlayMode::Active => &[OverlayMode::Expanding, OverlayMode::Active],
            OverlayMode::Collapsing => &[OverlayMode::Expanding, OverlayMode::Collapsing],
        };
        for &mode in path {
            assert!(m.set_mode(mode), "drive_to step {mode} must be legal");
        }
        assert_eq!(m.mode(), target);
    }

    #[tokio::test]
    async fn test_initial_state_is_idle() {
        let m = machine();
        let state = m.snapshot();
        assert_eq!(state.mode, OverlayMode::Idle);
        assert!(!m.is_locked());
        assert!(state.group_stack.is_empty());
    }

    #[tokio::test]
    async fn test_legal_cycle() {
        let m = machine();
        assert!(m.set_mode(OverlayMode::Expanding));
        assert!(m.set_mode(OverlayMode::Active));
        assert!(m.set_mode(OverlayMode::Collapsing));
        assert!(m.set_mode(OverlayMode::Idle));
        assert_eq!(m.mode(), OverlayMode::Idle);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_dropped_without_event() {
        let m = machine();
        let mut rx = m.subscribe();

        assert!(!m.set_mode(OverlayMode::Active));
        assert_eq!(m.mode(), OverlayMode::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_same_mode_is_noop() {
        let m = machine();
        let mut rx = m.subscribe();

        assert!(m.set_mode(OverlayMode::Idle));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mode_changed_event_payload() {
        let m = machine();
        let mut rx = m.subscribe();

        m.set_mode(OverlayMode::Expanding);
        assert_eq!(
            rx.try_recv().unwrap(),
            StateEvent::ModeChanged {
                old: OverlayMode::Idle,
                new: OverlayMode::Expanding,
            }
        );
    }

    #[tokio::test]
    async fn test_is_locked_in_transitional_modes() {
        let m = machine();
        drive_to(&m, OverlayMode::Expanding);
        assert!(m.is_locked());

        m.set_mode(OverlayMode::Active);
        assert!(!m.is_locked());

        m.set_mode(OverlayMode::Collapsing);
        assert!(m.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failsafe_advances_stuck_expanding() {
        let m = OverlayStateMachine::with_failsafe_delay(
            Arc::new(Metrics::new()),
            Duration::from_millis(50),
        );
        m.set_mode(OverlayMode::Expanding);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(m.mode(), OverlayMode::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failsafe_advances_stuck_collapsing() {
        let m = OverlayStateMachine::with_failsafe_delay(
            Arc::new(Metrics::new()),
            Duration::from_millis(50),
        );
        drive_to(&m, OverlayMode::Collapsing);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(m.mode(), OverlayMode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failsafe_cancelled_by_progress() {
        let m = OverlayStateMachine::with_failsafe_delay(
            Arc::new(Metrics::new()),
            Duration::from_millis(50),
        );
        m.set_mode(OverlayMode::Expanding);
        m.set_mode(OverlayMode::Active);

        let mut rx = m.subscribe();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(m.mode(), OverlayMode::Active);
        // No failsafe event after the transition completed in time.
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, StateEvent::FailsafeFired { .. }));
        }
    }

    #[tokio::test]
    async fn test_cursor_is_unguarded() {
        let m = machine();
        let mut rx = m.subscribe();

        m.set_cursor(640, 480);
        assert_eq!(m.snapshot().cursor, CursorPosition { x: 640, y: 480 });
        assert_eq!(
            rx.try_recv().unwrap(),
            StateEvent::CursorMoved { x: 640, y: 480 }
        );
    }

    #[tokio::test]
    async fn test_group_stack_cleared_on_idle() {
        let m = machine();
        drive_to(&m, OverlayMode::Active);
        m.push_group(vec![ActionNode::new(
            "Lock",
            ActionKind::RawCommand {
                command: "lock.cmd".to_string(),
            },
        )]);
        assert_eq!(m.group_depth(), 1);

        m.set_mode(OverlayMode::Collapsing);
        m.set_mode(OverlayMode::Idle);
        assert_eq!(m.group_depth(), 0);
    }

    #[tokio::test]
    async fn test_sync_from_config() {
        let m = machine();
        let mut config = Config::bundled_default();
        config.active_theme = "Solar Flare".to_string();
        config.dev_mode = true;

        m.sync_from_config(&config);
        let state = m.snapshot();
        assert_eq!(state.theme, "Solar Flare");
        assert!(state.dev_mode);
    }
}
