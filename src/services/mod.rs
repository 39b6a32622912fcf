// Services module
//
// The three control-plane services around the state machine: vetted action
// launching, trigger gating, and surface supervision.

pub mod executor;
pub mod trigger;
pub mod watchdog;

pub use executor::{ActionExecutor, ExecutionError};
pub use trigger::{DEBOUNCE_WINDOW, TriggerGate};
pub use watchdog::{HEARTBEAT_INTERVAL, RETRY_BUDGET, SupervisorCommand, SurfaceWatchdog};
