// Orbit - controller process for the radial overlay action menu
//
// This is the library crate containing the overlay control plane: the
// lifecycle state machine, the gated command/IPC surface boundary, the
// crash-safe configuration store, and the surface watchdog. The binary
// crate (main.rs) wires them together.

pub mod config;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod surface;

// Re-export commonly used types for convenience
pub use config::{AllowedPathSet, ConfigError, ConfigEvent, ConfigStore};
pub use gateway::{ALLOWED_INTENT_KINDS, CommandGateway, DispatchOutcome};
pub use metrics::Metrics;
pub use models::{ActionKind, ActionNode, Config, ConfigPatch, OverlayMode, OverlayState, Theme};
pub use services::{ActionExecutor, ExecutionError, SupervisorCommand, SurfaceWatchdog, TriggerGate};
pub use state::{OverlayStateMachine, StateEvent};
pub use surface::{SurfaceEvent, SurfaceLink};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
