// Data model module
//
// Config is the persisted shape owned by ConfigStore; OverlayState is the
// runtime shape owned by OverlayStateMachine. Both are replaced/mutated only
// through their owning component.

mod config;
mod overlay;

pub use config::{
    ActionKind, ActionNode, AUTO_DETECT_SENTINEL, BASELINE_CONFIG_VERSION, Config, ConfigPatch,
    MIN_RADIUS, Theme, UI_COMMAND_PREFIX, builtin_themes,
};
pub use overlay::{CursorPosition, OverlayMode, OverlayState};
