use crate::models::ActionNode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle phase of the overlay.
///
/// The overlay moves through a strict cycle:
/// Idle -> Expanding -> Active -> Collapsing -> Idle, with one extra edge
/// (Active -> Expanding) used when the user descends into a nested group and
/// the ring morphs in place.
///
/// The wire form (IPC `set-mode` intents) uses the lowercase names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    Idle,
    Expanding,
    Active,
    Collapsing,
}

impl OverlayMode {
    /// All modes, in lifecycle order. Useful for exhaustive table tests.
    pub const ALL: [OverlayMode; 4] = [
        OverlayMode::Idle,
        OverlayMode::Expanding,
        OverlayMode::Active,
        OverlayMode::Collapsing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayMode::Idle => "idle",
            OverlayMode::Expanding => "expanding",
            OverlayMode::Active => "active",
            OverlayMode::Collapsing => "collapsing",
        }
    }

    /// Whether the transition `self -> to` is present in the allowed table.
    ///
    /// Self-loops are not part of the table; `set_mode` treats them as
    /// no-ops before consulting this.
    pub fn can_transition_to(&self, to: OverlayMode) -> bool {
        use OverlayMode::*;
        matches!(
            (self, to),
            (Idle, Expanding)
                | (Expanding, Active)
                | (Expanding, Collapsing)
                | (Active, Collapsing)
                | (Active, Expanding)
                | (Collapsing, Idle)
        )
    }

    /// Expanding and Collapsing are transitional: the overlay is animating
    /// and new triggers are suppressed until the surface or the failsafe
    /// advances the mode.
    pub fn is_transitional(&self) -> bool {
        matches!(self, OverlayMode::Expanding | OverlayMode::Collapsing)
    }

    /// Where the failsafe timer forces a stuck transitional mode.
    pub fn failsafe_target(&self) -> Option<OverlayMode> {
        match self {
            OverlayMode::Expanding => Some(OverlayMode::Active),
            OverlayMode::Collapsing => Some(OverlayMode::Idle),
            _ => None,
        }
    }
}

impl fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(OverlayMode::Idle),
            "expanding" => Ok(OverlayMode::Expanding),
            "active" => Ok(OverlayMode::Active),
            "collapsing" => Ok(OverlayMode::Collapsing),
            other => Err(format!("unknown overlay mode '{other}'")),
        }
    }
}

/// Cursor position in absolute screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: i32,
    pub y: i32,
}

/// Single source of truth for the overlay's runtime state.
///
/// `OverlayState` is wrapped in `Arc<RwLock<OverlayState>>` by
/// [`crate::state::OverlayStateMachine`], which is the only legal mutation
/// path. Consumers read snapshots; they never write fields directly.
#[derive(Debug, Clone)]
pub struct OverlayState {
    /// Current lifecycle phase.
    pub mode: OverlayMode,

    /// Cursor position recorded by the last accepted trigger.
    pub cursor: CursorPosition,

    /// Nesting history for group navigation, most-recent group last.
    pub group_stack: Vec<Vec<ActionNode>>,

    /// Active theme name, mirrored from the config.
    pub theme: String,

    /// Developer mode flag, mirrored from the config.
    pub dev_mode: bool,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            mode: OverlayMode::Idle,
            cursor: CursorPosition::default(),
            group_stack: Vec::new(),
            theme: "Dark Neon".to_string(),
            dev_mode: false,
        }
    }
}
