// Surface link
//
// The display surface is a separate, untrusted execution context. Nothing
// crosses this boundary except serialized snapshots going out (this module)
// and allow-listed intents coming back (the gateway). No shared memory.

use crate::models::{Config, Theme};
use serde::Serialize;
use tokio::sync::mpsc;

/// Snapshot/event pushed from the controller to the display surface.
///
/// Serialized form uses kebab-case event tags, matching the wire protocol
/// (`window-shown`, `config-updated`, `themes-updated`, `ping-health`,
/// `pointer-passthrough`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SurfaceEvent {
    /// The overlay was shown at the given cursor position.
    WindowShown { x: i32, y: i32 },

    /// A new validated config snapshot.
    ConfigUpdated { config: Config },

    /// The selectable theme list.
    ThemesUpdated { themes: Vec<Theme> },

    /// Watchdog heartbeat; the surface is expected to answer with a pong.
    PingHealth,

    /// The surface window should start/stop ignoring pointer input.
    PointerPassthrough { enabled: bool },
}

/// Sending half of the controller -> surface channel.
///
/// Cheap to clone; every component that pushes snapshots holds its own
/// handle. A closed channel (surface gone) is logged, never fatal — the
/// watchdog owns the decision about a dead surface.
#[derive(Debug, Clone)]
pub struct SurfaceLink {
    tx: mpsc::UnboundedSender<SurfaceEvent>,
}

impl SurfaceLink {
    /// Create a link plus the receiving half the window layer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn push(&self, event: SurfaceEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("surface channel closed, dropping outbound event");
        }
    }
}
