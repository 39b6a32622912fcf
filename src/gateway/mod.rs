// Command gateway
//
// The single inbound entry point for intents originating on the untrusted
// display surface. Intent kinds outside the allow-list are a security
// event: logged once and dropped with no side effects. Dispatch itself is a
// pure switch; ConfigStore and OverlayStateMachine serialize their own
// mutations.

use crate::config::{self, ConfigStore};
use crate::metrics::Metrics;
use crate::models::{ActionNode, ConfigPatch, OverlayMode};
use crate::services::ActionExecutor;
use crate::state::OverlayStateMachine;
use crate::surface::{SurfaceEvent, SurfaceLink};
use serde_json::Value;
use std::sync::Arc;

/// The intent kinds a surface is allowed to send. Closed set; this is a
/// defense-in-depth boundary against a compromised or buggy surface probing
/// for unexposed capabilities.
pub const ALLOWED_INTENT_KINDS: [&str; 4] = [
    "toggle-pointer-passthrough",
    "execute-action",
    "update-config",
    "set-mode",
];

/// Result of a dispatch attempt, enumerable by callers and tests. Rejected
/// intents carry no error channel back to the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Rejected,
}

/// Typed form of an allow-listed intent, produced at the wire boundary.
#[derive(Debug, Clone)]
enum Intent {
    TogglePointerPassthrough(bool),
    ExecuteAction(ActionNode),
    UpdateConfig(ConfigPatch),
    SetMode(OverlayMode),
}

/// Routes surface intents to the components that own the relevant state.
///
/// The gateway performs no execution authorization itself (that is
/// [`ActionExecutor`]'s job) but is the single choke point where rate
/// limiting or auditing would attach.
#[derive(Clone)]
pub struct CommandGateway {
    config: ConfigStore,
    machine: OverlayStateMachine,
    executor: ActionExecutor,
    surface: SurfaceLink,
    metrics: Arc<Metrics>,
}

impl CommandGateway {
    pub fn new(
        config: ConfigStore,
        machine: OverlayStateMachine,
        executor: ActionExecutor,
        surface: SurfaceLink,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            machine,
            executor,
            surface,
            metrics,
        }
    }

    /// Dispatch one intent from the surface.
    ///
    /// Unknown kinds and malformed payloads are rejected with exactly one
    /// log entry and no side effects. Downstream failures (refused launches,
    /// invalid patches) are logged but never crash the controller.
    pub fn dispatch(&self, kind: &str, payload: Value) -> DispatchOutcome {
        if !ALLOWED_INTENT_KINDS.contains(&kind) {
            tracing::warn!("Security event: rejected intent kind '{kind}' from surface");
            self.metrics.record_intent_rejected();
            return DispatchOutcome::Rejected;
        }

        let intent = match self.parse(kind, payload) {
            Some(intent) => intent,
            None => {
                tracing::warn!("Security event: malformed payload for intent '{kind}'");
                self.metrics.record_intent_rejected();
                return DispatchOutcome::Rejected;
            }
        };

        self.metrics.record_intent_dispatched();
        match intent {
            Intent::TogglePointerPassthrough(enabled) => {
                self.surface
                    .push(SurfaceEvent::PointerPassthrough { enabled });
            }
            Intent::ExecuteAction(mut node) => {
                // The wire form never carries resolved_path; re-derive it
                // here. Authorization stays with the executor's allow-list.
                config::normalize_action(&mut node);
                if let Err(e) = self.executor.execute_node(&node, &self.config.allowed_paths()) {
                    tracing::error!("Execution error for action '{}': {e}", node.label);
                }
            }
            Intent::UpdateConfig(patch) => {
                // Observers (surface snapshot push, overlay theme sync)
                // react through the store's event channel.
                if let Err(e) = self.config.apply_patch(&patch) {
                    tracing::error!("Rejected config update from surface: {e}");
                }
            }
            Intent::SetMode(mode) => {
                // An illegal transition is logged and dropped by the machine.
                self.machine.set_mode(mode);
            }
        }

        DispatchOutcome::Handled
    }

    fn parse(&self, kind: &str, payload: Value) -> Option<Intent> {
        match kind {
            "toggle-pointer-passthrough" => {
                serde_json::from_value(payload)
                    .ok()
                    .map(Intent::TogglePointerPassthrough)
            }
            "execute-action" => serde_json::from_value(payload)
                .ok()
                .map(Intent::ExecuteAction),
            "update-config" => serde_json::from_value(payload)
                .ok()
                .map(Intent::UpdateConfig),
            "set-mode" => {
                // Accept both `"active"` and `{"mode": "active"}`.
                let mode_str = match payload {
                    Value::String(s) => s,
                    Value::Object(map) => map.get("mode")?.as_str()?.to_string(),
                    _ => return None,
                };
                mode_str.parse().ok().map(Intent::SetMode)
            }
            _ => None,
        }
    }
}
