use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Minimum legal value for every ring radius, enforced at the schema boundary.
pub const MIN_RADIUS: f64 = 50.0;

/// Version stamped onto configs that predate the `appVersion` field.
pub const BASELINE_CONFIG_VERSION: &str = "1.0.0";

/// Sentinel command value meaning "the controller picks the binary itself";
/// never resolved to a filesystem path.
pub const AUTO_DETECT_SENTINEL: &str = "auto-detect";

/// Prefix for commands handled inside the surface (palette toggles and the
/// like); never resolved to a filesystem path.
pub const UI_COMMAND_PREFIX: &str = "ui:";

/// User configuration persisted as `config.json`.
///
/// Replaced wholesale on every successful reload; consumers never mutate an
/// instance in place. They submit a [`ConfigPatch`] through
/// [`crate::config::ConfigStore`], which produces a new validated instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Absent in pre-1.0 files; stamped by migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    pub radius: f64,

    #[serde(default = "default_primary_radius")]
    pub primary_radius: f64,

    #[serde(default = "default_group_radius")]
    pub group_radius: f64,

    #[serde(default = "default_theme")]
    pub active_theme: String,

    #[serde(default)]
    pub dev_mode: bool,

    /// Root of the action tree. Required, may be empty.
    pub actions: Vec<ActionNode>,
}

fn default_primary_radius() -> f64 {
    110.0
}

fn default_group_radius() -> f64 {
    140.0
}

fn default_theme() -> String {
    "Dark Neon".to_string()
}

impl Config {
    /// The bundled default configuration, restored whenever the live file is
    /// missing or quarantined.
    pub fn bundled_default() -> Self {
        Self {
            app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            radius: 160.0,
            primary_radius: default_primary_radius(),
            group_radius: default_group_radius(),
            active_theme: default_theme(),
            dev_mode: false,
            actions: vec![
                ActionNode::new(
                    "Terminal",
                    ActionKind::Custom {
                        path: AUTO_DETECT_SENTINEL.to_string(),
                        args: Vec::new(),
                    },
                ),
                ActionNode::new(
                    "Search",
                    ActionKind::UiToggle {
                        target: "ui:palette".to_string(),
                    },
                ),
                ActionNode::new("System", ActionKind::Group { children: vec![] }),
            ],
        }
    }
}

/// One node in the action tree: a leaf the user can trigger, or a group that
/// opens a nested ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionNode {
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(flatten)]
    pub kind: ActionKind,

    /// Derived during normalization; never persisted and never trusted as an
    /// authorization decision by itself (membership in the
    /// [`crate::config::AllowedPathSet`] is what authorizes execution).
    #[serde(skip)]
    pub resolved_path: Option<Utf8PathBuf>,
}

impl ActionNode {
    pub fn new(label: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            label: label.into(),
            icon: None,
            kind,
            resolved_path: None,
        }
    }

    /// The raw command/path string subject to path resolution, if this node
    /// kind carries one.
    pub fn launch_target(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Custom { path, .. } => Some(path),
            ActionKind::RawCommand { command } => Some(command),
            _ => None,
        }
    }

    /// A group with no children is a legal but inert leaf; the surface must
    /// refuse to descend into it.
    pub fn is_inert_group(&self) -> bool {
        matches!(&self.kind, ActionKind::Group { children } if children.is_empty())
    }
}

/// Closed set of action kinds. Unknown `type` tags are rejected at the
/// deserialization boundary rather than passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionKind {
    /// Launch a user-configured program.
    Custom {
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    /// Nested ring of child actions.
    Group {
        #[serde(default)]
        children: Vec<ActionNode>,
    },
    /// Switch the active theme.
    ThemeSwitch { theme: String },
    /// Toggle a surface-side UI element.
    UiToggle { target: String },
    /// Legacy free-form command string, resolved like a custom path.
    RawCommand { command: String },
}

/// Partial configuration submitted through the `update-config` intent.
///
/// Unset fields keep their current values. Unknown fields are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigPatch {
    pub radius: Option<f64>,
    pub primary_radius: Option<f64>,
    pub group_radius: Option<f64>,
    pub active_theme: Option<String>,
    pub dev_mode: Option<bool>,
    pub actions: Option<Vec<ActionNode>>,
}

impl ConfigPatch {
    /// Apply this patch on top of `base`, producing a candidate config.
    ///
    /// The result is *not* validated here; the store validates before
    /// persisting.
    pub fn apply_to(&self, base: &Config) -> Config {
        let mut next = base.clone();
        if let Some(radius) = self.radius {
            next.radius = radius;
        }
        if let Some(primary_radius) = self.primary_radius {
            next.primary_radius = primary_radius;
        }
        if let Some(group_radius) = self.group_radius {
            next.group_radius = group_radius;
        }
        if let Some(ref theme) = self.active_theme {
            next.active_theme = theme.clone();
        }
        if let Some(dev_mode) = self.dev_mode {
            next.dev_mode = dev_mode;
        }
        if let Some(ref actions) = self.actions {
            next.actions = actions.clone();
        }
        next
    }
}

/// A selectable surface theme, pushed in the `themes-updated` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub accent: String,
}

/// Built-in theme registry, keyed by theme name in definition order.
pub fn builtin_themes() -> IndexMap<String, Theme> {
    let mut themes = IndexMap::new();
    for (name, accent) in [
        ("Dark Neon", "#00e5ff"),
        ("Light Frost", "#3366cc"),
        ("Solar Flare", "#ff8c00"),
    ] {
        themes.insert(
            name.to_string(),
            Theme {
                name: name.to_string(),
                accent: accent.to_string(),
            },
        );
    }
    themes
}
