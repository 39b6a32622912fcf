// Configuration store
//
// Owns the persisted config: load/validate/migrate/normalize on the way in,
// atomic temp-file-plus-rename on the way out, quarantine-and-restore when
// the live file is corrupt. The process must always end up with a usable
// configuration; no config failure is fatal.

use crate::metrics::Metrics;
use crate::models::{
    ActionKind, ActionNode, AUTO_DETECT_SENTINEL, BASELINE_CONFIG_VERSION, Config, ConfigPatch,
    MIN_RADIUS, Theme, UI_COMMAND_PREFIX, builtin_themes,
};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Errors from loading or persisting the configuration.
///
/// These never escape [`ConfigStore::load`] as failures: the store
/// quarantines the offending file and restores defaults instead.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file is not readable JSON: {0}")]
    Malformed(String),

    #[error("config failed schema validation: {0}")]
    SchemaInvalid(String),

    #[error("failed to persist config: {0}")]
    WriteFailed(String),
}

/// Events emitted when a new validated config snapshot is installed.
#[derive(Clone, Debug)]
pub enum ConfigEvent {
    /// A load, hot reload, or patch produced this snapshot.
    Updated(Arc<Config>),
}

/// Every `resolved_path` present in the current action tree.
///
/// This is the sole authorization source for
/// [`crate::services::ActionExecutor`]: a path outside this set is never
/// executed. Rebuilt from scratch on every load and patch; read-only to
/// consumers.
#[derive(Debug, Clone, Default)]
pub struct AllowedPathSet(HashSet<Utf8PathBuf>);

impl AllowedPathSet {
    /// Collect every resolved path in the tree, recursing into groups.
    pub fn from_actions(actions: &[ActionNode]) -> Self {
        let mut set = HashSet::new();
        collect_resolved(actions, &mut set);
        Self(set)
    }

    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.0.contains(path)
    }

    pub fn insert(&mut self, path: Utf8PathBuf) {
        self.0.insert(path);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn collect_resolved(actions: &[ActionNode], set: &mut HashSet<Utf8PathBuf>) {
    for node in actions {
        if let Some(ref path) = node.resolved_path {
            set.insert(path.clone());
        }
        if let ActionKind::Group { children } = &node.kind {
            collect_resolved(children, set);
        }
    }
}

/// Crash-safe configuration store.
///
/// The live file is `<config_dir>/config.json`. Consumers never mutate a
/// config in place: they read snapshots via [`current`](Self::current) and
/// submit changes via [`apply_patch`](Self::apply_patch), which validates
/// and persists before the snapshot is replaced.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    current: Arc<RwLock<Arc<Config>>>,
    allowed: Arc<RwLock<AllowedPathSet>>,
    events: broadcast::Sender<ConfigEvent>,
    metrics: Arc<Metrics>,

    /// Mtime of the live file at the last load/write; the watcher compares
    /// against this to detect external edits.
    last_modified: Arc<Mutex<Option<SystemTime>>>,
}

impl ConfigStore {
    /// Create a store rooted at `config_dir`, creating the directory if
    /// needed. Does not touch the config file; call [`load`](Self::load).
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P, metrics: Arc<Metrics>) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {config_dir}"))?;
        }

        let (events, _) = broadcast::channel(16);
        Ok(Self {
            config_path: config_dir.join("config.json"),
            config_dir,
            current: Arc::new(RwLock::new(Arc::new(Config::bundled_default()))),
            allowed: Arc::new(RwLock::new(AllowedPathSet::default())),
            events,
            metrics,
            last_modified: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// The current validated snapshot.
    pub fn current(&self) -> Arc<Config> {
        self.current.read().unwrap().clone()
    }

    /// The current allow-list of executable paths.
    pub fn allowed_paths(&self) -> AllowedPathSet {
        self.allowed.read().unwrap().clone()
    }

    /// Subscribe to config snapshot updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }

    /// Selectable themes, in registry order.
    pub fn themes(&self) -> Vec<Theme> {
        builtin_themes().into_values().collect()
    }

    /// Load the live config file, recovering to defaults on any failure.
    ///
    /// Missing file: the bundled default is written first. Corrupt or
    /// schema-invalid file: quarantined as `config.json.<epoch-ms>.bak`,
    /// defaults restored in its place. Either way the caller gets a usable
    /// config; only unrecoverable I/O (cannot write the default) is an
    /// error.
    pub fn load(&self) -> Result<Arc<Config>> {
        if !self.config_path.exists() {
            tracing::info!("Config missing at {}, creating from defaults", self.config_path);
            self.write(&Config::bundled_default())
                .context("Failed to create default config")?;
        }

        let config = match self.read_validated() {
            Ok(config) => config,
            Err(err) => {
                tracing::error!("Config failure: {err}. Quarantining and restoring defaults");
                self.quarantine_live_file();
                let default = Config::bundled_default();
                self.write(&default)
                    .context("Failed to restore default config")?;
                default
            }
        };

        self.record_live_mtime();
        self.metrics.record_config_load();
        Ok(self.install(config))
    }

    /// Parse and schema-validate the live file without installing it.
    fn read_validated(&self) -> Result<Config, ConfigError> {
        let raw = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;

        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;

        validate_schema(&value)?;

        serde_json::from_value(value).map_err(|e| ConfigError::SchemaInvalid(e.to_string()))
    }

    /// Rename the live file aside with a timestamp suffix, preserving it
    /// for diagnosis.
    fn quarantine_live_file(&self) {
        if !self.config_path.exists() {
            return;
        }
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let backup = Utf8PathBuf::from(format!("{}.{epoch_ms}.bak", self.config_path));
        match fs::rename(&self.config_path, &backup) {
            Ok(()) => {
                tracing::warn!("Quarantined invalid config to {backup}");
                self.metrics.record_config_quarantine();
            }
            Err(e) => tracing::error!("Failed to quarantine config: {e}"),
        }
    }

    /// Persist `config` atomically: sibling temp file, flush + fsync, rename
    /// over the live file. A crash mid-write never leaves a truncated live
    /// file; on any step failure the temp file is removed and the live file
    /// is untouched.
    pub fn write(&self, config: &Config) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(config)
            .map_err(|e| ConfigError::WriteFailed(e.to_string()))?;

        let temp_path = Utf8PathBuf::from(format!("{}.tmp", self.config_path));
        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(temp_path.as_std_path())?;
            file.write_all(&data)?;
            file.sync_all()?;
            drop(file);
            fs::rename(temp_path.as_std_path(), self.config_path.as_std_path())
        })();

        match result {
            Ok(()) => {
                self.record_live_mtime();
                tracing::info!("Config saved atomically to {}", self.config_path);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(temp_path.as_std_path());
                Err(ConfigError::WriteFailed(e.to_string()))
            }
        }
    }

    /// Merge a partial update over the current snapshot, validate, persist,
    /// and install. The live file and the snapshot are untouched on failure.
    pub fn apply_patch(&self, patch: &ConfigPatch) -> Result<Arc<Config>, ConfigError> {
        let candidate = patch.apply_to(&self.current());
        validate_config(&candidate)?;
        self.write(&candidate)?;
        Ok(self.install(candidate))
    }

    /// Migrate + normalize `config`, rebuild the allow-list, swap the
    /// snapshot, and notify observers.
    fn install(&self, config: Config) -> Arc<Config> {
        let mut config = migrate(config);
        normalize_actions(&mut config.actions);

        let allowed = AllowedPathSet::from_actions(&config.actions);
        let snapshot = Arc::new(config);

        *self.allowed.write().unwrap() = allowed;
        *self.current.write().unwrap() = Arc::clone(&snapshot);
        let _ = self.events.send(ConfigEvent::Updated(Arc::clone(&snapshot)));

        snapshot
    }

    fn record_live_mtime(&self) {
        let mtime = fs::metadata(self.config_path.as_std_path())
            .and_then(|m| m.modified())
            .ok();
        *self.last_modified.lock().unwrap() = mtime;
    }

    /// Watch the live file for external edits, reloading (and renormalizing)
    /// when its mtime changes. Self-writes update the recorded mtime and do
    /// not trigger a reload.
    pub fn spawn_watcher(&self, poll_interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;

                let on_disk = fs::metadata(store.config_path.as_std_path())
                    .and_then(|m| m.modified())
                    .ok();
                let recorded = *store.last_modified.lock().unwrap();
                if on_disk == recorded {
                    continue;
                }

                tracing::info!("External edit detected on {}, reloading", store.config_path);
                if let Err(e) = store.load() {
                    tracing::error!("Config reload failed: {e:#}");
                }
            }
        })
    }
}

/// Structural schema checks on the raw JSON, before typed deserialization.
///
/// `radius` (numeric, >= 50) and `actions` (array) are required; the other
/// radii must respect the minimum when present.
fn validate_schema(value: &serde_json::Value) -> Result<(), ConfigError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ConfigError::SchemaInvalid("config root must be an object".into()))?;

    let radius = obj
        .get("radius")
        .ok_or_else(|| ConfigError::SchemaInvalid("missing required field 'radius'".into()))?
        .as_f64()
        .ok_or_else(|| ConfigError::SchemaInvalid("'radius' must be a number".into()))?;
    if radius < MIN_RADIUS {
        return Err(ConfigError::SchemaInvalid(format!(
            "'radius' must be >= {MIN_RADIUS}, got {radius}"
        )));
    }

    for field in ["primaryRadius", "groupRadius"] {
        if let Some(v) = obj.get(field) {
            let n = v.as_f64().ok_or_else(|| {
                ConfigError::SchemaInvalid(format!("'{field}' must be a number"))
            })?;
            if n < MIN_RADIUS {
                return Err(ConfigError::SchemaInvalid(format!(
                    "'{field}' must be >= {MIN_RADIUS}, got {n}"
                )));
            }
        }
    }

    if !obj
        .get("actions")
        .ok_or_else(|| ConfigError::SchemaInvalid("missing required field 'actions'".into()))?
        .is_array()
    {
        return Err(ConfigError::SchemaInvalid("'actions' must be an array".into()));
    }

    Ok(())
}

/// Semantic validation of an already-typed config (the patch path).
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    for (name, value) in [
        ("radius", config.radius),
        ("primaryRadius", config.primary_radius),
        ("groupRadius", config.group_radius),
    ] {
        if value < MIN_RADIUS {
            return Err(ConfigError::SchemaInvalid(format!(
                "'{name}' must be >= {MIN_RADIUS}, got {value}"
            )));
        }
    }
    Ok(())
}

/// Stamp the baseline version onto configs that predate `appVersion`.
/// Treated as an implicit upgrade, not an error.
fn migrate(mut config: Config) -> Config {
    if config.app_version.is_none() {
        tracing::info!("Migrating config to v{BASELINE_CONFIG_VERSION}");
        config.app_version = Some(BASELINE_CONFIG_VERSION.to_string());
    }
    config
}

/// Normalize a single node arriving from outside the store (e.g. an
/// `execute-action` intent, whose wire form never carries `resolved_path`).
/// The result is still subject to the allow-list; resolution alone
/// authorizes nothing.
pub fn normalize_action(node: &mut ActionNode) {
    normalize_actions(std::slice::from_mut(node));
}

/// Attach `resolved_path` to every node whose command is a real filesystem
/// target, recursing into groups. Resolution failure is logged and leaves
/// the node unexecutable, not fatal.
fn normalize_actions(actions: &mut [ActionNode]) {
    for node in actions.iter_mut() {
        node.resolved_path = node.launch_target().and_then(|target| {
            if target == AUTO_DETECT_SENTINEL || target.starts_with(UI_COMMAND_PREFIX) {
                return None;
            }
            resolve_path(target, &node.label)
        });

        if let ActionKind::Group { children } = &mut node.kind {
            normalize_actions(children);
        }
    }
}

fn resolve_path(target: &str, label: &str) -> Option<Utf8PathBuf> {
    match std::path::absolute(target) {
        Ok(abs) => match Utf8PathBuf::from_path_buf(abs) {
            Ok(path) => Some(path),
            Err(_) => {
                tracing::warn!("Resolved path for action '{label}' is not valid UTF-8");
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to resolve path for action '{label}': {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (ConfigStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let store = ConfigStore::new(&dir, Arc::new(Metrics::new())).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_missing_file_creates_defaults() {
        let (store, _tmp) = create_test_store();
        let config = store.load().unwrap();

        assert_eq!(*config, {
            let mut expected = Config::bundled_default();
            // The installed snapshot has been through normalization; the
            // bundled default contains no resolvable paths so the trees match.
            normalize_actions(&mut expected.actions);
            expected
        });
        assert!(store.config_path().exists());
    }

    #[test]
    fn test_malformed_json_is_quarantined() {
        let (store, _tmp) = create_test_store();
        fs::write(store.config_path(), "{not json at all").unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.radius, Config::bundled_default().radius);

        let backups: Vec<_> = fs::read_dir(store.config_dir().as_std_path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_radius_below_minimum_is_quarantined() {
        let (store, _tmp) = create_test_store();
        fs::write(
            store.config_path(),
            r#"{"radius": 10, "actions": []}"#,
        )
        .unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.radius, Config::bundled_default().radius);
        assert!(
            fs::read_dir(store.config_dir().as_std_path())
                .unwrap()
                .filter_map(|e| e.ok())
                .any(|e| e.file_name().to_string_lossy().ends_with(".bak"))
        );
    }

    #[test]
    fn test_missing_actions_is_schema_invalid() {
        let (store, _tmp) = create_test_store();
        fs::write(store.config_path(), r#"{"radius": 120}"#).unwrap();

        let err = store.read_validated().unwrap_err();
        assert!(matches!(err, ConfigError::SchemaInvalid(_)));
    }

    #[test]
    fn test_unknown_top_level_field_is_schema_invalid() {
        let (store, _tmp) = create_test_store();
        fs::write(
            store.config_path(),
            r#"{"radius": 120, "actions": [], "telemetryUrl": "http://x"}"#,
        )
        .unwrap();

        let err = store.read_validated().unwrap_err();
        assert!(matches!(err, ConfigError::SchemaInvalid(_)));
    }

    #[test]
    fn test_migration_stamps_missing_version() {
        let (store, _tmp) = create_test_store();
        fs::write(
            store.config_path(),
            r#"{"radius": 120, "actions": []}"#,
        )
        .unwrap();
        // Schema-valid (radius + actions present) but version-less.
        let config = store.load().unwrap();
        assert_eq!(config.app_version.as_deref(), Some(BASELINE_CONFIG_VERSION));
    }

    #[test]
    fn test_normalize_resolves_paths_and_skips_sentinels() {
        let (store, tmp) = create_test_store();
        let target = tmp.path().join("tool.exe");
        fs::write(&target, b"x").unwrap();

        let json = format!(
            r#"{{
                "radius": 120,
                "actions": [
                    {{"label": "Tool", "type": "custom", "path": "{}"}},
                    {{"label": "Terminal", "type": "custom", "path": "auto-detect"}},
                    {{"label": "Palette", "type": "rawCommand", "command": "ui:palette"}},
                    {{"label": "Group", "type": "group", "children": [
                        {{"label": "Nested", "type": "rawCommand", "command": "{}"}}
                    ]}}
                ]
            }}"#,
            target.display(),
            target.display()
        );
        fs::write(store.config_path(), json).unwrap();

        let config = store.load().unwrap();
        assert!(config.actions[0].resolved_path.is_some());
        assert!(config.actions[1].resolved_path.is_none()); // auto-detect
        assert!(config.actions[2].resolved_path.is_none()); // ui: namespace
        if let ActionKind::Group { children } = &config.actions[3].kind {
            assert!(children[0].resolved_path.is_some());
        } else {
            panic!("expected group");
        }

        let allowed = store.allowed_paths();
        assert_eq!(allowed.len(), 1); // both resolve to the same path
        let resolved = config.actions[0].resolved_path.as_ref().unwrap();
        assert!(allowed.contains(resolved));
    }

    #[test]
    fn test_atomic_write_survives_stale_temp_file() {
        let (store, _tmp) = create_test_store();
        let committed = store.load().unwrap();

        // Simulate a crash that died after writing the temp file but before
        // the rename: the live file must still round-trip.
        let temp_path = format!("{}.tmp", store.config_path());
        fs::write(&temp_path, "garbage from a dying process").unwrap();

        let reread = store.read_validated().unwrap();
        assert_eq!(reread.radius, committed.radius);
        assert_eq!(reread.actions.len(), committed.actions.len());
    }

    #[test]
    fn test_write_failure_preserves_live_file() {
        let (store, _tmp) = create_test_store();
        store.load().unwrap();
        let before = fs::read_to_string(store.config_path()).unwrap();

        // Occupy the temp path with a directory so creating the temp file
        // fails. Permission tricks don't work when tests run as root; this
        // injection does.
        let temp_path = format!("{}.tmp", store.config_path());
        fs::create_dir(&temp_path).unwrap();

        let err = store.write(&Config::bundled_default()).unwrap_err();
        assert!(matches!(err, ConfigError::WriteFailed(_)));
        assert_eq!(fs::read_to_string(store.config_path()).unwrap(), before);

        // With the obstruction gone, the same write goes through and the
        // temp file is cleaned up by the rename.
        fs::remove_dir(&temp_path).unwrap();
        store.write(&Config::bundled_default()).unwrap();
        assert!(!std::path::Path::new(&temp_path).exists());
    }

    #[test]
    fn test_apply_patch_persists_and_rebuilds() {
        let (store, tmp) = create_test_store();
        store.load().unwrap();

        let target = tmp.path().join("newtool.exe");
        fs::write(&target, b"x").unwrap();

        let patch = ConfigPatch {
            radius: Some(210.0),
            actions: Some(vec![ActionNode::new(
                "New Tool",
                ActionKind::Custom {
                    path: target.display().to_string(),
                    args: Vec::new(),
                },
            )]),
            ..ConfigPatch::default()
        };

        let updated = store.apply_patch(&patch).unwrap();
        assert_eq!(updated.radius, 210.0);
        assert_eq!(store.allowed_paths().len(), 1);

        // Persisted: a fresh read from disk sees the patch.
        let reread = store.read_validated().unwrap();
        assert_eq!(reread.radius, 210.0);
    }

    #[test]
    fn test_apply_patch_rejects_invalid_radius() {
        let (store, _tmp) = create_test_store();
        let committed = store.load().unwrap();

        let patch = ConfigPatch {
            radius: Some(10.0),
            ..ConfigPatch::default()
        };
        let err = store.apply_patch(&patch).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaInvalid(_)));

        // Snapshot and live file untouched.
        assert_eq!(store.current().radius, committed.radius);
        assert_eq!(store.read_validated().unwrap().radius, committed.radius);
    }

    #[test]
    fn test_round_trip_preserves_action_tree() {
        let (store, _tmp) = create_test_store();
        let loaded = store.load().unwrap();

        // Serialize the normalized config and reparse: the actions tree is
        // structurally identical (resolved_path is derived, never persisted).
        let serialized = serde_json::to_string(&*loaded).unwrap();
        let reparsed: Config = serde_json::from_str(&serialized).unwrap();

        let strip = |actions: &[ActionNode]| -> Vec<ActionNode> {
            fn clear(node: &ActionNode) -> ActionNode {
                let mut node = node.clone();
                node.resolved_path = None;
                if let ActionKind::Group { children } = &mut node.kind {
                    *children = children.iter().map(clear).collect();
                }
                node
            }
            actions.iter().map(clear).collect()
        };

        assert_eq!(strip(&loaded.actions), strip(&reparsed.actions));
    }

    #[tokio::test]
    async fn test_subscribe_sees_installed_snapshot() {
        let (store, _tmp) = create_test_store();
        store.load().unwrap();
        let mut rx = store.subscribe();

        let patch = ConfigPatch {
            dev_mode: Some(true),
            ..ConfigPatch::default()
        };
        store.apply_patch(&patch).unwrap();

        let ConfigEvent::Updated(snapshot) = rx.try_recv().unwrap();
        assert!(snapshot.dev_mode);
    }

    #[test]
    fn test_themes_come_from_registry() {
        let (store, _tmp) = create_test_store();
        let themes = store.themes();
        assert_eq!(themes.len(), 3);
        assert_eq!(themes[0].name, "Dark Neon");
    }
}
