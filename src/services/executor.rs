use crate::config::AllowedPathSet;
use crate::metrics::Metrics;
use crate::models::ActionNode;
use camino::{Utf8Path, Utf8PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use thiserror::Error;

/// File extensions the executor will ever launch. A closed set, not
/// user-extensible: executable/shortcut/batch types only.
const ALLOWED_EXTENSIONS: [&str; 4] = ["exe", "bat", "cmd", "lnk"];

/// Errors from a refused or failed launch.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("blocked execution of unauthorized file type: .{0}")]
    UnauthorizedType(String),

    #[error("file not found at {0}")]
    NotFound(Utf8PathBuf),

    #[error("path is not present in the configured allow-list: {0}")]
    NotAllowlisted(Utf8PathBuf),

    #[error("action '{0}' has no resolved path")]
    Unresolved(String),

    #[error("failed to launch {path}: {source}")]
    LaunchFailed {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

/// Launches vetted user actions, fire-and-forget.
///
/// Authorization is a chain of three checks, all of which must pass:
/// extension in the closed allow-list, file present on disk, and path a
/// member of the current [`AllowedPathSet`]. The allow-list check blocks
/// execution outright: nothing that is not explicitly present in the user's
/// own configuration is ever launched.
///
/// Launched processes are fully detached. No handle is retained, stdio is
/// discarded, and completion/exit codes are never tracked; the user model is
/// "launch and dismiss the overlay".
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    metrics: Arc<Metrics>,
}

impl ActionExecutor {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    /// Execute the program behind an action node.
    pub fn execute_node(
        &self,
        node: &ActionNode,
        allowed: &AllowedPathSet,
    ) -> Result<(), ExecutionError> {
        let path = node
            .resolved_path
            .as_deref()
            .ok_or_else(|| ExecutionError::Unresolved(node.label.clone()))?;
        self.execute(path, allowed)
    }

    /// Execute a resolved absolute path after vetting it.
    ///
    /// # Errors
    ///
    /// Fails without launching anything when the extension is outside the
    /// closed set, the file is absent, or the path is not allow-listed.
    pub fn execute(
        &self,
        path: &Utf8Path,
        allowed: &AllowedPathSet,
    ) -> Result<(), ExecutionError> {
        let ext = path
            .extension()
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            self.metrics.record_action_refused();
            return Err(ExecutionError::UnauthorizedType(ext));
        }

        if !path.exists() {
            self.metrics.record_action_refused();
            return Err(ExecutionError::NotFound(path.to_path_buf()));
        }

        if !allowed.contains(path) {
            tracing::error!(
                "Security alert: refused execution of path absent from allow-list: {path}"
            );
            self.metrics.record_action_refused();
            return Err(ExecutionError::NotAllowlisted(path.to_path_buf()));
        }

        tracing::info!("Executing: {path}");

        let child = Command::new(path.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExecutionError::LaunchFailed {
                path: path.to_path_buf(),
                source,
            })?;

        // Fire-and-forget: dropping the handle detaches the child from our
        // lifetime. It is never waited on.
        drop(child);

        self.metrics.record_action_launched();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn executor() -> ActionExecutor {
        ActionExecutor::new(Arc::new(Metrics::new()))
    }

    #[test]
    fn test_rejects_unauthorized_extension() {
        let err = executor()
            .execute(Utf8Path::new("/tmp/evil.sh"), &AllowedPathSet::default())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnauthorizedType(ext) if ext == "sh"));
    }

    #[test]
    fn test_rejects_missing_extension() {
        let err = executor()
            .execute(Utf8Path::new("/tmp/noext"), &AllowedPathSet::default())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnauthorizedType(_)));
    }

    #[test]
    fn test_rejects_missing_file() {
        let path = Utf8Path::new("/tmp/definitely-not-here-12345.exe");
        let mut allowed = AllowedPathSet::default();
        allowed.insert(path.to_path_buf());

        let err = executor().execute(path, &allowed).unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound(_)));
    }

    #[test]
    fn test_blocks_path_outside_allow_list() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("present.exe");
        std::fs::write(&target, b"x").unwrap();
        let path = Utf8PathBuf::try_from(target).unwrap();

        // File exists with a legal extension, but the allow-list is empty:
        // execution must be refused, not merely logged.
        let err = executor()
            .execute(&path, &AllowedPathSet::default())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NotAllowlisted(_)));
    }

    #[test]
    fn test_unresolved_node_is_refused() {
        let node = ActionNode::new(
            "Ghost",
            crate::models::ActionKind::Custom {
                path: "ghost.exe".to_string(),
                args: Vec::new(),
            },
        );
        let err = executor()
            .execute_node(&node, &AllowedPathSet::default())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Unresolved(label) if label == "Ghost"));
    }

    #[cfg(unix)]
    #[test]
    fn test_launches_allow_listed_target_detached() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("ok.cmd");
        std::fs::write(&target, "#!/bin/sh\nexit 0\n").unwrap();
        let mut perms = std::fs::metadata(&target).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&target, perms).unwrap();

        let path = Utf8PathBuf::try_from(target).unwrap();
        let mut allowed = AllowedPathSet::default();
        allowed.insert(path.clone());

        executor().execute(&path, &allowed).unwrap();
    }
}
