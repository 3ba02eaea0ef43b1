//! Persistence for the workflow record and stage artifacts.
//!
//! Only the engine writes through a `StateStore`. File writes are atomic so a
//! crash mid-write leaves the previous record intact.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

use shipwright_utils::atomic_write::{write_file_atomic, write_json_atomic};
use shipwright_utils::ShipwrightError;
use shipwright_utils::paths;

use crate::state::WorkflowState;

pub const STATE_FILE: &str = "workflow.json";
pub const SPEC_ARTIFACT: &str = "spec.md";
pub const FILES_ARTIFACT: &str = "files.json";

pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<WorkflowState>, ShipwrightError>;

    fn save(&self, state: &WorkflowState) -> Result<(), ShipwrightError>;

    /// Remove the workflow record. Artifacts stay.
    fn clear(&self) -> Result<bool, ShipwrightError>;

    fn write_artifact(&self, name: &str, contents: &str) -> Result<(), ShipwrightError>;

    fn read_artifact(&self, name: &str) -> Result<Option<String>, ShipwrightError>;

    /// Remove the workflow record and every artifact.
    fn clear_all(&self) -> Result<bool, ShipwrightError>;
}

#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_dir: Utf8PathBuf,
    artifacts_dir: Utf8PathBuf,
}

impl FileStateStore {
    pub fn new(state_dir: impl Into<Utf8PathBuf>, artifacts_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            artifacts_dir: artifacts_dir.into(),
        }
    }

    /// Store rooted at the resolved shipwright home.
    #[must_use]
    pub fn at_home() -> Self {
        Self::new(paths::state_dir(), paths::artifacts_dir())
    }

    #[must_use]
    pub fn state_path(&self) -> Utf8PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    #[must_use]
    pub fn artifacts_dir(&self) -> &Utf8Path {
        &self.artifacts_dir
    }

    fn artifact_path(&self, name: &str) -> Result<Utf8PathBuf, ShipwrightError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(ShipwrightError::storage(name, "invalid artifact name"));
        }
        Ok(self.artifacts_dir.join(name))
    }
}

fn remove_if_exists(path: &Utf8Path) -> Result<bool, ShipwrightError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ShipwrightError::storage(path, e)),
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<WorkflowState>, ShipwrightError> {
        let path = self.state_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ShipwrightError::storage(&path, e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| {
                ShipwrightError::storage(&path, format!("unreadable workflow state: {e}"))
            })
    }

    fn save(&self, state: &WorkflowState) -> Result<(), ShipwrightError> {
        let path = self.state_path();
        write_json_atomic(&path, state)
            .map_err(|e| ShipwrightError::storage(&path, format!("{e:#}")))?;
        debug!(
            path = %path,
            stage = state.current_stage.number(),
            status = %state.status,
            "Saved workflow state"
        );
        Ok(())
    }

    fn clear(&self) -> Result<bool, ShipwrightError> {
        remove_if_exists(&self.state_path())
    }

    fn write_artifact(&self, name: &str, contents: &str) -> Result<(), ShipwrightError> {
        let path = self.artifact_path(name)?;
        write_file_atomic(&path, contents)
            .map_err(|e| ShipwrightError::storage(&path, format!("{e:#}")))
    }

    fn read_artifact(&self, name: &str) -> Result<Option<String>, ShipwrightError> {
        let path = self.artifact_path(name)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ShipwrightError::storage(&path, e)),
        }
    }

    fn clear_all(&self) -> Result<bool, ShipwrightError> {
        let mut removed = self.clear()?;
        match std::fs::remove_dir_all(&self.artifacts_dir) {
            Ok(()) => removed = true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ShipwrightError::storage(&self.artifacts_dir, e)),
        }
        Ok(removed)
    }
}

/// In-memory store for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<WorkflowState>>,
    artifacts: Mutex<BTreeMap<String, String>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_state(state: Option<WorkflowState>) -> Self {
        Self {
            state: Mutex::new(state),
            artifacts: Mutex::default(),
        }
    }

    fn poisoned() -> ShipwrightError {
        ShipwrightError::storage("memory", "state store lock poisoned")
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<WorkflowState>, ShipwrightError> {
        Ok(self.state.lock().map_err(|_| Self::poisoned())?.clone())
    }

    fn save(&self, state: &WorkflowState) -> Result<(), ShipwrightError> {
        *self.state.lock().map_err(|_| Self::poisoned())? = Some(state.clone());
        Ok(())
    }

    fn clear(&self) -> Result<bool, ShipwrightError> {
        Ok(self.state.lock().map_err(|_| Self::poisoned())?.take().is_some())
    }

    fn write_artifact(&self, name: &str, contents: &str) -> Result<(), ShipwrightError> {
        self.artifacts
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn read_artifact(&self, name: &str) -> Result<Option<String>, ShipwrightError> {
        Ok(self
            .artifacts
            .lock()
            .map_err(|_| Self::poisoned())?
            .get(name)
            .cloned())
    }

    fn clear_all(&self) -> Result<bool, ShipwrightError> {
        let had_state = self.clear()?;
        let mut artifacts = self.artifacts.lock().map_err(|_| Self::poisoned())?;
        let had_artifacts = !artifacts.is_empty();
        artifacts.clear();
        Ok(had_state || had_artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RequirementsSource, WorkflowStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    fn file_store(dir: &TempDir) -> FileStateStore {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        FileStateStore::new(root.join("state"), root.join("artifacts"))
    }

    #[test]
    fn test_file_store_round_trip_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        assert_eq!(store.load().unwrap(), None);

        let mut state = WorkflowState::new(RequirementsSource::text("todo app"), Utc::now());
        state.status = WorkflowStatus::Failed;
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_corrupted_state_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        paths::ensure_dir_all(dir.path().join("state")).unwrap();
        std::fs::write(store.state_path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, ShipwrightError::Storage { .. }));
    }

    #[test]
    fn test_artifacts_survive_clear_but_not_clear_all() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        store.write_artifact(SPEC_ARTIFACT, "# Spec\n").unwrap();
        store
            .save(&WorkflowState::new(RequirementsSource::text("x"), Utc::now()))
            .unwrap();

        store.clear().unwrap();
        assert_eq!(
            store.read_artifact(SPEC_ARTIFACT).unwrap().as_deref(),
            Some("# Spec\n")
        );

        assert!(store.clear_all().unwrap());
        assert_eq!(store.read_artifact(SPEC_ARTIFACT).unwrap(), None);
    }

    #[test]
    fn test_artifact_names_cannot_escape() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        assert!(store.write_artifact("../state/workflow.json", "x").is_err());
        assert!(store.write_artifact("", "x").is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStateStore::new();
        let state = WorkflowState::new(RequirementsSource::issue("3"), Utc::now());
        store.save(&state).unwrap();
        store.write_artifact(FILES_ARTIFACT, "[]").unwrap();

        assert_eq!(store.load().unwrap(), Some(state));
        assert!(store.clear_all().unwrap());
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.read_artifact(FILES_ARTIFACT).unwrap(), None);
    }
}
