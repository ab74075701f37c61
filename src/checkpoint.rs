//! Session checkpoint for resumable runs
//!
//! Stores the run id, stage flags, spec revisions and hashes of every
//! artifact the run produced in `.qaflow/session.json`. A missing
//! checkpoint is rebuilt from the artifacts present on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::contexts::{
    read_artifact, write_atomic, SpecStore, SuggestionSection, COMBINED_SCRIPT_FILE,
    REPORT_JSON_FILE, SCRIPTS_FILE, TEST_CASES_DRAFT_FILE, TEST_CASES_FILE,
};
use crate::data::{Action, PipelineState, SpecKind, SpecLineage, Stage};
use crate::error::StoreError;

pub const CHECKPOINT_DIR: &str = ".qaflow";
pub const CHECKPOINT_FILE: &str = "session.json";

/// Hash record of one artifact written by the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTrack {
    pub path: PathBuf,
    pub sha256: String,
    pub recorded_at: DateTime<Utc>,
}

/// Last stage-producing action that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub action: Action,
    pub cause: String,
    pub at: DateTime<Utc>,
}

/// Everything needed to resume a run in a new process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub state: PipelineState,
    #[serde(default)]
    pub spec: SpecLineage,
    #[serde(default)]
    pub approved_snapshot: Option<PathBuf>,
    #[serde(default)]
    pub suggestions: Vec<SuggestionSection>,
    #[serde(default)]
    pub show_suggestions: bool,
    #[serde(default)]
    pub last_failure: Option<FailureRecord>,
    /// Maps: artifact file name -> ArtifactTrack
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactTrack>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh run with a new id and no progress
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: PipelineState::new(),
            spec: SpecLineage::default(),
            approved_snapshot: None,
            suggestions: Vec::new(),
            show_suggestions: false,
            last_failure: None,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn checkpoint_path(root: &Path) -> PathBuf {
        root.join(CHECKPOINT_DIR).join(CHECKPOINT_FILE)
    }

    /// Loads the checkpoint under `store`'s root, or derives one from the
    /// artifacts on disk. Either way the flags are cut back to the longest
    /// prefix whose artifacts still exist.
    pub fn open(store: &SpecStore) -> Result<Self, StoreError> {
        let path = Self::checkpoint_path(store.root());
        if !path.exists() {
            return Self::derive(store);
        }

        let mut session = Self::read(&path)?;
        let before = session.state.clone();
        let snapshot = session.approved_snapshot.clone();
        session.state.retain_prefix(|stage| match stage {
            Stage::SpecApproved => snapshot.as_deref().is_some_and(Path::is_file),
            other => stage_file(other).is_some_and(|name| store.artifact_path(name).is_file()),
        });
        if session.state != before {
            warn!(
                run_id = %session.run_id,
                "artifacts missing on disk; checkpoint rolled back to {:?}",
                session.state.frontier()
            );
        }
        debug!(run_id = %session.run_id, frontier = ?session.state.frontier(), "opened checkpoint");
        Ok(session)
    }

    /// Rebuilds a session from artifact presence alone.
    pub fn derive(store: &SpecStore) -> Result<Self, StoreError> {
        let mut session = Self::new();
        let latest_snapshot = store.snapshots(SpecKind::Unified)?.pop();

        let mut flags = [false; crate::data::STAGE_COUNT];
        for stage in Stage::ALL {
            flags[stage.index()] = match stage {
                Stage::SpecApproved => latest_snapshot.is_some(),
                other => stage_file(other).is_some_and(|name| store.artifact_path(name).is_file()),
            };
        }
        session.state = PipelineState::from_flags(flags);

        if session.state.is_complete(Stage::SpecGenerated) {
            session.spec = SpecLineage::start(store.load(SpecKind::Unified)?);
        }
        if session.state.is_complete(Stage::SpecApproved) {
            session.spec.approve();
            session.approved_snapshot = latest_snapshot;
        }

        for stage in session.state.completed().collect::<Vec<_>>() {
            let path = match stage {
                Stage::SpecApproved => session.approved_snapshot.clone(),
                other => stage_file(other).map(|name| store.artifact_path(name)),
            };
            if let Some(path) = path {
                session.track(&path)?;
            }
        }

        if session.state.frontier().is_some() {
            info!(
                frontier = ?session.state.frontier(),
                "no checkpoint found; resumed from artifacts on disk"
            );
        }
        Ok(session)
    }

    fn read(path: &Path) -> Result<Self, StoreError> {
        let content = read_artifact(path)?;
        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Run id currently committed on disk, if any
    pub fn stored_run_id(root: &Path) -> Result<Option<Uuid>, StoreError> {
        let path = Self::checkpoint_path(root);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read(&path)?.run_id))
    }

    /// Write the checkpoint atomically
    pub fn save(&self, root: &Path) -> Result<(), StoreError> {
        let path = Self::checkpoint_path(root);
        let content = serde_json::to_string_pretty(self).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, content.as_bytes())
    }

    /// Record the current hash of an artifact
    pub fn track(&mut self, path: &Path) -> Result<(), StoreError> {
        let sha256 = hash_file(path)?;
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.artifacts.insert(
            key,
            ArtifactTrack {
                path: path.to_path_buf(),
                sha256,
                recorded_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Whether a tracked artifact still has the hash recorded for it
    pub fn is_unchanged(&self, path: &Path) -> Result<bool, StoreError> {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(false);
        };
        let Some(track) = self.artifacts.get(&name) else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }
        Ok(hash_file(path)? == track.sha256)
    }
}

/// Artifact whose presence proves a stage completed. Spec approval is proven
/// by a snapshot instead.
pub fn stage_file(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::SpecGenerated => Some(SpecKind::Unified.file_name()),
        Stage::SpecApproved => None,
        Stage::TestCasesGenerated => Some(TEST_CASES_DRAFT_FILE),
        Stage::TestCasesApproved => Some(TEST_CASES_FILE),
        Stage::ScriptsGenerated => Some(SCRIPTS_FILE),
        Stage::ScriptsCombined => Some(COMBINED_SCRIPT_FILE),
        Stage::ExecutionComplete => Some(REPORT_JSON_FILE),
    }
}

/// Compute SHA256 hash of a file
pub fn hash_file(path: &Path) -> Result<String, StoreError> {
    let content = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(store: &SpecStore, name: &str) {
        fs::write(store.artifact_path(name), "x").unwrap();
    }

    #[test]
    fn empty_workspace_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(&SpecStore::new(dir.path())).unwrap();
        assert_eq!(session.state.frontier(), None);
        assert!(session.spec.is_empty());
    }

    #[test]
    fn derives_prefix_from_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::new(dir.path());
        store.save(SpecKind::Unified, "# API").unwrap();
        store.snapshot(SpecKind::Unified, "# API").unwrap();
        touch(&store, TEST_CASES_DRAFT_FILE);
        // Gap: no approved table, so later artifacts do not count.
        touch(&store, SCRIPTS_FILE);

        let session = Session::open(&store).unwrap();

        assert_eq!(session.state.frontier(), Some(Stage::TestCasesGenerated));
        assert!(session.spec.is_approved());
        assert_eq!(session.spec.current().unwrap().content, "# API");
        assert!(session.artifacts.contains_key(TEST_CASES_DRAFT_FILE));
        assert!(!session.artifacts.contains_key(SCRIPTS_FILE));
    }

    #[test]
    fn checkpoint_round_trip_and_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::new(dir.path());
        let spec_path = store.save(SpecKind::Unified, "# API").unwrap();
        let snapshot = store.snapshot(SpecKind::Unified, "# API").unwrap();
        touch(&store, TEST_CASES_DRAFT_FILE);

        let mut session = Session::new();
        session.state.mark_complete(Stage::SpecGenerated).unwrap();
        session.state.mark_complete(Stage::SpecApproved).unwrap();
        session.state.mark_complete(Stage::TestCasesGenerated).unwrap();
        session.approved_snapshot = Some(snapshot);
        session.track(&spec_path).unwrap();
        session.save(dir.path()).unwrap();

        let reopened = Session::open(&store).unwrap();
        assert_eq!(reopened.run_id, session.run_id);
        assert_eq!(reopened.state, session.state);
        assert!(reopened.is_unchanged(&spec_path).unwrap());

        fs::remove_file(store.artifact_path(TEST_CASES_DRAFT_FILE)).unwrap();
        let rolled_back = Session::open(&store).unwrap();
        assert_eq!(rolled_back.state.frontier(), Some(Stage::SpecApproved));
    }

    #[test]
    fn fresh_checkpoint_ignores_old_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::new(dir.path());
        store.save(SpecKind::Unified, "# old run").unwrap();

        let reset = Session::new();
        reset.save(dir.path()).unwrap();

        let reopened = Session::open(&store).unwrap();
        assert_eq!(reopened.state.frontier(), None);
        assert_eq!(Session::stored_run_id(dir.path()).unwrap(), Some(reset.run_id));
    }

    #[test]
    fn hash_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COMBINED_SCRIPT_FILE);
        fs::write(&path, "a").unwrap();
        let mut session = Session::new();
        session.track(&path).unwrap();
        assert!(session.is_unchanged(&path).unwrap());

        fs::write(&path, "b").unwrap();
        assert!(!session.is_unchanged(&path).unwrap());
    }
}
