use chrono::Local;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::data::SpecKind;
use crate::error::StoreError;

/// Folder holding timestamped approval snapshots.
pub const SNAPSHOT_DIR: &str = "api_specs";

pub const TEST_CASES_DRAFT_FILE: &str = "generated_test_cases.csv";
pub const TEST_CASES_FILE: &str = "my_test_cases.csv";
pub const SCRIPTS_FILE: &str = "k6_generated_scripts.csv";
pub const COMBINED_SCRIPT_FILE: &str = "merged_k6_test.js";
pub const REPORT_MARKDOWN_FILE: &str = "k6_run_report.md";
pub const REPORT_JSON_FILE: &str = "k6_run_report.json";

/// File-backed store for spec documents and the other stage artifacts.
///
/// Current documents live at well-known names under `root` and are replaced
/// atomically. Snapshots are never overwritten.
#[derive(Debug, Clone)]
pub struct SpecStore {
    root: PathBuf,
}

impl SpecStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, kind: SpecKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, kind: SpecKind) -> bool {
        self.path(kind).is_file()
    }

    /// Replaces the current document of `kind`.
    pub fn save(&self, kind: SpecKind, content: &str) -> Result<PathBuf, StoreError> {
        let path = self.path(kind);
        write_atomic(&path, content.as_bytes())?;
        debug!(kind = ?kind, path = %path.display(), "saved spec");
        Ok(path)
    }

    pub fn load(&self, kind: SpecKind) -> Result<String, StoreError> {
        read_artifact(&self.path(kind))
    }

    /// Writes a new `<slug>_<timestamp>.md` file under the snapshot folder.
    /// Adds a numeric suffix instead of overwriting when the name is taken.
    pub fn snapshot(&self, kind: SpecKind, content: &str) -> Result<PathBuf, StoreError> {
        let dir = self.root.join(SNAPSHOT_DIR);
        ensure_dir(&dir)?;

        let stem = format!("{}_{}", kind.slug(), Local::now().format("%Y%m%d_%H%M%S"));
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}.md", stem)
            } else {
                format!("{}_{}.md", stem, attempt)
            };
            let path = dir.join(name);
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(content.as_bytes())
                        .and_then(|_| file.sync_all())
                        .map_err(|e| StoreError::io(&path, e))?;
                    debug!(path = %path.display(), "wrote spec snapshot");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
    }

    /// Snapshot files of `kind`, oldest first.
    pub fn snapshots(&self, kind: SpecKind) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.root.join(SNAPSHOT_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}_", kind.slug());
        let mut found: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| StoreError::io(&dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "md")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect();
        found.sort();
        Ok(found)
    }
}

/// Creates `dir` and its parents. Existing directories are fine.
pub fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))
}

/// Write-to-temp then rename, so readers never see a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&temp_path, contents).map_err(|e| StoreError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StoreError::io(path, e)
    })
}

pub fn read_artifact(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
        _ => StoreError::io(path, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_overwrites_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::new(dir.path());

        let path = store.save(SpecKind::Unified, "first").unwrap();
        assert_eq!(path, dir.path().join("Unified_API_Spec.md"));
        store.save(SpecKind::Unified, "second").unwrap();

        assert_eq!(store.load(SpecKind::Unified).unwrap(), "second");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn load_missing_kind_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::new(dir.path());
        assert!(matches!(
            store.load(SpecKind::OpenApiYaml),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn snapshots_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::new(dir.path());

        let a = store.snapshot(SpecKind::Unified, "one").unwrap();
        let b = store.snapshot(SpecKind::Unified, "two").unwrap();

        assert_ne!(a, b);
        assert_eq!(fs::read_to_string(&a).unwrap(), "one");
        assert_eq!(fs::read_to_string(&b).unwrap(), "two");
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("api_spec_"));
        assert_eq!(store.snapshots(SpecKind::Unified).unwrap().len(), 2);
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
