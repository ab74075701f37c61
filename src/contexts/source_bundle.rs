use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;

/// File extensions treated as API source or configuration.
const SOURCE_EXTENSIONS: &[&str] = &[
    "cs", "csproj", "py", "js", "ts", "go", "java", "kt", "rb", "php", "rs", "sql", "json",
    "yaml", "yml", "toml", "xml", "config", "proto", "graphql",
];

/// Build and dependency folders that never hold hand-written source.
const SKIPPED_DIRS: &[&str] = &["bin", "obj", "target", "node_modules", "__pycache__", "dist"];

/// Concatenated API sources used to seed spec generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBundle {
    pub text: String,
    pub files: Vec<PathBuf>,
    /// True when files were left out to stay under the byte budget.
    pub truncated: bool,
}

impl SourceBundle {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Walks `root` in sorted order and joins every source file as a
/// `# ===== relative/path =====` block. Files that would push the bundle
/// past `max_bytes` are left out; smaller ones after them still fit.
pub fn collect_sources(root: &Path, max_bytes: usize) -> Result<SourceBundle, StoreError> {
    if !root.is_dir() {
        return Err(StoreError::NotFound(root.to_path_buf()));
    }

    let mut paths = Vec::new();
    scan_directory(root, &mut paths)?;
    paths.sort();

    let mut bundle = SourceBundle::default();
    for path in paths {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable source file");
                continue;
            }
        };

        let relative = path.strip_prefix(root).unwrap_or(&path);
        let block = format!(
            "\n# ===== {} =====\n{}\n",
            relative.display().to_string().replace('\\', "/"),
            content
        );
        if bundle.text.len() + block.len() > max_bytes {
            bundle.truncated = true;
            warn!(
                path = %relative.display(),
                max_bytes,
                "source file left out to stay under the byte budget"
            );
            continue;
        }
        bundle.text.push_str(&block);
        bundle.files.push(relative.to_path_buf());
    }

    debug!(
        files = bundle.files.len(),
        bytes = bundle.text.len(),
        "collected API sources"
    );
    Ok(bundle)
}

fn scan_directory(current_dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    let entries = fs::read_dir(current_dir).map_err(|e| StoreError::io(current_dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(current_dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        // Does not follow symlinks, so linked directories are never entered.
        let file_type = entry.file_type().map_err(|e| StoreError::io(&path, e))?;

        if file_type.is_dir() {
            if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            scan_directory(&path, found)?;
        } else if is_source_file(&path) && path.is_file() {
            found.push(path);
        }
    }

    Ok(())
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
