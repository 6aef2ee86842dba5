//! Project snapshot embedded in generation prompts.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::io::config::ContextConfig;

const SKIPPED_DIRS: [&str; 9] = [
    ".git",
    ".ceil",
    "target",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    ".idea",
    ".vscode",
];

const BINARY_EXTENSIONS: [&str; 22] = [
    "png", "jpg", "jpeg", "gif", "ico", "webp", "pdf", "zip", "gz", "tar", "exe", "dll", "so",
    "dylib", "bin", "pyc", "woff", "woff2", "ttf", "mp3", "mp4", "sqlite",
];

/// One project file as seen by the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    /// `/`-separated path relative to the project root.
    pub path: String,
    /// `None` when the file was listed but not inlined.
    pub content: Option<String>,
}

/// Text files of a project, in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub files: Vec<SnapshotFile>,
    /// Inlining stopped because the context budget was reached.
    pub truncated: bool,
}

impl ProjectSnapshot {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            match &file.content {
                Some(content) => {
                    out.push_str(&format!("--- FILE: {} ---\n", file.path));
                    out.push_str(content);
                    if !content.ends_with('\n') {
                        out.push('\n');
                    }
                }
                None => out.push_str(&format!("--- FILE: {} (content omitted) ---\n", file.path)),
            }
        }
        if self.truncated {
            out.push_str("[context truncated]\n");
        }
        out
    }
}

/// Walk `root` and collect text files within the configured limits.
///
/// A missing root yields an empty snapshot.
pub fn project_snapshot(root: &Path, config: &ContextConfig) -> Result<ProjectSnapshot> {
    let mut snapshot = ProjectSnapshot::default();
    if !root.is_dir() {
        debug!(root = %root.display(), "no project directory to snapshot");
        return Ok(snapshot);
    }

    let mut used = 0usize;
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(err = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || is_binary(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
        let content = if snapshot.truncated || size > config.max_file_bytes {
            None
        } else {
            fs::read_to_string(entry.path()).ok()
        };
        let content = match content {
            Some(text) if used + text.len() > config.max_context_bytes => {
                snapshot.truncated = true;
                None
            }
            other => other,
        };
        used += content.as_ref().map_or(0, String::len);
        snapshot.files.push(SnapshotFile { path, content });
    }

    debug!(
        files = snapshot.files.len(),
        bytes = used,
        truncated = snapshot.truncated,
        "project snapshot collected"
    );
    Ok(snapshot)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn is_binary(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
