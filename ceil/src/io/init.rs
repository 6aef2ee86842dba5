//! Scaffolding for `.ceil/` under a project root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{CeilConfig, config_path, write_config};
use super::session_log::sessions_dir;

/// Canonical paths within `.ceil/` for a project root.
#[derive(Debug, Clone)]
pub struct CeilPaths {
    pub root: PathBuf,
    pub ceil_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
}

impl CeilPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let ceil_dir = root.join(".ceil");
        Self {
            sessions_dir: sessions_dir(&root),
            gitignore_path: ceil_dir.join(".gitignore"),
            config_path: config_path(&root),
            ceil_dir,
            root,
        }
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config with defaults.
    pub force: bool,
}

/// Create `.ceil/` with a default config in `root`.
///
/// Fails if the config already exists unless `options.force` is set.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<CeilPaths> {
    let paths = CeilPaths::new(root);
    if paths.ceil_dir.exists() && !paths.ceil_dir.is_dir() {
        return Err(anyhow!("ceil init: .ceil exists but is not a directory"));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "ceil init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    fs::create_dir_all(&paths.sessions_dir)
        .with_context(|| format!("create directory {}", paths.sessions_dir.display()))?;
    fs::write(&paths.gitignore_path, CEIL_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &CeilConfig::default())?;

    Ok(paths)
}

const CEIL_GITIGNORE: &str = "sessions/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.ceil_dir.is_dir());
        assert!(paths.sessions_dir.is_dir());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            CEIL_GITIGNORE
        );
        let cfg = load_config(&paths.config_path).expect("load");
        assert_eq!(cfg, CeilConfig::default());
    }

    #[test]
    fn init_without_force_refuses_existing_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_project(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_project(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_restores_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.config_path, "max_attempts = 7\n").expect("write custom");

        init_project(temp.path(), &InitOptions { force: true }).expect("re-init");

        let cfg = load_config(&paths.config_path).expect("load");
        assert_eq!(cfg.max_attempts, 3);
    }
}
