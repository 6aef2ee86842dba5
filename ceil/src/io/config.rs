//! CEIL configuration stored under `.ceil/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::retry::DEFAULT_MAX_ATTEMPTS;

/// CEIL configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields fall back to
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CeilConfig {
    /// Generation attempts per request, including the first.
    pub max_attempts: u32,

    /// Wall-clock cap for each `RUN` subprocess.
    pub run_timeout_secs: u64,

    /// Wall-clock cap for each generator invocation.
    pub generator_timeout_secs: u64,

    /// Base delay before retrying a failed generator call. The n-th retry
    /// waits n times this long; 0 retries immediately.
    pub generator_retry_delay_secs: u64,

    /// Keep at most this many bytes of each subprocess stream.
    pub output_limit_bytes: usize,

    /// Write per-attempt artifacts under `.ceil/sessions/`.
    pub session_log: bool,

    pub generator: GeneratorConfig,

    /// Script extension (without the dot) to interpreter argv.
    pub interpreters: BTreeMap<String, Vec<String>>,

    pub context: ContextConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and prints CEIL on stdout.
    pub command: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
        }
    }
}

/// Limits for the project snapshot embedded in prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    /// Files larger than this are listed but not inlined.
    pub max_file_bytes: u64,
    /// Stop inlining file content once the snapshot reaches this size.
    pub max_context_bytes: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 50_000,
            max_context_bytes: 200_000,
        }
    }
}

impl Default for CeilConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            run_timeout_secs: 300,
            generator_timeout_secs: 600,
            generator_retry_delay_secs: 2,
            output_limit_bytes: 100_000,
            session_log: true,
            generator: GeneratorConfig::default(),
            interpreters: default_interpreters(),
            context: ContextConfig::default(),
        }
    }
}

fn default_interpreters() -> BTreeMap<String, Vec<String>> {
    [("py", "python3"), ("sh", "sh"), ("js", "node")]
        .into_iter()
        .map(|(ext, program)| (ext.to_string(), vec![program.to_string()]))
        .collect()
}

impl CeilConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.run_timeout_secs == 0 {
            return Err(anyhow!("run_timeout_secs must be > 0"));
        }
        if self.generator_timeout_secs == 0 {
            return Err(anyhow!("generator_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        for (ext, argv) in &self.interpreters {
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err(anyhow!("interpreters.{ext} must be a non-empty array"));
            }
        }
        if self.context.max_context_bytes == 0 {
            return Err(anyhow!("context.max_context_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }

    pub fn generator_retry_delay(&self) -> Duration {
        Duration::from_secs(self.generator_retry_delay_secs)
    }

    /// Interpreter argv registered for `extension`, if any.
    pub fn interpreter_for(&self, extension: &str) -> Option<&[String]> {
        self.interpreters
            .get(&extension.to_ascii_lowercase())
            .map(Vec::as_slice)
    }
}

/// Location of the config file under a project root.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(".ceil").join("config.toml")
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CeilConfig::default()`.
pub fn load_config(path: &Path) -> Result<CeilConfig> {
    if !path.exists() {
        let cfg = CeilConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CeilConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CeilConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, CeilConfig::default());
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.generator_retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".ceil/config.toml");
        let cfg = CeilConfig {
            max_attempts: 5,
            session_log: false,
            ..CeilConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "run_timeout_secs = 5\n[interpreters]\nrb = [\"ruby\"]\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.run_timeout_secs, 5);
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.interpreter_for("rb"), Some(&["ruby".to_string()][..]));
        assert_eq!(cfg.interpreter_for("py"), None);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_attempts = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn default_interpreters_cover_common_scripts() {
        let cfg = CeilConfig::default();
        assert_eq!(cfg.interpreter_for("PY"), Some(&["python3".to_string()][..]));
        assert_eq!(cfg.interpreter_for("sh"), Some(&["sh".to_string()][..]));
        assert_eq!(cfg.interpreter_for("exe"), None);
    }
}
