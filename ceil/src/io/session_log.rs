//! Session logging helpers for `.ceil/sessions/`.
//!
//! Each attempt gets its own directory holding the raw generator response,
//! the parsed program and the executed outcomes. Logging is best-effort: the
//! orchestrator warns on write errors and carries on.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use crate::core::ast::Program;
use crate::core::render::render;
use crate::core::types::Outcome;

/// Directory that holds all session logs under a project root.
pub fn sessions_dir(root: &Path) -> PathBuf {
    root.join(".ceil").join("sessions")
}

/// Pick a fresh `session-<unix secs>[-n]` id that has no directory yet.
pub fn new_session_id(root: &Path) -> Result<String> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let base = format!("session-{secs}");
    let dir = sessions_dir(root);

    for suffix in 1..=999u32 {
        let id = if suffix == 1 {
            base.clone()
        } else {
            format!("{base}-{suffix}")
        };
        if !dir.join(&id).exists() {
            return Ok(id);
        }
    }

    Err(anyhow!(
        "unable to pick a unique session id from base '{base}'"
    ))
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub response_path: PathBuf,
    pub program_path: PathBuf,
    pub outcomes_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(root: &Path, session_id: &str, attempt: u32) -> Self {
        let dir = sessions_dir(root).join(session_id).join(attempt.to_string());
        Self {
            dir: dir.clone(),
            response_path: dir.join("response.txt"),
            program_path: dir.join("program.ceil"),
            outcomes_path: dir.join("outcomes.json"),
        }
    }
}

pub struct AttemptWriteRequest<'a> {
    pub root: &'a Path,
    pub session_id: &'a str,
    pub attempt: u32,
    pub response: &'a str,
    pub program: Option<&'a Program>,
    pub outcomes: Option<&'a [Outcome]>,
}

pub fn write_attempt(request: &AttemptWriteRequest<'_>) -> Result<AttemptPaths> {
    let paths = AttemptPaths::new(request.root, request.session_id, request.attempt);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

    write_text(&paths.response_path, request.response)?;
    if let Some(program) = request.program {
        write_text(&paths.program_path, &render(program))?;
    }
    if let Some(outcomes) = request.outcomes {
        write_json(&paths.outcomes_path, &outcomes)?;
    }

    Ok(paths)
}

/// Write `outcomes.json` for an attempt whose response is already logged.
pub fn write_outcomes(
    root: &Path,
    session_id: &str,
    attempt: u32,
    outcomes: &[Outcome],
) -> Result<PathBuf> {
    let paths = AttemptPaths::new(root, session_id, attempt);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;
    write_json(&paths.outcomes_path, outcomes)?;
    Ok(paths.outcomes_path)
}

/// Write the final session report next to the attempt directories.
pub fn write_report<T: Serialize>(root: &Path, session_id: &str, report: &T) -> Result<PathBuf> {
    let dir = sessions_dir(root).join(session_id);
    fs::create_dir_all(&dir).with_context(|| format!("create session dir {}", dir.display()))?;
    let path = dir.join("report.json");
    write_json(&path, report)?;
    Ok(path)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::Command;
    use crate::core::types::OutcomeStatus;

    #[test]
    fn attempt_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AttemptPaths::new(temp.path(), "session-1", 2);

        assert!(paths.dir.ends_with(Path::new(".ceil/sessions/session-1/2")));
        assert!(paths.response_path.ends_with("response.txt"));
        assert!(paths.program_path.ends_with("program.ceil"));
        assert!(paths.outcomes_path.ends_with("outcomes.json"));
    }

    #[test]
    fn writes_attempt_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let command = Command::Delete {
            file: "a.txt".to_string(),
        };
        let program = Program::new(vec![command.clone()]);
        let outcomes = vec![Outcome::new(0, &command, OutcomeStatus::Skipped, "nothing to delete")];

        let paths = write_attempt(&AttemptWriteRequest {
            root: temp.path(),
            session_id: "session-9",
            attempt: 1,
            response: "### COMMANDS\nDELETE a.txt",
            program: Some(&program),
            outcomes: Some(&outcomes),
        })
        .expect("write attempt");

        assert_eq!(
            fs::read_to_string(&paths.program_path).expect("read"),
            "DELETE a.txt\n"
        );
        let logged: Vec<Outcome> =
            serde_json::from_str(&fs::read_to_string(&paths.outcomes_path).expect("read"))
                .expect("parse");
        assert_eq!(logged, outcomes);
    }

    #[test]
    fn response_only_attempt_skips_other_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = write_attempt(&AttemptWriteRequest {
            root: temp.path(),
            session_id: "s",
            attempt: 1,
            response: "garbage",
            program: None,
            outcomes: None,
        })
        .expect("write attempt");
        assert!(paths.response_path.is_file());
        assert!(!paths.program_path.exists());
    }

    #[test]
    fn session_ids_avoid_existing_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = new_session_id(temp.path()).expect("id");
        fs::create_dir_all(sessions_dir(temp.path()).join(&first)).expect("mkdir");
        let second = new_session_id(temp.path()).expect("id");
        assert_ne!(first, second);
    }
}
