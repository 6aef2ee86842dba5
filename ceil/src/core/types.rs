//! Shared deterministic types for the CEIL pipeline.
//!
//! These types define stable contracts between the auditor, the executor and
//! the orchestrator. They carry no I/O and serialize to stable JSON.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::ast::{Command, CommandKind};

/// Caller role. Only [`Role::Admin`] may issue `RUN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Developer,
    User,
}

impl Role {
    pub fn is_privileged(self) -> bool {
        self == Role::Admin
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Developer => "developer",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "developer" => Ok(Role::Developer),
            "user" => Ok(Role::User),
            other => bail!("unknown role {other:?} (expected admin, developer or user)"),
        }
    }
}

/// Result classification for one executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Ok,
    /// Nothing to do, for example deleting an absent file.
    Skipped,
    Failed,
}

/// What happened to one command of an executed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Position of the command in its program.
    pub index: usize,
    pub kind: CommandKind,
    pub target: String,
    pub status: OutcomeStatus,
    pub detail: String,
}

impl Outcome {
    pub fn new(
        index: usize,
        command: &Command,
        status: OutcomeStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            index,
            kind: command.kind(),
            target: command.target().to_string(),
            status,
            detail: detail.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            OutcomeStatus::Ok => "ok",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Failed => "FAILED",
        };
        write!(f, "[{}] {} {} {}", self.index, status, self.kind, self.target)?;
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail.trim_end())?;
        }
        Ok(())
    }
}

/// True when any outcome in `outcomes` failed.
pub fn any_failed(outcomes: &[Outcome]) -> bool {
    outcomes.iter().any(Outcome::is_failed)
}
