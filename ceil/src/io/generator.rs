//! Generator abstraction for producing CEIL text.
//!
//! The [`Generator`] trait decouples orchestration from the actual text
//! backend (by default `codex exec -`). Tests use scripted generators that
//! return predetermined responses without spawning processes.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::retry::PromptKind;
use crate::io::process::run_command_with_timeout;

/// Parameters for one generator invocation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Working directory for the generator process.
    pub workdir: PathBuf,
    /// Rendered prompt text.
    pub prompt: String,
    pub kind: PromptKind,
    /// 1-based attempt number within the session.
    pub attempt: u32,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over text generation backends.
pub trait Generator {
    /// Return the raw response for `request.prompt`.
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// The generator errored or produced no usable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorFailure {
    pub attempt: u32,
    pub message: String,
}

impl fmt::Display for GeneratorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generator failed on attempt {}: {}",
            self.attempt, self.message
        )
    }
}

impl std::error::Error for GeneratorFailure {}

/// Generator that pipes the prompt into an external command and reads its
/// stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(attempt = request.attempt, timeout_secs = request.timeout.as_secs()))]
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        info!(program = %program, workdir = %request.workdir.display(), "starting generator");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.workdir);
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run generator {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }

        debug!(bytes = output.stdout.len(), "generator completed");
        Ok(output.stdout_text())
    }
}

/// Run the generator, mapping errors and blank responses to
/// [`GeneratorFailure`].
pub fn generate_text<G: Generator>(
    generator: &G,
    request: &GenerationRequest,
) -> Result<String, GeneratorFailure> {
    let failure = |message: String| GeneratorFailure {
        attempt: request.attempt,
        message,
    };
    let text = generator
        .generate(request)
        .map_err(|err| failure(format!("{err:#}")))?;
    if text.trim().is_empty() {
        return Err(failure("empty response".to_string()));
    }
    Ok(text)
}
