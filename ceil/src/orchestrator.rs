//! Self-healing generate/execute cycle for one user request.
//!
//! The cycle is a bounded state machine driven by [`RetryState`]:
//! `Idle -> Generating -> Executing -> (Generating | Idle)`. Syntax errors
//! and security violations end the run with a typed error; failed commands
//! are folded into a repair prompt while attempts remain.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuthorizationContext, audit};
use crate::core::ast::{Command, Program};
use crate::core::parser::{SyntaxError, parse_source};
use crate::core::render::render;
use crate::core::retry::{
    AfterExecution, PromptKind, RetryState, failure_lines, generator_backoff,
};
use crate::core::sanitize::sanitize_response;
use crate::core::types::{Outcome, Role};
use crate::execute::{CommandExecutor, ProcessRunner, SystemProcessRunner};
use crate::io::config::CeilConfig;
use crate::io::context::project_snapshot;
use crate::io::generator::{GenerationRequest, Generator, GeneratorFailure, generate_text};
use crate::io::prompt::{PromptBuilder, PromptInputs};
use crate::io::session_log::{
    AttemptWriteRequest, new_session_id, write_attempt, write_outcomes, write_report,
};

/// Room reserved for the fixed parts of a prompt on top of the project
/// snapshot budget.
const PROMPT_OVERHEAD_BYTES: usize = 32_000;

const CANCEL_POLL: Duration = Duration::from_millis(50);

/// One user request. Carries its own root and role so concurrent requests
/// never share policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub prompt: String,
    pub project_root: PathBuf,
    pub role: Role,
    /// Earlier conversation turns, oldest first.
    pub history: Vec<String>,
    /// Extra context supplied by the caller.
    pub attachments: Vec<String>,
}

impl Request {
    pub fn new(prompt: impl Into<String>, project_root: impl Into<PathBuf>, role: Role) -> Self {
        Self {
            prompt: prompt.into(),
            project_root: project_root.into(),
            role,
            history: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

/// Cooperative cancellation, observed only between phases.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Sleep for up to `duration`, returning early once cancelled.
    pub fn wait(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.is_cancelled() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return;
            }
            std::thread::sleep(left.min(CANCEL_POLL));
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reason why [`Orchestrator::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStop {
    /// The last executed batch had no failures.
    Completed,
    /// Failures remained when the attempt budget ran out.
    AttemptsExhausted,
    /// The caller cancelled between phases.
    Cancelled,
}

/// What one attempt did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub prompt: PromptKind,
    pub outcomes: Vec<Outcome>,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub stop: SessionStop,
    /// Outcomes of the last executed batch.
    pub outcomes: Vec<Outcome>,
    /// Executed attempts, oldest first.
    pub history: Vec<AttemptRecord>,
    /// URLs the caller is expected to fetch.
    pub delegated_fetches: Vec<String>,
    /// Every failure folded into a repair prompt or left unrepaired.
    pub errors: Vec<String>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.stop == SessionStop::Completed
    }
}

/// Drives generation, audit and execution for requests.
pub struct Orchestrator<G: Generator, R: ProcessRunner = SystemProcessRunner> {
    generator: G,
    executor: CommandExecutor<R>,
    config: CeilConfig,
}

impl<G: Generator> Orchestrator<G, SystemProcessRunner> {
    pub fn system(generator: G, config: CeilConfig) -> Self {
        Self::new(generator, SystemProcessRunner, config)
    }
}

impl<G: Generator, R: ProcessRunner> Orchestrator<G, R> {
    pub fn new(generator: G, runner: R, config: CeilConfig) -> Self {
        Self {
            generator,
            executor: CommandExecutor::new(runner, &config),
            config,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn executor(&self) -> &CommandExecutor<R> {
        &self.executor
    }

    /// Run one request to completion, exhaustion or cancellation.
    ///
    /// Returns `Err` carrying a [`crate::core::parser::SyntaxError`],
    /// [`crate::audit::SecurityViolation`] or [`GeneratorFailure`] when the
    /// run cannot continue; use `downcast_ref` to tell them apart.
    #[instrument(skip_all, fields(role = %request.role, root = %request.project_root.display()))]
    pub fn run(&self, request: &Request, cancel: &CancelFlag) -> Result<SessionReport> {
        let ctx = AuthorizationContext::new(&request.project_root, request.role)?;
        let mut session = Session::new(self, request, &ctx);
        let mut state = RetryState::new(self.config.max_attempts);
        let mut kind = PromptKind::Initial;
        let mut prompt = session.build_prompt(kind, &[], None)?;

        loop {
            if cancel.is_cancelled() {
                info!(attempts = state.attempt_count, "session cancelled before generation");
                return Ok(session.finish(&mut state, SessionStop::Cancelled));
            }
            if !state.begin_generation() {
                return Ok(session.finish(&mut state, SessionStop::AttemptsExhausted));
            }
            let attempt = state.attempt_count;
            info!(attempt, ?kind, "generating");

            let program = match self.generate_program(&session, attempt, kind, &prompt) {
                Ok(program) => program,
                Err(failure) => {
                    warn!(attempt, message = %failure.message, "generator failure");
                    if state.after_generator_failure(&failure.message) {
                        let delay = generator_backoff(self.config.generator_retry_delay(), attempt);
                        debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                        cancel.wait(delay);
                        continue;
                    }
                    state.finish();
                    return Err(failure.into());
                }
            };
            let program = match program {
                Generated::Program(program) => program,
                Generated::Rejected(err) => {
                    state.finish();
                    return Err(err.into());
                }
            };

            let authorized = match audit(program, &ctx) {
                Ok(authorized) => authorized,
                Err(violation) => {
                    state.finish();
                    return Err(violation.into());
                }
            };

            if cancel.is_cancelled() {
                info!(attempt, "session cancelled before execution");
                return Ok(session.finish(&mut state, SessionStop::Cancelled));
            }
            state.begin_execution();
            let outcomes = self.executor.execute(&authorized);
            session.record(attempt, kind, authorized.program(), outcomes);

            match state.after_execution(&session.outcomes) {
                AfterExecution::Complete => {
                    info!(attempt, "all commands applied");
                    return Ok(session.finish(&mut state, SessionStop::Completed));
                }
                AfterExecution::Exhausted => {
                    warn!(attempt, "failures remain and attempts are exhausted");
                    return Ok(session.finish(&mut state, SessionStop::AttemptsExhausted));
                }
                AfterExecution::Repair => {
                    let failures = failure_lines(&session.outcomes);
                    debug!(attempt, failures = failures.len(), "building repair prompt");
                    kind = PromptKind::Repair;
                    let previous = render(authorized.program());
                    prompt = session.build_prompt(kind, &failures, Some(previous))?;
                }
            }
        }
    }

    /// Generate, sanitize and parse one response. Generator problems come
    /// back as `Err`; parse errors as [`Generated::Rejected`].
    fn generate_program(
        &self,
        session: &Session<'_, G, R>,
        attempt: u32,
        kind: PromptKind,
        prompt: &str,
    ) -> Result<Generated, GeneratorFailure> {
        let request = GenerationRequest {
            workdir: session.ctx.sandbox_root().to_path_buf(),
            prompt: prompt.to_string(),
            kind,
            attempt,
            timeout: self.config.generator_timeout(),
            output_limit_bytes: self.config.output_limit_bytes,
        };
        let text = generate_text(&self.generator, &request)?;
        let cleaned = sanitize_response(&text);
        match parse_source(&cleaned) {
            Ok(program) if program.is_empty() => {
                session.log_attempt(attempt, &text, None);
                Err(GeneratorFailure {
                    attempt,
                    message: "response contained no commands".to_string(),
                })
            }
            Ok(program) => {
                session.log_attempt(attempt, &text, Some(&program));
                Ok(Generated::Program(program))
            }
            Err(err) => {
                warn!(attempt, %err, "generated text rejected");
                session.log_attempt(attempt, &text, None);
                Ok(Generated::Rejected(err))
            }
        }
    }
}

enum Generated {
    Program(Program),
    Rejected(SyntaxError),
}

/// Per-request bookkeeping shared by the phases of [`Orchestrator::run`].
struct Session<'a, G: Generator, R: ProcessRunner> {
    orchestrator: &'a Orchestrator<G, R>,
    request: &'a Request,
    ctx: &'a AuthorizationContext,
    id: Option<String>,
    outcomes: Vec<Outcome>,
    history: Vec<AttemptRecord>,
    delegated_fetches: Vec<String>,
}

impl<'a, G: Generator, R: ProcessRunner> Session<'a, G, R> {
    fn new(
        orchestrator: &'a Orchestrator<G, R>,
        request: &'a Request,
        ctx: &'a AuthorizationContext,
    ) -> Self {
        let id = if orchestrator.config.session_log {
            new_session_id(ctx.sandbox_root())
                .map_err(|err| warn!(err = %err, "session log disabled"))
                .ok()
        } else {
            None
        };
        Self {
            orchestrator,
            request,
            ctx,
            id,
            outcomes: Vec::new(),
            history: Vec::new(),
            delegated_fetches: Vec::new(),
        }
    }

    fn build_prompt(
        &self,
        kind: PromptKind,
        failures: &[String],
        previous_program: Option<String>,
    ) -> Result<String> {
        let config = &self.orchestrator.config;
        let project = match project_snapshot(self.ctx.sandbox_root(), &config.context) {
            Ok(snapshot) => snapshot.render(),
            Err(err) => {
                warn!(err = %err, "project snapshot unavailable");
                String::new()
            }
        };
        let inputs = PromptInputs {
            request: self.request.prompt.clone(),
            project,
            history: self.request.history.clone(),
            attachments: self.request.attachments.clone(),
            failures: failures.to_vec(),
            previous_program,
        };
        PromptBuilder::new(config.context.max_context_bytes + PROMPT_OVERHEAD_BYTES)
            .build(kind, &inputs)
    }

    fn record(&mut self, attempt: u32, kind: PromptKind, program: &Program, outcomes: Vec<Outcome>) {
        for command in program {
            if let Command::FetchExternal { url } = command
                && !self.delegated_fetches.contains(url)
            {
                self.delegated_fetches.push(url.clone());
            }
        }
        if let Some(id) = &self.id
            && let Err(err) = write_outcomes(self.ctx.sandbox_root(), id, attempt, &outcomes)
        {
            warn!(attempt, err = %err, "failed to write session outcomes");
        }
        self.history.push(AttemptRecord {
            attempt,
            prompt: kind,
            outcomes: outcomes.clone(),
        });
        self.outcomes = outcomes;
    }

    fn log_attempt(&self, attempt: u32, response: &str, program: Option<&Program>) {
        let Some(id) = &self.id else {
            return;
        };
        let result = write_attempt(&AttemptWriteRequest {
            root: self.ctx.sandbox_root(),
            session_id: id,
            attempt,
            response,
            program,
            outcomes: None,
        });
        if let Err(err) = result {
            warn!(attempt, err = %err, "failed to write session log");
        }
    }

    fn finish(self, state: &mut RetryState, stop: SessionStop) -> SessionReport {
        state.finish();
        let report = SessionReport {
            session_id: self.id,
            attempts: state.attempt_count,
            max_attempts: state.max_attempts,
            stop,
            outcomes: self.outcomes,
            history: self.history,
            delegated_fetches: self.delegated_fetches,
            errors: state.accumulated_errors.clone(),
        };
        if let Some(id) = &report.session_id
            && let Err(err) = write_report(self.ctx.sandbox_root(), id, &report)
        {
            warn!(err = %err, "failed to write session report");
        }
        info!(attempts = report.attempts, stop = ?report.stop, "session finished");
        report
    }
}
