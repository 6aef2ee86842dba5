//! Bounded retry bookkeeping for the self-healing loop.
//!
//! The orchestrator owns one [`RetryState`] per request and asks it what to
//! do after every generation and execution. All decisions are pure, so the
//! termination bound lives here rather than in the I/O loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::Outcome;

/// Default attempt budget per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Where the orchestrator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Generating,
    Executing,
}

/// Which prompt an attempt was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// The user's request.
    Initial,
    /// The request plus the failures of the previous attempt.
    Repair,
}

/// What to do after a batch has been executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterExecution {
    /// Every outcome is Ok or Skipped.
    Complete,
    /// Failures were recorded and another attempt is available.
    Repair,
    /// Failures remain and the attempt budget is spent.
    Exhausted,
}

/// Attempt accounting for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub accumulated_errors: Vec<String>,
    phase: Phase,
}

impl RetryState {
    /// Fresh state for a new request. A zero budget is treated as one attempt.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            accumulated_errors: Vec::new(),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Enter `Generating`, consuming one attempt. Returns `false` when the
    /// budget is already spent; the state is left untouched in that case.
    pub fn begin_generation(&mut self) -> bool {
        if !self.has_attempts_left() {
            return false;
        }
        self.attempt_count += 1;
        self.phase = Phase::Generating;
        true
    }

    pub fn begin_execution(&mut self) {
        self.phase = Phase::Executing;
    }

    pub fn finish(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Classify an executed batch, folding any failures into
    /// `accumulated_errors`.
    pub fn after_execution(&mut self, outcomes: &[Outcome]) -> AfterExecution {
        let failures = failure_lines(outcomes);
        if failures.is_empty() {
            return AfterExecution::Complete;
        }
        self.accumulated_errors.extend(failures);
        if self.has_attempts_left() {
            AfterExecution::Repair
        } else {
            AfterExecution::Exhausted
        }
    }

    /// Record a generator failure. Returns `true` when another attempt may
    /// be made with the same prompt.
    pub fn after_generator_failure(&mut self, message: &str) -> bool {
        self.accumulated_errors
            .push(format!("attempt {}: generator failed: {message}", self.attempt_count));
        self.has_attempts_left()
    }
}

/// Delay before generating again after the generator failed on `attempt`
/// (1-based): the base delay grows linearly with the attempt number.
pub fn generator_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.max(1))
}

/// One human-readable line per failed outcome.
pub fn failure_lines(outcomes: &[Outcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter(|o| o.is_failed())
        .map(|o| format!("{} {} (command {}): {}", o.kind, o.target, o.index, o.detail.trim()))
        .collect()
}
