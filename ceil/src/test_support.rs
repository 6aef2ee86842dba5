//! Test-only helpers: scripted generator and process runner doubles.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::execute::{ProcessOutput, ProcessRequest, ProcessRunner};
use crate::io::config::CeilConfig;
use crate::io::generator::{GenerationRequest, Generator};
use crate::orchestrator::CancelFlag;

/// One scripted generator reply.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Text(String),
    Error(String),
}

/// Generator that replays responses in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<GenerationRequest>>,
    cancel: Option<CancelOnCall>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            cancel: None,
        }
    }

    /// Cancel `flag` while serving the `call`-th request (1-based).
    pub fn cancel_on_call(mut self, call: usize, flag: CancelFlag) -> Self {
        self.cancel = Some(CancelOnCall { call, flag });
        self
    }

    /// Shorthand for a generator that only returns text.
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .map(|t| ScriptedResponse::Text(t.into()))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let mut requests = self.requests.lock().expect("requests lock");
        requests.push(request.clone());
        if let Some(cancel) = &self.cancel {
            cancel.observe(requests.len());
        }
        drop(requests);
        match self.responses.lock().expect("responses lock").pop_front() {
            Some(ScriptedResponse::Text(text)) => Ok(text),
            Some(ScriptedResponse::Error(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted response left")),
        }
    }
}

/// Process runner that replays outputs in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedProcessRunner {
    outputs: Mutex<VecDeque<ProcessOutput>>,
    requests: Mutex<Vec<ProcessRequest>>,
    cancel: Option<CancelOnCall>,
}

impl ScriptedProcessRunner {
    pub fn new(outputs: Vec<ProcessOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            requests: Mutex::new(Vec::new()),
            cancel: None,
        }
    }

    /// Cancel `flag` while running the `call`-th process (1-based).
    pub fn cancel_on_call(mut self, call: usize, flag: CancelFlag) -> Self {
        self.cancel = Some(CancelOnCall { call, flag });
        self
    }

    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ProcessRunner for ScriptedProcessRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput> {
        let mut requests = self.requests.lock().expect("requests lock");
        requests.push(request.clone());
        if let Some(cancel) = &self.cancel {
            cancel.observe(requests.len());
        }
        drop(requests);
        self.outputs
            .lock()
            .expect("outputs lock")
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted process output left"))
    }
}

/// Flips a cancel flag when a double sees its `call`-th request.
#[derive(Debug)]
struct CancelOnCall {
    call: usize,
    flag: CancelFlag,
}

impl CancelOnCall {
    fn observe(&self, call: usize) {
        if call == self.call {
            self.flag.cancel();
        }
    }
}

/// A successful process that printed `stdout`.
pub fn ok_output(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        success: true,
        code: Some(0),
        stdout: stdout.to_string(),
        ..ProcessOutput::default()
    }
}

/// A process that exited with status 1 after printing `stderr`.
pub fn failed_output(stderr: &str) -> ProcessOutput {
    ProcessOutput {
        success: false,
        code: Some(1),
        stderr: stderr.to_string(),
        ..ProcessOutput::default()
    }
}

/// Default config with session logging off, so tests leave no `.ceil/`,
/// and no delay between generator retries.
pub fn quiet_config() -> CeilConfig {
    CeilConfig {
        session_log: false,
        generator_retry_delay_secs: 0,
        ..CeilConfig::default()
    }
}
