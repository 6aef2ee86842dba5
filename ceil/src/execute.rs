//! Best-effort execution of an authorized program.
//!
//! Each command is applied independently: an error in one becomes a
//! `Failed` outcome for that command and execution moves on to the next.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuthorizationContext, AuthorizedProgram};
use crate::core::ast::Command;
use crate::core::path::normalize_join;
use crate::core::run_target::{RunTarget, classify};
use crate::core::types::{Outcome, OutcomeStatus};
use crate::io::config::CeilConfig;
use crate::io::process::run_command_with_timeout;

/// A subprocess the executor wants to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Captured result of a [`ProcessRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Stdout, or stderr when stdout is blank.
    pub fn detail(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Process-spawning seam for `RUN` commands.
pub trait ProcessRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput>;
}

/// Runs requests as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput> {
        let mut cmd = StdCommand::new(&request.program);
        cmd.args(&request.args).current_dir(&request.cwd);
        let output = run_command_with_timeout(cmd, None, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run {}", request.program))?;
        Ok(ProcessOutput {
            success: output.status.success() && !output.timed_out,
            code: output.status.code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            timed_out: output.timed_out,
        })
    }
}

/// Applies authorized programs to the sandbox.
#[derive(Debug, Clone)]
pub struct CommandExecutor<R: ProcessRunner = SystemProcessRunner> {
    runner: R,
    config: CeilConfig,
}

impl CommandExecutor<SystemProcessRunner> {
    pub fn system(config: &CeilConfig) -> Self {
        Self::new(SystemProcessRunner, config)
    }
}

impl<R: ProcessRunner> CommandExecutor<R> {
    pub fn new(runner: R, config: &CeilConfig) -> Self {
        Self {
            runner,
            config: config.clone(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute every command in order. Always returns one outcome per
    /// command.
    #[instrument(skip_all, fields(commands = program.program().len()))]
    pub fn execute(&self, program: &AuthorizedProgram) -> Vec<Outcome> {
        let ctx = program.context();
        program
            .program()
            .iter()
            .enumerate()
            .map(|(index, command)| {
                let outcome = match self.execute_one(command, ctx) {
                    Ok((status, detail)) => Outcome::new(index, command, status, detail),
                    Err(err) => Outcome::new(index, command, OutcomeStatus::Failed, format!("{err:#}")),
                };
                if outcome.is_failed() {
                    warn!(index, kind = %outcome.kind, target = %outcome.target, "command failed");
                } else {
                    info!(index, kind = %outcome.kind, target = %outcome.target, status = ?outcome.status, "command applied");
                }
                outcome
            })
            .collect()
    }

    fn execute_one(
        &self,
        command: &Command,
        ctx: &AuthorizationContext,
    ) -> Result<(OutcomeStatus, String)> {
        let root = ctx.sandbox_root();
        match command {
            Command::Create { file, content } => create(&normalize_join(root, file), content),
            Command::Patch {
                file,
                search,
                replace,
            } => patch(&normalize_join(root, file), search, replace),
            Command::Delete { file } => delete(&normalize_join(root, file)),
            Command::Run { target } => self.run(target, ctx),
            Command::FetchExternal { url } => {
                debug!(url = %url, "fetch delegated to caller");
                Ok((OutcomeStatus::Ok, format!("delegated fetch: {url}")))
            }
        }
    }

    fn run(&self, target: &str, ctx: &AuthorizationContext) -> Result<(OutcomeStatus, String)> {
        let root = ctx.sandbox_root();
        let request = match classify(target) {
            RunTarget::MissingScript => {
                return Ok((OutcomeStatus::Failed, "no script given".to_string()));
            }
            RunTarget::System(line) => {
                let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
                self.request(shell, vec![flag.to_string(), line.to_string()], root)
            }
            RunTarget::Script { path, args } => {
                let Some(script) = resolve_script(path, ctx) else {
                    return Ok((OutcomeStatus::Failed, format!("script {path} not found")));
                };
                let extension = script.extension().and_then(|e| e.to_str()).unwrap_or("");
                let script_arg = script.display().to_string();
                let user_args = args.iter().map(|a| (*a).to_string());
                match self.config.interpreter_for(extension) {
                    Some([program, prefix @ ..]) => {
                        let argv = prefix
                            .iter()
                            .cloned()
                            .chain(std::iter::once(script_arg))
                            .chain(user_args)
                            .collect();
                        self.request(program, argv, root)
                    }
                    _ => self.request(&script_arg, user_args.collect(), root),
                }
            }
        };

        debug!(program = %request.program, args = ?request.args, "spawning run target");
        let output = self.runner.run(&request)?;
        let detail = output.detail().to_string();
        if output.timed_out {
            let mut message = format!("timed out after {}s", request.timeout.as_secs());
            if !detail.trim().is_empty() {
                message.push('\n');
                message.push_str(&detail);
            }
            return Ok((OutcomeStatus::Failed, message));
        }
        if !output.success {
            if detail.trim().is_empty() {
                let code = output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                return Ok((OutcomeStatus::Failed, format!("exit status {code}")));
            }
            return Ok((OutcomeStatus::Failed, detail));
        }
        Ok((OutcomeStatus::Ok, detail))
    }

    fn request(&self, program: &str, args: Vec<String>, cwd: &Path) -> ProcessRequest {
        ProcessRequest {
            program: program.to_string(),
            args,
            cwd: cwd.to_path_buf(),
            timeout: self.config.run_timeout(),
            output_limit_bytes: self.config.output_limit_bytes,
        }
    }
}

fn create(path: &Path, content: &str) -> Result<(OutcomeStatus, String)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
    Ok((OutcomeStatus::Ok, format!("wrote {} bytes", content.len())))
}

fn patch(path: &Path, search: &str, replace: &str) -> Result<(OutcomeStatus, String)> {
    let original =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if search.is_empty() {
        return Ok((OutcomeStatus::Failed, "empty search text".to_string()));
    }
    let occurrences = original.matches(search).count();
    // A miss still writes the content back, so the file is touched either way.
    fs::write(path, original.replace(search, replace))
        .with_context(|| format!("write {}", path.display()))?;
    if occurrences == 0 {
        return Ok((
            OutcomeStatus::Ok,
            "search text not found; file unchanged".to_string(),
        ));
    }
    Ok((
        OutcomeStatus::Ok,
        format!("replaced {occurrences} occurrence(s)"),
    ))
}

fn delete(path: &Path) -> Result<(OutcomeStatus, String)> {
    match fs::symlink_metadata(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => {
            Ok((OutcomeStatus::Skipped, "nothing to delete".to_string()))
        }
        Err(err) => Err(err).with_context(|| format!("stat {}", path.display())),
        Ok(meta) if meta.is_dir() => Ok((
            OutcomeStatus::Failed,
            format!("{} is a directory", path.display()),
        )),
        Ok(_) => {
            fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
            Ok((OutcomeStatus::Ok, "deleted".to_string()))
        }
    }
}

/// Literal path under the root first, then the bare file name directly
/// under the root.
fn resolve_script(path: &str, ctx: &AuthorizationContext) -> Option<PathBuf> {
    let literal = ctx.contain(path).filter(|p| p.is_file());
    literal.or_else(|| {
        let name = Path::new(path).file_name()?.to_str()?;
        ctx.contain(name).filter(|p| p.is_file())
    })
}
