//! `ceil`: parse, audit and execute CEIL programs, or run a full
//! generate/execute/repair session against a configured generator.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use ceil::audit::{AuthorizationContext, AuthorizedProgram, SecurityViolation, audit};
use ceil::core::parser::parse_source;
use ceil::core::render::render;
use ceil::core::types::{Outcome, Role, any_failed};
use ceil::execute::CommandExecutor;
use ceil::exit_codes;
use ceil::io::config::{config_path, load_config};
use ceil::io::generator::CommandGenerator;
use ceil::io::init::{InitOptions, init_project};
use ceil::orchestrator::{Orchestrator, Request, SessionReport, SessionStop};
use ceil::worker::spawn_request;

#[derive(Parser)]
#[command(
    name = "ceil",
    version,
    about = "Constrained execution language for generated file and process edits"
)]
struct Cli {
    /// Project root that sandboxes every command.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.ceil/config.toml` with defaults.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Parse and audit a program, then print it in normalized form.
    Check {
        /// Program file, or `-` for stdin.
        file: PathBuf,
        /// Caller role (admin, developer, user).
        #[arg(long, default_value = "developer")]
        role: Role,
    },
    /// Parse, audit and execute a program.
    Apply {
        /// Program file, or `-` for stdin.
        file: PathBuf,
        /// Caller role (admin, developer, user).
        #[arg(long, default_value = "developer")]
        role: Role,
        /// Print outcomes as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Generate a program from a prompt and repair it until it applies cleanly.
    Run {
        /// Natural-language request for the generator.
        #[arg(short, long)]
        prompt: String,
        /// Caller role (admin, developer, user).
        #[arg(long, default_value = "developer")]
        role: Role,
        /// Extra context file to include in the prompt (repeatable).
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
        /// Print the session report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    ceil::logging::init();
    let code = match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            error_code(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Check { file, role } => cmd_check(&cli.root, &file, role),
        Command::Apply { file, role, json } => cmd_apply(&cli.root, &file, role, json),
        Command::Run {
            prompt,
            role,
            attachments,
            json,
        } => cmd_run(&cli.root, prompt, role, &attachments, json),
    }
}

/// Security violations get their own exit code; everything else is invalid
/// input or an I/O problem.
fn error_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<SecurityViolation>().is_some() {
        exit_codes::REJECTED
    } else {
        exit_codes::INVALID
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_project(root, &InitOptions { force })?;
    println!("wrote {}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_check(root: &Path, file: &Path, role: Role) -> Result<i32> {
    let authorized = load_program(root, file, role)?;
    print!("{}", render(authorized.program()));
    Ok(exit_codes::OK)
}

fn cmd_apply(root: &Path, file: &Path, role: Role, json: bool) -> Result<i32> {
    let config = load_config(&config_path(root))?;
    let authorized = load_program(root, file, role)?;
    let outcomes = CommandExecutor::system(&config).execute(&authorized);
    print_outcomes(&outcomes, json)?;
    if any_failed(&outcomes) {
        Ok(exit_codes::FAILED)
    } else {
        Ok(exit_codes::OK)
    }
}

fn cmd_run(
    root: &Path,
    prompt: String,
    role: Role,
    attachments: &[PathBuf],
    json: bool,
) -> Result<i32> {
    let config = load_config(&config_path(root))?;
    let mut request = Request::new(prompt, root, role);
    for path in attachments {
        let text =
            fs::read_to_string(path).with_context(|| format!("read attachment {}", path.display()))?;
        request
            .attachments
            .push(format!("{}:\n{}", path.display(), text));
    }

    let generator = CommandGenerator::new(config.generator.command.clone());
    let orchestrator = Arc::new(Orchestrator::system(generator, config));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    let report = runtime.block_on(async move {
        let handle = spawn_request(orchestrator, request);
        let cancel = handle.cancel_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping at the next phase");
                cancel.cancel();
            }
        });
        handle.join().await
    })?;

    print_report(&report, json)?;
    Ok(match report.stop {
        SessionStop::Completed => exit_codes::OK,
        SessionStop::AttemptsExhausted | SessionStop::Cancelled => exit_codes::FAILED,
    })
}

/// Read, parse and audit a program from `file` (`-` reads stdin).
fn load_program(root: &Path, file: &Path, role: Role) -> Result<AuthorizedProgram> {
    let source = read_source(file)?;
    let program = parse_source(&source).with_context(|| format!("parse {}", file.display()))?;
    let ctx = AuthorizationContext::new(root, role)?;
    Ok(audit(program, &ctx)?)
}

fn read_source(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read program from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(file).with_context(|| format!("read {}", file.display()))
}

fn print_outcomes(outcomes: &[Outcome], json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(outcomes).context("serialize outcomes")?
        );
    } else {
        for outcome in outcomes {
            println!("{outcome}");
        }
    }
    Ok(())
}

fn print_report(report: &SessionReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("serialize session report")?
        );
        return Ok(());
    }
    print_outcomes(&report.outcomes, false)?;
    for url in &report.delegated_fetches {
        println!("fetch delegated to caller: {url}");
    }
    println!(
        "session {:?} after {}/{} attempt(s)",
        report.stop, report.attempts, report.max_attempts
    );
    if let Some(id) = &report.session_id {
        println!("log: .ceil/sessions/{id}");
    }
    Ok(())
}
