//! CEIL: a constrained execution language for machine-generated edits.
//!
//! Generated text goes through a fixed pipeline before anything touches the
//! disk:
//!
//! - **[`core`]**: Pure, deterministic logic (tokenizer, parser, renderer,
//!   path normalization, retry state machine). No I/O.
//! - **[`audit`]**: Sandbox containment and role checks over a whole program.
//!   Produces the only input the executor accepts.
//! - **[`execute`]**: Applies an audited program command by command.
//! - **[`io`]**: Side-effecting helpers (config, subprocesses, generator,
//!   prompts, project snapshot, session logs).
//!
//! [`orchestrator`] ties these together into the bounded self-healing cycle
//! and [`worker`] moves that cycle off the async runtime.

pub mod audit;
pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod worker;
