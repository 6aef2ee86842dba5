//! Sandbox and authorization audit.
//!
//! [`audit`] is the only way to obtain an [`AuthorizedProgram`], and the
//! executor accepts nothing else, so unaudited commands cannot reach the
//! filesystem. The audit is pure: it reads path metadata to resolve symlinks
//! but never writes.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::ast::{Command, Program};
use crate::core::path::{is_within, normalize, normalize_join};
use crate::core::run_target::classify;
use crate::core::types::Role;

/// Immutable policy for one audit pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    sandbox_root: PathBuf,
    caller_role: Role,
}

impl AuthorizationContext {
    /// Build a context rooted at `root`, made absolute and resolved through
    /// any symlinks among its existing ancestors.
    pub fn new(root: &Path, caller_role: Role) -> Result<Self> {
        let absolute = std::path::absolute(root)
            .with_context(|| format!("resolve sandbox root {}", root.display()))?;
        Ok(Self {
            sandbox_root: resolve_existing(&normalize(&absolute)),
            caller_role,
        })
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    pub fn caller_role(&self) -> Role {
        self.caller_role
    }

    /// Resolve a command path the way the audit does, or `None` if it
    /// escapes the sandbox.
    pub fn contain(&self, relative: &str) -> Option<PathBuf> {
        let resolved = resolve_existing(&normalize_join(&self.sandbox_root, relative));
        is_within(&self.sandbox_root, &resolved).then_some(resolved)
    }
}

/// A program that passed [`audit`] under a specific context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedProgram {
    program: Program,
    context: AuthorizationContext,
}

impl AuthorizedProgram {
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn context(&self) -> &AuthorizationContext {
        &self.context
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    PathTraversal,
    UnauthorizedExecution,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::PathTraversal => f.write_str("path traversal"),
            ViolationKind::UnauthorizedExecution => f.write_str("unauthorized execution"),
        }
    }
}

/// The first command that broke policy. Rejects the whole program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityViolation {
    pub kind: ViolationKind,
    pub index: usize,
    pub target: String,
    pub message: String,
}

impl fmt::Display for SecurityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "security violation ({}) in command {} targeting {:?}: {}",
            self.kind, self.index, self.target, self.message
        )
    }
}

impl std::error::Error for SecurityViolation {}

/// Check every command of `program` against `ctx`, failing on the first
/// offender.
#[instrument(skip_all, fields(commands = program.len(), role = %ctx.caller_role))]
pub fn audit(
    program: Program,
    ctx: &AuthorizationContext,
) -> Result<AuthorizedProgram, SecurityViolation> {
    for (index, command) in program.iter().enumerate() {
        if let Err(violation) = check_command(index, command, ctx) {
            warn!(
                index,
                kind = %violation.kind,
                target = %violation.target,
                "program rejected"
            );
            return Err(violation);
        }
    }
    debug!("program authorized");
    Ok(AuthorizedProgram {
        program,
        context: ctx.clone(),
    })
}

fn check_command(
    index: usize,
    command: &Command,
    ctx: &AuthorizationContext,
) -> Result<(), SecurityViolation> {
    let violation = |kind, message: String| SecurityViolation {
        kind,
        index,
        target: command.target().to_string(),
        message,
    };

    let path = match command {
        Command::Run { target } => {
            if !ctx.caller_role.is_privileged() {
                return Err(violation(
                    ViolationKind::UnauthorizedExecution,
                    format!("role {} may not run commands", ctx.caller_role),
                ));
            }
            classify(target).containment_path(target)
        }
        other => match other.path() {
            Some(path) => path,
            None => return Ok(()),
        },
    };

    if ctx.contain(path).is_none() {
        return Err(violation(
            ViolationKind::PathTraversal,
            format!(
                "{path:?} resolves outside the sandbox {}",
                ctx.sandbox_root.display()
            ),
        ));
    }
    Ok(())
}

/// Canonicalize the deepest existing ancestor of an already normalized
/// `path` and re-append the components that do not exist yet.
fn resolve_existing(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            resolved.extend(missing.iter().rev());
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_source;

    fn audit_text(text: &str, root: &Path, role: Role) -> Result<AuthorizedProgram, SecurityViolation> {
        let ctx = AuthorizationContext::new(root, role).expect("context");
        audit(parse_source(text).expect("parse"), &ctx)
    }

    #[test]
    fn traversal_outside_missing_root_is_rejected() {
        let err = audit_text("DELETE ../../etc/passwd", Path::new("/project"), Role::Admin)
            .expect_err("traversal");
        assert_eq!(err.kind, ViolationKind::PathTraversal);
        assert_eq!(err.index, 0);
        assert_eq!(err.target, "../../etc/passwd");
    }

    #[test]
    fn nested_new_paths_inside_root_pass() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = audit_text(
            "CREATE a/b/../c/new.txt <<< x >>>\nDELETE ./gone.txt",
            temp.path(),
            Role::User,
        )
        .expect("authorized");
        assert_eq!(program.program().len(), 2);
    }

    #[test]
    fn sibling_with_shared_prefix_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("project");
        std::fs::create_dir_all(&root).expect("mkdir");
        let err = audit_text("CREATE ../project-evil/x <<< x >>>", &root, Role::Admin)
            .expect_err("sibling");
        assert_eq!(err.kind, ViolationKind::PathTraversal);
    }

    #[test]
    fn first_offender_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = audit_text(
            "CREATE ok.txt <<< x >>>\nDELETE ../one\nDELETE ../two",
            temp.path(),
            Role::Admin,
        )
        .expect_err("traversal");
        assert_eq!(err.index, 1);
    }

    #[test]
    fn run_requires_admin_before_path_checks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = audit_text("RUN ../../outside.py", temp.path(), Role::Developer)
            .expect_err("unauthorized");
        assert_eq!(err.kind, ViolationKind::UnauthorizedExecution);

        let err = audit_text("RUN ../../outside.py", temp.path(), Role::Admin)
            .expect_err("traversal");
        assert_eq!(err.kind, ViolationKind::PathTraversal);
    }

    #[test]
    fn run_checks_the_script_after_interpreter_prefix() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = audit_text("RUN python ../evil.py", temp.path(), Role::Admin)
            .expect_err("traversal");
        assert_eq!(err.kind, ViolationKind::PathTraversal);
        assert!(audit_text("RUN pip install requests", temp.path(), Role::Admin).is_ok());
    }

    #[test]
    fn fetch_external_is_exempt_from_containment() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = audit_text(
            r#"FETCH_EXTERNAL "https://example.com/../../x""#,
            temp.path(),
            Role::User,
        )
        .expect("authorized");
        assert_eq!(program.context().caller_role(), Role::User);
        assert_eq!(program.program().commands[0].target(), "https://example.com/../../x");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_the_root_is_rejected() {
        let outside = tempfile::tempdir().expect("outside");
        let temp = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).expect("symlink");
        let err = audit_text("CREATE link/x.txt <<< x >>>", temp.path(), Role::Admin)
            .expect_err("symlink escape");
        assert_eq!(err.kind, ViolationKind::PathTraversal);
    }
}
