//! End-to-end checks of tokenize -> parse -> audit -> execute, and of the
//! repair cycle, through the public crate API.

use std::fs;
use std::path::Path;

use ceil::audit::{AuthorizationContext, AuthorizedProgram, SecurityViolation, ViolationKind, audit};
use ceil::core::ast::CommandKind;
use ceil::core::parser::parse_source;
use ceil::core::types::{Outcome, OutcomeStatus, Role};
use ceil::execute::CommandExecutor;
use ceil::orchestrator::{CancelFlag, Orchestrator, Request, SessionStop};
use ceil::test_support::{ScriptedGenerator, ScriptedProcessRunner, ok_output, quiet_config};

fn check(text: &str, root: &Path, role: Role) -> Result<AuthorizedProgram, SecurityViolation> {
    let ctx = AuthorizationContext::new(root, role).expect("context");
    audit(parse_source(text).expect("parse"), &ctx)
}

fn apply(text: &str, root: &Path) -> Vec<Outcome> {
    let program = check(text, root, Role::Developer).expect("audit");
    CommandExecutor::new(ScriptedProcessRunner::default(), &quiet_config()).execute(&program)
}

#[test]
fn create_in_empty_sandbox_writes_exact_content() {
    let temp = tempfile::tempdir().expect("tempdir");

    let outcomes = apply("CREATE a.txt <<< hello >>>", temp.path());

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].kind, CommandKind::Create);
    assert_eq!(outcomes[0].status, OutcomeStatus::Ok);
    assert_eq!(
        fs::read_to_string(temp.path().join("a.txt")).expect("read"),
        "hello"
    );
}

#[test]
fn traversal_out_of_project_is_rejected_before_execution() {
    let err = check("DELETE ../../etc/passwd", Path::new("/project"), Role::Admin)
        .expect_err("violation");
    assert_eq!(err.kind, ViolationKind::PathTraversal);
    assert_eq!(err.index, 0);
}

#[test]
fn run_requires_privileged_role() {
    let temp = tempfile::tempdir().expect("tempdir");
    for role in [Role::Developer, Role::User] {
        let err = check("RUN pip install requests", temp.path(), role).expect_err("violation");
        assert_eq!(err.kind, ViolationKind::UnauthorizedExecution);
    }

    let program = check("RUN pip install requests", temp.path(), Role::Admin).expect("audit");
    let executor = CommandExecutor::new(
        ScriptedProcessRunner::new(vec![ok_output("Successfully installed requests-2.32\n")]),
        &quiet_config(),
    );
    let outcomes = executor.execute(&program);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, OutcomeStatus::Ok);
    assert!(outcomes[0].detail.contains("Successfully installed requests"));
}

#[test]
fn failed_attempt_is_repaired_on_the_second_try() {
    let temp = tempfile::tempdir().expect("tempdir");
    let orchestrator = Orchestrator::new(
        ScriptedGenerator::texts([
            "PATCH config.ini SEARCH <<< debug=false >>> REPLACE <<< debug=true >>>",
            "CREATE config.ini <<< debug=true >>>",
        ]),
        ScriptedProcessRunner::default(),
        quiet_config(),
    );

    let report = orchestrator
        .run(
            &Request::new("turn on debug", temp.path(), Role::Developer),
            &CancelFlag::new(),
        )
        .expect("run");

    assert_eq!(report.stop, SessionStop::Completed);
    assert_eq!(report.attempts, 2);
    assert_eq!(report.max_attempts, 3);
    assert!(report.outcomes.iter().all(|o| o.status == OutcomeStatus::Ok));
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("config.ini"));

    let prompts = orchestrator.generator().requests();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].prompt.contains(&report.errors[0]));
}

#[test]
fn delete_twice_is_skipped_the_second_time() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("old.log"), "x").expect("write");

    let outcomes = apply("DELETE old.log\nDELETE old.log", temp.path());

    assert_eq!(outcomes[0].status, OutcomeStatus::Ok);
    assert_eq!(outcomes[1].status, OutcomeStatus::Skipped);
    assert!(!temp.path().join("old.log").exists());
}

#[test]
fn deleting_a_file_that_never_existed_is_skipped_every_time() {
    let temp = tempfile::tempdir().expect("tempdir");

    let outcomes = apply("DELETE ghost.txt\nDELETE ghost.txt", temp.path());

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::Skipped));
    assert!(!temp.path().join("ghost.txt").exists());
    assert_eq!(fs::read_dir(temp.path()).expect("read dir").count(), 0);
}

#[test]
fn patch_without_a_match_leaves_file_unchanged() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("app.py"), "print('a')\n").expect("write");

    let outcomes = apply(
        "PATCH app.py SEARCH <<< print('b') >>> REPLACE <<< print('c') >>>",
        temp.path(),
    );

    assert_eq!(outcomes[0].status, OutcomeStatus::Ok);
    assert_eq!(
        fs::read_to_string(temp.path().join("app.py")).expect("read"),
        "print('a')\n"
    );
}

#[test]
fn one_failure_does_not_stop_the_batch() {
    let temp = tempfile::tempdir().expect("tempdir");

    let outcomes = apply(
        "PATCH missing.py SEARCH <<< a >>> REPLACE <<< b >>>\nCREATE ok.txt <<< fine >>>",
        temp.path(),
    );

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status, OutcomeStatus::Failed);
    assert_eq!(outcomes[1].status, OutcomeStatus::Ok);
    assert!(temp.path().join("ok.txt").is_file());
}

#[test]
fn a_single_offender_rejects_the_whole_program() {
    let temp = tempfile::tempdir().expect("tempdir");

    let err = check(
        "CREATE fine.txt <<< a >>>\nCREATE ../escape.txt <<< b >>>",
        temp.path(),
        Role::Admin,
    )
    .expect_err("violation");

    assert_eq!(err.index, 1);
    assert!(!temp.path().join("fine.txt").exists());
}

#[test]
fn generated_markdown_is_cleaned_before_parsing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let response = "Sure, here you go.\n\n### COMMANDS\nCREATE src/index.html\n```html\n<h1>Hi</h1>\n```\n";
    let orchestrator = Orchestrator::new(
        ScriptedGenerator::texts([response]),
        ScriptedProcessRunner::default(),
        quiet_config(),
    );

    let report = orchestrator
        .run(
            &Request::new("add a page", temp.path(), Role::User),
            &CancelFlag::new(),
        )
        .expect("run");

    assert!(report.is_success());
    assert_eq!(
        fs::read_to_string(temp.path().join("src/index.html")).expect("read"),
        "<h1>Hi</h1>"
    );
}
