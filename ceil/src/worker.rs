//! Background offload of orchestrator runs onto the tokio blocking pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::execute::ProcessRunner;
use crate::io::generator::Generator;
use crate::orchestrator::{CancelFlag, Orchestrator, Request, SessionReport};

/// Handle to one in-flight request.
#[derive(Debug)]
pub struct RequestHandle {
    cancel: CancelFlag,
    task: JoinHandle<Result<SessionReport>>,
}

impl RequestHandle {
    /// Ask the run to stop at its next phase transition.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<SessionReport> {
        self.task.await.context("join orchestrator task")?
    }
}

/// Run `request` on the blocking pool. Must be called from within a tokio
/// runtime.
pub fn spawn_request<G, R>(orchestrator: Arc<Orchestrator<G, R>>, request: Request) -> RequestHandle
where
    G: Generator + Send + Sync + 'static,
    R: ProcessRunner + Send + Sync + 'static,
{
    spawn_request_with_cancel(orchestrator, request, CancelFlag::new())
}

/// Like [`spawn_request`], observing a caller-supplied cancel flag.
pub fn spawn_request_with_cancel<G, R>(
    orchestrator: Arc<Orchestrator<G, R>>,
    request: Request,
    cancel: CancelFlag,
) -> RequestHandle
where
    G: Generator + Send + Sync + 'static,
    R: ProcessRunner + Send + Sync + 'static,
{
    let flag = cancel.clone();
    debug!(root = %request.project_root.display(), "spawning request");
    let task = tokio::task::spawn_blocking(move || orchestrator.run(&request, &flag));
    RequestHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;
    use crate::orchestrator::SessionStop;
    use crate::test_support::{ScriptedGenerator, ScriptedProcessRunner, quiet_config};

    #[tokio::test]
    async fn requests_keep_their_own_roots() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        let orch = Arc::new(Orchestrator::new(
            ScriptedGenerator::texts([
                "CREATE note.txt <<< one >>>",
                "CREATE note.txt <<< two >>>",
            ]),
            ScriptedProcessRunner::default(),
            quiet_config(),
        ));

        let a = spawn_request(
            Arc::clone(&orch),
            Request::new("a", first.path(), Role::Developer),
        );
        let report_a = a.join().await.expect("join a");
        let b = spawn_request(
            Arc::clone(&orch),
            Request::new("b", second.path(), Role::Developer),
        );
        let report_b = b.join().await.expect("join b");

        assert!(report_a.is_success());
        assert!(report_b.is_success());
        let a_text = std::fs::read_to_string(first.path().join("note.txt")).expect("read a");
        let b_text = std::fs::read_to_string(second.path().join("note.txt")).expect("read b");
        assert_eq!(a_text, "one");
        assert_eq!(b_text, "two");
    }

    #[tokio::test]
    async fn cancel_flag_is_shared_with_the_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cancel = CancelFlag::new();
        let orch = Arc::new(Orchestrator::new(
            ScriptedGenerator::texts(["CREATE a.txt <<< x >>>"]).cancel_on_call(1, cancel.clone()),
            ScriptedProcessRunner::default(),
            quiet_config(),
        ));
        let handle = spawn_request_with_cancel(
            orch,
            Request::new("x", temp.path(), Role::Developer),
            cancel,
        );
        let shared = handle.cancel_flag();

        let report = handle.join().await.expect("join");
        assert_eq!(report.stop, SessionStop::Cancelled);
        assert_eq!(report.attempts, 1);
        assert!(shared.is_cancelled());
        assert!(!temp.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn cancel_through_the_handle_stops_the_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let orch = Arc::new(Orchestrator::new(
            ScriptedGenerator::texts(["DELETE a.txt"]),
            ScriptedProcessRunner::default(),
            quiet_config(),
        ));
        let handle = spawn_request(orch, Request::new("x", temp.path(), Role::Developer));
        handle.cancel();
        assert!(handle.cancel_flag().is_cancelled());

        let report = handle.join().await.expect("join");
        // The run may have finished before the flag was raised.
        assert!(matches!(
            report.stop,
            SessionStop::Cancelled | SessionStop::Completed
        ));
    }
}
