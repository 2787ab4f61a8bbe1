use crate::engine::{Paths, RunContext};
use crate::exec::mock::MockCommandRunner;
use crate::model::{Control, ControlResult, Status};
use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Context backed by a mock runner and system default paths, for engine-level
/// tests that never touch the filesystem.
pub fn test_context() -> RunContext {
    RunContext::new(Arc::new(MockCommandRunner::new()))
}

/// Tempdir config root with the given nginx.conf contents, plus Paths
/// pointing every observed file into the tempdir.
pub fn nginx_fixture(main_conf: &str) -> (TempDir, Paths) {
    let dir = TempDir::new().expect("create tempdir");
    fs::write(dir.path().join("nginx.conf"), main_conf).expect("write nginx.conf");
    let paths = Paths {
        conf_dir: dir.path().to_path_buf(),
        pid_file: dir.path().join("nginx.pid"),
        repo_file: dir.path().join("nginx.repo"),
        passwd_file: dir.path().join("passwd"),
        group_file: dir.path().join("group"),
    };
    (dir, paths)
}

/// Context whose controls observe a fixture tree through a mock runner.
pub fn fixture_context(paths: Paths) -> RunContext {
    RunContext::new(Arc::new(MockCommandRunner::new())).with_paths(paths)
}

pub fn fixture_context_with_runner(paths: Paths, runner: MockCommandRunner) -> RunContext {
    RunContext::new(Arc::new(runner)).with_paths(paths)
}

/// Invocation counters observable after the control is boxed into a registry.
#[derive(Default)]
pub struct Calls {
    pub check: AtomicUsize,
    pub remediate: AtomicUsize,
}

/// Test double driven by a script of check statuses: each `check` pops the
/// next status, the last one repeating. Used to model every orchestrator
/// scenario without touching system state.
pub struct ScriptedControl {
    id: String,
    checks: Mutex<VecDeque<Status>>,
    remediate_status: Status,
    calls: Arc<Calls>,
    panic_on_check: bool,
    cancel_on_check: bool,
}

impl ScriptedControl {
    pub fn new(id: &str, checks: &[Status]) -> Self {
        Self {
            id: id.to_string(),
            checks: Mutex::new(checks.iter().copied().collect()),
            remediate_status: Status::Manual,
            calls: Arc::new(Calls::default()),
            panic_on_check: false,
            cancel_on_check: false,
        }
    }

    pub fn passing(id: &str) -> Self {
        Self::new(id, &[Status::Pass])
    }

    pub fn panicking(id: &str) -> Self {
        let mut control = Self::new(id, &[Status::Pass]);
        control.panic_on_check = true;
        control
    }

    /// Passes, but flips the run-level cancellation flag during its check.
    pub fn cancelling(id: &str) -> Self {
        let mut control = Self::new(id, &[Status::Pass]);
        control.cancel_on_check = true;
        control
    }

    pub fn with_remediate(mut self, status: Status) -> Self {
        self.remediate_status = status;
        self
    }

    pub fn calls(&self) -> Arc<Calls> {
        self.calls.clone()
    }
}

impl Control for ScriptedControl {
    fn id(&self) -> &str { &self.id }
    fn title(&self) -> &str { "scripted control" }
    fn description(&self) -> &str { "scripted test double" }

    fn check(&self, ctx: &RunContext) -> ControlResult {
        self.calls.check.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_check {
            panic!("scripted check panic");
        }
        if self.cancel_on_check {
            ctx.cancel.store(true, Ordering::SeqCst);
        }
        let mut queue = self.checks.lock().unwrap();
        let status = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().copied().unwrap_or(Status::Pass)
        };
        ControlResult::new(&self.id, status, "scripted check")
    }

    fn remediate(&self, _ctx: &RunContext) -> ControlResult {
        self.calls.remediate.fetch_add(1, Ordering::SeqCst);
        ControlResult::new(&self.id, self.remediate_status, "scripted remediation")
    }
}
