use crate::exec::{CommandOutput, CommandRunner, ExecError};
use crate::model::{Control, ControlOutcome, ControlResult, Outcome, Status};
use crate::registry::ControlRegistry;
use crate::report::RunReport;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Filesystem locations the controls observe and remediate. Overridable so
/// tests (and `--prefix`) can point a run at a fixture tree instead of the
/// live system.
#[derive(Debug, Clone)]
pub struct Paths {
    pub conf_dir: PathBuf,
    pub pid_file: PathBuf,
    pub repo_file: PathBuf,
    pub passwd_file: PathBuf,
    pub group_file: PathBuf,
}

impl Paths {
    pub fn system() -> Self {
        Self {
            conf_dir: PathBuf::from("/etc/nginx"),
            pid_file: PathBuf::from("/var/run/nginx.pid"),
            repo_file: PathBuf::from("/etc/yum.repos.d/nginx.repo"),
            passwd_file: PathBuf::from("/etc/passwd"),
            group_file: PathBuf::from("/etc/group"),
        }
    }

    pub fn main_conf(&self) -> PathBuf {
        self.conf_dir.join("nginx.conf")
    }

    pub fn conf_d_pattern(&self) -> String {
        self.conf_dir.join("conf.d").join("*.conf").to_string_lossy().into_owned()
    }
}

/// Everything one run is configured with. Built once per run and passed to
/// every control; there is no process-global state.
pub struct RunContext {
    pub runner: Arc<dyn CommandRunner>,
    pub paths: Paths,
    pub auto_remediate: bool,
    pub timeout: Duration,
    pub jobs: usize,
    pub authorized_ports: Vec<u16>,
    pub cancel: Arc<AtomicBool>,
}

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

impl RunContext {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            paths: Paths::system(),
            auto_remediate: false,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            jobs: 1,
            authorized_ports: vec![80, 443],
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_paths(mut self, paths: Paths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_auto_remediate(mut self, enabled: bool) -> Self {
        self.auto_remediate = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_authorized_ports(mut self, ports: Vec<u16>) -> Self {
        self.authorized_ports = ports;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run an external command under this run's timeout.
    pub fn command(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        self.runner.run(program, args, self.timeout)
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Runs a registry of controls to completion and assembles one report, even
/// when individual controls fail, panic, or hang on an external command.
pub struct Orchestrator {
    ctx: RunContext,
}

impl Orchestrator {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Execute every registered control in registry (lexical) order and fold
    /// the outcomes into a run report. Every control in the registry appears
    /// exactly once in the report, whatever happened to it.
    pub fn run(&self, registry: &ControlRegistry) -> RunReport {
        let controls: Vec<&dyn Control> = registry.iter().collect();
        let outcomes = if self.ctx.jobs > 1 && controls.len() > 1 {
            self.run_pooled(&controls)
        } else {
            controls.iter().map(|c| self.run_control(*c)).collect()
        };
        RunReport::from_outcomes(outcomes)
    }

    /// Serialized audit result for a single control, without running the rest
    /// of the registry. Unknown ids are a caller fault and surface as errors.
    pub fn report(&self, registry: &ControlRegistry, id: &str) -> anyhow::Result<String> {
        let control = registry.get(id)?;
        Ok(control.report(&self.ctx)?)
    }

    /// Bounded worker pool. Workers pull the next un-run control off a shared
    /// cursor; outcomes are reassembled in registry order before emission, so
    /// the report never reflects completion order.
    fn run_pooled(&self, controls: &[&dyn Control]) -> Vec<ControlOutcome> {
        let workers = self.ctx.jobs.min(controls.len());
        let next = AtomicUsize::new(0);
        let collected: Mutex<Vec<(usize, ControlOutcome)>> =
            Mutex::new(Vec::with_capacity(controls.len()));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= controls.len() {
                        break;
                    }
                    let outcome = self.run_control(controls[index]);
                    match collected.lock() {
                        Ok(mut slots) => slots.push((index, outcome)),
                        Err(poisoned) => poisoned.into_inner().push((index, outcome)),
                    }
                });
            }
        });

        let mut slots = match collected.into_inner() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.sort_by_key(|(index, _)| *index);
        slots.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// The per-control pipeline: check, conditionally remediate, re-verify.
    fn run_control(&self, control: &dyn Control) -> ControlOutcome {
        let id = control.id().to_string();

        if self.ctx.cancelled() {
            let skipped =
                ControlResult::skipped(&id, "run cancelled before this control was scheduled");
            return ControlOutcome {
                control_id: id,
                initial_check: skipped,
                remediation: None,
                final_check: None,
                overall_status: Outcome::Skipped,
            };
        }

        let initial = self.invoke_check(control);
        let (remediation, final_check, overall_status) = match initial.status {
            Status::Pass => (None, None, Outcome::Pass),
            Status::Error => (None, None, Outcome::Error),
            Status::Fail if !self.ctx.auto_remediate => (None, None, Outcome::Fail),
            Status::Fail => {
                let remediation = self.invoke_remediate(control);
                match remediation.status {
                    Status::Remediated => {
                        // A control never self-reports success it did not
                        // verify: re-check before calling it remediated.
                        let final_check = self.invoke_check(control);
                        let overall = match final_check.status {
                            Status::Pass => Outcome::Remediated,
                            Status::Fail => Outcome::FailedRemediation,
                            _ => Outcome::Error,
                        };
                        (Some(remediation), Some(final_check), overall)
                    }
                    Status::Manual => (Some(remediation), None, Outcome::Manual),
                    // ERROR, plus anything remediate() is not allowed to return.
                    _ => (Some(remediation), None, Outcome::Error),
                }
            }
            // check() only returns PASS/FAIL/ERROR; anything else is a
            // contract breach surfaced as an ERROR outcome.
            _ => (None, None, Outcome::Error),
        };

        ControlOutcome {
            control_id: id,
            initial_check: initial,
            remediation,
            final_check,
            overall_status,
        }
    }

    fn invoke_check(&self, control: &dyn Control) -> ControlResult {
        match catch_unwind(AssertUnwindSafe(|| control.check(&self.ctx))) {
            Ok(result) => result,
            Err(payload) => ControlResult::error(
                control.id(),
                format!("check panicked: {}", panic_message(payload.as_ref())),
            ),
        }
    }

    fn invoke_remediate(&self, control: &dyn Control) -> ControlResult {
        match catch_unwind(AssertUnwindSafe(|| control.remediate(&self.ctx))) {
            Ok(result) => result,
            Err(payload) => ControlResult::error(
                control.id(),
                format!("remediation panicked: {}", panic_message(payload.as_ref())),
            ),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "opaque panic payload"
    }
}
