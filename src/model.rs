use crate::engine::RunContext;
use serde::{Deserialize, Serialize};

/// Status of a single check or remediation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Error,
    Remediated,
    Manual,
    Skipped,
}

impl Status {
    pub fn is_fail(&self) -> bool { matches!(self, Status::Fail) }
    pub fn is_error(&self) -> bool { matches!(self, Status::Error) }
}

/// Per-control outcome after the whole check/remediate/re-verify pipeline ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
    Remediated,
    FailedRemediation,
    Manual,
    Skipped,
}

impl Outcome {
    /// True when the outcome leaves the system out of compliance or unverifiable.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Outcome::Fail | Outcome::Error | Outcome::FailedRemediation)
    }
}

/// Immutable result of one control phase. Each phase produces a fresh value;
/// nothing patches a result in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResult {
    pub control_id: String,
    pub status: Status,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ControlResult {
    pub fn new(control_id: &str, status: Status, output: impl Into<String>) -> Self {
        Self { control_id: control_id.to_string(), status, output: output.into(), details: None }
    }

    pub fn pass(control_id: &str, output: impl Into<String>) -> Self {
        Self::new(control_id, Status::Pass, output)
    }

    pub fn fail(control_id: &str, output: impl Into<String>) -> Self {
        Self::new(control_id, Status::Fail, output)
    }

    pub fn error(control_id: &str, output: impl Into<String>) -> Self {
        Self::new(control_id, Status::Error, output)
    }

    pub fn remediated(control_id: &str, output: impl Into<String>) -> Self {
        Self::new(control_id, Status::Remediated, output)
    }

    pub fn manual(control_id: &str, output: impl Into<String>) -> Self {
        Self::new(control_id, Status::Manual, output)
    }

    pub fn skipped(control_id: &str, output: impl Into<String>) -> Self {
        Self::new(control_id, Status::Skipped, output)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// One benchmark requirement: a read-only audit plus an idempotent fix.
///
/// `check` must not mutate system state and only returns PASS, FAIL or ERROR;
/// any fault inside the audit (missing file, subprocess failure, parse error)
/// is converted to an ERROR result rather than raised. `remediate` may mutate
/// system state, must be safe to invoke on an already compliant system, and
/// returns REMEDIATED, ERROR or MANUAL (guidance text, no action taken).
pub trait Control: Send + Sync {
    fn id(&self) -> &str;
    fn title(&self) -> &str;
    fn description(&self) -> &str;
    fn check(&self, ctx: &RunContext) -> ControlResult;
    fn remediate(&self, ctx: &RunContext) -> ControlResult;

    /// Serialized form of the current audit result. Never mutates state.
    fn report(&self, ctx: &RunContext) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.check(ctx))
    }
}

/// Record of everything that happened to one control during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlOutcome {
    pub control_id: String,
    pub initial_check: ControlResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<ControlResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_check: Option<ControlResult>,
    pub overall_status: Outcome,
}
