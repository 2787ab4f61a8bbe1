use crate::model::{ControlOutcome, Outcome, Status};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use sysinfo::System;

/// Aggregate verdict for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub counts: BTreeMap<Outcome, usize>,
    pub overall: RunStatus,
}

impl Summary {
    pub fn of(outcomes: &[ControlOutcome]) -> Self {
        let mut counts = BTreeMap::new();
        for outcome in outcomes {
            *counts.entry(outcome.overall_status).or_insert(0) += 1;
        }
        let overall = if outcomes.iter().any(|o| o.overall_status.is_outstanding()) {
            RunStatus::Fail
        } else {
            RunStatus::Pass
        };
        Self { total: outcomes.len(), counts, overall }
    }
}

/// The orchestrator's output: one ordered outcome record per registered
/// control plus the folded summary. Field and map ordering are stable, so
/// identical runs serialize to identical bytes and reports diff cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub summary: Summary,
    pub controls: Vec<ControlOutcome>,
}

impl RunReport {
    pub fn from_outcomes(controls: Vec<ControlOutcome>) -> Self {
        Self {
            hostname: System::host_name(),
            os: System::long_os_version(),
            summary: Summary::of(&controls),
            controls,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
            Status::Remediated => "REMEDIATED",
            Status::Manual => "MANUAL",
            Status::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Error => "ERROR",
            Outcome::Remediated => "REMEDIATED",
            Outcome::FailedRemediation => "FAILED_REMEDIATION",
            Outcome::Manual => "MANUAL",
            Outcome::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Pass => "PASS",
            RunStatus::Fail => "FAIL",
        })
    }
}

#[derive(Clone, Copy)]
pub enum OutputFormat { Text, Json }

pub struct Reporter {
    verbose: bool,
    format: OutputFormat,
}

impl Reporter {
    pub fn new(verbose: bool, format: OutputFormat) -> Self { Self { verbose, format } }

    pub fn print(&self, report: &RunReport) {
        match self.format {
            OutputFormat::Text => self.print_text(report),
            OutputFormat::Json => self.print_json(report),
        }
    }

    fn print_text(&self, report: &RunReport) {
        println!("NGINX CIS Benchmark Audit");
        println!("=========================");
        if let Some(hostname) = &report.hostname {
            println!("host: {}", hostname);
        }
        println!();
        for outcome in &report.controls {
            if !self.verbose
                && matches!(outcome.overall_status, Outcome::Pass | Outcome::Skipped)
            {
                continue;
            }
            println!("[{}] {}", outcome.overall_status, outcome.control_id);
            print_result("check", &outcome.initial_check.output);
            if let Some(remediation) = &outcome.remediation {
                print_result("remediation", &remediation.output);
            }
            if let Some(final_check) = &outcome.final_check {
                print_result("re-check", &final_check.output);
            }
            println!();
        }
        let counts = report
            .summary
            .counts
            .iter()
            .map(|(status, n)| format!("{}={}", status, n))
            .collect::<Vec<_>>()
            .join(", ");
        println!("Summary: {} ({} controls)", counts, report.summary.total);
        println!("Overall: {}", report.summary.overall);
    }

    fn print_json(&self, report: &RunReport) {
        println!("{}", serde_json::to_string_pretty(report).unwrap());
    }
}

fn print_result(label: &str, output: &str) {
    if output.is_empty() {
        return;
    }
    let mut lines = output.lines();
    if let Some(first) = lines.next() {
        println!("  {}: {}", label, first);
    }
    for line in lines {
        println!("    {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ControlResult;

    fn outcome(id: &str, overall: Outcome) -> ControlOutcome {
        ControlOutcome {
            control_id: id.to_string(),
            initial_check: ControlResult::new(
                id,
                match overall {
                    Outcome::Pass | Outcome::Skipped => Status::Pass,
                    Outcome::Error => Status::Error,
                    _ => Status::Fail,
                },
                "details",
            ),
            remediation: None,
            final_check: None,
            overall_status: overall,
        }
    }

    #[test]
    fn summary_counts_by_outcome() {
        let outcomes = vec![
            outcome("1.1.1", Outcome::Pass),
            outcome("1.1.2", Outcome::Pass),
            outcome("1.2.1", Outcome::Fail),
            outcome("2.1.1", Outcome::Manual),
            outcome("2.1.2", Outcome::Remediated),
        ];
        let summary = Summary::of(&outcomes);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.counts[&Outcome::Pass], 2);
        assert_eq!(summary.counts[&Outcome::Fail], 1);
        assert_eq!(summary.counts[&Outcome::Manual], 1);
        assert_eq!(summary.counts[&Outcome::Remediated], 1);
        assert_eq!(summary.overall, RunStatus::Fail);
    }

    #[test]
    fn run_passes_with_only_benign_outcomes() {
        let outcomes = vec![
            outcome("1.1.1", Outcome::Pass),
            outcome("2.1.1", Outcome::Manual),
            outcome("2.1.2", Outcome::Remediated),
            outcome("2.4.1", Outcome::Skipped),
        ];
        assert_eq!(Summary::of(&outcomes).overall, RunStatus::Pass);
    }

    #[test]
    fn run_fails_on_error_or_failed_remediation() {
        for bad in [Outcome::Error, Outcome::FailedRemediation, Outcome::Fail] {
            let outcomes = vec![outcome("1.1.1", Outcome::Pass), outcome("1.1.2", bad)];
            assert_eq!(Summary::of(&outcomes).overall, RunStatus::Fail);
        }
    }

    #[test]
    fn identical_outcomes_serialize_to_identical_bytes() {
        let outcomes = vec![outcome("1.1.1", Outcome::Pass), outcome("1.2.1", Outcome::Fail)];
        let a = RunReport::from_outcomes(outcomes.clone());
        let b = RunReport::from_outcomes(outcomes);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = RunReport::from_outcomes(vec![
            outcome("1.1.1", Outcome::Pass),
            outcome("2.4.3", Outcome::FailedRemediation),
        ]);
        let json = serde_json::to_string(&report).unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn empty_run_passes() {
        let summary = Summary::of(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.overall, RunStatus::Pass);
        assert!(summary.counts.is_empty());
    }
}
