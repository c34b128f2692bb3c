//! Step, scenario and suite reports

use std::time::Duration;

use crate::common::FailureKind;

use super::StepKind;

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Passed,
    Failed { kind: FailureKind, message: String },
    /// A best-effort or cleanup step failed; reported, never counted
    CleanupFailed { message: String },
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: String,
    pub kind: StepKind,
    pub outcome: StepOutcome,
    pub duration: Duration,
}

impl StepReport {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub project: String,
    pub steps: Vec<StepReport>,
    pub duration: Duration,
}

impl ScenarioReport {
    /// Report for a scenario whose task died before it could report
    pub(crate) fn aborted(name: String, project: String, reason: String) -> Self {
        Self {
            name,
            project,
            steps: vec![StepReport {
                name: "scenario task".to_string(),
                kind: StepKind::Regular,
                outcome: StepOutcome::Failed {
                    kind: FailureKind::CommandFailure,
                    message: format!("scenario task aborted: {reason}"),
                },
                duration: Duration::ZERO,
            }],
            duration: Duration::ZERO,
        }
    }

    /// True unless a regular step failed
    pub fn passed(&self) -> bool {
        !self.steps.iter().any(StepReport::failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.failed())
    }

    pub fn cleanup_failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::CleanupFailed { .. }))
    }
}

/// Reports of every scenario in a suite, in registration order
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    pub scenarios: Vec<ScenarioReport>,
    pub duration: Duration,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.scenarios.len() - self.passed_count()
    }

    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}
