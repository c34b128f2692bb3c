//! Scenario orchestration
//!
//! A scenario is an ordered list of named steps bound to one project
//! identifier. Regular steps run in order and a failing step does not stop
//! the ones after it. Cleanup steps are deferred: they run after every
//! regular step, in reverse registration order, whatever happened before.
//! Best-effort and cleanup failures are reported but never fail the scenario.

pub mod file;
mod outcome;
mod suite;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::common::{FailureKind, Result};
use crate::inspect::{self, InspectKind, InspectObject};
use crate::naming::{NamingScheme, ProjectId};
use crate::poll::{self, CommandProbe, PollSpec};
use crate::runner::{CommandResult, Expectation};
use crate::session::Session;

pub use outcome::{ScenarioReport, StepOutcome, StepReport, SuiteReport};
pub use suite::Suite;

/// How a step's failure is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Failure fails the scenario
    Regular,
    /// Failure is recorded and ignored
    BestEffort,
    /// Deferred until the end; failure is recorded and ignored
    Cleanup,
}

type StepFn = Box<dyn FnOnce(Arc<ScenarioContext>) -> BoxFuture<'static, Result<()>> + Send>;

struct Step {
    name: String,
    kind: StepKind,
    action: StepFn,
}

/// Everything a step can reach: the session, the project and the defaults
/// for polling and naming
#[derive(Debug)]
pub struct ScenarioContext {
    scenario: String,
    session: Session,
    project: ProjectId,
    naming: NamingScheme,
    poll: PollSpec,
}

impl ScenarioContext {
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    pub fn naming(&self) -> NamingScheme {
        self.naming
    }

    pub fn poll_spec(&self) -> PollSpec {
        self.poll
    }

    /// Run the CLI, failing on a non-zero exit
    pub async fn run<I, S>(&self, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session.run(args).await
    }

    /// Run the CLI and hand back the result whatever the exit code
    pub async fn run_allowing_error<I, S>(&self, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session.run_allowing_error(args).await
    }

    /// GET `url` until it answers `status`, using the scenario poll defaults
    pub async fn http_get(&self, url: &str, status: u16) -> Result<String> {
        poll::http_get_with_retry(url, status, self.poll).await
    }

    /// Re-run a command until its output satisfies `expectation`
    pub async fn wait_for<I, S>(&self, args: I, expectation: Expectation) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = args.into_iter().map(Into::into).collect();
        let probe = CommandProbe::new(self.session.clone(), args, expectation)?;
        poll::poll_probe(&probe, self.poll).await
    }

    pub async fn inspect(&self, kind: InspectKind, name: &str) -> Result<InspectObject> {
        inspect::inspect(&self.session, kind, name).await
    }

    pub fn container_name(&self, service: &str, index: u32) -> String {
        self.naming
            .container_name(self.project.as_str(), service, index)
    }

    pub fn network_name(&self, network: &str) -> String {
        self.naming.network_name(self.project.as_str(), network)
    }

    pub fn volume_name(&self, volume: &str) -> String {
        self.naming.volume_name(self.project.as_str(), volume)
    }

    pub fn image_name(&self, service: &str) -> String {
        self.naming.image_name(self.project.as_str(), service)
    }

    /// Expand `{project}`, `{container:web}` and friends for this project
    pub fn expand(&self, input: &str) -> Result<String> {
        self.naming.expand(input, self.project.as_str())
    }
}

/// An ordered list of steps bound to one project
pub struct Scenario {
    name: String,
    session: Session,
    project: ProjectId,
    naming: NamingScheme,
    poll: PollSpec,
    steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, session: Session, project: ProjectId) -> Self {
        Self {
            name: name.into(),
            session,
            project,
            naming: NamingScheme::default(),
            poll: PollSpec::default(),
            steps: Vec::new(),
        }
    }

    pub fn naming(mut self, naming: NamingScheme) -> Self {
        self.naming = naming;
        self
    }

    /// Default interval and timeout for every poll in this scenario
    pub fn poll(mut self, spec: PollSpec) -> Self {
        self.poll = spec;
        self
    }

    /// Add a step whose failure fails the scenario
    pub fn step<F, Fut>(self, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(Arc<ScenarioContext>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push(name.into(), StepKind::Regular, action)
    }

    /// Add a step whose failure is only recorded
    pub fn best_effort<F, Fut>(self, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(Arc<ScenarioContext>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push(name.into(), StepKind::BestEffort, action)
    }

    /// Register a cleanup; cleanups run last, most recent first
    pub fn cleanup<F, Fut>(self, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(Arc<ScenarioContext>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push(name.into(), StepKind::Cleanup, action)
    }

    fn push<F, Fut>(mut self, name: String, kind: StepKind, action: F) -> Self
    where
        F: FnOnce(Arc<ScenarioContext>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // The closure is invoked inside the boxed future so a panic while
        // building the step future is caught with the rest of the step.
        let action: StepFn = Box::new(move |ctx| async move { action(ctx).await }.boxed());
        self.steps.push(Step { name, kind, action });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step and report what happened
    pub async fn run(self) -> ScenarioReport {
        let start = Instant::now();
        let ctx = Arc::new(ScenarioContext {
            scenario: self.name.clone(),
            session: self.session,
            project: self.project,
            naming: self.naming,
            poll: self.poll,
        });

        info!(scenario = %self.name, project = %ctx.project, "Starting scenario");

        let (cleanups, steps): (Vec<Step>, Vec<Step>) = self
            .steps
            .into_iter()
            .partition(|step| step.kind == StepKind::Cleanup);

        let mut reports = Vec::with_capacity(steps.len() + cleanups.len());
        for step in steps {
            reports.push(run_step(&ctx, step).await);
        }
        for step in cleanups.into_iter().rev() {
            reports.push(run_step(&ctx, step).await);
        }

        let report = ScenarioReport {
            name: self.name,
            project: ctx.project.to_string(),
            steps: reports,
            duration: start.elapsed(),
        };
        info!(
            scenario = %report.name,
            passed = report.passed(),
            elapsed = ?report.duration,
            "Scenario finished"
        );
        report
    }
}

async fn run_step(ctx: &Arc<ScenarioContext>, step: Step) -> StepReport {
    let start = Instant::now();
    debug!(scenario = %ctx.scenario, step = %step.name, kind = ?step.kind, "Running step");

    let result = AssertUnwindSafe((step.action)(ctx.clone()))
        .catch_unwind()
        .await;

    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some((e.kind(), e.to_string())),
        Err(payload) => Some((
            FailureKind::CommandFailure,
            format!("step panicked: {}", panic_message(payload.as_ref())),
        )),
    };

    let outcome = match (error, step.kind) {
        (None, _) => StepOutcome::Passed,
        (Some((kind, message)), StepKind::Regular) => {
            warn!(scenario = %ctx.scenario, step = %step.name, %kind, "Step failed");
            StepOutcome::Failed { kind, message }
        }
        (Some((_, message)), StepKind::BestEffort | StepKind::Cleanup) => {
            warn!(scenario = %ctx.scenario, step = %step.name, error = %message, "Cleanup failed");
            StepOutcome::CleanupFailed { message }
        }
    };

    StepReport {
        name: step.name,
        kind: step.kind,
        outcome,
        duration: start.elapsed(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
