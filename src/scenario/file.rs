//! YAML scenario files
//!
//! A scenario file names its steps and the actions each step performs.
//! Strings may contain naming placeholders (`{project}`, `{container:web}`,
//! `{network:default}`, `{volume:data}`, `{image:nginx}`), expanded against
//! the scenario's project when the action runs.
//!
//! ```yaml
//! name: compose up
//! project: compose-e2e-demo
//! steps:
//!   - name: up
//!     actions:
//!       - action: run
//!         args: [compose, -f, ./fixtures/sentences/docker-compose.yaml, --project-name, "{project}", up, -d]
//!       - action: http_get
//!         url: http://localhost:80/words/noun
//!         expect:
//!           - contains: '"word":'
//! cleanup:
//!   - name: down
//!     actions:
//!       - action: run
//!         args: [compose, --project-name, "{project}", down]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::common::config::Config;
use crate::common::paths::resolve_relative;
use crate::common::{Error, Result};
use crate::inspect::{InspectKind, Mount};
use crate::naming::{NamingScheme, ProjectId};
use crate::poll::{self, CommandProbe, PollSpec};
use crate::runner::{Expectation, Matcher};
use crate::session::Session;

use super::{Scenario, ScenarioContext};

/// A scenario loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Name shown in reports
    pub name: String,
    /// What the scenario verifies
    pub description: Option<String>,
    /// Fixed project identifier; a unique one is generated when absent
    pub project: Option<String>,
    /// Directory commands run from, relative to the scenario file
    pub working_dir: Option<PathBuf>,
    /// Extra environment for every command
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
    /// Deferred steps, run last and in reverse order
    #[serde(default)]
    pub cleanup: Vec<StepDef>,

    #[serde(skip)]
    source: PathBuf,
}

/// One named step
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct StepDef {
    pub name: String,
    /// Record a failure without failing the scenario
    #[serde(default)]
    pub best_effort: bool,
    pub actions: Vec<Action>,
}

/// A single action within a step
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Invoke the CLI once
    Run {
        args: Vec<String>,
        /// Accept any exit code
        #[serde(default)]
        allow_error: bool,
        /// Require this exit code (implies `allow_error`)
        exit_code: Option<i32>,
        #[serde(default)]
        expect: Vec<Expectation>,
    },
    /// GET a URL until it answers `status`, then check the body
    HttpGet {
        url: String,
        #[serde(default = "default_status")]
        status: u16,
        interval_ms: Option<u64>,
        timeout_secs: Option<u64>,
        #[serde(default)]
        expect: Vec<Matcher>,
    },
    /// Re-run a command until its output satisfies `expect`
    WaitFor {
        args: Vec<String>,
        expect: Expectation,
        interval_ms: Option<u64>,
        timeout_secs: Option<u64>,
    },
    /// Inspect an object and check its labels; a null value only requires the key
    InspectLabels {
        target: String,
        #[serde(default)]
        kind: InspectKind,
        labels: BTreeMap<String, Option<String>>,
    },
    /// Inspect a container and check its mounts
    InspectMounts { target: String, mounts: Vec<Mount> },
}

fn default_status() -> u16 {
    200
}

impl ScenarioFile {
    /// Read and validate a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let mut file = Self::parse(&content).map_err(|e| Error::scenario_parse(path, e))?;
        file.source = path.to_path_buf();
        debug!(path = %path.display(), name = %file.name, "Loaded scenario");
        Ok(file)
    }

    /// Parse and validate scenario YAML
    pub fn parse(content: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("invalid scenario: {e}")))?;
        file.validate()?;
        Ok(file)
    }

    /// Check everything that can be checked without running
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("scenario name must not be empty".into()));
        }
        if let Some(project) = &self.project {
            ProjectId::new(project.as_str())?;
        }

        // Placeholders are checked against a throwaway project
        let naming = NamingScheme::default();
        for step in self.steps.iter().chain(&self.cleanup) {
            if step.actions.is_empty() {
                return Err(Error::Config(format!("step '{}' has no actions", step.name)));
            }
            for action in &step.actions {
                action
                    .validate(naming)
                    .map_err(|e| Error::Config(format!("step '{}': {e}", step.name)))?;
            }
        }
        Ok(())
    }

    /// Directory relative paths in this file are resolved against
    pub fn base_dir(&self) -> &Path {
        match self.source.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Bind this file to a session and turn it into a runnable scenario
    pub fn into_scenario(self, session: &Session, config: &Config) -> Result<Scenario> {
        let project = match &self.project {
            Some(id) => ProjectId::new(id.as_str())?,
            None => ProjectId::generate(&self.name),
        };
        let working_dir = match &self.working_dir {
            Some(dir) => resolve_relative(self.base_dir(), dir),
            None => self.base_dir().to_path_buf(),
        };
        let session = session
            .clone()
            .with_working_dir(working_dir)
            .with_envs(self.env);

        let mut scenario = Scenario::new(self.name, session, project)
            .naming(config.naming.scheme())
            .poll(config.poll.spec());

        for step in self.steps {
            let actions = step.actions;
            let run = move |ctx: Arc<ScenarioContext>| execute_all(ctx, actions);
            scenario = if step.best_effort {
                scenario.best_effort(step.name, run)
            } else {
                scenario.step(step.name, run)
            };
        }
        for step in self.cleanup {
            let actions = step.actions;
            scenario = scenario.cleanup(step.name, move |ctx| execute_all(ctx, actions));
        }
        Ok(scenario)
    }
}

impl Action {
    fn validate(&self, naming: NamingScheme) -> Result<()> {
        let check = |s: &str| naming.expand(s, "validate").map(drop);
        match self {
            Action::Run { args, expect, .. } => {
                if args.is_empty() {
                    return Err(Error::Config("run action needs at least one argument".into()));
                }
                args.iter().try_for_each(|a| check(a.as_str()))?;
                for e in expect {
                    e.matcher.map_operand(|s| naming.expand(s, "validate"))?;
                    validate_pattern(&e.matcher)?;
                }
            }
            Action::HttpGet { url, expect, .. } => {
                check(url.as_str())?;
                for m in expect {
                    m.map_operand(|s| naming.expand(s, "validate"))?;
                    validate_pattern(m)?;
                }
            }
            Action::WaitFor { args, expect, .. } => {
                if args.is_empty() {
                    return Err(Error::Config("wait_for action needs at least one argument".into()));
                }
                args.iter().try_for_each(|a| check(a.as_str()))?;
                expect.matcher.map_operand(|s| naming.expand(s, "validate"))?;
                validate_pattern(&expect.matcher)?;
            }
            Action::InspectLabels { target, labels, .. } => {
                check(target.as_str())?;
                for value in labels.values().flatten() {
                    check(value.as_str())?;
                }
            }
            Action::InspectMounts { target, mounts } => {
                check(target.as_str())?;
                for source in mounts.iter().filter_map(|m| m.source.as_deref()) {
                    check(source)?;
                }
            }
        }
        Ok(())
    }
}

fn validate_pattern(matcher: &Matcher) -> Result<()> {
    if let Matcher::Matches(pattern) = matcher {
        regex::Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid pattern /{pattern}/: {e}")))?;
    }
    Ok(())
}

async fn execute_all(ctx: Arc<ScenarioContext>, actions: Vec<Action>) -> Result<()> {
    for action in &actions {
        execute(&ctx, action).await?;
    }
    Ok(())
}

fn poll_spec(base: PollSpec, interval_ms: Option<u64>, timeout_secs: Option<u64>) -> PollSpec {
    let mut spec = base;
    if let Some(ms) = interval_ms {
        spec = spec.with_interval(Duration::from_millis(ms));
    }
    if let Some(secs) = timeout_secs {
        spec = spec.with_timeout(Duration::from_secs(secs));
    }
    spec
}

fn expand_all(ctx: &ScenarioContext, values: &[String]) -> Result<Vec<String>> {
    values.iter().map(|v| ctx.expand(v)).collect()
}

async fn execute(ctx: &ScenarioContext, action: &Action) -> Result<()> {
    match action {
        Action::Run {
            args,
            allow_error,
            exit_code,
            expect,
        } => {
            let args = expand_all(ctx, args)?;
            let result = if *allow_error || exit_code.is_some() {
                ctx.run_allowing_error(args).await?
            } else {
                ctx.run(args).await?
            };
            if let Some(code) = exit_code {
                result.assert_exit_code(*code)?;
            }
            for expectation in expect {
                let matcher = expectation.matcher.map_operand(|s| ctx.expand(s))?;
                result.assert(&Expectation::new(expectation.stream, matcher))?;
            }
        }

        Action::HttpGet {
            url,
            status,
            interval_ms,
            timeout_secs,
            expect,
        } => {
            let url = ctx.expand(url)?;
            let spec = poll_spec(ctx.poll_spec(), *interval_ms, *timeout_secs);
            let body = poll::http_get_with_retry(&url, *status, spec).await?;
            let subject = format!("body of GET {url}");
            for matcher in expect {
                matcher.map_operand(|s| ctx.expand(s))?.check(&subject, &body)?;
            }
        }

        Action::WaitFor {
            args,
            expect,
            interval_ms,
            timeout_secs,
        } => {
            let args = expand_all(ctx, args)?;
            let matcher = expect.matcher.map_operand(|s| ctx.expand(s))?;
            let probe = CommandProbe::new(
                ctx.session().clone(),
                args,
                Expectation::new(expect.stream, matcher),
            )?;
            let spec = poll_spec(ctx.poll_spec(), *interval_ms, *timeout_secs);
            poll::poll_probe(&probe, spec).await?;
        }

        Action::InspectLabels {
            target,
            kind,
            labels,
        } => {
            let target = ctx.expand(target)?;
            let mut expected = BTreeMap::new();
            for (key, value) in labels {
                let value = value.as_deref().map(|v| ctx.expand(v)).transpose()?;
                expected.insert(key.clone(), value);
            }
            ctx.inspect(*kind, &target).await?.expect_labels(&expected)?;
        }

        Action::InspectMounts { target, mounts } => {
            let target = ctx.expand(target)?;
            let mut expected = Vec::with_capacity(mounts.len());
            for mount in mounts {
                let mut mount = mount.clone();
                mount.source = mount.source.as_deref().map(|s| ctx.expand(s)).transpose()?;
                expected.push(mount);
            }
            ctx.inspect(InspectKind::Container, &target)
                .await?
                .expect_mounts(&expected)?;
        }
    }
    Ok(())
}
