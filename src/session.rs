//! Execution context bound to one CLI binary
//!
//! A session carries nothing but the binary location and the overrides a
//! scenario wants applied to every invocation. Cloning is cheap and sessions
//! are shared freely between concurrently running scenarios.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::common::Result;
use crate::runner::{self, CommandResult};

/// Isolated execution context for CLI invocations
#[derive(Debug, Clone)]
pub struct Session {
    binary_path: PathBuf,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl Session {
    /// Session for `binary_name` inside the bootstrap directory
    pub fn new(binary_dir: &Path, binary_name: &str) -> Self {
        Self::with_binary(binary_dir.join(binary_name))
    }

    /// Session for an explicit binary path
    pub fn with_binary(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// Run every command from `dir`
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set one environment variable for every command
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables for every command
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Run the CLI, failing on a non-zero exit
    pub async fn run<I, S>(&self, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        runner::run(self, collect_args(args)).await
    }

    /// Run the CLI, returning the result whatever the exit code
    pub async fn run_allowing_error<I, S>(&self, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        runner::run_allowing_error(self, collect_args(args)).await
    }
}

fn collect_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_joins_binary_dir() {
        let session = Session::new(Path::new("/tmp/bin"), "docker");
        assert_eq!(session.binary_path(), Path::new("/tmp/bin/docker"));
        assert!(session.working_dir().is_none());
        assert!(session.env().is_empty());
    }

    #[test]
    fn test_overrides_do_not_touch_base() {
        let base = Session::with_binary("/usr/bin/docker");
        let scoped = base
            .clone()
            .with_working_dir("fixtures/build-test")
            .with_env("COMPOSE_PROJECT_NAME", "demo")
            .with_envs([("DOCKER_BUILDKIT", "1")]);

        assert!(base.working_dir().is_none());
        assert!(base.env().is_empty());
        assert_eq!(scoped.working_dir(), Some(Path::new("fixtures/build-test")));
        assert_eq!(scoped.env().get("COMPOSE_PROJECT_NAME").unwrap(), "demo");
        assert_eq!(scoped.env().get("DOCKER_BUILDKIT").unwrap(), "1");
    }
}
