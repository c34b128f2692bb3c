//! Harness bootstrap
//!
//! Produces the CLI binary the scenarios run against, either by running a
//! build command or by locating an existing executable, and stages it in a
//! private temporary directory. Every failure here is a bootstrap failure
//! and stops the run before any scenario starts.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::common::config::{BinaryConfig, Config};
use crate::common::paths::resolve_relative;
use crate::common::{display_command, Error, Result};
use crate::scenario::{Suite, SuiteReport};
use crate::session::Session;

/// Where the staged binary lives
#[derive(Debug, Clone)]
pub struct BinaryLocation {
    dir: PathBuf,
    name: String,
}

impl BinaryLocation {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// A fresh session for the staged binary
    pub fn session(&self) -> Session {
        Session::new(&self.dir, &self.name)
    }
}

/// Removes the staging directory
///
/// Dropping a teardown without running it removes the directory as well.
#[derive(Debug)]
pub struct Teardown {
    staging: Option<TempDir>,
}

impl Teardown {
    pub fn run(mut self) -> Result<()> {
        if let Some(staging) = self.staging.take() {
            let path = staging.path().to_path_buf();
            staging.close().map_err(|e| {
                Error::Cleanup(format!("failed to remove {}: {e}", path.display()))
            })?;
            debug!(path = %path.display(), "Removed staging directory");
        }
        Ok(())
    }
}

/// Build or locate the CLI binary and stage it
pub async fn setup(config: &BinaryConfig) -> Result<(BinaryLocation, Teardown)> {
    let source = if config.build_command.is_empty() {
        locate(config)?
    } else {
        build(config).await?
    };
    stage(&source, &config.name)
}

/// Find an existing binary in `dir` or on PATH
pub fn locate(config: &BinaryConfig) -> Result<PathBuf> {
    let path = match &config.dir {
        Some(dir) => dir.join(&config.name),
        None => which::which(&config.name).map_err(|e| {
            Error::Bootstrap(format!("'{}' not found on PATH: {e}", config.name))
        })?,
    };
    if !path.is_file() {
        return Err(Error::Bootstrap(format!(
            "binary not found at {}",
            path.display()
        )));
    }
    Ok(path)
}

async fn build(config: &BinaryConfig) -> Result<PathBuf> {
    let Some((program, args)) = config.build_command.split_first() else {
        return Err(Error::Bootstrap("build command is empty".into()));
    };
    let build_dir = config.build_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let command = display_command(program, args);
    info!(command = %command, dir = %build_dir.display(), "Building CLI binary");

    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(&build_dir)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| Error::Bootstrap(format!("failed to run '{command}': {e}")))?;

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
        return Err(Error::Bootstrap(format!(
            "'{command}' exited with {code}\n{}",
            String::from_utf8_lossy(&output.stderr).trim_end()
        )));
    }

    let output_dir = match &config.build_output {
        Some(dir) => resolve_relative(&build_dir, dir),
        None => build_dir,
    };
    let binary = output_dir.join(&config.name);
    if !binary.is_file() {
        return Err(Error::Bootstrap(format!(
            "build succeeded but {} does not exist",
            binary.display()
        )));
    }
    Ok(binary)
}

fn stage(source: &Path, name: &str) -> Result<(BinaryLocation, Teardown)> {
    let source = source
        .canonicalize()
        .map_err(|e| Error::Bootstrap(format!("cannot resolve {}: {e}", source.display())))?;
    let staging = tempfile::Builder::new()
        .prefix("compose-e2e-")
        .tempdir()
        .map_err(|e| Error::Bootstrap(format!("cannot create staging directory: {e}")))?;
    let target = staging.path().join(name);

    link_or_copy(&source, &target).map_err(|e| {
        Error::Bootstrap(format!(
            "cannot stage {} into {}: {e}",
            source.display(),
            staging.path().display()
        ))
    })?;
    debug!(source = %source.display(), target = %target.display(), "Staged binary");

    let location = BinaryLocation {
        dir: staging.path().to_path_buf(),
        name: name.to_string(),
    };
    Ok((
        location,
        Teardown {
            staging: Some(staging),
        },
    ))
}

#[cfg(unix)]
fn link_or_copy(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(not(unix))]
fn link_or_copy(source: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::copy(source, target).map(drop)
}

/// Bootstrap, run a suite and tear down
pub struct Harness {
    config: Config,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Set up the binary, build the suite against it, run it and tear down
    ///
    /// Teardown runs whether or not the suite could be built.
    pub async fn run<F>(&self, build_suite: F) -> Result<SuiteReport>
    where
        F: FnOnce(&BinaryLocation) -> Result<Suite>,
    {
        let (location, teardown) = setup(&self.config.binary).await?;
        info!(binary = %location.path().display(), "Harness ready");

        let report = match build_suite(&location) {
            Ok(suite) => Ok(suite.run().await),
            Err(e) => Err(e),
        };

        if let Err(e) = teardown.run() {
            warn!(error = %e, "Teardown failed");
        }
        report
    }
}
