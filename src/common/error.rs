//! Error types for the compose harness
//!
//! Every error maps onto one of four failure kinds so reports can tell a
//! broken bootstrap apart from a regression or a flaky cleanup.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Bootstrap Errors ===
    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    // === Command Errors ===
    #[error("Failed to spawn '{command}': {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Command '{command}' exited with code {exit_code}\n--- output ---\n{output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("Expectation failed: {expectation} on {stream}\n--- actual ---\n{actual}")]
    ExpectationFailed {
        expectation: String,
        stream: String,
        actual: String,
    },

    // === Convergence Errors ===
    #[error("{what} did not converge after {elapsed:?}; last observed: {}", .last_observed.as_deref().unwrap_or("nothing"))]
    ConvergenceTimeout {
        what: String,
        last_observed: Option<String>,
        elapsed: Duration,
    },

    // === Cleanup Errors ===
    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario file '{path}': {message}")]
    ScenarioParse { path: String, message: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === HTTP Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure taxonomy used when reporting step outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Setup could not produce a usable binary; fatal to the run
    BootstrapFailure,
    /// A command exited unexpectedly or its output missed an expectation
    CommandFailure,
    /// A poll loop ran out of time
    ConvergenceTimeout,
    /// A best-effort cleanup action failed; never escalated
    CleanupFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::BootstrapFailure => write!(f, "bootstrap failure"),
            FailureKind::CommandFailure => write!(f, "command failure"),
            FailureKind::ConvergenceTimeout => write!(f, "convergence timeout"),
            FailureKind::CleanupFailure => write!(f, "cleanup failure"),
        }
    }
}

impl Error {
    /// Classify this error for reporting
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Bootstrap(_) => FailureKind::BootstrapFailure,
            Error::ConvergenceTimeout { .. } => FailureKind::ConvergenceTimeout,
            Error::Cleanup(_) => FailureKind::CleanupFailure,
            _ => FailureKind::CommandFailure,
        }
    }

    /// Create a spawn error for a command line
    pub fn command_spawn(command: &str, source: io::Error) -> Self {
        Self::CommandSpawn {
            command: command.to_string(),
            source,
        }
    }

    /// Create an expectation failure
    pub fn expectation_failed(expectation: impl fmt::Display, stream: &str, actual: &str) -> Self {
        Self::ExpectationFailed {
            expectation: expectation.to_string(),
            stream: stream.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a scenario parse error
    pub fn scenario_parse(path: &std::path::Path, message: impl fmt::Display) -> Self {
        Self::ScenarioParse {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}
