//! Command runner
//!
//! Executes one CLI invocation to completion and captures stdout, stderr and
//! the combined stream in the order the child wrote it. Assertions over the
//! captured text return errors instead of panicking so the orchestrator can
//! record them against the step that issued the command.

use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

use crate::common::{display_command, Error, Result};
use crate::session::Session;

/// Which captured stream an expectation applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Stdout,
    Stderr,
    #[default]
    Combined,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
            Stream::Combined => write!(f, "combined output"),
        }
    }
}

/// Predicate over captured text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// Text contains the substring
    Contains(String),
    /// Text does not contain the substring
    NotContains(String),
    /// Text equals the value after trimming trailing whitespace
    Equals(String),
    /// Text matches the regular expression
    Matches(String),
}

impl Matcher {
    /// Evaluate against `text`; an invalid regex is reported as `Err`
    pub fn evaluate(&self, text: &str) -> std::result::Result<bool, String> {
        match self {
            Matcher::Contains(s) => Ok(text.contains(s.as_str())),
            Matcher::NotContains(s) => Ok(!text.contains(s.as_str())),
            Matcher::Equals(s) => Ok(text.trim_end() == s.trim_end()),
            Matcher::Matches(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(text))
                .map_err(|e| format!("invalid pattern /{pattern}/: {e}")),
        }
    }

    /// Check `text`, naming `subject` in the failure
    pub fn check(&self, subject: &str, text: &str) -> Result<()> {
        match self.evaluate(text) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::expectation_failed(self, subject, text)),
            Err(reason) => Err(Error::expectation_failed(
                format!("{self} ({reason})"),
                subject,
                text,
            )),
        }
    }

    /// Rewrite the operand, e.g. to expand placeholders
    pub fn map_operand(&self, f: impl FnOnce(&str) -> Result<String>) -> Result<Self> {
        Ok(match self {
            Matcher::Contains(s) => Matcher::Contains(f(s)?),
            Matcher::NotContains(s) => Matcher::NotContains(f(s)?),
            Matcher::Equals(s) => Matcher::Equals(f(s)?),
            Matcher::Matches(s) => Matcher::Matches(f(s)?),
        })
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Contains(s) => write!(f, "contains {s:?}"),
            Matcher::NotContains(s) => write!(f, "does not contain {s:?}"),
            Matcher::Equals(s) => write!(f, "equals {s:?}"),
            Matcher::Matches(s) => write!(f, "matches /{s}/"),
        }
    }
}

/// A matcher bound to one output stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(default)]
    pub stream: Stream,
    #[serde(flatten)]
    pub matcher: Matcher,
}

impl Expectation {
    pub fn new(stream: Stream, matcher: Matcher) -> Self {
        Self { stream, matcher }
    }

    /// Combined output contains `s`
    pub fn contains(s: impl Into<String>) -> Self {
        Self::new(Stream::Combined, Matcher::Contains(s.into()))
    }

    /// Combined output does not contain `s`
    pub fn not_contains(s: impl Into<String>) -> Self {
        Self::new(Stream::Combined, Matcher::NotContains(s.into()))
    }

    /// Apply to a different stream
    pub fn on(mut self, stream: Stream) -> Self {
        self.stream = stream;
        self
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.stream, self.matcher)
    }
}

/// Outcome of a single CLI invocation
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Rendered command line
    pub command: String,
    /// Exit code, -1 if the process died from a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// stdout and stderr interleaved in arrival order
    pub combined: String,
    pub duration: Duration,
}

impl CommandResult {
    /// Whether the command exited with 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Select a captured stream
    pub fn stream(&self, stream: Stream) -> &str {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
            Stream::Combined => &self.combined,
        }
    }

    /// Check one expectation against the selected stream
    pub fn assert(&self, expectation: &Expectation) -> Result<()> {
        let subject = format!("{} of '{}'", expectation.stream, self.command);
        expectation
            .matcher
            .check(&subject, self.stream(expectation.stream))
    }

    /// Check expectations in order, stopping at the first failure
    pub fn assert_all(&self, expectations: &[Expectation]) -> Result<()> {
        expectations.iter().try_for_each(|e| self.assert(e))
    }

    /// Check the exit code
    pub fn assert_exit_code(&self, expected: i32) -> Result<()> {
        if self.exit_code == expected {
            return Ok(());
        }
        Err(Error::expectation_failed(
            format!("exit code {expected} (got {})", self.exit_code),
            &format!("'{}'", self.command),
            &self.combined,
        ))
    }
}

/// Run the session's binary with `args`, failing on a non-zero exit
pub async fn run(session: &Session, args: Vec<String>) -> Result<CommandResult> {
    let result = run_allowing_error(session, args).await?;
    if !result.success() {
        return Err(Error::CommandFailed {
            command: result.command,
            exit_code: result.exit_code,
            output: result.combined,
        });
    }
    Ok(result)
}

/// Run the session's binary with `args` and report any exit code as-is
///
/// Only a failure to spawn the process is an error.
pub async fn run_allowing_error(session: &Session, args: Vec<String>) -> Result<CommandResult> {
    let program = session.binary_path().display().to_string();
    let command = display_command(&program, &args);
    debug!(command = %command, cwd = ?session.working_dir(), "Running command");

    let mut cmd = Command::new(session.binary_path());
    cmd.args(&args)
        .envs(session.env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = session.working_dir() {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| Error::command_spawn(&command, e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Internal("child stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Internal("child stderr was not captured".to_string()))?;

    let captured = capture(stdout, stderr).await?;
    let status = child.wait().await?;
    let duration = start.elapsed();
    let exit_code = status.code().unwrap_or(-1);

    debug!(command = %command, exit_code, ?duration, "Command finished");

    Ok(CommandResult {
        command,
        exit_code,
        stdout: String::from_utf8_lossy(&captured.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
        combined: String::from_utf8_lossy(&captured.combined).into_owned(),
        duration,
    })
}

#[derive(Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    combined: Vec<u8>,
}

/// Drain both pipes until EOF, recording chunks in arrival order
async fn capture<O, E>(mut stdout: O, mut stderr: E) -> io::Result<Captured>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => {
                match read? {
                    0 => out_open = false,
                    n => {
                        captured.stdout.extend_from_slice(&out_buf[..n]);
                        captured.combined.extend_from_slice(&out_buf[..n]);
                    }
                }
            }
            read = stderr.read(&mut err_buf), if err_open => {
                match read? {
                    0 => err_open = false,
                    n => {
                        captured.stderr.extend_from_slice(&err_buf[..n]);
                        captured.combined.extend_from_slice(&err_buf[..n]);
                    }
                }
            }
        }
    }

    Ok(captured)
}
