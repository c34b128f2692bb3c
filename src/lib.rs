//! compose-e2e - an end-to-end harness for container-orchestration CLIs
//!
//! Drives a compose-style CLI binary through scenarios: runs commands,
//! polls HTTP endpoints and command output until they converge, inspects
//! containers, networks, volumes and images, and always runs cleanup.
//! Every scenario owns a project identifier so scenarios can run
//! concurrently without touching each other's resources.

pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod common;
pub mod inspect;
pub mod naming;
pub mod poll;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod session;

// Re-export commonly used types
pub use bootstrap::{BinaryLocation, Harness, Teardown};
pub use common::{Error, FailureKind, Result};
pub use naming::{NamingScheme, ProjectId};
pub use poll::{PollSpec, ProbeOutcome};
pub use runner::{CommandResult, Expectation, Matcher, Stream};
pub use scenario::{Scenario, ScenarioContext, ScenarioReport, Suite, SuiteReport};
pub use session::Session;
