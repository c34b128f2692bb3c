//! Typed views over `inspect` output
//!
//! The CLI prints inspected objects as a JSON array. Parsing labels and
//! mounts into records keeps assertions independent of whitespace and key
//! order in the printed JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::session::Session;

/// Kind of object to inspect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectKind {
    #[default]
    Container,
    Network,
    Volume,
    Image,
}

impl InspectKind {
    /// CLI arguments that print the object as JSON
    pub fn command_args(&self, name: &str) -> Vec<String> {
        let mut args: Vec<String> = match self {
            InspectKind::Container => vec!["inspect".into()],
            InspectKind::Network => vec!["network".into(), "inspect".into()],
            InspectKind::Volume => vec!["volume".into(), "inspect".into()],
            InspectKind::Image => vec!["image".into(), "inspect".into()],
        };
        args.push(name.to_string());
        args
    }
}

impl fmt::Display for InspectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectKind::Container => write!(f, "container"),
            InspectKind::Network => write!(f, "network"),
            InspectKind::Volume => write!(f, "volume"),
            InspectKind::Image => write!(f, "image"),
        }
    }
}

/// A mount attached to a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    #[serde(rename = "Type", alias = "type")]
    pub kind: String,
    #[serde(rename = "Source", alias = "source", default)]
    pub source: Option<String>,
    #[serde(rename = "Target", alias = "target")]
    pub target: String,
    #[serde(rename = "ReadOnly", alias = "read_only", default)]
    pub read_only: Option<bool>,
}

impl Mount {
    /// Whether `actual` satisfies this mount; unset fields match anything
    pub fn matches(&self, actual: &Mount) -> bool {
        self.kind == actual.kind
            && self.target == actual.target
            && self
                .source
                .as_ref()
                .map_or(true, |s| actual.source.as_ref() == Some(s))
            && self
                .read_only
                .map_or(true, |ro| actual.read_only.unwrap_or(false) == ro)
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.kind)?;
        if let Some(source) = &self.source {
            write!(f, "{source}:")?;
        }
        write!(f, "{}", self.target)?;
        if self.read_only == Some(true) {
            write!(f, " (ro)")?;
        }
        Ok(())
    }
}

/// Labels and mounts of one inspected object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectObject {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawObject {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    config: Option<RawConfig>,
    #[serde(default)]
    host_config: Option<RawHostConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawConfig {
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawHostConfig {
    #[serde(default)]
    mounts: Option<Vec<Mount>>,
}

impl From<RawObject> for InspectObject {
    fn from(raw: RawObject) -> Self {
        let name = raw
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .or_else(|| raw.repo_tags.and_then(|tags| tags.into_iter().next()))
            .unwrap_or_default();
        let labels = raw
            .config
            .and_then(|c| c.labels)
            .or(raw.labels)
            .unwrap_or_default();
        let mounts = raw
            .host_config
            .and_then(|h| h.mounts)
            .unwrap_or_default();
        Self {
            name,
            labels,
            mounts,
        }
    }
}

/// Parse the JSON array printed by an `inspect` subcommand
pub fn parse_objects(json: &str) -> Result<Vec<InspectObject>> {
    let raw: Vec<RawObject> = serde_json::from_str(json)?;
    Ok(raw.into_iter().map(InspectObject::from).collect())
}

/// Inspect one object through the CLI
pub async fn inspect(session: &Session, kind: InspectKind, name: &str) -> Result<InspectObject> {
    let result = session.run(kind.command_args(name)).await?;
    parse_objects(&result.stdout)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            Error::expectation_failed(
                format!("{kind} '{name}' to exist"),
                &format!("'{}'", result.command),
                &result.combined,
            )
        })
}

impl InspectObject {
    /// Every key must be present; `Some(value)` must also match exactly
    pub fn expect_labels(&self, expected: &BTreeMap<String, Option<String>>) -> Result<()> {
        let mut problems = Vec::new();
        for (key, want) in expected {
            match (self.labels.get(key), want) {
                (None, _) => problems.push(format!("missing label {key:?}")),
                (Some(actual), Some(want)) if actual != want => problems.push(format!(
                    "label {key:?} is {actual:?}, expected {want:?}"
                )),
                _ => {}
            }
        }
        if problems.is_empty() {
            return Ok(());
        }
        Err(Error::expectation_failed(
            problems.join("; "),
            &format!("labels of '{}'", self.name),
            &render_labels(&self.labels),
        ))
    }

    /// Every expected mount must match one actual mount
    pub fn expect_mounts(&self, expected: &[Mount]) -> Result<()> {
        let missing: Vec<String> = expected
            .iter()
            .filter(|want| !self.mounts.iter().any(|m| want.matches(m)))
            .map(|want| format!("mount {want}"))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let actual = self
            .mounts
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Err(Error::expectation_failed(
            missing.join("; "),
            &format!("mounts of '{}'", self.name),
            &actual,
        ))
    }
}

fn render_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k:?}: {v:?}"))
        .collect::<Vec<_>>()
        .join("\n")
}
