//! Project identifiers and derived resource names
//!
//! Every named resource a scenario creates (containers, networks, volumes,
//! images) is derived from its project identifier, so scenarios running at
//! the same time never touch each other's resources.

use std::fmt;

use crate::common::{Error, Result};

/// How the CLI composes resource names from a project identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingScheme {
    separator: char,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self { separator: '_' }
    }
}

impl NamingScheme {
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// `<project><sep><service><sep><index>`
    pub fn container_name(&self, project: &str, service: &str, index: u32) -> String {
        let sep = self.separator;
        format!("{project}{sep}{service}{sep}{index}")
    }

    /// `<project><sep><network>`, e.g. `demo_default`
    pub fn network_name(&self, project: &str, network: &str) -> String {
        format!("{project}{}{network}", self.separator)
    }

    /// `<project><sep><volume>`
    pub fn volume_name(&self, project: &str, volume: &str) -> String {
        format!("{project}{}{volume}", self.separator)
    }

    /// Image built for a service without an explicit image name
    pub fn image_name(&self, project: &str, service: &str) -> String {
        format!("{project}{}{service}", self.separator)
    }
}

impl NamingScheme {
    /// Expand naming placeholders in `input`
    ///
    /// Recognised: `{project}`, `{container:SERVICE}`, `{container:SERVICE:N}`,
    /// `{network:NAME}`, `{volume:NAME}`, `{image:SERVICE}`. Any other braces
    /// (Go templates passed to `--format`, JSON) are copied through untouched,
    /// with placeholders inside them still expanded.
    pub fn expand(&self, input: &str, project: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                rest = "";
                break;
            };
            let key = &after[..close];
            let value = if key.contains('{') {
                None
            } else {
                self.placeholder(key, project)?
            };
            match value {
                Some(value) => {
                    out.push_str(&value);
                    rest = &after[close + 1..];
                }
                // Literal brace; placeholders nested inside it are still expanded
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    fn placeholder(&self, key: &str, project: &str) -> Result<Option<String>> {
        if key == "project" {
            return Ok(Some(project.to_string()));
        }
        let Some((kind, arg)) = key.split_once(':') else {
            return Ok(None);
        };
        if !matches!(kind, "container" | "network" | "volume" | "image") {
            return Ok(None);
        }
        if arg.is_empty() {
            return Err(Error::Config(format!("placeholder {{{key}}} is missing a name")));
        }

        let value = match kind {
            "container" => {
                let (service, index) = match arg.split_once(':') {
                    Some((service, index)) => {
                        let index = index.parse::<u32>().map_err(|_| {
                            Error::Config(format!("placeholder {{{key}}} has an invalid index"))
                        })?;
                        (service, index)
                    }
                    None => (arg, 1),
                };
                self.container_name(project, service, index)
            }
            "network" => self.network_name(project, arg),
            "volume" => self.volume_name(project, arg),
            _ => self.image_name(project, arg),
        };
        Ok(Some(value))
    }
}

/// Isolation key for one scenario instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectId(String);

impl ProjectId {
    /// Use an identifier verbatim after validating its characters
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::Config("project identifier must not be empty".into()));
        }
        let valid = id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !valid || !id.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(Error::Config(format!(
                "invalid project identifier '{id}': use lowercase letters, digits, '-' and '_'"
            )));
        }
        Ok(Self(id))
    }

    /// Slugify `prefix` and append a random suffix
    pub fn generate(prefix: &str) -> Self {
        let mut slug = String::with_capacity(prefix.len());
        for c in prefix.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_end_matches('-');
        let slug = if slug.is_empty() { "scenario" } else { slug };

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{slug}-{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
