//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;
use crate::naming::NamingScheme;
use crate::poll::PollSpec;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Where the CLI under test comes from
    #[serde(default)]
    pub binary: BinaryConfig,

    /// Default convergence settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Scenario scheduling
    #[serde(default)]
    pub suite: SuiteConfig,

    /// Resource naming
    #[serde(default)]
    pub naming: NamingConfig,
}

/// Location or build recipe for the CLI binary
#[derive(Debug, Deserialize, Clone)]
pub struct BinaryConfig {
    /// Executable name, looked up in `dir` or on PATH
    #[serde(default = "default_binary_name")]
    pub name: String,

    /// Directory containing the binary (skips the PATH lookup)
    pub dir: Option<PathBuf>,

    /// Command that builds the binary before the run
    #[serde(default)]
    pub build_command: Vec<String>,

    /// Working directory for `build_command`
    pub build_dir: Option<PathBuf>,

    /// Directory the build writes the binary into
    pub build_output: Option<PathBuf>,
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            name: default_binary_name(),
            dir: None,
            build_command: Vec::new(),
            build_dir: None,
            build_output: None,
        }
    }
}

fn default_binary_name() -> String {
    "docker".to_string()
}

/// Poll settings
#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    /// Delay between probes
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Give up after this long
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_interval_ms() -> u64 {
    2_000
}
fn default_timeout_secs() -> u64 {
    20
}

impl PollConfig {
    /// Convert to a poll spec
    pub fn spec(&self) -> PollSpec {
        PollSpec::new(
            Duration::from_millis(self.interval_ms),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

/// Suite scheduling
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SuiteConfig {
    /// Maximum scenarios in flight, 0 for unbounded
    #[serde(default)]
    pub max_parallel: usize,
}

/// Naming configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NamingConfig {
    /// Separator between project, service and index
    #[serde(default = "default_separator")]
    pub separator: char,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
        }
    }
}

fn default_separator() -> char {
    '_'
}

impl NamingConfig {
    /// Convert to a naming scheme
    pub fn scheme(&self) -> NamingScheme {
        NamingScheme::new(self.separator)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
