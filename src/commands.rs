//! CLI command definitions
//!
//! Defines the clap commands for the compose-e2e CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::common::config::BinaryConfig;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenario files against the CLI under test
    Run {
        /// YAML scenario files; all of them run concurrently
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,

        #[command(flatten)]
        binary: BinaryArgs,

        /// Build the binary before running, e.g. --build-cmd "make cli"
        #[arg(long = "build-cmd")]
        build_command: Option<String>,

        /// Maximum number of scenarios running at once (0 = unlimited)
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
    },

    /// Parse and check scenario files without running them
    Validate {
        /// YAML scenario files
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,
    },

    /// Print the binary that would be used
    Locate {
        #[command(flatten)]
        binary: BinaryArgs,
    },

    /// Print the resource names derived from a project
    Names {
        /// Project identifier
        #[arg(long)]
        project: String,

        /// Service whose container (and image) name to print
        #[arg(long)]
        service: Option<String>,

        /// Container index within the service
        #[arg(long, default_value_t = 1)]
        index: u32,

        /// Network name within the project
        #[arg(long)]
        network: Option<String>,

        /// Volume name within the project
        #[arg(long)]
        volume: Option<String>,

        /// Separator between name components (overrides the config file)
        #[arg(long)]
        separator: Option<char>,
    },
}

/// Where to find the CLI under test
#[derive(Args, Debug, Default)]
pub struct BinaryArgs {
    /// Executable name or path
    #[arg(long, env = "COMPOSE_E2E_BINARY")]
    pub binary: Option<String>,

    /// Directory containing the executable (skips the PATH lookup)
    #[arg(long, env = "COMPOSE_E2E_BINARY_DIR")]
    pub binary_dir: Option<PathBuf>,
}

impl BinaryArgs {
    /// Overlay command-line values on the configured binary
    ///
    /// A `--binary` containing a path separator sets both directory and name.
    pub fn apply(self, config: &mut BinaryConfig) {
        if let Some(binary) = self.binary {
            let path = PathBuf::from(&binary);
            match (path.parent(), path.file_name()) {
                (Some(dir), Some(name)) if !dir.as_os_str().is_empty() => {
                    config.dir = Some(dir.to_path_buf());
                    config.name = name.to_string_lossy().into_owned();
                }
                _ => config.name = binary,
            }
        }
        if let Some(dir) = self.binary_dir {
            config.dir = Some(dir);
        }
    }
}
