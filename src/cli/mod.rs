//! CLI command handling
//!
//! Dispatches CLI commands and formats output. Each handler returns the
//! process exit code.

use std::path::{Path, PathBuf};

use colored::Colorize;
use tracing::info;

use crate::bootstrap::{self, Harness};
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::naming::{NamingScheme, ProjectId};
use crate::report;
use crate::scenario::file::ScenarioFile;
use crate::scenario::Suite;

/// Dispatch a CLI command
pub async fn dispatch(
    command: Commands,
    config_path: Option<PathBuf>,
    verbose: bool,
) -> Result<i32> {
    match command {
        Commands::Run {
            scenarios,
            binary,
            build_command,
            jobs,
        } => {
            let mut config = load_config(config_path.as_deref())?;
            binary.apply(&mut config.binary);
            if let Some(cmd) = build_command {
                config.binary.build_command = cmd.split_whitespace().map(String::from).collect();
            }
            if let Some(jobs) = jobs {
                config.suite.max_parallel = jobs;
            }

            // Scenario errors surface before anything is built
            let files = scenarios
                .iter()
                .map(|path| ScenarioFile::load(path))
                .collect::<Result<Vec<_>>>()?;
            info!(scenarios = files.len(), "Loaded scenarios");

            let harness = Harness::new(config);
            let config = harness.config();
            let report = harness
                .run(|location| {
                    let session = location.session();
                    let mut suite = Suite::new().max_parallel(config.suite.max_parallel);
                    for file in files {
                        suite.push(file.into_scenario(&session, config)?);
                    }
                    Ok(suite)
                })
                .await?;

            report::print_suite(&report, verbose);
            Ok(report.exit_code())
        }

        Commands::Validate { scenarios } => {
            let mut invalid = 0;
            for path in &scenarios {
                match ScenarioFile::load(path) {
                    Ok(file) => {
                        let steps = file.steps.len() + file.cleanup.len();
                        println!(
                            "  {} {} {}",
                            "✓".green(),
                            path.display(),
                            format!("({}, {steps} steps)", file.name).dimmed()
                        );
                    }
                    Err(e) => {
                        invalid += 1;
                        println!("  {} {}: {}", "✗".red(), path.display(), e);
                    }
                }
            }
            Ok(if invalid == 0 { 0 } else { 1 })
        }

        Commands::Locate { binary } => {
            let mut config = load_config(config_path.as_deref())?;
            binary.apply(&mut config.binary);
            let path = bootstrap::locate(&config.binary)?;
            println!("{}", path.display());
            Ok(0)
        }

        Commands::Names {
            project,
            service,
            index,
            network,
            volume,
            separator,
        } => {
            let project = ProjectId::new(project)?;
            let naming = match separator {
                Some(sep) => NamingScheme::new(sep),
                None => load_config(config_path.as_deref())?.naming.scheme(),
            };
            for (kind, name) in resource_names(&naming, &project, service, index, network, volume) {
                println!("{:<10} {}", format!("{kind}:"), name);
            }
            Ok(0)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) if !path.exists() => Err(Error::Config(format!(
            "config file {} does not exist",
            path.display()
        ))),
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn resource_names(
    naming: &NamingScheme,
    project: &ProjectId,
    service: Option<String>,
    index: u32,
    network: Option<String>,
    volume: Option<String>,
) -> Vec<(&'static str, String)> {
    let project = project.as_str();
    let mut names = vec![("project", project.to_string())];
    if let Some(service) = service {
        names.push(("container", naming.container_name(project, &service, index)));
        names.push(("image", naming.image_name(project, &service)));
    }
    names.push((
        "network",
        naming.network_name(project, network.as_deref().unwrap_or("default")),
    ));
    if let Some(volume) = volume {
        names.push(("volume", naming.volume_name(project, &volume)));
    }
    names
}
