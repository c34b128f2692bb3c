//! Terminal output for scenario and suite reports

use std::time::Duration;

use colored::Colorize;

use crate::scenario::{ScenarioReport, StepKind, StepOutcome, SuiteReport};

/// Print one scenario with a line per step
pub fn print_scenario(report: &ScenarioReport, verbose: bool) {
    println!(
        "\n{} {} {}",
        "Scenario:".blue().bold(),
        report.name.white().bold(),
        format!("(project {})", report.project).dimmed()
    );

    for step in &report.steps {
        let label = match step.kind {
            StepKind::Cleanup => format!("{} {}", step.name, "[cleanup]".dimmed()),
            StepKind::BestEffort => format!("{} {}", step.name, "[best effort]".dimmed()),
            StepKind::Regular => step.name.clone(),
        };
        match &step.outcome {
            StepOutcome::Passed => {
                if verbose {
                    println!(
                        "  {} {} {}",
                        "✓".green(),
                        label,
                        format_duration(step.duration).dimmed()
                    );
                } else {
                    println!("  {} {}", "✓".green(), label);
                }
            }
            StepOutcome::Failed { kind, message } => {
                println!("  {} {} {}", "✗".red(), label, format!("({kind})").red());
                for line in message.lines() {
                    println!("      {}", line);
                }
            }
            StepOutcome::CleanupFailed { message } => {
                println!("  {} {} {}", "!".yellow(), label, "(ignored)".yellow());
                if verbose {
                    for line in message.lines() {
                        println!("      {}", line.dimmed());
                    }
                }
            }
        }
    }

    if report.passed() {
        println!(
            "{} {} {}",
            "✓".green().bold(),
            "Passed".green().bold(),
            format_duration(report.duration).dimmed()
        );
    } else {
        println!(
            "{} {} {}",
            "✗".red().bold(),
            "Failed".red().bold(),
            format_duration(report.duration).dimmed()
        );
    }
}

/// Print every scenario followed by the totals
pub fn print_suite(report: &SuiteReport, verbose: bool) {
    for scenario in &report.scenarios {
        print_scenario(scenario, verbose);
    }
    println!("\n{}", summary_line(report));
}

fn summary_line(report: &SuiteReport) -> String {
    let total = report.scenarios.len();
    let passed = report.passed_count();
    let failed = report.failed_count();
    let text = format!(
        "{total} scenario{}: {passed} passed, {failed} failed in {}",
        if total == 1 { "" } else { "s" },
        format_duration(report.duration)
    );
    if report.success() {
        text.green().bold().to_string()
    } else {
        text.red().bold().to_string()
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 60 {
        format!("{}m{:02}s", duration.as_secs() / 60, duration.as_secs() % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
