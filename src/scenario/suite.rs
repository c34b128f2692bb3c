//! Concurrent execution of independent scenarios

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info};

use super::{Scenario, ScenarioReport, SuiteReport};

/// A set of scenarios that run concurrently, one task each
#[derive(Default)]
pub struct Suite {
    scenarios: Vec<Scenario>,
    max_parallel: usize,
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of scenarios running at once; 0 means no cap
    pub fn max_parallel(mut self, limit: usize) -> Self {
        self.max_parallel = limit;
        self
    }

    pub fn add(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn push(&mut self, scenario: Scenario) {
        self.scenarios.push(scenario);
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Run every scenario and collect reports in registration order
    pub async fn run(self) -> SuiteReport {
        let start = Instant::now();
        let limit = (self.max_parallel > 0).then(|| Arc::new(Semaphore::new(self.max_parallel)));

        info!(
            scenarios = self.scenarios.len(),
            max_parallel = self.max_parallel,
            "Running suite"
        );

        let mut handles = Vec::with_capacity(self.scenarios.len());
        for scenario in self.scenarios {
            let name = scenario.name().to_string();
            let project = scenario.project().to_string();
            let limit = limit.clone();
            let handle = tokio::spawn(async move {
                let _permit = match limit {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                scenario.run().await
            });
            handles.push((name, project, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (name, project, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(scenario = %name, error = %e, "Scenario task aborted");
                    reports.push(ScenarioReport::aborted(name, project, e.to_string()));
                }
            }
        }

        SuiteReport {
            scenarios: reports,
            duration: start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ProjectId;
    use crate::session::Session;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sleeping(name: &str, running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Scenario {
        Scenario::new(
            name,
            Session::with_binary("/nonexistent/cli"),
            ProjectId::generate(name),
        )
        .step("sleep", move |_| async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenarios_run_concurrently() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let mut suite = Suite::new();
        for name in ["up", "build", "volume"] {
            suite.push(sleeping(name, running.clone(), peak.clone()));
        }
        let report = suite.run().await;

        assert!(report.success());
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() < Duration::from_secs(2));
        let names: Vec<_> = report.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["up", "build", "volume"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_parallel_limits_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let report = Suite::new()
            .max_parallel(1)
            .add(sleeping("a", running.clone(), peak.clone()))
            .add(sleeping("b", running.clone(), peak.clone()))
            .run()
            .await;

        assert!(report.success());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_scenario_does_not_affect_others() {
        let report = Suite::new()
            .add(
                Scenario::new(
                    "broken",
                    Session::with_binary("/nonexistent/cli"),
                    ProjectId::generate("broken"),
                )
                .step("ps", |ctx| async move {
                    ctx.run(["ps"]).await?;
                    Ok(())
                }),
            )
            .add(
                Scenario::new(
                    "fine",
                    Session::with_binary("/nonexistent/cli"),
                    ProjectId::generate("fine"),
                )
                .step("noop", |_| async { Ok(()) }),
            )
            .run()
            .await;

        assert!(!report.success());
        assert!(!report.get("broken").unwrap().passed());
        assert!(report.get("fine").unwrap().passed());
    }

    #[tokio::test]
    async fn test_empty_suite_succeeds() {
        let suite = Suite::new();
        assert!(suite.is_empty());
        let report = suite.run().await;
        assert!(report.success());
        assert!(report.scenarios.is_empty());
    }
}
