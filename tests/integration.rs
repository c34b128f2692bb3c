//! End-to-end tests for the harness
//!
//! These tests drive a fake compose CLI, a small shell script that keeps its
//! containers, networks and images as files in a state directory, so the
//! whole pipeline (bootstrap, sessions, concurrent scenarios, polling,
//! inspection and cleanup) runs without a container engine.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tempfile::TempDir;

use compose_e2e::common::config::{BinaryConfig, Config};
use compose_e2e::inspect::InspectKind;
use compose_e2e::poll::{self, PollSpec};
use compose_e2e::scenario::file::ScenarioFile;
use compose_e2e::scenario::StepOutcome;
use compose_e2e::{Error, Expectation, FailureKind, Harness, ProjectId, Scenario, Suite};

const FAKE_CLI: &str = r#"#!/bin/sh
state="${FAKE_STATE_DIR:?}"
mkdir -p "$state/containers" "$state/networks" "$state/images"
case "$1" in
  compose)
    shift
    project=""
    if [ "$1" = "-p" ]; then project="$2"; shift 2; fi
    case "$1" in
      up)
        touch "$state/containers/${project}_web_1" "$state/networks/${project}_default"
        echo "Container ${project}_web_1 Started"
        ;;
      down)
        rm -f "$state/containers/${project}_"* "$state/networks/${project}_"*
        echo "Container ${project}_web_1 Removed"
        ;;
      ps)
        ls "$state/containers" | grep "^${project}_" || true
        ;;
      build)
        if [ -f "$state/images/${project}_web" ]; then
          echo "CACHED"
        else
          touch "$state/images/${project}_web"
          echo "COPY static /usr/share/nginx/html"
        fi
        ;;
      *) echo "unknown compose command: $1" >&2; exit 2 ;;
    esac
    ;;
  ps) ls "$state/containers" ;;
  network) ls "$state/networks" ;;
  inspect)
    if [ ! -f "$state/containers/$2" ]; then
      echo "Error: No such object: $2" >&2
      exit 1
    fi
    printf '[{"Name": "/%s", "Config": {"Labels": {"com.docker.compose.project": "%s", "com.docker.compose.service": "web"}}}]\n' "$2" "${2%_web_1}"
    ;;
  fail) echo "forced failure" >&2; exit 1 ;;
  *) echo "unknown command: $1" >&2; exit 2 ;;
esac
"#;

/// Test context: a fake CLI on disk and the state directory it writes to
struct TestContext {
    _temp: TempDir,
    bin_dir: PathBuf,
    state_dir: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let bin_dir = temp.path().join("bin");
        let state_dir = temp.path().join("state");
        fs::create_dir_all(&bin_dir).expect("Failed to create bin dir");
        fs::create_dir_all(&state_dir).expect("Failed to create state dir");

        let cli = bin_dir.join("fakecompose");
        fs::write(&cli, FAKE_CLI).expect("Failed to write fake CLI");
        fs::set_permissions(&cli, fs::Permissions::from_mode(0o755))
            .expect("Failed to make fake CLI executable");

        Self {
            _temp: temp,
            bin_dir,
            state_dir,
        }
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.binary = BinaryConfig {
            name: "fakecompose".into(),
            dir: Some(self.bin_dir.clone()),
            ..BinaryConfig::default()
        };
        config.poll.interval_ms = 50;
        config.poll.timeout_secs = 5;
        config
    }

    fn session(&self) -> compose_e2e::Session {
        compose_e2e::Session::new(&self.bin_dir, "fakecompose")
            .with_env("FAKE_STATE_DIR", self.state_dir.display().to_string())
    }

    fn containers(&self) -> Vec<String> {
        list_dir(&self.state_dir.join("containers"))
    }

    fn networks(&self) -> Vec<String> {
        list_dir(&self.state_dir.join("networks"))
    }
}

fn list_dir(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Scenario that brings a project up, checks it only sees itself, and
/// tears it down again
fn lifecycle(ctx: &TestContext, name: &str, others: Vec<String>) -> Scenario {
    let project = ProjectId::generate(name);
    Scenario::new(name, ctx.session(), project)
        .step("up", |ctx| async move {
            let p = ctx.project().to_string();
            ctx.run(["compose", "-p", p.as_str(), "up"]).await?;
            Ok(())
        })
        .step("ps shows only this project", move |ctx| async move {
            let p = ctx.project().to_string();
            let result = ctx.run(["compose", "-p", p.as_str(), "ps"]).await?;
            result.assert(&Expectation::contains(ctx.container_name("web", 1)))?;
            for other in &others {
                result.assert(&Expectation::not_contains(other.as_str()))?;
            }
            Ok(())
        })
        .step("labels", |ctx| async move {
            let name = ctx.container_name("web", 1);
            let object = ctx.inspect(InspectKind::Container, &name).await?;
            let expected = [(
                "com.docker.compose.project".to_string(),
                Some(ctx.project().to_string()),
            )]
            .into_iter()
            .collect();
            object.expect_labels(&expected)
        })
        .cleanup("down", |ctx| async move {
            let p = ctx.project().to_string();
            ctx.run(["compose", "-p", p.as_str(), "down"]).await?;
            Ok(())
        })
}

#[tokio::test]
async fn test_concurrent_scenarios_are_isolated() {
    let ctx = TestContext::new();

    let names = ["isolation-a", "isolation-b", "isolation-c"];
    let mut suite = Suite::new();
    for name in names {
        let others = names
            .iter()
            .filter(|n| **n != name)
            .map(|n| format!("{n}-"))
            .collect();
        suite.push(lifecycle(&ctx, name, others));
    }

    let report = suite.run().await;
    for scenario in &report.scenarios {
        assert!(scenario.passed(), "{} failed: {:?}", scenario.name, scenario.steps);
    }
    assert!(report.success());
    assert!(ctx.containers().is_empty(), "{:?}", ctx.containers());
    assert!(ctx.networks().is_empty(), "{:?}", ctx.networks());
}

#[tokio::test]
async fn test_cleanup_runs_after_failure() {
    let ctx = TestContext::new();

    let report = Scenario::new("failing", ctx.session(), ProjectId::generate("failing"))
        .step("up", |ctx| async move {
            let p = ctx.project().to_string();
            ctx.run(["compose", "-p", p.as_str(), "up"]).await?;
            Ok(())
        })
        .step("fail", |ctx| async move {
            ctx.run(["fail"]).await?;
            Ok(())
        })
        .cleanup("down", |ctx| async move {
            let p = ctx.project().to_string();
            ctx.run(["compose", "-p", p.as_str(), "down"]).await?;
            Ok(())
        })
        .run()
        .await;

    assert!(!report.passed());
    match &report.steps[1].outcome {
        StepOutcome::Failed { kind, message } => {
            assert_eq!(*kind, FailureKind::CommandFailure);
            assert!(message.contains("forced failure"), "{message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.steps[2].outcome, StepOutcome::Passed);
    assert!(ctx.containers().is_empty());
}

#[tokio::test]
async fn test_inspect_missing_object_fails() {
    let ctx = TestContext::new();
    let report = Scenario::new("missing", ctx.session(), ProjectId::generate("missing"))
        .step("inspect", |ctx| async move {
            ctx.inspect(InspectKind::Container, &ctx.container_name("web", 1))
                .await?;
            Ok(())
        })
        .run()
        .await;
    assert_eq!(report.failures().count(), 1);
}

#[tokio::test]
async fn test_yaml_scenario_through_harness() {
    let ctx = TestContext::new();
    let scenario_path = ctx.state_dir.parent().unwrap().join("build.yaml");
    fs::write(
        &scenario_path,
        r#"
name: build idempotence
steps:
  - name: clean slate
    best_effort: true
    actions:
      - action: run
        args: [compose, -p, "{project}", down]
  - name: first build copies
    actions:
      - action: run
        args: [compose, -p, "{project}", build]
        expect:
          - stream: stdout
            contains: COPY static
  - name: up
    actions:
      - action: run
        args: [compose, -p, "{project}", up]
      - action: wait_for
        args: [compose, -p, "{project}", ps]
        expect:
          contains: "{container:web}"
      - action: inspect_labels
        target: "{container:web}"
        labels:
          com.docker.compose.project: "{project}"
          com.docker.compose.service: ~
  - name: second build is cached
    actions:
      - action: run
        args: [compose, -p, "{project}", build]
        expect:
          - stream: stdout
            not_contains: COPY
cleanup:
  - name: down
    actions:
      - action: run
        args: [compose, -p, "{project}", down]
      - action: run
        args: [network]
        expect:
          - not_contains: "{network:default}"
"#,
    )
    .unwrap();

    let file = ScenarioFile::load(&scenario_path).unwrap();
    let config = ctx.config();
    let harness = Harness::new(config.clone());
    let state_dir = ctx.state_dir.display().to_string();
    let mut staged = None;

    let report = harness
        .run(|location| {
            staged = Some(location.dir().to_path_buf());
            let session = location.session().with_env("FAKE_STATE_DIR", state_dir);
            Ok(Suite::new().add(file.into_scenario(&session, &config)?))
        })
        .await
        .unwrap();

    let scenario = &report.scenarios[0];
    assert!(report.success(), "{:?}", scenario.steps);
    assert_eq!(scenario.steps.len(), 5);
    assert!(!staged.unwrap().exists());
    assert!(ctx.containers().is_empty());
}

#[tokio::test]
async fn test_bootstrap_failure_is_fatal() {
    let ctx = TestContext::new();
    let mut config = ctx.config();
    config.binary.name = "not-there".into();

    let mut built = false;
    let err = Harness::new(config)
        .run(|_| {
            built = true;
            Ok(Suite::new())
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::BootstrapFailure);
    assert!(!built);
}

/// Serve `/health` that answers 503 until it has been hit `ready_after` times
async fn spawn_health_server(ready_after: u32) -> (String, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/health",
        get(move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= ready_after {
                    (StatusCode::OK, "Hello from Nginx container")
                } else {
                    (StatusCode::SERVICE_UNAVAILABLE, "starting")
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/health"), hits)
}

#[tokio::test]
async fn test_http_endpoint_converges() {
    let (url, hits) = spawn_health_server(3).await;
    let spec = PollSpec::new(Duration::from_millis(50), Duration::from_secs(5));

    let body = poll::http_get_with_retry(&url, 200, spec).await.unwrap();
    assert!(body.contains("Hello from Nginx container"));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_http_step_inside_scenario() {
    let (url, _hits) = spawn_health_server(2).await;
    let ctx = TestContext::new();

    let report = Scenario::new("http", ctx.session(), ProjectId::generate("http"))
        .poll(PollSpec::new(Duration::from_millis(50), Duration::from_secs(5)))
        .step("curl", move |ctx| async move {
            let body = ctx.http_get(&url, 200).await?;
            compose_e2e::Matcher::Contains("Hello from Nginx".into()).check("body", &body)
        })
        .run()
        .await;

    assert!(report.passed(), "{:?}", report.steps);
}

#[tokio::test]
async fn test_hung_endpoint_does_not_overrun_deadline() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/health",
        get(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) >= 8 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                (StatusCode::SERVICE_UNAVAILABLE, "starting")
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/health", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let spec = PollSpec::new(Duration::from_millis(100), Duration::from_secs(1));
    let start = std::time::Instant::now();
    let err = poll::http_get_with_retry(&url, 200, spec).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(elapsed >= spec.timeout, "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1300), "{elapsed:?}");
    assert!(hits.load(Ordering::SeqCst) > 8);
    assert!(matches!(err, Error::ConvergenceTimeout { .. }), "{err}");
}

#[tokio::test]
async fn test_refused_connection_times_out() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}/");
    let spec = PollSpec::new(Duration::from_millis(100), Duration::from_millis(500));

    let start = std::time::Instant::now();
    let err = poll::http_get_with_retry(&url, 200, spec).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    match err {
        Error::ConvergenceTimeout { last_observed, .. } => {
            assert!(last_observed.unwrap().starts_with("probe error"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bundled_scenarios_are_valid() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    for name in ["compose-up.yaml", "build.yaml", "volume.yaml"] {
        let file = ScenarioFile::load(&dir.join(name))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        assert!(!file.steps.is_empty(), "{name}");
        assert!(!file.cleanup.is_empty(), "{name}");
    }
}
