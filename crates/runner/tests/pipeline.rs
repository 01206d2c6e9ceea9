//! End-to-end pipeline behavior: fetch, verify, stage, build, install

use httpmock::prelude::*;
use kiln_hash::{Algorithm, Digest};
use kiln_net::NetConfig;
use kiln_runner::{Runner, RunnerConfig};
use kiln_types::{Recipe, RunState};
use std::path::Path;
use std::time::Duration;

const BODY: &[u8] = b"pretend this is a source tarball";

fn body_sha256() -> String {
    Digest::of_data(Algorithm::Sha256, BODY).to_hex()
}

fn recipe(url: &str, sha256: &str, build: &[&str], install: &[&str]) -> Recipe {
    Recipe {
        name: "hello".to_string(),
        version: "1".to_string(),
        homepage: None,
        source: url.to_string(),
        sha256: Some(sha256.to_string()),
        blake3: None,
        maintainer: None,
        license: None,
        section: None,
        description: None,
        build_depends: Vec::new(),
        depends: Vec::new(),
        prefix: "/usr/local".to_string(),
        build: build.iter().map(ToString::to_string).collect(),
        install: install.iter().map(ToString::to_string).collect(),
    }
}

fn config(work_root: &Path) -> RunnerConfig {
    RunnerConfig {
        net: NetConfig {
            retry_count: 0,
            retry_delay: Duration::from_millis(10),
            ..NetConfig::default()
        },
        ..RunnerConfig::default()
    }
    .with_work_root(work_root)
    .with_timeout(60)
    .with_jobs(2)
}

async fn serve_source(server: &MockServer) -> String {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/hello-1.tar.gz");
            then.status(200).body(BODY);
        })
        .await;
    server.url("/hello-1.tar.gz")
}

fn entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|iter| {
            iter.filter_map(|e| e.ok().map(|e| e.file_name().to_string_lossy().into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn successful_run_executes_both_phases_and_cleans_up() {
    let server = MockServer::start_async().await;
    let url = serve_source(&server).await;
    let work = tempfile::tempdir().unwrap();

    let recipe = recipe(
        &url,
        &body_sha256(),
        &["touch built.marker"],
        &["cp built.marker ${DESTDIR}/installed.marker"],
    );
    let runner = Runner::new(config(work.path())).unwrap();
    let (tx, _rx) = kiln_events::channel();

    let report = runner.run(&recipe, &tx).await;

    assert!(report.succeeded(), "failure: {:?}", report.failure);
    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.phases.len(), 2);
    assert!(report.phases.iter().all(kiln_types::PhaseResult::success));
    assert!(report.artifact.unwrap().digest.starts_with("sha256:"));
    assert!(report.retained_build_root.is_none());
    // Scratch and staged trees are both gone
    assert!(entries(work.path()).is_empty());
}

#[tokio::test]
async fn keep_build_dir_retains_tree_with_staged_install() {
    let server = MockServer::start_async().await;
    let url = serve_source(&server).await;
    let work = tempfile::tempdir().unwrap();

    let recipe = recipe(
        &url,
        &body_sha256(),
        &["touch built.marker"],
        &["cp built.marker ${DESTDIR}/installed.marker"],
    );
    let runner = Runner::new(config(work.path()).with_keep_build_dir(true)).unwrap();
    let (tx, _rx) = kiln_events::channel();

    let report = runner.run(&recipe, &tx).await;

    assert!(report.succeeded());
    let root = report.retained_build_root.expect("retained root");
    assert!(root.join("build").join("built.marker").exists());
    assert!(root.join("destdir").join("installed.marker").exists());
}

#[tokio::test]
async fn tampered_artifact_fails_before_any_staging() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/hello-1.tar.gz");
            then.status(200).body(b"tampered bytes");
        })
        .await;
    let work = tempfile::tempdir().unwrap();

    let recipe = recipe(
        &server.url("/hello-1.tar.gz"),
        &body_sha256(),
        &["touch built.marker"],
        &["touch ${DESTDIR}/installed.marker"],
    );
    let runner = Runner::new(config(work.path())).unwrap();
    let (tx, _rx) = kiln_events::channel();

    let report = runner.run(&recipe, &tx).await;

    assert_eq!(report.state, RunState::Failed);
    let failure = report.failure.expect("failure info");
    assert_eq!(failure.exit_code, 4);
    assert!(report.phases.is_empty());
    // No build root was ever created
    assert!(entries(work.path()).is_empty());
}

#[tokio::test]
async fn failing_build_step_skips_install_and_retains_tree() {
    let server = MockServer::start_async().await;
    let url = serve_source(&server).await;
    let work = tempfile::tempdir().unwrap();

    let recipe = recipe(
        &url,
        &body_sha256(),
        &["touch built.marker", "sh -c 'exit 1'"],
        &["touch ${DESTDIR}/installed.marker"],
    );
    let runner = Runner::new(config(work.path())).unwrap();
    let (tx, _rx) = kiln_events::channel();

    let report = runner.run(&recipe, &tx).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.phases.len(), 1);
    assert_eq!(report.phases[0].exit_code, 1);
    let failure = report.failure.expect("failure info");
    assert_eq!(failure.exit_code, 5);

    // install never ran, and the tree stayed around for inspection
    let root = report.retained_build_root.expect("retained root");
    assert!(root.join("build").join("built.marker").exists());
    assert!(!root.join("destdir").join("installed.marker").exists());
}

#[tokio::test]
async fn failing_install_maps_to_its_own_exit_code() {
    let server = MockServer::start_async().await;
    let url = serve_source(&server).await;
    let work = tempfile::tempdir().unwrap();

    let recipe = recipe(
        &url,
        &body_sha256(),
        &["touch built.marker"],
        &["sh -c 'exit 3'"],
    );
    let runner = Runner::new(config(work.path())).unwrap();
    let (tx, _rx) = kiln_events::channel();

    let report = runner.run(&recipe, &tx).await;

    assert_eq!(report.phases.len(), 2);
    assert_eq!(report.phases[1].exit_code, 3);
    assert_eq!(report.failure.expect("failure info").exit_code, 6);
}

#[tokio::test]
async fn timeout_fails_the_run_and_releases_directories() {
    let server = MockServer::start_async().await;
    let url = serve_source(&server).await;
    let work = tempfile::tempdir().unwrap();

    let recipe = recipe(&url, &body_sha256(), &["sleep 30"], &["true"]);
    let runner = Runner::new(config(work.path()).with_timeout(1)).unwrap();
    let (tx, _rx) = kiln_events::channel();

    let report = runner.run(&recipe, &tx).await;

    assert_eq!(report.state, RunState::Failed);
    let failure = report.failure.expect("failure info");
    assert!(failure.message.contains("timed out"));
    assert!(report.retained_build_root.is_none());
    assert!(entries(work.path()).is_empty());
}

#[tokio::test]
async fn repeated_runs_use_disjoint_trees() {
    let server = MockServer::start_async().await;
    let url = serve_source(&server).await;
    let work = tempfile::tempdir().unwrap();

    let recipe = recipe(&url, &body_sha256(), &["true"], &["true"]);
    let runner = Runner::new(config(work.path()).with_keep_build_dir(true)).unwrap();
    let (tx, _rx) = kiln_events::channel();

    let first = runner.run(&recipe, &tx).await;
    let second = runner.run(&recipe, &tx).await;

    let a = first.retained_build_root.expect("first root");
    let b = second.retained_build_root.expect("second root");
    assert_ne!(a, b);
    assert!(a.exists() && b.exists());
}

#[tokio::test]
async fn unknown_program_is_a_build_failure() {
    let server = MockServer::start_async().await;
    let url = serve_source(&server).await;
    let work = tempfile::tempdir().unwrap();

    let recipe = recipe(
        &url,
        &body_sha256(),
        &["definitely-not-a-real-tool-kiln-test"],
        &["true"],
    );
    let runner = Runner::new(config(work.path())).unwrap();
    let (tx, _rx) = kiln_events::channel();

    let report = runner.run(&recipe, &tx).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failure.expect("failure info").exit_code, 5);
}

#[tokio::test]
async fn lifecycle_events_arrive_in_order() {
    let server = MockServer::start_async().await;
    let url = serve_source(&server).await;
    let work = tempfile::tempdir().unwrap();

    let recipe = recipe(&url, &body_sha256(), &["true"], &["true"]);
    let runner = Runner::new(config(work.path())).unwrap();
    let (tx, mut rx) = kiln_events::channel();

    let report = runner.run(&recipe, &tx).await;
    assert!(report.succeeded());
    drop(tx);

    let mut states = Vec::new();
    while let Some(event) = rx.recv().await {
        if let kiln_events::AppEvent::Run(kiln_events::RunEvent::StateChanged { to, .. }) = event {
            states.push(to);
        }
    }
    assert_eq!(
        states,
        vec![
            RunState::Fetching,
            RunState::Verifying,
            RunState::Staged,
            RunState::Building,
            RunState::Installing,
            RunState::Done,
        ]
    );
}
