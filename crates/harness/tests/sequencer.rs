//! Sequencer and session driver tests against a scripted browser backend.
//!
//! No real browser is launched: `FakeLauncher` answers the driver's page queries
//! from a per-URL script and records what each session went through.

use abrbench_common::{Catalog, TestConfiguration, TestOutcome};
use abrbench_harness::telemetry::{PLAYER_SELECTOR, READY_PROBE, READY_STATE_PROBE, SNAPSHOT_QUERY};
use abrbench_harness::{
    ActiveProfile, BrowserLauncher, BrowserSession, HarnessError, HarnessResult, LaunchOptions,
    ProfileRunner, ResultPersister, SequencerConfig, SessionDriver, SessionTimeouts, TestSequencer,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_case::test_case;

/// How the page at a given URL behaves
#[derive(Debug, Clone)]
enum Page {
    /// Loads, mounts the player and exposes this telemetry
    Healthy(Value),
    /// Never leaves `document.readyState == "loading"`
    NeverInteractive,
    /// Loads but never mounts the player element
    NoPlayer,
    /// Mounts the player but never exposes telemetry
    NoTelemetry,
    /// The navigation command itself never returns
    HangingNavigation,
}

#[derive(Debug, Default)]
struct SessionRecord {
    user_data_dir: PathBuf,
    url: Option<String>,
    closed: bool,
    /// Running profile when the browser was launched
    profile_at_launch: Option<String>,
    /// Running profile while the page was being observed
    profile_during_session: Option<String>,
}

#[derive(Clone, Default)]
struct FakeLauncher {
    pages: HashMap<String, Page>,
    fail_launch: bool,
    sessions: Arc<Mutex<Vec<SessionRecord>>>,
    active: Option<ActiveProfile>,
}

impl FakeLauncher {
    fn watching(mut self, active: ActiveProfile) -> Self {
        self.active = Some(active);
        self
    }

    fn with_page(mut self, url: &str, page: Page) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Vec<SessionRecord>> {
        self.sessions.lock().unwrap()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> HarnessResult<Box<dyn BrowserSession>> {
        assert!(options.user_data_dir.is_dir(), "workspace must exist before launch");
        assert!(options.request_timeout >= timeouts().navigation);
        if self.fail_launch {
            return Err(HarnessError::Browser("no browser binary".to_string()));
        }

        let mut sessions = self.sessions.lock().unwrap();
        sessions.push(SessionRecord {
            user_data_dir: options.user_data_dir.clone(),
            profile_at_launch: self.active.as_ref().and_then(ActiveProfile::current),
            ..Default::default()
        });
        Ok(Box::new(FakeSession {
            index: sessions.len() - 1,
            pages: self.pages.clone(),
            sessions: self.sessions.clone(),
            active: self.active.clone(),
        }))
    }
}

struct FakeSession {
    index: usize,
    pages: HashMap<String, Page>,
    sessions: Arc<Mutex<Vec<SessionRecord>>>,
    active: Option<ActiveProfile>,
}

impl FakeSession {
    fn page(&self) -> Option<Page> {
        let sessions = self.sessions.lock().unwrap();
        let url = sessions[self.index].url.as_ref()?;
        self.pages.get(url).cloned()
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        {
            let mut sessions = self.sessions.lock().unwrap();
            sessions[self.index].url = Some(url.to_string());
            sessions[self.index].profile_during_session =
                self.active.as_ref().and_then(ActiveProfile::current);
        }
        if matches!(self.pages.get(url), Some(Page::HangingNavigation)) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(())
    }

    async fn element_exists(&self, selector: &str) -> HarnessResult<bool> {
        assert_eq!(selector, PLAYER_SELECTOR);
        Ok(matches!(self.page(), Some(Page::Healthy(_) | Page::NoTelemetry)))
    }

    async fn evaluate(&self, expression: &str) -> HarnessResult<Value> {
        let page = self.page();
        match expression {
            READY_STATE_PROBE => Ok(match page {
                Some(Page::NeverInteractive | Page::HangingNavigation) | None => json!("loading"),
                _ => json!("complete"),
            }),
            READY_PROBE => Ok(json!(matches!(page, Some(Page::Healthy(_))))),
            SNAPSHOT_QUERY => match page {
                Some(Page::Healthy(telemetry)) => Ok(telemetry),
                _ => Err(HarnessError::Browser("videoPlayer is undefined".to_string())),
            },
            other => panic!("unexpected expression: {}", other),
        }
    }

    async fn close(self: Box<Self>) -> HarnessResult<()> {
        self.sessions.lock().unwrap()[self.index].closed = true;
        Ok(())
    }
}

fn telemetry() -> Value {
    json!({
        "contractVersion": 1,
        "timeToFirstFrame": 1200.0,
        "numRebuffers": 1,
        "numQualitySwitches": 4,
        "bitrateHistory": [
            {"bitrate": 1000000, "timestamp": 0.0},
            {"bitrate": 3000000, "timestamp": 20000.0}
        ],
        "lastQuality": 3000000,
        "reportedAverageBitrate": null,
        "currentTime": 58.0
    })
}

fn timeouts() -> SessionTimeouts {
    SessionTimeouts {
        navigation: Duration::from_millis(200),
        mount: Duration::from_millis(200),
        telemetry: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
    }
}

fn driver(launcher: &FakeLauncher) -> SessionDriver {
    SessionDriver::new(Arc::new(launcher.clone()), timeouts())
}

fn sequencer(launcher: &FakeLauncher, scripts_dir: PathBuf) -> TestSequencer {
    sequencer_with(launcher, ProfileRunner::new(scripts_dir, "sh"))
}

fn sequencer_with(launcher: &FakeLauncher, profiles: ProfileRunner) -> TestSequencer {
    TestSequencer::new(
        profiles,
        driver(launcher),
        SequencerConfig {
            target_host: "localhost".to_string(),
            observation: Duration::from_millis(10),
            settle_delay: Duration::ZERO,
            inter_test_delay: Duration::from_millis(5),
        },
    )
}

fn test_config(name: &str, port: u16, script: Option<&str>) -> TestConfiguration {
    TestConfiguration {
        name: name.to_string(),
        port,
        network_script: script.map(str::to_string),
        weight: None,
        description: String::new(),
    }
}

#[tokio::test]
async fn healthy_session_returns_telemetry_and_cleans_up() {
    let launcher = FakeLauncher::default().with_page("http://localhost:9001", Page::Healthy(telemetry()));

    let metrics = driver(&launcher)
        .run("http://localhost:9001", Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(metrics.time_to_first_frame, Some(1200.0));
    assert_eq!(metrics.num_rebuffers, 1);
    assert_eq!(metrics.num_quality_switches, 4);
    assert_eq!(metrics.average_bitrate, 2_000_000.0);
    assert_eq!(metrics.duration, 58.0);
    assert_eq!(metrics.bitrate_history.len(), 2);

    let records = launcher.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].closed);
    assert!(!records[0].user_data_dir.exists());
}

#[test_case(Page::NeverInteractive ; "navigation never completes")]
#[test_case(Page::NoPlayer ; "player never mounts")]
#[test_case(Page::NoTelemetry ; "telemetry never appears")]
#[tokio::test]
async fn failed_session_still_closes_browser_and_removes_workspace(page: Page) {
    let launcher = FakeLauncher::default().with_page("http://localhost:9002", page.clone());

    let err = driver(&launcher)
        .run("http://localhost:9002", Duration::from_millis(10))
        .await
        .unwrap_err();

    match page {
        Page::NeverInteractive => assert!(matches!(err, HarnessError::NavigationTimeout { .. })),
        Page::NoPlayer => assert!(matches!(err, HarnessError::PlayerNotMounted { .. })),
        Page::NoTelemetry => assert!(matches!(err, HarnessError::TelemetryNotReady { .. })),
        Page::HangingNavigation | Page::Healthy(_) => unreachable!(),
    }
    assert!(err.is_session_error());

    let records = launcher.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].closed, "browser must be closed on failure");
    assert!(!records[0].user_data_dir.exists(), "workspace must be removed on failure");
}

#[tokio::test]
async fn hanging_navigation_is_bounded_by_navigation_timeout() {
    let launcher = FakeLauncher::default().with_page("http://localhost:9004", Page::HangingNavigation);

    let start = std::time::Instant::now();
    let err = driver(&launcher)
        .run("http://localhost:9004", Duration::from_millis(10))
        .await
        .unwrap_err();

    assert!(
        matches!(&err, HarnessError::NavigationTimeout { url, .. } if url == "http://localhost:9004"),
        "unexpected error: {}",
        err
    );
    assert!(start.elapsed() < Duration::from_secs(2));

    let records = launcher.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].closed);
    assert!(!records[0].user_data_dir.exists());
}

#[tokio::test]
async fn launch_failure_is_reported() {
    let launcher = FakeLauncher {
        fail_launch: true,
        ..Default::default()
    };

    let err = driver(&launcher)
        .run("http://localhost:9003", Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Browser(_)));
    assert!(launcher.records().is_empty());
}

#[tokio::test]
async fn every_catalog_entry_gets_an_outcome() {
    let scripts = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::default()
        .with_page("http://localhost:9101", Page::Healthy(telemetry()))
        .with_page("http://localhost:9102", Page::NoTelemetry)
        .with_page("http://localhost:9103", Page::Healthy(telemetry()));

    let catalog = Catalog::new(vec![
        test_config("native", 9101, None),
        test_config("broken-player", 9102, None),
        // Missing script: runs under native conditions
        test_config("missing-profile", 9103, Some("missing_profile.sh")),
        // Nothing listens here
        test_config("unreachable", 9104, None),
    ])
    .unwrap();

    let results = sequencer(&launcher, scripts.path().to_path_buf())
        .run_all(&catalog)
        .await;

    assert_eq!(results.len(), 4);
    assert!(results.get("native").unwrap().is_success());
    assert!(results.get("missing-profile").unwrap().is_success());
    assert!(matches!(
        results.get("broken-player"),
        Some(TestOutcome::Failed { error }) if error.contains("telemetry")
    ));
    assert!(!results.get("unreachable").unwrap().is_success());

    // One isolated session per test, all cleaned up
    let records = launcher.records();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.closed && !r.user_data_dir.exists()));
    let mut dirs: Vec<_> = records.iter().map(|r| r.user_data_dir.clone()).collect();
    dirs.sort();
    dirs.dedup();
    assert_eq!(dirs.len(), 4);
}

#[tokio::test]
async fn run_catalog_persists_report_in_catalog_order() {
    let scripts = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::default()
        .with_page("http://localhost:9201", Page::Healthy(telemetry()))
        .with_page("http://localhost:9203", Page::Healthy(telemetry()));

    let catalog = Catalog::new(vec![
        test_config("first", 9201, None),
        test_config("second", 9202, None),
        test_config("third", 9203, None),
    ])
    .unwrap();

    let persister = ResultPersister::new(out.path().join("test-results.json"));
    let report = sequencer(&launcher, scripts.path().to_path_buf())
        .run_catalog(&catalog, &persister)
        .await
        .unwrap();

    assert_eq!(report.passed(), 2);
    assert_eq!(report.failed(), 1);

    let saved = persister.load().unwrap();
    let names: Vec<&str> = saved.test_results.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
    assert!(saved.test_results["second"].error.is_some());
    assert!(saved.test_results["second"].qoe_score.is_none());

    // Identical telemetry scores identically
    assert_eq!(
        saved.test_results["first"].qoe_score,
        saved.test_results["third"].qoe_score
    );
    assert!(saved.test_results["first"].qoe_score.is_some());
}

#[tokio::test]
async fn run_single_persists_only_that_test() {
    let scripts = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::default().with_page("http://localhost:9301", Page::Healthy(telemetry()));
    let persister = ResultPersister::new(out.path().join("test-results.json"));

    let report = sequencer(&launcher, scripts.path().to_path_buf())
        .run_single(&test_config("solo", 9301, None), &persister)
        .await
        .unwrap();

    assert_eq!(report.test_results.len(), 1);
    assert!(report.test_results["solo"].is_success());
    let saved = persister.load().unwrap();
    assert_eq!(saved.test_results.len(), 1);
    assert!(saved.test_results["solo"].metrics.is_some());
}

#[cfg(unix)]
#[tokio::test]
async fn profile_spans_its_session_and_is_stopped_before_the_next_test() {
    let scripts = tempfile::tempdir().unwrap();
    std::fs::write(scripts.path().join("slow_link.sh"), "sleep 30\n").unwrap();
    std::fs::write(scripts.path().join("lossy_link.sh"), "sleep 30\n").unwrap();

    let profiles = ProfileRunner::new(scripts.path(), "sh");
    let launcher = FakeLauncher::default()
        .watching(profiles.active())
        .with_page("http://localhost:9401", Page::Healthy(telemetry()))
        .with_page("http://localhost:9402", Page::Healthy(telemetry()))
        .with_page("http://localhost:9403", Page::Healthy(telemetry()));

    let catalog = Catalog::new(vec![
        test_config("slow-link", 9401, Some("slow_link.sh")),
        test_config("native", 9402, None),
        test_config("lossy-link", 9403, Some("lossy_link.sh")),
    ])
    .unwrap();

    let sequencer = sequencer_with(&launcher, profiles);
    let results = sequencer.run_all(&catalog).await;
    assert_eq!(results.len(), 3);

    let records = launcher.records();
    assert_eq!(records.len(), 3);

    // Started before the session and alive throughout it
    assert_eq!(records[0].profile_at_launch.as_deref(), Some("slow_link.sh"));
    assert_eq!(records[0].profile_during_session.as_deref(), Some("slow_link.sh"));

    // Stopped before the next test starts
    assert_eq!(records[1].profile_at_launch, None);
    assert_eq!(records[1].profile_during_session, None);

    assert_eq!(records[2].profile_at_launch.as_deref(), Some("lossy_link.sh"));
    assert_eq!(records[2].profile_during_session.as_deref(), Some("lossy_link.sh"));

    assert_eq!(sequencer.profiles().active().current(), None);
}
