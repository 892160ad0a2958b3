//! Test sequencer - runs catalog entries one after another
//!
//! Tests never overlap: network profiles are not composable and concurrent
//! browsers would disturb each other's measurements.

use abrbench_common::{Catalog, ResultReport, ResultSet, TestConfiguration, TestOutcome};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Timings;
use crate::error::HarnessResult;
use crate::persist::ResultPersister;
use crate::profile::ProfileRunner;
use crate::session::SessionDriver;

/// Sequencing parameters
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Host serving the player endpoints
    pub target_host: String,

    /// Observation window per test
    pub observation: Duration,

    /// Wait between starting a profile and opening the session
    pub settle_delay: Duration,

    /// Wait between consecutive tests
    pub inter_test_delay: Duration,
}

impl SequencerConfig {
    pub fn new(target_host: impl Into<String>, observation: Duration, timings: &Timings) -> Self {
        Self {
            target_host: target_host.into(),
            observation,
            settle_delay: timings.settle_delay(),
            inter_test_delay: timings.inter_test_delay(),
        }
    }
}

/// Runs tests through a profile runner + session driver pair
pub struct TestSequencer {
    profiles: ProfileRunner,
    driver: SessionDriver,
    config: SequencerConfig,
}

impl TestSequencer {
    pub fn new(profiles: ProfileRunner, driver: SessionDriver, config: SequencerConfig) -> Self {
        Self {
            profiles,
            driver,
            config,
        }
    }

    pub fn profiles(&self) -> &ProfileRunner {
        &self.profiles
    }

    /// Nominal observation window, in seconds
    pub fn nominal_duration_secs(&self) -> f64 {
        self.config.observation.as_secs_f64()
    }

    /// Run a single test. Failures become a failed outcome, never an error.
    pub async fn run_one(&self, test: &TestConfiguration) -> TestOutcome {
        let start = Instant::now();
        info!("--- Running test: {} ---", test.name);

        let mut profile = self.profiles.start(test.network_script.as_deref());

        // Let the profile take effect
        sleep(self.config.settle_delay).await;

        let url = test.target_url(&self.config.target_host);
        info!("[TEST] Accessing {}", url);

        let outcome = match self.driver.run(&url, self.config.observation).await {
            Ok(metrics) => TestOutcome::Completed(metrics),
            Err(e) => {
                warn!("Test {} failed: {}", test.name, e);
                TestOutcome::failed(e.to_string())
            }
        };

        if let Err(e) = profile.stop().await {
            warn!("{}", e);
        }

        info!(
            "Finished {} in {:.1}s ({})",
            test.name,
            start.elapsed().as_secs_f64(),
            if outcome.is_success() { "ok" } else { "failed" }
        );
        outcome
    }

    /// Run every catalog entry in order
    pub async fn run_all(&self, catalog: &Catalog) -> ResultSet {
        info!("Running {} test(s)...", catalog.len());

        let mut results = ResultSet::new();
        for (i, test) in catalog.iter().enumerate() {
            if i > 0 {
                info!("[WAIT] Sleeping for {}s before next test...", self.config.inter_test_delay.as_secs());
                sleep(self.config.inter_test_delay).await;
            }
            let outcome = self.run_one(test).await;
            results.record(test.name.clone(), outcome);
        }

        let mut names: Vec<&str> = results.names().collect();
        names.sort_unstable();
        info!("Collected results for: {:?}", names);
        results
    }

    /// Run the whole catalog, then score and persist the report
    pub async fn run_catalog(
        &self,
        catalog: &Catalog,
        persister: &ResultPersister,
    ) -> HarnessResult<ResultReport> {
        let results = self.run_all(catalog).await;
        self.finish(catalog, &results, persister)
    }

    /// Run one test, then score and persist a report holding just that test.
    ///
    /// Unlike [`run_catalog`](Self::run_catalog), the report carries no
    /// "No data" entries for the catalog tests that were not run.
    pub async fn run_single(
        &self,
        test: &TestConfiguration,
        persister: &ResultPersister,
    ) -> HarnessResult<ResultReport> {
        let mut results = ResultSet::new();
        results.record(test.name.clone(), self.run_one(test).await);

        let catalog = Catalog::new(vec![test.clone()])?;
        self.finish(&catalog, &results, persister)
    }

    fn finish(
        &self,
        catalog: &Catalog,
        results: &ResultSet,
        persister: &ResultPersister,
    ) -> HarnessResult<ResultReport> {
        let report = ResultReport::build(catalog, results, self.nominal_duration_secs(), Utc::now());
        persister.save(&report)?;
        Ok(report)
    }
}
