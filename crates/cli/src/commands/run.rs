//! Run Commands

use abrbench_common::{capability, Catalog, ReportEntry, ResultReport, TestConfiguration, DEFAULT_DURATION_SECS};
use abrbench_harness::{
    ChromiumLauncher, HarnessConfig, ProfileRunner, ResultPersister, SequencerConfig, SessionDriver,
    SessionTimeouts, TestSequencer,
};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::output::{print_error, print_info, print_list, print_success, print_warning, OutputFormat, TableDisplay};

/// Run arguments
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Test to run, or `list` to show the catalog (default: every test)
    pub target: Option<String>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub visual: bool,

    /// Observation window per test, in seconds (0 falls back to the default)
    #[arg(long, default_value_t = DEFAULT_DURATION_SECS)]
    pub duration: u64,

    /// Accepted for compatibility; has no effect
    #[arg(long)]
    pub bench: bool,

    /// Results file (overrides `results_path` from the config)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    /// Observation window, with 0 meaning the default
    pub fn observation(&self) -> Duration {
        match self.duration {
            0 => Duration::from_secs(DEFAULT_DURATION_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

/// What a `run` invocation covers
enum Selection {
    All,
    One(TestConfiguration),
}

/// Catalog entry display wrapper
#[derive(Serialize)]
pub struct CatalogRow {
    pub name: String,
    pub port: u16,
    pub weight: Option<f64>,
    pub network_script: Option<String>,
    pub quality_target_kbps: Option<u32>,
    pub description: String,
}

impl From<&TestConfiguration> for CatalogRow {
    fn from(test: &TestConfiguration) -> Self {
        Self {
            name: test.name.clone(),
            port: test.port,
            weight: test.weight,
            network_script: test.network_script.clone(),
            quality_target_kbps: capability::lookup(&test.name)
                .profile()
                .map(|p| p.quality_target_kbps),
            description: test.description.clone(),
        }
    }
}

impl TableDisplay for CatalogRow {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Port", "Weight", "Profile", "Target", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.port.to_string(),
            self.weight.map(|w| w.to_string()).unwrap_or_else(|| "-".to_string()),
            self.network_script.clone().unwrap_or_else(|| "-".to_string()),
            self.quality_target_kbps
                .map(|kbps| format!("{} kbit/s", kbps))
                .unwrap_or_else(|| "-".to_string()),
            self.description.clone(),
        ]
    }
}

/// Post-run summary display wrapper
#[derive(Serialize)]
pub struct SummaryRow {
    pub test: String,
    pub qoe_score: Option<f64>,
    pub average_bitrate_bps: Option<f64>,
    pub num_rebuffers: Option<u32>,
    pub num_quality_switches: Option<u32>,
    pub time_to_first_frame_ms: Option<f64>,
    pub stall_time_s: Option<f64>,
    pub quality_target_kbps: Option<u32>,
    pub meets_target: Option<bool>,
    pub error: Option<String>,
}

impl From<&ReportEntry> for SummaryRow {
    fn from(entry: &ReportEntry) -> Self {
        let capability = capability::lookup(&entry.network);
        let metrics = entry.metrics.as_ref();
        Self {
            test: entry.network.clone(),
            qoe_score: entry.qoe_score,
            average_bitrate_bps: metrics.map(|m| m.average_bitrate_bps),
            num_rebuffers: metrics.map(|m| m.num_rebuffers),
            num_quality_switches: metrics.map(|m| m.num_quality_switches),
            time_to_first_frame_ms: metrics.map(|m| m.time_to_first_frame_ms),
            stall_time_s: metrics.map(|m| m.stall_time_s),
            quality_target_kbps: capability.profile().map(|p| p.quality_target_kbps),
            meets_target: metrics.and_then(|m| capability.meets_target(m.average_bitrate_bps)),
            error: entry.error.clone(),
        }
    }
}

impl TableDisplay for SummaryRow {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "QoE", "Bitrate", "Rebuffers", "Switches", "TTFF", "Stall", "Target", "Status"]
    }

    fn row(&self) -> Vec<String> {
        let dash = || "-".to_string();
        vec![
            self.test.clone(),
            self.qoe_score.map(|s| format!("{:.2}", s)).unwrap_or_else(dash),
            self.average_bitrate_bps
                .map(|bps| format!("{:.0} kbit/s", bps / 1000.0))
                .unwrap_or_else(dash),
            self.num_rebuffers.map(|n| n.to_string()).unwrap_or_else(dash),
            self.num_quality_switches.map(|n| n.to_string()).unwrap_or_else(dash),
            self.time_to_first_frame_ms
                .map(|ms| format!("{:.0}ms", ms))
                .unwrap_or_else(dash),
            self.stall_time_s.map(|s| format!("{:.1}s", s)).unwrap_or_else(dash),
            match (self.quality_target_kbps, self.meets_target) {
                (Some(kbps), Some(true)) => format!("{} kbit/s ✓", kbps),
                (Some(kbps), Some(false)) => format!("{} kbit/s ✗", kbps),
                (Some(kbps), None) => format!("{} kbit/s", kbps),
                (None, _) => dash(),
            },
            match &self.error {
                Some(error) => format!("failed: {}", error),
                None => "ok".to_string(),
            },
        ]
    }
}

pub async fn execute(args: RunArgs, config: HarnessConfig, format: OutputFormat) -> Result<()> {
    let catalog = config.catalog()?;

    let selection = match args.target.as_deref() {
        Some("list") => {
            list(&catalog, format);
            return Ok(());
        }
        Some(name) => match catalog.find(name) {
            Ok(test) => Selection::One(test.clone()),
            Err(e) => {
                print_error(&e.to_string());
                std::process::exit(1);
            }
        },
        None => Selection::All,
    };

    if args.bench {
        debug!("--bench has no effect");
    }

    let sequencer = build_sequencer(&args, &config);
    let persister = ResultPersister::new(args.output.clone().unwrap_or_else(|| config.results_path.clone()));
    let active = sequencer.profiles().active();

    let work = async {
        match &selection {
            Selection::All => sequencer.run_catalog(&catalog, &persister).await,
            Selection::One(test) => sequencer.run_single(test, &persister).await,
        }
    };

    let report = tokio::select! {
        result = work => match result {
            Ok(report) => report,
            Err(e) => {
                error!("Fatal error during run: {}", e);
                active.terminate();
                return Err(e.into());
            }
        },
        signal = shutdown_signal() => {
            print_warning(&format!("Received {}, shutting down...", signal));
            active.terminate();
            return Ok(());
        }
    };

    print_summary(&report, format);
    print_success(&format!(
        "{} passed, {} failed. Results saved to {}",
        report.passed(),
        report.failed(),
        persister.path().display()
    ));
    Ok(())
}

fn build_sequencer(args: &RunArgs, config: &HarnessConfig) -> TestSequencer {
    let profiles = ProfileRunner::new(config.scripts_dir.clone(), config.script_interpreter.clone());

    let driver = SessionDriver::new(
        Arc::new(ChromiumLauncher),
        SessionTimeouts::from(&config.timings),
    )
    .headless(!args.visual)
    .executable(config.chrome_executable.clone());

    TestSequencer::new(
        profiles,
        driver,
        SequencerConfig::new(
            config.target_host.clone(),
            args.observation(),
            &config.timings,
        ),
    )
}

fn list(catalog: &Catalog, format: OutputFormat) {
    let rows: Vec<CatalogRow> = catalog.iter().map(CatalogRow::from).collect();
    if format == OutputFormat::Table {
        print_info(&format!("{} tests available:", rows.len()));
    }
    print_list(&rows, format);
}

fn print_summary(report: &ResultReport, format: OutputFormat) {
    let rows: Vec<SummaryRow> = report.entries().map(SummaryRow::from).collect();
    print_list(&rows, format);
}

/// Resolves on SIGINT or SIGTERM with the signal's name
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
