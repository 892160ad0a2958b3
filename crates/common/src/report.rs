//! Persisted result report
//!
//! Schema of the `test-results.json` artifact. Entries are stored in catalog
//! order regardless of the order the result set was filled in.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::Catalog;
use crate::qoe::{self, ScoredSession};
use crate::types::{BitrateSample, ResultSet, TestOutcome};

/// Error recorded for a catalog entry that has no outcome at all
pub const NO_DATA: &str = "No data";

/// The full report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReport {
    pub timestamp: DateTime<Utc>,
    pub test_results: IndexMap<String, ReportEntry>,
}

/// Per-test entry of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub network: String,

    #[serde(rename = "QoE_score", default, skip_serializing_if = "Option::is_none")]
    pub qoe_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ReportMetrics>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportEntry {
    pub fn failed(network: &str, error: impl Into<String>) -> Self {
        Self {
            network: network.to_string(),
            qoe_score: None,
            metrics: None,
            error: Some(error.into()),
        }
    }

    pub fn scored(network: &str, session: ScoredSession) -> Self {
        Self {
            network: network.to_string(),
            qoe_score: Some(session.qoe_score),
            metrics: Some(ReportMetrics::from(session)),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.qoe_score.is_some()
    }

    /// One-line operator summary
    pub fn summary_line(&self) -> String {
        match (&self.metrics, self.qoe_score, &self.error) {
            (Some(m), Some(score), _) => format!(
                "[RESULT] {}: QoE={:.2}, bitrate={:.0}, rebuffer={}, switches={}, TTF={}, Stall Time={}",
                self.network,
                score,
                m.average_bitrate_bps,
                m.num_rebuffers,
                m.num_quality_switches,
                m.time_to_first_frame_ms,
                m.stall_time_s,
            ),
            (_, _, Some(error)) => format!("[RESULT] {}: failed: {}", self.network, error),
            _ => format!("[RESULT] {}: failed: {}", self.network, NO_DATA),
        }
    }
}

/// Normalized metrics of a scored test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetrics {
    #[serde(rename = "averageBitrate_bps")]
    pub average_bitrate_bps: f64,
    pub num_rebuffers: u32,
    pub num_quality_switches: u32,
    #[serde(rename = "timeToFirstFrame_ms")]
    pub time_to_first_frame_ms: f64,
    #[serde(rename = "duration_s")]
    pub duration_s: f64,
    #[serde(rename = "stallTime_s")]
    pub stall_time_s: f64,
    pub bitrate_history: Vec<BitrateSample>,
}

impl From<ScoredSession> for ReportMetrics {
    fn from(session: ScoredSession) -> Self {
        Self {
            average_bitrate_bps: session.average_bitrate_bps,
            num_rebuffers: session.num_rebuffers,
            num_quality_switches: session.num_quality_switches,
            time_to_first_frame_ms: session.time_to_first_frame_ms,
            duration_s: session.duration_s,
            stall_time_s: session.stall_time_s,
            bitrate_history: session.bitrate_history,
        }
    }
}

impl ResultReport {
    /// Score every outcome and lay the entries out in catalog order.
    ///
    /// Every catalog entry gets exactly one report entry; entries without an
    /// outcome are recorded as failures.
    pub fn build(
        catalog: &Catalog,
        results: &ResultSet,
        nominal_duration_s: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut test_results = IndexMap::with_capacity(catalog.len());

        for config in catalog {
            let entry = match results.get(&config.name) {
                Some(TestOutcome::Completed(metrics)) => {
                    ReportEntry::scored(&config.name, qoe::score(metrics, nominal_duration_s))
                }
                Some(TestOutcome::Failed { error }) => ReportEntry::failed(&config.name, error.clone()),
                None => ReportEntry::failed(&config.name, NO_DATA),
            };
            info!("{}", entry.summary_line());
            test_results.insert(config.name.clone(), entry);
        }

        Self {
            timestamp,
            test_results,
        }
    }

    /// Entries in report order
    pub fn entries(&self) -> impl Iterator<Item = &ReportEntry> {
        self.test_results.values()
    }

    pub fn passed(&self) -> usize {
        self.entries().filter(|e| e.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.test_results.len() - self.passed()
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
