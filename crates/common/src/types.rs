//! Core types for abrbench

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of the player's bitrate history.
///
/// `timestamp` is the page clock (`performance.now()`) in milliseconds at the
/// moment the new quality was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BitrateSample {
    pub bitrate: f64,
    pub timestamp: f64,
}

impl BitrateSample {
    pub fn new(bitrate: f64, timestamp: f64) -> Self {
        Self { bitrate, timestamp }
    }
}

/// Telemetry snapshot captured once at the end of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSessionMetrics {
    /// Milliseconds from stream initialization to first rendered frame
    pub time_to_first_frame: Option<f64>,
    pub num_rebuffers: u32,
    pub num_quality_switches: u32,
    /// Driver-side average in bits/second (page routine or unweighted mean)
    pub average_bitrate: f64,
    /// Seconds of media actually played
    pub duration: f64,
    #[serde(default)]
    pub bitrate_history: Vec<BitrateSample>,
    pub timestamp: DateTime<Utc>,
}

impl RawSessionMetrics {
    /// Snapshot with no playback at all
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            time_to_first_frame: None,
            num_rebuffers: 0,
            num_quality_switches: 0,
            average_bitrate: 0.0,
            duration: 0.0,
            bitrate_history: Vec::new(),
            timestamp,
        }
    }
}

/// Outcome of a single attempted test
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Completed(RawSessionMetrics),
    Failed { error: String },
}

impl TestOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestOutcome::Completed(_))
    }

    pub fn metrics(&self) -> Option<&RawSessionMetrics> {
        match self {
            TestOutcome::Completed(metrics) => Some(metrics),
            TestOutcome::Failed { .. } => None,
        }
    }
}

/// Raw outcomes of a run, keyed by test name.
///
/// The map is unordered; anything that displays or persists results walks the
/// catalog and looks entries up here.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    outcomes: HashMap<String, TestOutcome>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a test, replacing any earlier outcome for it
    pub fn record(&mut self, test_name: impl Into<String>, outcome: TestOutcome) {
        self.outcomes.insert(test_name.into(), outcome);
    }

    pub fn get(&self, test_name: &str) -> Option<&TestOutcome> {
        self.outcomes.get(test_name)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Names of tests with a recorded outcome, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outcomes.keys().map(String::as_str)
    }
}
