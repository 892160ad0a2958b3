//! QoE scoring engine
//!
//! Turns a session's raw telemetry into a single comparable score:
//!
//! ```text
//! QoE = 100 * avg_bitrate_mbps
//!     - 10  * stall_time_s
//!     - 3   * rebuffers
//!     - 1   * ttff_s
//!     - 0.1 * quality_switches
//! ```
//!
//! Scores are not clamped; a badly degraded session scores below zero.

use serde::Serialize;

use crate::types::{BitrateSample, RawSessionMetrics};

/// Reward per Mbit/s of time-weighted average bitrate
pub const BITRATE_REWARD_PER_MBPS: f64 = 100.0;
/// Penalty per second without forward playback progress
pub const STALL_PENALTY_PER_SEC: f64 = 10.0;
/// Penalty per rebuffer event
pub const REBUFFER_PENALTY: f64 = 3.0;
/// Penalty per second of time-to-first-frame
pub const STARTUP_PENALTY_PER_SEC: f64 = 1.0;
/// Penalty per quality switch
pub const SWITCH_PENALTY: f64 = 0.1;

/// Inputs of the score formula, already normalized to the formula's units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QoeInputs {
    pub average_bitrate_bps: f64,
    pub stall_time_s: f64,
    pub num_rebuffers: u32,
    pub time_to_first_frame_ms: f64,
    pub num_quality_switches: u32,
}

impl QoeInputs {
    pub fn score(&self) -> f64 {
        BITRATE_REWARD_PER_MBPS * (self.average_bitrate_bps / 1_000_000.0)
            - STALL_PENALTY_PER_SEC * self.stall_time_s
            - REBUFFER_PENALTY * f64::from(self.num_rebuffers)
            - STARTUP_PENALTY_PER_SEC * (self.time_to_first_frame_ms / 1000.0)
            - SWITCH_PENALTY * f64::from(self.num_quality_switches)
    }
}

/// A scored session: the score plus the normalized fields that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSession {
    pub qoe_score: f64,
    pub average_bitrate_bps: f64,
    pub stall_time_s: f64,
    pub num_rebuffers: u32,
    pub num_quality_switches: u32,
    pub time_to_first_frame_ms: f64,
    pub duration_s: f64,
    /// Bitrate history sorted by timestamp
    pub bitrate_history: Vec<BitrateSample>,
}

/// Score a session observed over a window of `nominal_duration_s` seconds
pub fn score(metrics: &RawSessionMetrics, nominal_duration_s: f64) -> ScoredSession {
    let mut history = metrics.bitrate_history.clone();
    sort_history(&mut history);

    let average_bitrate_bps = weighted_average_sorted(&history, nominal_duration_s);
    let duration_s = finite_or_zero(metrics.duration);
    let stall_time_s = stall_time(nominal_duration_s, duration_s);
    let time_to_first_frame_ms = metrics
        .time_to_first_frame
        .map(finite_or_zero)
        .unwrap_or(0.0);

    let inputs = QoeInputs {
        average_bitrate_bps,
        stall_time_s,
        num_rebuffers: metrics.num_rebuffers,
        time_to_first_frame_ms,
        num_quality_switches: metrics.num_quality_switches,
    };

    ScoredSession {
        qoe_score: inputs.score(),
        average_bitrate_bps,
        stall_time_s,
        num_rebuffers: metrics.num_rebuffers,
        num_quality_switches: metrics.num_quality_switches,
        time_to_first_frame_ms,
        duration_s,
        bitrate_history: history,
    }
}

/// Time-weighted average bitrate in bits/second.
///
/// Each sample holds until the next one; the last sample holds until the end
/// of the nominal window. Order of `history` does not matter.
pub fn time_weighted_average_bitrate(history: &[BitrateSample], nominal_duration_s: f64) -> f64 {
    let mut sorted = history.to_vec();
    sort_history(&mut sorted);
    weighted_average_sorted(&sorted, nominal_duration_s)
}

/// Seconds of the window in which media made no forward progress
pub fn stall_time(nominal_duration_s: f64, observed_duration_s: f64) -> f64 {
    (nominal_duration_s - observed_duration_s).max(0.0)
}

fn sort_history(history: &mut [BitrateSample]) {
    history.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
}

fn weighted_average_sorted(history: &[BitrateSample], nominal_duration_s: f64) -> f64 {
    let (first, last) = match (history.first(), history.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for pair in history.windows(2) {
        let weight = ms_to_s(pair[1].timestamp - pair[0].timestamp);
        weighted_sum += pair[0].bitrate * weight;
        total_weight += weight;
    }

    let tail = (nominal_duration_s - ms_to_s(last.timestamp - first.timestamp)).max(0.0);
    weighted_sum += last.bitrate * tail;
    total_weight += tail;

    let average = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        // Zero-length window: every sample weighs the same.
        history.iter().map(|s| s.bitrate).sum::<f64>() / history.len() as f64
    };

    finite_or_zero(average).max(0.0)
}

fn ms_to_s(ms: f64) -> f64 {
    ms / 1000.0
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
