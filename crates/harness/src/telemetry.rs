//! Player telemetry contract
//!
//! The player page exposes a global handle carrying live evaluation metrics.
//! The harness only reads it, once, at the end of the observation window.
//!
//! Contract version 1:
//! - the player mounts a media element matching [`PLAYER_SELECTOR`]
//! - `window.videoPlayer.evalMetrics` holds `timeToFirstFrame` (ms or null),
//!   `numRebuffers`, `numQualitySwitches`, `bitrateHistory`
//!   (`[{bitrate, timestamp}]`) and `lastQuality`
//! - `window.videoPlayer.getAverageBitrate()` is optional; without it the
//!   average is the unweighted mean of `bitrateHistory`

use abrbench_common::{BitrateSample, RawSessionMetrics};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{HarnessError, HarnessResult};

pub const TELEMETRY_CONTRACT_VERSION: u32 = 1;

/// Player mount marker
pub const PLAYER_SELECTOR: &str = "#player";

/// Evaluates to `true` once the telemetry handle exists
pub const READY_PROBE: &str = "Boolean(window.videoPlayer && window.videoPlayer.evalMetrics)";

/// Evaluates to the document's readiness
pub const READY_STATE_PROBE: &str = "document.readyState";

/// Read-only snapshot of the telemetry handle
pub const SNAPSHOT_QUERY: &str = r#"(() => {
    const handle = window.videoPlayer;
    const m = handle.evalMetrics;
    const video = document.getElementById('player');
    return {
        contractVersion: 1,
        timeToFirstFrame: m.timeToFirstFrame ?? null,
        numRebuffers: m.numRebuffers ?? 0,
        numQualitySwitches: m.numQualitySwitches ?? 0,
        bitrateHistory: Array.isArray(m.bitrateHistory) ? m.bitrateHistory : [],
        lastQuality: m.lastQuality ?? null,
        reportedAverageBitrate: typeof handle.getAverageBitrate === 'function'
            ? handle.getAverageBitrate()
            : null,
        currentTime: video ? video.currentTime : 0,
    };
})()"#;

/// Whether a `document.readyState` value means the DOM is usable
pub fn is_interactive(ready_state: &str) -> bool {
    matches!(ready_state, "interactive" | "complete")
}

/// Raw shape returned by [`SNAPSHOT_QUERY`]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTelemetry {
    pub contract_version: u32,
    pub time_to_first_frame: Option<f64>,
    pub num_rebuffers: u32,
    pub num_quality_switches: u32,
    #[serde(default)]
    pub bitrate_history: Vec<BitrateSample>,
    #[serde(default)]
    pub last_quality: Option<f64>,
    #[serde(default)]
    pub reported_average_bitrate: Option<f64>,
    #[serde(default)]
    pub current_time: f64,
}

impl PageTelemetry {
    /// Decode the value returned by the snapshot query
    pub fn from_value(value: serde_json::Value) -> HarnessResult<Self> {
        let telemetry: Self = serde_json::from_value(value)
            .map_err(|e| HarnessError::SessionExtraction(format!("malformed telemetry: {}", e)))?;
        if telemetry.contract_version != TELEMETRY_CONTRACT_VERSION {
            return Err(HarnessError::SessionExtraction(format!(
                "unsupported telemetry contract version {} (expected {})",
                telemetry.contract_version, TELEMETRY_CONTRACT_VERSION
            )));
        }
        Ok(telemetry)
    }

    /// Average bitrate: the page's routine when it gave a usable number,
    /// otherwise the unweighted mean of the history
    pub fn average_bitrate(&self) -> f64 {
        match self.reported_average_bitrate {
            Some(avg) if avg.is_finite() && avg >= 0.0 => avg,
            _ if self.bitrate_history.is_empty() => 0.0,
            _ => {
                let sum: f64 = self.bitrate_history.iter().map(|s| s.bitrate).sum();
                sum / self.bitrate_history.len() as f64
            }
        }
    }

    pub fn into_metrics(self, captured_at: DateTime<Utc>) -> RawSessionMetrics {
        RawSessionMetrics {
            time_to_first_frame: self.time_to_first_frame,
            num_rebuffers: self.num_rebuffers,
            num_quality_switches: self.num_quality_switches,
            average_bitrate: self.average_bitrate(),
            duration: if self.current_time.is_finite() {
                self.current_time
            } else {
                0.0
            },
            bitrate_history: self.bitrate_history,
            timestamp: captured_at,
        }
    }
}
