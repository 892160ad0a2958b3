//! Network capability table
//!
//! Reference expectations per network condition: how much bitrate the
//! encoding ladder can realistically deliver under it, and what a good ABR
//! rule should reach. This is annotation only and never feeds the QoE score.

use serde::Serialize;
use std::fmt;

/// Qualitative expectation for delivered quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityExpectation {
    Maximum,
    High,
    Moderate,
    Constrained,
    Adaptive,
}

/// How many quality switches are acceptable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchTolerance {
    Strict,
    Moderate,
    Lenient,
    VeryLenient,
}

impl fmt::Display for SwitchTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchTolerance::Strict => write!(f, "strict"),
            SwitchTolerance::Moderate => write!(f, "moderate"),
            SwitchTolerance::Lenient => write!(f, "lenient"),
            SwitchTolerance::VeryLenient => write!(f, "very_lenient"),
        }
    }
}

/// Expected achievable behavior for one network condition
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetworkCapabilityProfile {
    /// Highest bitrate realistically deliverable, kbit/s
    pub max_realistic_kbps: u32,
    pub variable_bandwidth: bool,
    pub quality_expectation: QualityExpectation,
    /// Average bitrate a good rule should reach, kbit/s
    pub quality_target_kbps: u32,
    pub switch_tolerance: SwitchTolerance,
}

impl NetworkCapabilityProfile {
    const fn new(
        max_realistic_kbps: u32,
        variable_bandwidth: bool,
        quality_expectation: QualityExpectation,
        quality_target_kbps: u32,
        switch_tolerance: SwitchTolerance,
    ) -> Self {
        Self {
            max_realistic_kbps,
            variable_bandwidth,
            quality_expectation,
            quality_target_kbps,
            switch_tolerance,
        }
    }

    /// Whether an average bitrate in bits/second reaches the quality target
    pub fn meets_target(&self, average_bitrate_bps: f64) -> bool {
        average_bitrate_bps / 1000.0 >= f64::from(self.quality_target_kbps)
    }
}

/// Result of a capability lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CapabilityLookup {
    Characterized(NetworkCapabilityProfile),
    /// The condition has never been characterized
    Uncharacterized,
}

impl CapabilityLookup {
    pub fn profile(&self) -> Option<&NetworkCapabilityProfile> {
        match self {
            CapabilityLookup::Characterized(profile) => Some(profile),
            CapabilityLookup::Uncharacterized => None,
        }
    }

    /// `None` when uncharacterized, otherwise whether the target was reached
    pub fn meets_target(&self, average_bitrate_bps: f64) -> Option<bool> {
        self.profile().map(|p| p.meets_target(average_bitrate_bps))
    }
}

use QualityExpectation as Q;
use SwitchTolerance as S;

const CAPABILITIES: &[(&str, NetworkCapabilityProfile)] = &[
    ("unrestricted", NetworkCapabilityProfile::new(4220, false, Q::Maximum, 3500, S::Strict)),
    ("6mbit-50ms-jitter", NetworkCapabilityProfile::new(4220, true, Q::High, 3000, S::Moderate)),
    ("500kbit-100ms-1min", NetworkCapabilityProfile::new(445, false, Q::Constrained, 375, S::Strict)),
    ("10mbit-100ms-1min", NetworkCapabilityProfile::new(4220, false, Q::Maximum, 4000, S::Strict)),
    ("500kbit-then-unrestricted", NetworkCapabilityProfile::new(2800, true, Q::Adaptive, 1500, S::Lenient)),
    ("56kbit-100ms-1min", NetworkCapabilityProfile::new(50, false, Q::Constrained, 45, S::Strict)),
    ("oscillate-1mbit-start", NetworkCapabilityProfile::new(2800, true, Q::Adaptive, 1200, S::VeryLenient)),
    ("oscillate-5mbit-start", NetworkCapabilityProfile::new(2800, true, Q::Adaptive, 1800, S::VeryLenient)),
    ("4mbit-then-200kbit", NetworkCapabilityProfile::new(2800, true, Q::Adaptive, 1200, S::Lenient)),
    ("3mbit-100ms-1min", NetworkCapabilityProfile::new(2670, false, Q::High, 2000, S::Strict)),
    ("jernbanetorget-ljabru-tram", NetworkCapabilityProfile::new(2800, true, Q::Adaptive, 1000, S::VeryLenient)),
    ("snaroya-smestad-car", NetworkCapabilityProfile::new(2800, true, Q::Adaptive, 1000, S::VeryLenient)),
    // Conditions no longer in the built-in catalog; kept for custom catalogs.
    ("200kbit-100ms-1min", NetworkCapabilityProfile::new(178, false, Q::Constrained, 150, S::Strict)),
    ("1mbit-100ms-1min", NetworkCapabilityProfile::new(791, false, Q::Moderate, 600, S::Strict)),
    ("unrestricted-then-1mbit", NetworkCapabilityProfile::new(2800, true, Q::Adaptive, 1500, S::Lenient)),
];

/// Look up the capability profile for a test name
pub fn lookup(test_name: &str) -> CapabilityLookup {
    CAPABILITIES
        .iter()
        .find(|(name, _)| *name == test_name)
        .map(|(_, profile)| CapabilityLookup::Characterized(*profile))
        .unwrap_or(CapabilityLookup::Uncharacterized)
}
