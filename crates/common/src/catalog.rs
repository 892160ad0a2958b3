//! Test catalog
//!
//! The catalog is the fixed, ordered list of network conditions a run walks
//! through. Order matters: it drives execution order and report order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{Error, Result};

/// A single catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfiguration {
    /// Unique name for this test
    pub name: String,

    /// Port of the player endpoint serving this test
    pub port: u16,

    /// Network profile script to run alongside the session
    #[serde(default)]
    pub network_script: Option<String>,

    /// Relative importance (informational)
    #[serde(default)]
    pub weight: Option<f64>,

    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

impl TestConfiguration {
    fn builtin(name: &str, port: u16, weight: Option<f64>, description: &str) -> Self {
        Self {
            name: name.to_string(),
            port,
            network_script: Some(format!("{}.sh", name.replace('-', "_"))),
            weight,
            description: description.to_string(),
        }
    }

    /// URL of the player page for this test on `host`
    pub fn target_url(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.port)
    }
}

/// Ordered, validated set of test configurations
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    entries: Vec<TestConfiguration>,
}

impl Catalog {
    /// Build a catalog, rejecting empty or duplicate names
    pub fn new(entries: Vec<TestConfiguration>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.name.trim().is_empty() {
                return Err(Error::InvalidCatalog(format!(
                    "entry on port {} has an empty name",
                    entry.port
                )));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(Error::DuplicateTestName(entry.name.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// The catalog shipped with the harness
    pub fn builtin() -> Self {
        let entries = vec![
            TestConfiguration::builtin("unrestricted", 9001, Some(1.0), "No network constraints"),
            TestConfiguration::builtin("6mbit-50ms-jitter", 9002, Some(1.5), "Moderate bandwidth with jitter"),
            TestConfiguration::builtin("500kbit-100ms-1min", 9003, Some(2.0), "Low bandwidth"),
            TestConfiguration::builtin("10mbit-100ms-1min", 9004, Some(0.5), "High bandwidth"),
            TestConfiguration::builtin("500kbit-then-unrestricted", 9005, Some(1.5), "Bandwidth improvement"),
            TestConfiguration::builtin("56kbit-100ms-1min", 9006, Some(1.0), "Very low bandwidth"),
            TestConfiguration::builtin("oscillate-1mbit-start", 9007, Some(2.0), "Variable bandwidth starting low"),
            TestConfiguration::builtin("oscillate-5mbit-start", 9008, Some(1.5), "Variable bandwidth starting high"),
            TestConfiguration::builtin("4mbit-then-200kbit", 9009, Some(1.5), "Bandwidth degradation"),
            TestConfiguration::builtin("3mbit-100ms-1min", 9010, Some(2.0), "Median bandwidth"),
            TestConfiguration::builtin(
                "jernbanetorget-ljabru-tram",
                9011,
                None,
                "real-world bandwidth when taking a tram from Ljansbakken to Jernbanetorget",
            ),
            TestConfiguration::builtin(
                "snaroya-smestad-car",
                9012,
                None,
                "real-world bandwidth when driving from snaroya to smestad",
            ),
        ];
        Self { entries }
    }

    /// Look up an entry by exact name
    pub fn find(&self, name: &str) -> Result<&TestConfiguration> {
        self.entries
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownTestName(name.to_string()))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TestConfiguration> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[TestConfiguration] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a TestConfiguration;
    type IntoIter = std::slice::Iter<'a, TestConfiguration>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
