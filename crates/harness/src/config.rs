//! Harness configuration

use abrbench_common::{Catalog, TestConfiguration};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

/// Harness configuration, usually read from `abrbench.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Where the result report is written
    pub results_path: PathBuf,

    /// Host serving the per-test player endpoints
    pub target_host: String,

    /// Directory holding the network profile scripts
    pub scripts_dir: PathBuf,

    /// Interpreter used to run a profile script
    pub script_interpreter: String,

    /// Browser binary (None = auto-detect)
    pub chrome_executable: Option<PathBuf>,

    /// Delays and bounded waits
    pub timings: Timings,

    /// Replacement for the built-in catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Vec<TestConfiguration>>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            results_path: PathBuf::from(crate::persist::DEFAULT_RESULTS_PATH),
            target_host: "localhost".to_string(),
            scripts_dir: PathBuf::from("scripts"),
            script_interpreter: "bash".to_string(),
            chrome_executable: None,
            timings: Timings::default(),
            catalog: None,
        }
    }
}

/// Delays and bounded waits, in whole seconds unless noted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Wait after starting a profile, before the session
    pub settle_delay_secs: u64,

    /// Quiescence between consecutive tests
    pub inter_test_delay_secs: u64,

    pub navigation_timeout_secs: u64,
    pub mount_timeout_secs: u64,
    pub telemetry_timeout_secs: u64,

    /// Polling cadence for readiness checks, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_delay_secs: 5,
            inter_test_delay_secs: 5,
            navigation_timeout_secs: 60,
            mount_timeout_secs: 30,
            telemetry_timeout_secs: 30,
            poll_interval_ms: 250,
        }
    }
}

impl Timings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn inter_test_delay(&self) -> Duration {
        Duration::from_secs(self.inter_test_delay_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn mount_timeout(&self) -> Duration {
        Duration::from_secs(self.mount_timeout_secs)
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_secs(self.telemetry_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl HarnessConfig {
    /// Load configuration from file; a missing file yields the defaults
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| HarnessError::Config(format!("{}: {}", path.display(), e)))?;
        // Fail at load time rather than mid-run
        config.catalog()?;
        Ok(config)
    }

    /// The catalog to run: the configured replacement or the built-in one
    pub fn catalog(&self) -> HarnessResult<Catalog> {
        match &self.catalog {
            Some(entries) => Ok(Catalog::new(entries.clone())?),
            None => Ok(Catalog::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.results_path, PathBuf::from("test-results.json"));
        assert_eq!(config.timings.navigation_timeout(), Duration::from_secs(60));
        assert_eq!(config.catalog().unwrap().len(), 12);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abrbench.toml");
        std::fs::write(
            &path,
            r#"
target_host = "10.0.0.5"

[timings]
settle_delay_secs = 1

[[catalog]]
name = "lab-link"
port = 9800
network_script = "lab_link.sh"
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.target_host, "10.0.0.5");
        assert_eq!(config.timings.settle_delay_secs, 1);
        assert_eq!(config.timings.inter_test_delay_secs, 5);
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entries()[0].target_url("10.0.0.5"), "http://10.0.0.5:9800");
    }

    #[test]
    fn test_duplicate_catalog_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abrbench.toml");
        std::fs::write(
            &path,
            r#"
[[catalog]]
name = "twice"
port = 9001

[[catalog]]
name = "twice"
port = 9002
"#,
        )
        .unwrap();

        assert!(matches!(
            HarnessConfig::load(&path),
            Err(HarnessError::Common(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abrbench.toml");
        std::fs::write(&path, "timings = 3").unwrap();
        assert!(matches!(HarnessConfig::load(&path), Err(HarnessError::Config(_))));
    }
}
