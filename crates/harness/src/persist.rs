//! Result persistence

use abrbench_common::ResultReport;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{HarnessError, HarnessResult};

/// Default report location, relative to the working directory
pub const DEFAULT_RESULTS_PATH: &str = "test-results.json";

/// Writes result reports to a fixed path.
///
/// Writes go to a temporary file next to the target which is then renamed
/// over it, so an interrupted write never leaves a truncated report.
#[derive(Debug, Clone)]
pub struct ResultPersister {
    path: PathBuf,
}

impl ResultPersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `report` and replace any previous file
    pub fn save(&self, report: &ResultReport) -> HarnessResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = report.to_json_pretty()?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".abrbench-results-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| HarnessError::Io(e.error))?;

        info!("Saved {} results to {}", report.test_results.len(), self.path.display());
        Ok(())
    }

    /// Read back a previously saved report
    pub fn load(&self) -> HarnessResult<ResultReport> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for ResultPersister {
    fn default() -> Self {
        Self::new(DEFAULT_RESULTS_PATH)
    }
}
