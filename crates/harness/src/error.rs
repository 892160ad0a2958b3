//! Error types for the harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Navigation to {url} did not become interactive within {seconds}s")]
    NavigationTimeout { url: String, seconds: u64 },

    #[error("Player element '{selector}' not mounted within {seconds}s")]
    PlayerNotMounted { selector: String, seconds: u64 },

    #[error("Player telemetry not ready within {seconds}s")]
    TelemetryNotReady { seconds: u64 },

    #[error("Telemetry extraction failed: {0}")]
    SessionExtraction(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Network profile '{profile}' failed to start: {reason}")]
    ProfileStart { profile: String, reason: String },

    #[error("Network profile '{profile}' failed to stop: {reason}")]
    ProfileStop { profile: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] abrbench_common::Error),
}

impl HarnessError {
    /// Whether this error belongs to a single browser session
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            HarnessError::NavigationTimeout { .. }
                | HarnessError::PlayerNotMounted { .. }
                | HarnessError::TelemetryNotReady { .. }
                | HarnessError::SessionExtraction(_)
                | HarnessError::Browser(_)
        )
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
