//! Browser session driver
//!
//! One session = one fresh browser bound to a throwaway profile directory,
//! one page, one observation window, one telemetry snapshot. The browser is
//! closed and the directory removed on every exit path.

use abrbench_common::RawSessionMetrics;
use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::Timings;
use crate::error::{HarnessError, HarnessResult};
use crate::telemetry::{self, PageTelemetry};

/// How a browser instance should be launched
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Profile directory exclusive to this session
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub no_sandbox: bool,
    /// Browser binary (None = auto-detect)
    pub executable: Option<PathBuf>,
    /// Deadline for a single DevTools request; never shorter than the navigation bound
    pub request_timeout: Duration,
}

/// Launches browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> HarnessResult<Box<dyn BrowserSession>>;
}

/// A running browser with a single page
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate the page to `url`
    async fn navigate(&self, url: &str) -> HarnessResult<()>;

    /// Whether an element matching `selector` is in the DOM
    async fn element_exists(&self, selector: &str) -> HarnessResult<bool>;

    /// Evaluate a read-only expression in the page, returning its JSON value
    async fn evaluate(&self, expression: &str) -> HarnessResult<serde_json::Value>;

    /// Close the browser
    async fn close(self: Box<Self>) -> HarnessResult<()>;
}

/// Throwaway browser profile directory, removed when released or dropped
#[derive(Debug)]
pub struct SessionWorkspace {
    dir: tempfile::TempDir,
}

impl SessionWorkspace {
    pub fn allocate() -> HarnessResult<Self> {
        let dir = tempfile::Builder::new().prefix("abrbench-chrome-").tempdir()?;
        debug!("Allocated session workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory; failures are logged, not returned
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("temp directory cleanup failed for {}: {}", path.display(), e);
        }
    }
}

/// Floor for the DevTools request deadline
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded waits used by a session
#[derive(Debug, Clone)]
pub struct SessionTimeouts {
    pub navigation: Duration,
    pub mount: Duration,
    pub telemetry: Duration,
    pub poll_interval: Duration,
}

impl SessionTimeouts {
    /// DevTools request deadline, at least the navigation bound
    pub fn request_timeout(&self) -> Duration {
        self.navigation.max(MIN_REQUEST_TIMEOUT)
    }
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self::from(&Timings::default())
    }
}

impl From<&Timings> for SessionTimeouts {
    fn from(timings: &Timings) -> Self {
        Self {
            navigation: timings.navigation_timeout(),
            mount: timings.mount_timeout(),
            telemetry: timings.telemetry_timeout(),
            poll_interval: timings.poll_interval(),
        }
    }
}

/// Drives one browser session per call to [`SessionDriver::run`]
#[derive(Clone)]
pub struct SessionDriver {
    launcher: Arc<dyn BrowserLauncher>,
    timeouts: SessionTimeouts,
    headless: bool,
    executable: Option<PathBuf>,
}

impl SessionDriver {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, timeouts: SessionTimeouts) -> Self {
        Self {
            launcher,
            timeouts,
            headless: true,
            executable: None,
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }

    /// Open `url`, let the player run for `observation`, return its telemetry
    pub async fn run(&self, url: &str, observation: Duration) -> HarnessResult<RawSessionMetrics> {
        let workspace = SessionWorkspace::allocate()?;
        let options = LaunchOptions {
            user_data_dir: workspace.path().to_path_buf(),
            headless: self.headless,
            no_sandbox: true,
            executable: self.executable.clone(),
            request_timeout: self.timeouts.request_timeout(),
        };

        let session = match self.launcher.launch(&options).await {
            Ok(session) => session,
            Err(e) => {
                workspace.release();
                return Err(e);
            }
        };

        let outcome = self.observe(session.as_ref(), url, observation).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser: {}", e);
        }
        workspace.release();

        outcome
    }

    async fn observe(
        &self,
        session: &dyn BrowserSession,
        url: &str,
        observation: Duration,
    ) -> HarnessResult<RawSessionMetrics> {
        let poll = self.timeouts.poll_interval;

        let navigation = async {
            session.navigate(url).await?;
            wait_until(poll, move || async move {
                let state = session.evaluate(telemetry::READY_STATE_PROBE).await?;
                Ok::<bool, HarnessError>(state.as_str().map(telemetry::is_interactive).unwrap_or(false))
            })
            .await;
            Ok::<(), HarnessError>(())
        };
        match timeout(self.timeouts.navigation, navigation).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(HarnessError::NavigationTimeout {
                    url: url.to_string(),
                    seconds: self.timeouts.navigation.as_secs(),
                })
            }
        }

        let mounted = timeout(
            self.timeouts.mount,
            wait_until(poll, || session.element_exists(telemetry::PLAYER_SELECTOR)),
        )
        .await;
        if mounted.is_err() {
            return Err(HarnessError::PlayerNotMounted {
                selector: telemetry::PLAYER_SELECTOR.to_string(),
                seconds: self.timeouts.mount.as_secs(),
            });
        }

        let ready = timeout(
            self.timeouts.telemetry,
            wait_until(poll, move || async move {
                let ready = session.evaluate(telemetry::READY_PROBE).await?;
                Ok::<bool, HarnessError>(ready.as_bool().unwrap_or(false))
            }),
        )
        .await;
        if ready.is_err() {
            return Err(HarnessError::TelemetryNotReady {
                seconds: self.timeouts.telemetry.as_secs(),
            });
        }

        info!("Player ready, observing for {}s", observation.as_secs_f64());
        sleep(observation).await;

        let value = session
            .evaluate(telemetry::SNAPSHOT_QUERY)
            .await
            .map_err(|e| HarnessError::SessionExtraction(e.to_string()))?;
        let metrics = PageTelemetry::from_value(value)?.into_metrics(Utc::now());

        debug!(
            "Captured telemetry: {} samples, {} rebuffers, {:.1}s played",
            metrics.bitrate_history.len(),
            metrics.num_rebuffers,
            metrics.duration
        );
        Ok(metrics)
    }
}

/// Poll `check` every `interval` until it yields `true`.
///
/// Check errors count as "not yet"; callers bound this with a timeout.
async fn wait_until<F, Fut>(interval: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<bool>>,
{
    let start = Instant::now();
    loop {
        match check().await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => debug!("Readiness check failed after {:?}: {}", start.elapsed(), e),
        }
        sleep(interval).await;
    }
}
