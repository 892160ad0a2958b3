//! Chromium backend over the DevTools protocol

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventLoadingFailed, EventResponseReceived};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, RemoteObject};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::session::{BrowserLauncher, BrowserSession, LaunchOptions};

/// Launches local Chrome/Chromium instances
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> HarnessResult<Box<dyn BrowserSession>> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&options.user_data_dir)
            .request_timeout(options.request_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if options.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(HarnessError::Browser)?;

        debug!("Launching browser (headless: {})", options.headless);
        let (mut browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;

        let mut tasks = vec![tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("DevTools handler error: {}", e);
                }
            }
        })];

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                abort_all(&tasks);
                return Err(browser_err(e));
            }
        };

        match attach_listeners(&page).await {
            Ok(listeners) => tasks.extend(listeners),
            Err(e) => warn!("Diagnostic listeners unavailable: {}", e),
        }

        Ok(Box::new(ChromiumSession {
            browser: Mutex::new(browser),
            page,
            tasks,
            request_timeout: options.request_timeout,
        }))
    }
}

struct ChromiumSession {
    browser: Mutex<Browser>,
    page: Page,
    tasks: Vec<JoinHandle<()>>,
    request_timeout: Duration,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    /// Returns once the navigation is committed; readiness is polled by the driver.
    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| match e {
                CdpError::Timeout => HarnessError::NavigationTimeout {
                    url: url.to_string(),
                    seconds: self.request_timeout.as_secs(),
                },
                other => browser_err(other),
            })?;

        match &response.result.error_text {
            Some(error) => Err(HarnessError::Browser(format!("navigation to {} failed: {}", url, error))),
            None => Ok(()),
        }
    }

    async fn element_exists(&self, selector: &str) -> HarnessResult<bool> {
        let expression = format!(
            "document.querySelector({}) !== null",
            serde_json::to_string(selector)?
        );
        let value = self.evaluate(&expression).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn evaluate(&self, expression: &str) -> HarnessResult<serde_json::Value> {
        let result = self.page.evaluate(expression).await.map_err(browser_err)?;
        Ok(result.into_value()?)
    }

    async fn close(self: Box<Self>) -> HarnessResult<()> {
        let ChromiumSession { browser, tasks, .. } = *self;
        let mut browser = browser.into_inner();

        let closed = browser.close().await.map_err(browser_err);
        if let Err(e) = browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        abort_all(&tasks);
        closed.map(|_| ())
    }
}

/// Log console output, HTTP errors and failed requests; never fatal
async fn attach_listeners(page: &Page) -> HarnessResult<Vec<JoinHandle<()>>> {
    let mut console = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .map_err(browser_err)?;
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(browser_err)?;
    let mut failures = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(browser_err)?;

    Ok(vec![
        tokio::spawn(async move {
            while let Some(event) = console.next().await {
                info!(target: "abrbench::browser", "Browser console: {}", console_text(&event.args));
            }
        }),
        tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                if event.response.status >= 400 {
                    warn!(target: "abrbench::browser", "[HTTP] {} {}", event.response.status, event.response.url);
                }
            }
        }),
        tokio::spawn(async move {
            while let Some(event) = failures.next().await {
                warn!(
                    target: "abrbench::browser",
                    "[REQFAIL] {:?} {:?} → {}",
                    event.r#type, event.request_id, event.error_text
                );
            }
        }),
    ])
}

fn console_text(args: &[RemoteObject]) -> String {
    args.iter()
        .map(|arg| render_console_arg(arg.value.as_ref(), arg.description.as_deref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_console_arg(value: Option<&serde_json::Value>, description: Option<&str>) -> String {
    match (value, description) {
        (Some(serde_json::Value::String(s)), _) => s.clone(),
        (Some(value), _) => value.to_string(),
        (None, Some(description)) => description.to_string(),
        (None, None) => String::new(),
    }
}

fn abort_all(tasks: &[JoinHandle<()>]) {
    for task in tasks {
        task.abort();
    }
}

fn browser_err(e: CdpError) -> HarnessError {
    HarnessError::Browser(e.to_string())
}
