//! Headless Chrome implementation of [`Browser`] via `chromiumoxide`.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::contract::Browser;
use crate::error::SnapshotError;
use crate::snapshot::{scripts, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    /// Upper bound on each readiness wait. `None` waits indefinitely.
    pub readiness_timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            readiness_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One Chrome process driving a single tab.
pub struct ChromeBrowser {
    browser: chromiumoxide::Browser,
    page: Page,
    handler: JoinHandle<()>,
    options: ChromeOptions,
}

impl ChromeBrowser {
    pub async fn launch(options: ChromeOptions) -> Result<Self, SnapshotError> {
        let mut builder = BrowserConfig::builder().window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT);
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(SnapshotError::Launch)?;

        info!(headless = options.headless, "[SNAPSHOT] Launching Chrome");
        let (browser, mut events) = chromiumoxide::Browser::launch(config)
            .await
            .map_err(|e| SnapshotError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "[SNAPSHOT] Browser handler stopped");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SnapshotError::Launch(e.to_string()))?;

        Ok(Self {
            browser,
            page,
            handler,
            options,
        })
    }

    async fn poll_selector(&self, selector: &str) -> Result<(), SnapshotError> {
        loop {
            match self.page.find_element(selector).await {
                Ok(_) => return Ok(()),
                Err(e) if is_not_ready(&e) => {
                    debug!(selector, error = %e, "[SNAPSHOT] Selector not ready yet");
                    tokio::time::sleep(self.options.poll_interval).await;
                }
                Err(e) => {
                    error!(selector, error = %e, "[SNAPSHOT] Browser stopped answering");
                    return Err(SnapshotError::Disconnected(e.to_string()));
                }
            }
        }
    }

    async fn evaluate(&self, script: String) -> Result<(), SnapshotError> {
        self.page
            .evaluate(script)
            .await
            .map(|_| ())
            .map_err(|e| SnapshotError::Script(e.to_string()))
    }
}

/// Errors a live page answers with while the element is still missing.
/// Anything else means the connection to Chrome is gone.
fn is_not_ready(error: &CdpError) -> bool {
    matches!(error, CdpError::NotFound | CdpError::Chrome(_))
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), SnapshotError> {
        let params = SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false);
        self.page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|e| SnapshotError::Launch(format!("viewport {width}x{height}: {e}")))
    }

    async fn navigate(&self, url: &str) -> Result<(), SnapshotError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| SnapshotError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn wait_ready(&self, selector: &str) -> Result<(), SnapshotError> {
        match self.options.readiness_timeout {
            None => self.poll_selector(selector).await,
            Some(limit) => tokio::time::timeout(limit, self.poll_selector(selector))
                .await
                .map_err(|_| {
                    warn!(selector, timeout = ?limit, "[SNAPSHOT] Readiness wait timed out");
                    SnapshotError::Readiness {
                        selector: selector.to_string(),
                        reason: format!("not present after {limit:?}"),
                    }
                })?,
        }
    }

    async fn submit_text(&self, selector: &str, text: &str) -> Result<(), SnapshotError> {
        let input_error = |e: CdpError| SnapshotError::Input {
            selector: selector.to_string(),
            reason: e.to_string(),
        };
        let element = self.page.find_element(selector).await.map_err(input_error)?;
        element.click().await.map_err(input_error)?;
        element.type_str(text).await.map_err(input_error)?;
        element.press_key("Enter").await.map_err(input_error)?;
        Ok(())
    }

    async fn remove_element(&self, selector: &str) -> Result<(), SnapshotError> {
        self.evaluate(scripts::remove_element(selector)).await
    }

    async fn clear_padding_left(&self, selector: &str) -> Result<(), SnapshotError> {
        self.evaluate(scripts::clear_padding_left(selector)).await
    }

    async fn print_to_pdf(&self) -> Result<Vec<u8>, SnapshotError> {
        self.page
            .pdf(PrintToPdfParams::default())
            .await
            .map_err(|e| SnapshotError::Print(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), SnapshotError> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "[SNAPSHOT] Chrome process did not exit cleanly");
        }
        self.handler.abort();
        closed.map(|_| ()).map_err(|e| {
            error!(error = %e, "[SNAPSHOT] Failed to close Chrome");
            SnapshotError::Launch(format!("close: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_node_keeps_polling() {
        assert!(is_not_ready(&CdpError::NotFound));
    }

    #[test]
    fn dead_connection_stops_polling() {
        assert!(!is_not_ready(&CdpError::NoResponse));
        assert!(!is_not_ready(&CdpError::ChromeMessage("handler gone".into())));
    }
}
