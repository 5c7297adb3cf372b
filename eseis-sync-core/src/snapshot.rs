//! # snapshot: capture dynamically rendered pages as PDF
//!
//! A [`SnapshotSession`] owns one [`Browser`] and walks it through a small
//! state machine:
//!
//! ```text
//! Unauthenticated --login--> Authenticated --snapshot--> Authenticated
//!        |                         |
//!        +--------close------------+------> Closed
//! ```
//!
//! A snapshot navigates to the target page, waits for every readiness
//! selector of its [`PageProfile`], strips banner and navigation chrome so the
//! printed page matches a clean viewport, and prints to PDF.
//!
//! The session adds no timeout to readiness waits; a page that never renders
//! its markers blocks for as long as the [`Browser`] implementation lets it.
//! The selectors are tied to the web client's current markup.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{ApiConfig, Credentials};
use crate::contract::Browser;
use crate::error::SnapshotError;

pub const VIEWPORT_WIDTH: u32 = 799;
pub const VIEWPORT_HEIGHT: u32 = 799;

const USERNAME_FIELD: &str = "#login-username";
const PASSWORD_FIELD: &str = "#login-password";
/// Co-owner balance widget, only rendered once logged in.
const AUTHENTICATED_MARKER: &str = ".sc-eHWfIC";

const TITLE: &str = ".sc-jQAxuV";
const AUTHOR: &str = ".sc-eDdKWq";
const REPORT_DESCRIPTION: &str = ".sc-eHEENL";
const REPORT_COMMENT: &str = ".sc-dWBRfb";
const TOPIC_DESCRIPTION: &str = ".sc-jOFryr";
const MENU_BANNER: &str = ".sc-kLDuD";
const CONTENT_WRAPPER: &str = ".sc-qFupO";

const FORUM_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// Interactive web login: username, Enter, password, Enter.
#[derive(Debug, Clone)]
pub struct LoginFlow {
    pub web_root: String,
    pub credentials: Credentials,
}

impl LoginFlow {
    pub fn new(api: &ApiConfig, credentials: Credentials) -> Self {
        Self {
            web_root: api.web_base_url.clone(),
            credentials,
        }
    }
}

/// What a page needs before it is printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProfile {
    pub name: &'static str,
    pub ready_selectors: Vec<&'static str>,
    pub remove_selectors: Vec<&'static str>,
    pub unpad_selectors: Vec<&'static str>,
    /// Extra delay after cleanup, for content that keeps rendering.
    pub settle: Duration,
}

impl PageProfile {
    pub fn report() -> Self {
        Self {
            name: "report",
            ready_selectors: vec![TITLE, AUTHOR, REPORT_DESCRIPTION, REPORT_COMMENT],
            remove_selectors: vec![MENU_BANNER],
            unpad_selectors: vec![CONTENT_WRAPPER],
            settle: Duration::ZERO,
        }
    }

    pub fn forum_topic() -> Self {
        Self {
            name: "forum_topic",
            ready_selectors: vec![TITLE, AUTHOR, TOPIC_DESCRIPTION],
            remove_selectors: vec![MENU_BANNER],
            unpad_selectors: vec![CONTENT_WRAPPER],
            settle: FORUM_SETTLE,
        }
    }
}

pub struct SnapshotSession<B> {
    browser: B,
    state: SessionState,
}

impl<B: Browser> SnapshotSession<B> {
    pub fn new(browser: B) -> Self {
        Self {
            browser,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub async fn login(&mut self, flow: &LoginFlow) -> Result<(), SnapshotError> {
        match self.state {
            SessionState::Closed => return Err(SnapshotError::Closed),
            SessionState::Authenticated => return Ok(()),
            SessionState::Unauthenticated => {}
        }
        info!(web_root = %flow.web_root, username = %flow.credentials.username, "[SNAPSHOT] Logging in");

        self.browser.set_viewport(VIEWPORT_WIDTH, VIEWPORT_HEIGHT).await?;
        self.browser.navigate(&flow.web_root).await?;
        self.browser.wait_ready(USERNAME_FIELD).await?;
        self.browser
            .submit_text(USERNAME_FIELD, &flow.credentials.username)
            .await?;
        self.browser.wait_ready(PASSWORD_FIELD).await?;
        self.browser
            .submit_text(PASSWORD_FIELD, &flow.credentials.password)
            .await?;
        self.browser.wait_ready(AUTHENTICATED_MARKER).await?;

        self.state = SessionState::Authenticated;
        info!("[SNAPSHOT] Browser session authenticated");
        Ok(())
    }

    /// Renders `url` to PDF bytes. Requires a logged-in session.
    pub async fn snapshot(&mut self, url: &str, profile: &PageProfile) -> Result<Vec<u8>, SnapshotError> {
        match self.state {
            SessionState::Authenticated => {}
            SessionState::Unauthenticated => return Err(SnapshotError::NotAuthenticated),
            SessionState::Closed => return Err(SnapshotError::Closed),
        }
        info!(url, profile = profile.name, "[SNAPSHOT] Capturing page");

        self.browser.navigate(url).await?;
        for selector in &profile.ready_selectors {
            debug!(selector, "[SNAPSHOT] Waiting for selector");
            self.browser.wait_ready(selector).await?;
        }
        for selector in &profile.remove_selectors {
            self.browser.remove_element(selector).await?;
        }
        for selector in &profile.unpad_selectors {
            self.browser.clear_padding_left(selector).await?;
        }
        if !profile.settle.is_zero() {
            tokio::time::sleep(profile.settle).await;
        }

        let pdf = self.browser.print_to_pdf().await?;
        if pdf.is_empty() {
            error!(url, "[SNAPSHOT] Browser returned an empty PDF");
            return Err(SnapshotError::EmptyPdf(url.to_string()));
        }
        debug!(url, size = pdf.len(), "[SNAPSHOT] Captured");
        Ok(pdf)
    }

    /// Releases the browser. Idempotent.
    pub async fn close(&mut self) -> Result<(), SnapshotError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        info!("[SNAPSHOT] Closing browser session");
        self.browser.close().await.map_err(|e| {
            warn!(error = %e, "[SNAPSHOT] Browser did not shut down cleanly");
            e
        })
    }
}

/// DOM clean-up scripts evaluated in the page before printing.
pub mod scripts {
    /// A JavaScript string literal for `value`.
    fn js_string(value: &str) -> String {
        serde_json::Value::String(value.to_string()).to_string()
    }

    pub fn remove_element(selector: &str) -> String {
        format!(
            "(() => {{ const node = document.querySelector({}); \
             if (node && node.parentNode) {{ node.parentNode.removeChild(node); }} \
             return true; }})()",
            js_string(selector)
        )
    }

    pub fn clear_padding_left(selector: &str) -> String {
        format!(
            "(() => {{ const node = document.querySelector({}); \
             if (node) {{ node.style.paddingLeft = 0; }} \
             return true; }})()",
            js_string(selector)
        )
    }
}
