//! # contract: trait seams between the engine and the outside world
//!
//! The traversal never talks to HTTP, a browser, or the system clock directly.
//! It goes through the traits below so each one can be swapped for a real
//! client, a `mockall` mock, or a small hand-written fake.
//!
//! - [`EseisApi`]: the REST surface (listing endpoints plus byte downloads).
//! - [`Browser`]: the browser capabilities the snapshot pipeline drives.
//! - [`TokenExchange`]: the password-grant credential exchange.
//! - [`Clock`]: wall-clock time for token expiry decisions.
//!
//! Mocks (`MockEseisApi`, `MockBrowser`, ...) are generated under `cfg(test)`
//! and under the default `test-export-mocks` feature so integration tests in
//! `tests/` can use them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::auth::TokenGrant;
use crate::error::{AuthError, SnapshotError, SyncError};
use crate::model::{
    AccountPlaceEntry, Budget, Contract, Document, FiscalYear, Folder, ForumTopic,
    MaintenanceContractCategory, MaintenanceContractDetails, Post, Report,
};

/// The remote REST API of one account.
///
/// Implementations are responsible for keeping the bearer token valid before
/// every call; callers never see an expired-token failure as a normal result.
/// Paged methods take a 1-based page index and return an empty vector past
/// the last page.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait EseisApi: Send + Sync {
    async fn contracts(&self, sergic_offer: &str) -> Result<Vec<Contract>, SyncError>;

    async fn contract_folders(&self, contract_id: i64, page: u32) -> Result<Vec<Folder>, SyncError>;

    async fn contract_documents(
        &self,
        contract_id: i64,
        folder_id: i64,
        page: u32,
    ) -> Result<Vec<Document>, SyncError>;

    async fn coownership_folders(&self, place_id: i64, page: u32) -> Result<Vec<Folder>, SyncError>;

    async fn coownership_documents(
        &self,
        place_id: i64,
        folder_id: i64,
        page: u32,
    ) -> Result<Vec<Document>, SyncError>;

    async fn maintenance_contract_categories(
        &self,
        place_id: i64,
    ) -> Result<Vec<MaintenanceContractCategory>, SyncError>;

    async fn maintenance_contract(
        &self,
        maintenance_contract_id: i64,
    ) -> Result<MaintenanceContractDetails, SyncError>;

    async fn reports(&self, place_id: i64, page: u32) -> Result<Vec<Report>, SyncError>;

    async fn forum_topics(&self, place_id: i64, page: u32) -> Result<Vec<ForumTopic>, SyncError>;

    async fn topic_posts(
        &self,
        place_id: i64,
        topic_id: i64,
        page: u32,
    ) -> Result<Vec<Post>, SyncError>;

    async fn fiscal_years(&self, place_id: i64) -> Result<Vec<FiscalYear>, SyncError>;

    async fn budgets(&self, place_id: i64, fiscal_year_id: i64) -> Result<Vec<Budget>, SyncError>;

    async fn account_place_entries(
        &self,
        budget_id: i64,
    ) -> Result<Vec<AccountPlaceEntry>, SyncError>;

    /// Raw bytes of a document addressed by uuid.
    async fn document(&self, uuid: &str) -> Result<Vec<u8>, SyncError>;

    /// Raw bytes of an attachment addressed by its absolute file URL.
    async fn attachment(&self, file_url: &str) -> Result<Vec<u8>, SyncError>;

    /// Web page of a report, for the snapshot pipeline.
    fn report_page_url(&self, report_id: i64) -> String;

    /// Web page of a forum topic, for the snapshot pipeline.
    fn forum_topic_page_url(&self, topic_id: i64) -> String;
}

/// What the snapshot pipeline needs from a browser.
///
/// One implementation drives a single tab; it is not safe for concurrent
/// navigation, which `&mut self` on the session enforces upstream.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Browser: Send + Sync {
    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), SnapshotError>;

    async fn navigate(&self, url: &str) -> Result<(), SnapshotError>;

    /// Resolves once `selector` matches an element on the current page.
    async fn wait_ready(&self, selector: &str) -> Result<(), SnapshotError>;

    /// Types `text` into the element matching `selector`, then presses Enter.
    async fn submit_text(&self, selector: &str, text: &str) -> Result<(), SnapshotError>;

    /// Detaches the first element matching `selector` from the DOM, if any.
    async fn remove_element(&self, selector: &str) -> Result<(), SnapshotError>;

    /// Zeroes the left padding of the first element matching `selector`, if any.
    async fn clear_padding_left(&self, selector: &str) -> Result<(), SnapshotError>;

    async fn print_to_pdf(&self) -> Result<Vec<u8>, SnapshotError>;

    async fn close(&mut self) -> Result<(), SnapshotError>;
}

/// Exchanges configured credentials for a fresh token grant.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self) -> Result<TokenGrant, AuthError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
