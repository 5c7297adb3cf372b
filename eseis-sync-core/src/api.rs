//! HTTP implementation of [`EseisApi`] on top of `reqwest`.
//!
//! Every authenticated call goes through [`TokenAuthority::ensure_valid`]
//! first. The authority sits behind a `tokio` mutex so concurrent callers
//! never race two credential exchanges.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::auth::{HttpTokenExchange, TokenAuthority};
use crate::config::{ApiConfig, Credentials};
use crate::contract::{EseisApi, TokenExchange};
use crate::error::{AuthError, SyncError};
use crate::model::{
    AccountPlaceEntry, Budget, Contract, Document, FiscalYear, Folder, ForumTopic,
    MaintenanceContractCategory, MaintenanceContractDetails, Post, Report,
};

const CURRENT_PLACE_HEADER: &str = "x-current-place-id";
const REPORTS_PER_PAGE: u32 = 10;
const TOPICS_PER_PAGE: u32 = 20;
const POSTS_PER_PAGE: u32 = 15;

/// Relative paths of the REST endpoints, query strings included.
pub mod endpoints {
    use super::{POSTS_PER_PAGE, REPORTS_PER_PAGE, TOPICS_PER_PAGE};

    pub const DOCUMENT: &str = "/v1/sergic_documents";

    pub fn contracts(sergic_offer: &str) -> String {
        format!("/v1/users/me/contracts?by_sergic_offer={sergic_offer}")
    }

    pub fn contract_folders(contract_id: i64, page: u32) -> String {
        format!("/v2/contract_folders?by_contract={contract_id}&page={page}&sort=display_name")
    }

    pub fn contract_documents(contract_id: i64, folder_id: i64, page: u32) -> String {
        format!("/v1/contracts/{contract_id}/contract_documents?by_folder={folder_id}&page={page}")
    }

    pub fn coownership_folders(place_id: i64, page: u32) -> String {
        format!("/v2/places/{place_id}/coownership_folders?page={page}&sort=display_name")
    }

    pub fn coownership_documents(place_id: i64, folder_id: i64, page: u32) -> String {
        format!("/v1/places/{place_id}/coownership_documents?by_folder={folder_id}&page={page}")
    }

    pub fn maintenance_contract_categories(place_id: i64) -> String {
        format!("/v1/places/{place_id}/maintenance_contract_categories")
    }

    pub fn maintenance_contract(id: i64) -> String {
        format!("/v1/maintenance_contracts/{id}")
    }

    pub fn reports(place_id: i64, page: u32) -> String {
        format!(
            "/v1/places/{place_id}/reports?page={page}&per_page={REPORTS_PER_PAGE}&sort=created_at"
        )
    }

    pub fn forum_topics(place_id: i64, page: u32) -> String {
        format!(
            "/v1/places/{place_id}/forum/topics?page={page}&per_page={TOPICS_PER_PAGE}&sort=-updated_at"
        )
    }

    pub fn topic_posts(topic_id: i64, page: u32) -> String {
        format!(
            "/v1/forum/topics/{topic_id}/posts?page={page}&per_page={POSTS_PER_PAGE}&sort=-updated_at"
        )
    }

    pub fn fiscal_years(place_id: i64) -> String {
        format!("/v1/places/{place_id}/fiscal_years")
    }

    pub fn budgets(place_id: i64, fiscal_year_id: i64) -> String {
        format!("/v1/places/{place_id}/budgets?fiscal_year_id={fiscal_year_id}")
    }

    pub fn account_place_entries(budget_id: i64) -> String {
        format!("/v1/budgets/{budget_id}/account_place_entries")
    }

    pub fn report_page(report_id: i64) -> String {
        format!("/mes-echanges/signalements/{report_id}")
    }

    pub fn forum_topic_page(topic_id: i64) -> String {
        format!("/mes-echanges/forum/{topic_id}")
    }
}

pub struct EseisClient<E = HttpTokenExchange> {
    http: reqwest::Client,
    base_url: String,
    web_base_url: String,
    authority: Mutex<TokenAuthority<E>>,
}

impl EseisClient<HttpTokenExchange> {
    pub fn new(api: &ApiConfig, credentials: Credentials) -> Self {
        let http = reqwest::Client::new();
        let exchange = HttpTokenExchange::new(http.clone(), api, credentials);
        Self::with_exchange(http, api, exchange)
    }
}

impl<E: TokenExchange> EseisClient<E> {
    pub fn with_exchange(http: reqwest::Client, api: &ApiConfig, exchange: E) -> Self {
        Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            web_base_url: api.web_base_url.trim_end_matches('/').to_string(),
            authority: Mutex::new(TokenAuthority::new(exchange)),
        }
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn web_url(&self, path: &str) -> String {
        format!("{}{}", self.web_base_url, path)
    }

    /// A bearer value guaranteed to be outside the expiry safety margin.
    async fn bearer(&self) -> Result<String, SyncError> {
        let mut authority = self.authority.lock().await;
        authority.ensure_valid().await?;
        authority
            .bearer()
            .map(str::to_owned)
            .ok_or_else(|| AuthError::Malformed("no token held after authentication".into()).into())
    }

    /// GET `url`, failing on transport errors and non-2xx statuses.
    ///
    /// `endpoint` is what ends up in logs and errors; it must not carry secrets.
    async fn get_bytes(
        &self,
        url: &str,
        endpoint: &str,
        bearer: Option<&str>,
        query: &[(&str, &str)],
        place_id: Option<i64>,
    ) -> Result<Vec<u8>, SyncError> {
        debug!(endpoint, "[API] GET");
        let mut request = self.http.get(url).query(query);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(place_id) = place_id {
            request = request.header(CURRENT_PLACE_HEADER, place_id.to_string());
        }

        let response = request.send().await.map_err(|e| {
            let e = e.without_url();
            error!(error = %e, endpoint, "[API] Request failed");
            SyncError::transport(endpoint, e)
        })?;
        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), endpoint, "[API] Unexpected status");
            return Err(SyncError::transport(
                endpoint,
                format!("unexpected status {status}"),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::transport(endpoint, e.without_url()))?;
        Ok(bytes.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        place_id: Option<i64>,
    ) -> Result<T, SyncError> {
        let bearer = self.bearer().await?;
        let bytes = self
            .get_bytes(&self.api_url(path), path, Some(&bearer), &[], place_id)
            .await?;
        serde_json::from_slice(&bytes).map_err(|source| {
            error!(error = %source, endpoint = path, "[API] Could not decode response");
            SyncError::Decode {
                endpoint: path.to_string(),
                source,
            }
        })
    }
}

#[async_trait]
impl<E: TokenExchange> EseisApi for EseisClient<E> {
    async fn contracts(&self, sergic_offer: &str) -> Result<Vec<Contract>, SyncError> {
        self.get_json(&endpoints::contracts(sergic_offer), None).await
    }

    async fn contract_folders(&self, contract_id: i64, page: u32) -> Result<Vec<Folder>, SyncError> {
        self.get_json(&endpoints::contract_folders(contract_id, page), None)
            .await
    }

    async fn contract_documents(
        &self,
        contract_id: i64,
        folder_id: i64,
        page: u32,
    ) -> Result<Vec<Document>, SyncError> {
        self.get_json(
            &endpoints::contract_documents(contract_id, folder_id, page),
            None,
        )
        .await
    }

    async fn coownership_folders(&self, place_id: i64, page: u32) -> Result<Vec<Folder>, SyncError> {
        self.get_json(&endpoints::coownership_folders(place_id, page), None)
            .await
    }

    async fn coownership_documents(
        &self,
        place_id: i64,
        folder_id: i64,
        page: u32,
    ) -> Result<Vec<Document>, SyncError> {
        self.get_json(
            &endpoints::coownership_documents(place_id, folder_id, page),
            None,
        )
        .await
    }

    async fn maintenance_contract_categories(
        &self,
        place_id: i64,
    ) -> Result<Vec<MaintenanceContractCategory>, SyncError> {
        self.get_json(&endpoints::maintenance_contract_categories(place_id), None)
            .await
    }

    async fn maintenance_contract(
        &self,
        maintenance_contract_id: i64,
    ) -> Result<MaintenanceContractDetails, SyncError> {
        self.get_json(&endpoints::maintenance_contract(maintenance_contract_id), None)
            .await
    }

    async fn reports(&self, place_id: i64, page: u32) -> Result<Vec<Report>, SyncError> {
        self.get_json(&endpoints::reports(place_id, page), None).await
    }

    async fn forum_topics(&self, place_id: i64, page: u32) -> Result<Vec<ForumTopic>, SyncError> {
        self.get_json(&endpoints::forum_topics(place_id, page), None)
            .await
    }

    async fn topic_posts(
        &self,
        place_id: i64,
        topic_id: i64,
        page: u32,
    ) -> Result<Vec<Post>, SyncError> {
        self.get_json(&endpoints::topic_posts(topic_id, page), Some(place_id))
            .await
    }

    async fn fiscal_years(&self, place_id: i64) -> Result<Vec<FiscalYear>, SyncError> {
        self.get_json(&endpoints::fiscal_years(place_id), None).await
    }

    async fn budgets(&self, place_id: i64, fiscal_year_id: i64) -> Result<Vec<Budget>, SyncError> {
        self.get_json(&endpoints::budgets(place_id, fiscal_year_id), None)
            .await
    }

    async fn account_place_entries(
        &self,
        budget_id: i64,
    ) -> Result<Vec<AccountPlaceEntry>, SyncError> {
        self.get_json(&endpoints::account_place_entries(budget_id), None)
            .await
    }

    async fn document(&self, uuid: &str) -> Result<Vec<u8>, SyncError> {
        // The binary endpoint authenticates through the query string.
        let bearer = self.bearer().await?;
        self.get_bytes(
            &self.api_url(endpoints::DOCUMENT),
            endpoints::DOCUMENT,
            Some(&bearer),
            &[("access_token", bearer.as_str()), ("uuid", uuid)],
            None,
        )
        .await
    }

    async fn attachment(&self, file_url: &str) -> Result<Vec<u8>, SyncError> {
        // Attachment URLs are pre-signed.
        let endpoint = file_url.split('?').next().unwrap_or(file_url);
        self.get_bytes(file_url, endpoint, None, &[], None).await
    }

    fn report_page_url(&self, report_id: i64) -> String {
        self.web_url(&endpoints::report_page(report_id))
    }

    fn forum_topic_page_url(&self, topic_id: i64) -> String {
        self.web_url(&endpoints::forum_topic_page(topic_id))
    }
}
