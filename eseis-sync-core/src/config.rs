use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ErrorPolicy;

pub const DEFAULT_BASE_URL: &str = "https://sergic-api-prod.sergic.com";
pub const DEFAULT_WEB_BASE_URL: &str = "https://client.eseis-syndic.com";
pub const DEFAULT_SERGIC_OFFER: &str = "ESE";

/// Everything one synchronisation run needs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub output_dir: PathBuf,
    pub api: ApiConfig,
    pub credentials: Credentials,
    pub sergic_offer: String,
    pub on_item_error: ErrorPolicy,
    pub snapshots: bool,
}

impl SyncConfig {
    pub fn trace_loaded(&self) {
        info!(
            output_dir = %self.output_dir.display(),
            base_url = %self.api.base_url,
            web_base_url = %self.api.web_base_url,
            sergic_offer = %self.sergic_offer,
            on_item_error = ?self.on_item_error,
            snapshots = self.snapshots,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub client_id: String,
    pub base_url: String,
    pub web_base_url: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// Keeps the password out of debug logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
