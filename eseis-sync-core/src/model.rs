//! Remote resource records as returned by the Eseis REST API.
//!
//! Each record keeps the fields the traversal needs as typed members and
//! collects everything else in `extra`, so serialising a record back out
//! yields the full remote payload for metadata side-files. Timestamps keep
//! the offset the server sent them with; callers convert to UTC where they
//! compare or name things.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Extra = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: i64,
    pub display_name: String,
    pub place_id: i64,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A contract folder or a co-ownership folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A document stored behind the binary document endpoint, addressed by uuid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub uuid: String,
    pub display_name: String,
    pub updated_at: DateTime<FixedOffset>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceContractCategory {
    pub id: i64,
    pub display_name: String,
    #[serde(default)]
    pub maintenance_contracts: Vec<MaintenanceContractSummary>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceContractSummary {
    pub id: i64,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceContractDetails {
    pub id: i64,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub maintenance_contract_documents: Vec<Document>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub display_name: String,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    /// `None` when the server sends no state or `null`.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub source_file_name: String,
    #[serde(default)]
    pub source_content_type: Option<String>,
    pub file_url: String,
    #[serde(default)]
    pub source_updated_at: Option<DateTime<FixedOffset>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumTopic {
    pub id: i64,
    pub display_name: String,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalYear {
    pub id: i64,
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A ledger entry of a budget, paired with one binary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPlaceEntry {
    pub id: i64,
    pub uuid: String,
    pub display_name: String,
    pub amount: i64,
    pub operation_date: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    #[serde(flatten)]
    pub extra: Extra,
}
