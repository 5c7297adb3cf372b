//! Deterministic local layout derived from remote display names.

use std::path::Path;

use chrono::{DateTime, Datelike, SecondsFormat, Utc};

use crate::error::SyncError;

pub const INDIVIDUAL_DIR: &str = "individual";
pub const COOWNERSHIP_DIR: &str = "coownership";
pub const MAINTENANCE_DIR: &str = "maintenance";
pub const REPORTS_DIR: &str = "reports";
pub const FORUM_DIR: &str = "forum";
pub const BUDGETS_DIR: &str = "budgets";

/// Report buckets created up front for every contract.
pub const REPORT_STATES: [&str; 3] = ["opened", "acknowledged", "resolved"];

pub const PDF_EXTENSION: &str = ".pdf";
pub const JPG_EXTENSION: &str = ".jpg";
pub const PNG_EXTENSION: &str = ".png";
pub const JSON_EXTENSION: &str = ".json";

pub const INFO_FILE: &str = "info.json";
pub const TOPIC_FILE: &str = "topic.json";
pub const POSTS_FILE: &str = "posts.json";
pub const TOPIC_SNAPSHOT_FILE: &str = "topic.pdf";

/// Makes a display name safe as a single path component.
///
/// Replaces `/` with `_` and trims surrounding spaces. Idempotent.
pub fn sanitize(name: &str) -> String {
    name.replace('/', "_").trim_matches(' ').to_string()
}

/// `<year>_<month>_<day>__<id>__<name>`, month and day not zero-padded.
pub fn dated_name(date: DateTime<Utc>, id: i64, name: &str) -> String {
    format!(
        "{}_{}_{}__{}__{}",
        date.year(),
        date.month(),
        date.day(),
        id,
        sanitize(name)
    )
}

/// `<RFC3339 operation date>_<amount>_<name>` for budget ledger entries.
pub fn ledger_entry_name(operation_date: DateTime<Utc>, amount: i64, name: &str) -> String {
    format!(
        "{}_{}_{}",
        operation_date.to_rfc3339_opts(SecondsFormat::Secs, true),
        amount,
        sanitize(name)
    )
}

/// File extension for a declared content type; empty when unrecognised.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "application/pdf" => PDF_EXTENSION,
        "image/jpeg" => JPG_EXTENSION,
        "image/png" => PNG_EXTENSION,
        _ => "",
    }
}

pub fn ensure_dir(path: &Path) -> Result<(), SyncError> {
    std::fs::create_dir_all(path).map_err(|e| {
        tracing::error!(error = ?e, path = %path.display(), "Failed to create directory");
        SyncError::filesystem(path, e)
    })
}
