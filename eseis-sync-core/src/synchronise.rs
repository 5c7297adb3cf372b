//! High-level pipeline: walks every contract of the account and mirrors it locally.
//!
//! For each contract returned by the API, the [`Synchroniser`] visits six
//! sections in a fixed order, each rooted in its own directory under
//! `<output>/<contract display name>/`:
//!
//!   - `individual`: contract folders, then their paged documents
//!   - `coownership`: co-ownership folders, then their paged documents
//!   - `maintenance`: categories, maintenance contracts, their documents and an `info.json`
//!   - `reports`: paged reports, bucketed by state, each captured as a PDF snapshot
//!   - `forum`: paged topics with attachments, all posts with their attachments, and a topic snapshot
//!   - `budgets`: fiscal years, budgets, ledger entries with their documents
//!
//! # Responsibilities
//! - Builds every destination path from sanitised display names
//! - Hands binary payloads to [`export::export_item`] so unchanged files are never re-downloaded
//! - Routes snapshot-only resources through the [`SnapshotSession`], when one is configured
//! - Rewrites metadata side-files on every visit, whatever happened to the paired binary
//!
//! # Error Handling
//! Every item and every section runs to a `Result`. The configured
//! [`ErrorPolicy`] decides what happens next: under `SkipItem` a tolerated
//! failure is logged, recorded in the [`SynchroniseReport`] and the walk
//! moves on; otherwise the error ends the run. A failure while listing a
//! section abandons the remainder of that section for the current contract.
//!
//! # Navigation
//! - Main entrypoint: [`Synchroniser::run`]
//! - Supporting types: [`SynchroniseSettings`], [`SynchroniseReport`], [`ItemFailure`].

use std::future::Future;
use std::path::{Path, PathBuf};

use futures::{pin_mut, TryStreamExt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::contract::{Browser, EseisApi};
use crate::error::{ErrorPolicy, SnapshotError, SyncError};
use crate::export::{self, ExportAction, ExportableItem};
use crate::model::{
    Attachment, Budget, Contract, Document, FiscalYear, Folder, ForumTopic,
    MaintenanceContractSummary, AccountPlaceEntry, Report,
};
use crate::paginate;
use crate::paths::{self, sanitize};
use crate::snapshot::{PageProfile, SnapshotSession};

/// Bucket for reports without a state.
const UNKNOWN_REPORT_STATE: &str = "other";

/// Per-run settings, independent of how the API and browser are built.
#[derive(Debug, Clone)]
pub struct SynchroniseSettings {
    pub output_dir: PathBuf,
    pub sergic_offer: String,
    pub on_item_error: ErrorPolicy,
}

impl From<&SyncConfig> for SynchroniseSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            sergic_offer: config.sergic_offer.clone(),
            on_item_error: config.on_item_error,
        }
    }
}

/// An error that was tolerated, with the item or section it cost.
#[derive(Debug)]
pub struct ItemFailure {
    pub scope: String,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct SynchroniseReport {
    pub contracts: usize,
    /// Documents and attachments written this run. Snapshots are counted apart.
    pub created: usize,
    /// Artifacts of any kind left untouched because they were current.
    pub skipped: usize,
    /// Page snapshots captured this run.
    pub snapshots: usize,
    pub metadata_files: usize,
    /// Snapshot-only items passed over because no browser session is configured.
    pub snapshots_disabled: usize,
    pub failures: Vec<ItemFailure>,
}

impl SynchroniseReport {
    fn count(&mut self, action: ExportAction) {
        match action {
            ExportAction::Created => self.created += 1,
            ExportAction::Skipped => self.skipped += 1,
        }
    }
}

/// One of the per-contract resource trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Individual,
    Coownership,
    Maintenance,
    Reports,
    Forum,
    Budgets,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Individual,
        Section::Coownership,
        Section::Maintenance,
        Section::Reports,
        Section::Forum,
        Section::Budgets,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Section::Individual => paths::INDIVIDUAL_DIR,
            Section::Coownership => paths::COOWNERSHIP_DIR,
            Section::Maintenance => paths::MAINTENANCE_DIR,
            Section::Reports => paths::REPORTS_DIR,
            Section::Forum => paths::FORUM_DIR,
            Section::Budgets => paths::BUDGETS_DIR,
        }
    }
}

pub struct Synchroniser<A, B> {
    api: A,
    snapshots: Option<SnapshotSession<B>>,
    settings: SynchroniseSettings,
}

impl<A: EseisApi, B: Browser> Synchroniser<A, B> {
    /// A synchroniser without a browser: snapshot-only items are skipped.
    pub fn new(api: A, settings: SynchroniseSettings) -> Self {
        Self {
            api,
            snapshots: None,
            settings,
        }
    }

    pub fn with_snapshots(mut self, session: SnapshotSession<B>) -> Self {
        self.snapshots = Some(session);
        self
    }

    pub fn settings(&self) -> &SynchroniseSettings {
        &self.settings
    }

    /// Mirrors every contract of the account into the output directory.
    pub async fn run(&mut self) -> Result<SynchroniseReport, SyncError> {
        info!(
            output_dir = %self.settings.output_dir.display(),
            sergic_offer = %self.settings.sergic_offer,
            snapshots = self.snapshots.is_some(),
            "[SYNC] Starting Eseis synchronisation"
        );
        paths::ensure_dir(&self.settings.output_dir)?;

        let contracts = self.api.contracts(&self.settings.sergic_offer).await.map_err(|e| {
            error!(error = %e, "[SYNC][ERROR] Failed to list contracts");
            e
        })?;
        info!(count = contracts.len(), "[SYNC] Contracts listed");

        let mut walker = Walker {
            api: &self.api,
            snapshots: self.snapshots.as_mut(),
            policy: self.settings.on_item_error,
            report: SynchroniseReport::default(),
        };
        for contract in &contracts {
            let contract_dir = self
                .settings
                .output_dir
                .join(sanitize(&contract.display_name));
            walker.contract(contract, &contract_dir).await?;
            walker.report.contracts += 1;
        }

        let report = walker.report;
        info!(
            contracts = report.contracts,
            created = report.created,
            skipped = report.skipped,
            snapshots = report.snapshots,
            metadata_files = report.metadata_files,
            snapshots_disabled = report.snapshots_disabled,
            failures = report.failures.len(),
            "Done synchronising Eseis documents"
        );
        Ok(report)
    }

    /// Releases the browser session, if any.
    pub async fn close(&mut self) -> Result<(), SnapshotError> {
        match self.snapshots.as_mut() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

/// Borrowed state of one run.
struct Walker<'a, A, B> {
    api: &'a A,
    snapshots: Option<&'a mut SnapshotSession<B>>,
    policy: ErrorPolicy,
    report: SynchroniseReport,
}

impl<'a, A: EseisApi, B: Browser> Walker<'a, A, B> {
    /// `Ok(None)` when the error was tolerated and recorded.
    fn absorb<T>(&mut self, scope: String, result: Result<T, SyncError>) -> Result<Option<T>, SyncError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.policy.tolerates(&e) => {
                warn!(scope = %scope, error = %e, "[SYNC] Skipping after error");
                self.report.failures.push(ItemFailure { scope, error: e });
                Ok(None)
            }
            Err(e) => {
                error!(scope = %scope, error = %e, "[SYNC][ERROR] Aborting run");
                Err(e)
            }
        }
    }

    fn metadata<T: Serialize + ?Sized>(&mut self, record: &T, path: &Path) -> Result<(), SyncError> {
        export::write_metadata(record, path)?;
        self.report.metadata_files += 1;
        Ok(())
    }

    async fn contract(&mut self, contract: &Contract, dir: &Path) -> Result<(), SyncError> {
        info!(
            contract_id = contract.id,
            place_id = contract.place_id,
            name = %contract.display_name,
            "[SYNC] Processing contract"
        );
        for section in Section::ALL {
            let section_dir = dir.join(section.dir_name());
            let result = match section {
                Section::Individual => self.individual(contract, &section_dir).await,
                Section::Coownership => self.coownership(contract, &section_dir).await,
                Section::Maintenance => self.maintenance(contract.place_id, &section_dir).await,
                Section::Reports => self.reports(contract.place_id, &section_dir).await,
                Section::Forum => self.forum(contract.place_id, &section_dir).await,
                Section::Budgets => self.budgets(contract.place_id, &section_dir).await,
            };
            self.absorb(
                format!("contract {} section {}", contract.id, section.dir_name()),
                result,
            )?;
        }
        Ok(())
    }

    async fn individual(&mut self, contract: &Contract, dir: &Path) -> Result<(), SyncError> {
        let api = self.api;
        let contract_id = contract.id;
        self.folder_tree(
            dir,
            move |page| api.contract_folders(contract_id, page),
            move |folder_id, page| api.contract_documents(contract_id, folder_id, page),
        )
        .await
    }

    async fn coownership(&mut self, contract: &Contract, dir: &Path) -> Result<(), SyncError> {
        let api = self.api;
        let place_id = contract.place_id;
        self.folder_tree(
            dir,
            move |page| api.coownership_folders(place_id, page),
            move |folder_id, page| api.coownership_documents(place_id, folder_id, page),
        )
        .await
    }

    /// Paged folders, each holding paged documents.
    async fn folder_tree<FF, FFut, DF, DFut>(
        &mut self,
        dir: &Path,
        mut list_folders: FF,
        mut list_documents: DF,
    ) -> Result<(), SyncError>
    where
        FF: FnMut(u32) -> FFut,
        FFut: Future<Output = Result<Vec<Folder>, SyncError>>,
        DF: FnMut(i64, u32) -> DFut,
        DFut: Future<Output = Result<Vec<Document>, SyncError>>,
    {
        let folders = paginate::items(&mut list_folders);
        pin_mut!(folders);
        while let Some(folder) = folders.try_next().await? {
            let result = self.folder(dir, &folder, &mut list_documents).await;
            self.absorb(
                format!("folder {} ({})", folder.id, folder.display_name),
                result,
            )?;
        }
        Ok(())
    }

    async fn folder<DF, DFut>(
        &mut self,
        dir: &Path,
        folder: &Folder,
        list_documents: &mut DF,
    ) -> Result<(), SyncError>
    where
        DF: FnMut(i64, u32) -> DFut,
        DFut: Future<Output = Result<Vec<Document>, SyncError>>,
    {
        info!(folder_id = folder.id, name = %folder.display_name, "[SYNC] Folder");
        let folder_dir = dir.join(sanitize(&folder.display_name));
        paths::ensure_dir(&folder_dir)?;

        let documents = paginate::items(|page| list_documents(folder.id, page));
        pin_mut!(documents);
        while let Some(document) = documents.try_next().await? {
            let result = self.document(&folder_dir, &document).await;
            self.absorb(
                format!("document {} ({})", document.id, document.display_name),
                result,
            )?;
        }
        Ok(())
    }

    async fn document(&mut self, dir: &Path, document: &Document) -> Result<(), SyncError> {
        let item = ExportableItem::new(document.id, &document.display_name, document.updated_at);
        self.binary_document(dir, &item, &document.uuid).await
    }

    /// Exports a document-endpoint payload as `<display name>.pdf`.
    async fn binary_document(
        &mut self,
        dir: &Path,
        item: &ExportableItem,
        uuid: &str,
    ) -> Result<(), SyncError> {
        let destination = dir.join(sanitize(&format!(
            "{}{}",
            item.display_name,
            paths::PDF_EXTENSION
        )));
        let api = self.api;
        let action = export::export_item(item, &destination, || api.document(uuid)).await?;
        self.report.count(action);
        Ok(())
    }

    async fn attachment(&mut self, dir: &Path, attachment: &Attachment) -> Result<(), SyncError> {
        let content_type = attachment.source_content_type.as_deref().unwrap_or_default();
        let name = sanitize(&format!(
            "{}{}",
            attachment.source_file_name,
            paths::extension_for(content_type)
        ));
        // No update time: any local copy counts as current.
        let updated_at = attachment
            .source_updated_at
            .map_or(DateTime::<Utc>::MIN_UTC, |at| at.with_timezone(&Utc));
        let item = ExportableItem::new(attachment.id, &attachment.source_file_name, updated_at);
        let api = self.api;
        let action = export::export_item(&item, &dir.join(name), || {
            api.attachment(&attachment.file_url)
        })
        .await?;
        self.report.count(action);
        Ok(())
    }

    /// Captures `url` to `destination` unless the local PDF is current.
    async fn snapshot(
        &mut self,
        item: &ExportableItem,
        destination: &Path,
        url: String,
        profile: PageProfile,
    ) -> Result<(), SyncError> {
        let Some(session) = self.snapshots.as_deref_mut() else {
            warn!(
                remote_id = %item.remote_id,
                name = %item.display_name,
                "[SYNC] Snapshots disabled, skipping page capture"
            );
            self.report.snapshots_disabled += 1;
            return Ok(());
        };
        let action = export::export_item(item, destination, move || async move {
            session.snapshot(&url, &profile).await.map_err(SyncError::from)
        })
        .await?;
        match action {
            ExportAction::Created => self.report.snapshots += 1,
            ExportAction::Skipped => self.report.skipped += 1,
        }
        Ok(())
    }

    async fn maintenance(&mut self, place_id: i64, dir: &Path) -> Result<(), SyncError> {
        let categories = self.api.maintenance_contract_categories(place_id).await?;
        for category in &categories {
            debug!(category_id = category.id, name = %category.display_name, "[SYNC] Maintenance category");
            let category_dir = dir.join(sanitize(&category.display_name));
            for summary in &category.maintenance_contracts {
                let result = self.maintenance_contract(&category_dir, summary).await;
                self.absorb(format!("maintenance contract {}", summary.id), result)?;
            }
        }
        Ok(())
    }

    async fn maintenance_contract(
        &mut self,
        category_dir: &Path,
        summary: &MaintenanceContractSummary,
    ) -> Result<(), SyncError> {
        info!(
            maintenance_contract_id = summary.id,
            company = %summary.company_name,
            reference = %summary.reference,
            "[SYNC] Maintenance contract"
        );
        let contract_dir = category_dir.join(sanitize(&format!(
            "{}_{}",
            summary.company_name, summary.reference
        )));
        paths::ensure_dir(&contract_dir)?;

        let details = self.api.maintenance_contract(summary.id).await?;
        self.metadata(&details, &contract_dir.join(paths::INFO_FILE))?;
        for document in &details.maintenance_contract_documents {
            let result = self.document(&contract_dir, document).await;
            self.absorb(
                format!("document {} ({})", document.id, document.display_name),
                result,
            )?;
        }
        Ok(())
    }

    async fn reports(&mut self, place_id: i64, dir: &Path) -> Result<(), SyncError> {
        for state in paths::REPORT_STATES {
            paths::ensure_dir(&dir.join(state))?;
        }
        let api = self.api;
        let reports = paginate::items(move |page| api.reports(place_id, page));
        pin_mut!(reports);
        while let Some(report) = reports.try_next().await? {
            let result = self.report(dir, &report).await;
            self.absorb(format!("report {} ({})", report.id, report.display_name), result)?;
        }
        Ok(())
    }

    async fn report(&mut self, dir: &Path, report: &Report) -> Result<(), SyncError> {
        info!(report_id = report.id, name = %report.display_name, state = ?report.state, "[SYNC] Report");
        let state = report
            .state
            .as_deref()
            .map(sanitize)
            .filter(|state| !state.is_empty());
        let bucket = dir.join(state.as_deref().unwrap_or(UNKNOWN_REPORT_STATE));
        paths::ensure_dir(&bucket)?;

        let stem = paths::dated_name(
            report.created_at.with_timezone(&Utc),
            report.id,
            &report.display_name,
        );
        self.metadata(report, &bucket.join(format!("{stem}{}", paths::JSON_EXTENSION)))?;

        let item = ExportableItem::new(report.id, &report.display_name, report.updated_at);
        let url = self.api.report_page_url(report.id);
        self.snapshot(
            &item,
            &bucket.join(format!("{stem}{}", paths::PDF_EXTENSION)),
            url,
            PageProfile::report(),
        )
        .await
    }

    async fn forum(&mut self, place_id: i64, dir: &Path) -> Result<(), SyncError> {
        paths::ensure_dir(dir)?;
        let api = self.api;
        let topics = paginate::items(move |page| api.forum_topics(place_id, page));
        pin_mut!(topics);
        while let Some(topic) = topics.try_next().await? {
            let result = self.forum_topic(place_id, dir, &topic).await;
            self.absorb(format!("forum topic {} ({})", topic.id, topic.display_name), result)?;
        }
        Ok(())
    }

    async fn forum_topic(&mut self, place_id: i64, dir: &Path, topic: &ForumTopic) -> Result<(), SyncError> {
        info!(topic_id = topic.id, name = %topic.display_name, "[SYNC] Forum topic");
        let topic_dir = dir.join(paths::dated_name(
            topic.created_at.with_timezone(&Utc),
            topic.id,
            &topic.display_name,
        ));
        paths::ensure_dir(&topic_dir)?;
        self.metadata(topic, &topic_dir.join(paths::TOPIC_FILE))?;

        for attachment in &topic.attachments {
            let result = self.attachment(&topic_dir, attachment).await;
            self.absorb(format!("attachment {}", attachment.id), result)?;
        }

        let api = self.api;
        let topic_id = topic.id;
        let posts = paginate::collect_all(move |page| api.topic_posts(place_id, topic_id, page)).await?;
        debug!(topic_id, posts = posts.len(), "[SYNC] Posts collected");
        self.metadata(&posts, &topic_dir.join(paths::POSTS_FILE))?;
        for attachment in posts.iter().flat_map(|post| &post.attachments) {
            let result = self.attachment(&topic_dir, attachment).await;
            self.absorb(format!("attachment {}", attachment.id), result)?;
        }

        let item = ExportableItem::new(topic.id, &topic.display_name, topic.updated_at);
        let url = api.forum_topic_page_url(topic.id);
        self.snapshot(
            &item,
            &topic_dir.join(paths::TOPIC_SNAPSHOT_FILE),
            url,
            PageProfile::forum_topic(),
        )
        .await
    }

    async fn budgets(&mut self, place_id: i64, dir: &Path) -> Result<(), SyncError> {
        paths::ensure_dir(dir)?;
        let fiscal_years = self.api.fiscal_years(place_id).await?;
        for fiscal_year in &fiscal_years {
            let result = self.fiscal_year(place_id, dir, fiscal_year).await;
            self.absorb(format!("fiscal year {} ({})", fiscal_year.id, fiscal_year.display_name), result)?;
        }
        Ok(())
    }

    async fn fiscal_year(&mut self, place_id: i64, dir: &Path, fiscal_year: &FiscalYear) -> Result<(), SyncError> {
        info!(fiscal_year_id = fiscal_year.id, name = %fiscal_year.display_name, "[SYNC] Fiscal year");
        let budgets = self.api.budgets(place_id, fiscal_year.id).await?;
        let fiscal_year_dir = dir.join(sanitize(&fiscal_year.display_name));
        paths::ensure_dir(&fiscal_year_dir)?;
        self.metadata(fiscal_year, &fiscal_year_dir.join(paths::INFO_FILE))?;

        for budget in &budgets {
            let result = self.budget(&fiscal_year_dir, budget).await;
            self.absorb(format!("budget {} ({})", budget.id, budget.display_name), result)?;
        }
        Ok(())
    }

    async fn budget(&mut self, fiscal_year_dir: &Path, budget: &Budget) -> Result<(), SyncError> {
        info!(budget_id = budget.id, name = %budget.display_name, "[SYNC] Budget");
        let budget_dir = fiscal_year_dir.join(sanitize(&budget.display_name));
        paths::ensure_dir(&budget_dir)?;
        self.metadata(budget, &budget_dir.join(paths::INFO_FILE))?;

        let entries = self.api.account_place_entries(budget.id).await?;
        for entry in &entries {
            let result = self.ledger_entry(&budget_dir, entry).await;
            self.absorb(format!("ledger entry {} ({})", entry.id, entry.display_name), result)?;
        }
        Ok(())
    }

    async fn ledger_entry(&mut self, budget_dir: &Path, entry: &AccountPlaceEntry) -> Result<(), SyncError> {
        let stem = paths::ledger_entry_name(
            entry.operation_date.with_timezone(&Utc),
            entry.amount,
            &entry.display_name,
        );
        self.metadata(entry, &budget_dir.join(format!("{stem}{}", paths::JSON_EXTENSION)))?;
        let item = ExportableItem::new(entry.id, stem, entry.updated_at);
        self.binary_document(budget_dir, &item, &entry.uuid).await
    }
}
