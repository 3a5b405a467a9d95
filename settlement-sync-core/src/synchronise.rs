//! High-level pipeline: reconciles inventories, then drives each statement through
//! fetch → parse → validate → persist → archive.
//!
//! This module is the orchestration layer of the crate. One run:
//!   - Lists the remote drop directory, the archive and the processing ledger
//!   - Reconciles the three with [`crate::reconcile::reconcile`] and logs anomalies as one
//!     warning block
//!   - Processes every file the reconciliation schedules, one at a time, in remote
//!     listing order
//!   - Returns a [`SyncReport`] with per-file outcomes
//!
//! # Per-file state machine
//! `Discovered → Fetched → StructurallyValid → RowValid → Persisted → Archived`.
//! Every failed transition removes the staged copy of the file. Failures after the
//! ledger claim (persistence, archive) also mark the ledger entry `failed` so the next
//! run retries the file. Archival never happens before both inserts succeed.
//!
//! # Error Handling
//! - Remote listing failures degrade the run: nothing is processed, but archive/ledger
//!   anomalies are still reported.
//! - Archive or ledger listing failures abort the run with [`SyncError`].
//! - Per-file failures never abort the run; they end up in the report as
//!   [`FileOutcome::Failed`].
//!
//! # Navigation
//! - Main entrypoints: [`synchronise`], [`plan`]
//! - Supporting types: [`Collaborators`], [`SyncReport`], [`SyncPlan`]

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{SyncConfig, TableTargets};
use crate::contract::{
    ArchiveStore, LedgerEntry, PersistenceGateway, ProcessingLedger, RemoteSource,
    RowValidator, StatementParser,
};
use crate::error::{PersistenceError, StageError, SyncError};
use crate::reconcile::{reconcile, DesyncReport, Reconciliation, RemoteInventory};
use crate::staging::StagingFile;
use crate::statement::{check_structure, HeaderExpectations, ProcessingSummaryRecord, Stage};
use crate::validate::{NormalizedTransaction, Validation, ValidationError};

/// The leaf collaborators a run talks to.
pub struct Collaborators<'a> {
    pub remote: &'a dyn RemoteSource,
    pub archive: &'a dyn ArchiveStore,
    pub ledger: &'a dyn ProcessingLedger,
    pub parser: &'a dyn StatementParser,
    pub validator: &'a dyn RowValidator,
    pub gateway: &'a dyn PersistenceGateway,
}

/// The three inventories as read at the start of a run.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub remote: RemoteInventory,
    /// Remote names dropped by the statement filter.
    pub ignored_remote: Vec<String>,
    pub archive: BTreeSet<String>,
    pub ledger: BTreeMap<String, LedgerEntry>,
}

/// What a run would do, without doing it.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub remote_available: bool,
    pub remote_files: usize,
    pub ignored_remote_files: usize,
    pub archived_files: usize,
    pub ledger_entries: usize,
    pub reconciliation: Reconciliation,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub remote_available: bool,
    pub anomalies: Vec<DesyncReport>,
    pub files: Vec<FileOutcome>,
}

impl SyncReport {
    pub fn archived(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Archived { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.archived()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Archived {
        file: String,
        transactions: usize,
        /// Rows newly written; lower than `transactions` when a retry found rows from an
        /// earlier partial attempt.
        inserted: u64,
        archive_path: PathBuf,
    },
    Failed {
        file: String,
        stage: Stage,
        error: String,
        validation_errors: Vec<ValidationError>,
    },
}

struct ArchivedFile {
    transactions: usize,
    inserted: u64,
    archive_path: PathBuf,
}

/// Reads the remote listing, the archive listing and the ledger.
pub async fn take_inventory(
    config: &SyncConfig,
    collaborators: &Collaborators<'_>,
) -> Result<Inventory, SyncError> {
    let (remote, ignored_remote) = match collaborators.remote.list().await {
        Ok(names) => {
            let (accepted, ignored): (Vec<String>, Vec<String>) =
                names.into_iter().partition(|name| config.accepts(name));
            info!(
                found = accepted.len(),
                ignored = ignored.len(),
                "[SYNC] Remote drop directory listed"
            );
            if !ignored.is_empty() {
                debug!(?ignored, "[SYNC] Ignoring remote files that are not statements");
            }
            (RemoteInventory::Available(accepted), ignored)
        }
        Err(e) => {
            warn!(error = %e, "[SYNC] Could not list remote drop directory");
            info!("[SYNC] Continuing with archive and ledger reconciliation only");
            (RemoteInventory::Unavailable, Vec::new())
        }
    };

    let archive = collaborators.archive.list().await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Failed to list archive");
        SyncError::ArchiveInventory(e)
    })?;
    info!(count = archive.len(), "[SYNC] Archive listed");

    let ledger = collaborators.ledger.get_all().await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Failed to read processing ledger");
        SyncError::LedgerInventory(e)
    })?;
    info!(count = ledger.len(), "[SYNC] Ledger entries loaded");

    Ok(Inventory {
        remote,
        ignored_remote,
        archive,
        ledger,
    })
}

/// Inventories and reconciliation only. Fetches and writes nothing.
pub async fn plan(
    config: &SyncConfig,
    collaborators: &Collaborators<'_>,
) -> Result<SyncPlan, SyncError> {
    let inventory = take_inventory(config, collaborators).await?;
    let reconciliation = reconcile(&inventory.remote, &inventory.archive, &inventory.ledger);
    log_anomalies(&reconciliation.reports);

    Ok(SyncPlan {
        remote_available: inventory.remote.is_available(),
        remote_files: match &inventory.remote {
            RemoteInventory::Available(names) => names.len(),
            RemoteInventory::Unavailable => 0,
        },
        ignored_remote_files: inventory.ignored_remote.len(),
        archived_files: inventory.archive.len(),
        ledger_entries: inventory.ledger.len(),
        reconciliation,
    })
}

/// Runs the whole pipeline once.
pub async fn synchronise(
    config: &SyncConfig,
    collaborators: &Collaborators<'_>,
) -> Result<SyncReport, SyncError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("sync", run_id = %run_id);
    run(run_id, config, collaborators).instrument(span).await
}

async fn run(
    run_id: Uuid,
    config: &SyncConfig,
    collaborators: &Collaborators<'_>,
) -> Result<SyncReport, SyncError> {
    info!("[SYNC] Starting statement synchronisation run");

    tokio::fs::create_dir_all(&config.staging_dir)
        .await
        .map_err(|source| {
            error!(error = ?source, path = %config.staging_dir.display(), "[SYNC][ERROR] Cannot create staging directory");
            SyncError::StagingDir {
                path: config.staging_dir.clone(),
                source,
            }
        })?;

    let inventory = take_inventory(config, collaborators).await?;
    let reconciliation = reconcile(&inventory.remote, &inventory.archive, &inventory.ledger);
    log_anomalies(&reconciliation.reports);
    info!(
        to_process = reconciliation.to_process.len(),
        anomalies = reconciliation.reports.len(),
        "[SYNC] Reconciliation complete"
    );

    let expectations = HeaderExpectations::default();
    let mut files = Vec::with_capacity(reconciliation.to_process.len());

    for file_name in &reconciliation.to_process {
        info!(file = %file_name, "[SYNC] Processing file");
        let previous = inventory.ledger.get(file_name);
        let outcome = match ingest_file(config, collaborators, &expectations, file_name, previous)
            .await
        {
            Ok(done) => {
                info!(
                    file = %file_name,
                    transactions = done.transactions,
                    inserted = done.inserted,
                    archive_path = %done.archive_path.display(),
                    "[SYNC] File processed and archived"
                );
                FileOutcome::Archived {
                    file: file_name.clone(),
                    transactions: done.transactions,
                    inserted: done.inserted,
                    archive_path: done.archive_path,
                }
            }
            Err(e) => {
                error!(
                    file = %file_name,
                    stage = ?e.stage(),
                    error = %e,
                    "[SYNC][ERROR] Failed to process file"
                );
                let validation_errors = match &e {
                    StageError::Validation(errors) => errors.clone(),
                    _ => Vec::new(),
                };
                FileOutcome::Failed {
                    file: file_name.clone(),
                    stage: e.stage(),
                    error: e.to_string(),
                    validation_errors,
                }
            }
        };
        files.push(outcome);
    }

    let report = SyncReport {
        run_id,
        remote_available: inventory.remote.is_available(),
        anomalies: reconciliation.reports,
        files,
    };
    info!(
        archived = report.archived(),
        failed = report.failed(),
        anomalies = report.anomalies.len(),
        "[SYNC] Run complete"
    );
    Ok(report)
}

fn log_anomalies(reports: &[DesyncReport]) {
    if reports.is_empty() {
        return;
    }
    warn!(count = reports.len(), "[SYNC][DESYNC] Desynchronised files found:");
    for report in reports {
        warn!(file = %report.file, "[SYNC][DESYNC] - {}: {}", report.file, report.message);
    }
}

async fn ingest_file(
    config: &SyncConfig,
    c: &Collaborators<'_>,
    expectations: &HeaderExpectations,
    file_name: &str,
    previous: Option<&LedgerEntry>,
) -> Result<ArchivedFile, StageError> {
    // Discovered -> Fetched
    let bytes = c.remote.fetch(file_name).await.map_err(StageError::Fetch)?;
    let staged = StagingFile::write(&config.staging_dir, file_name, &bytes)
        .await
        .map_err(|source| StageError::Staging {
            path: config.staging_dir.join(file_name),
            source,
        })?;
    info!(file = %file_name, size = bytes.len(), "[SYNC][FETCH] File fetched");

    // Fetched -> StructurallyValid
    let parsed = c
        .parser
        .parse(file_name, &bytes)
        .and_then(|document| check_structure(&document, expectations).map(|()| document));
    let document = match parsed {
        Ok(document) => document,
        Err(e) => return Err(abandon(staged, StageError::Format(e)).await),
    };
    info!(
        file = %file_name,
        transactions = document.transactions.len(),
        "[SYNC][PARSE] Statement structure valid"
    );

    // StructurallyValid -> RowValid
    let rows = match c.validator.validate(&document.header, &document.transactions) {
        Validation::Valid(rows) => rows,
        Validation::Invalid(errors) => {
            for err in &errors {
                error!(
                    file = %file_name,
                    line = err.line,
                    field = err.field,
                    "[SYNC][ERROR][VALIDATE] {}",
                    err.message
                );
            }
            return Err(abandon(staged, StageError::Validation(errors)).await);
        }
    };

    // RowValid -> Persisted
    let claim = LedgerEntry::pending(file_name, previous, Utc::now());
    if let Err(e) = c.ledger.upsert(&claim).await {
        return Err(abandon(staged, StageError::Claim(e)).await);
    }
    debug!(file = %file_name, attempt = claim.attempts, "[SYNC][LEDGER] Attempt claimed");

    let archive_location = c.archive.location(file_name);
    let summary =
        ProcessingSummaryRecord::new(&document, file_name, &archive_location.display().to_string());
    let inserted = match persist(c.gateway, &config.tables, &rows, &summary).await {
        Ok(inserted) => inserted,
        Err(e) => return Err(fail_attempt(c, &claim, staged, StageError::Persistence(e)).await),
    };

    // Persisted -> Archived
    let archive_path = match c.archive.store(file_name, staged.path()).await {
        Ok(path) => path,
        Err(e) => return Err(fail_attempt(c, &claim, staged, StageError::Archive(e)).await),
    };
    staged.discard().await;
    info!(file = %file_name, path = %archive_path.display(), "[SYNC][ARCHIVE] File archived");

    c.ledger
        .upsert(&claim.succeeded(Utc::now()))
        .await
        .map_err(StageError::Record)?;

    Ok(ArchivedFile {
        transactions: rows.len(),
        inserted,
        archive_path,
    })
}

async fn persist(
    gateway: &dyn PersistenceGateway,
    tables: &TableTargets,
    rows: &[NormalizedTransaction],
    summary: &ProcessingSummaryRecord,
) -> Result<u64, PersistenceError> {
    let transactions = NormalizedTransaction::to_row_set(rows);
    let inserted = gateway
        .bulk_insert(&tables.schema, &tables.transactions_table, &transactions)
        .await?;
    info!(
        file = %summary.file_name,
        table = %tables.transactions_table,
        rows = transactions.len(),
        inserted,
        "[SYNC][PERSIST] Transactions inserted"
    );

    match serde_json::to_string(summary) {
        Ok(json) => debug!(json = %json, "[SYNC][PERSIST][DEBUG] Processing summary as JSON"),
        Err(e) => debug!(error = ?e, "[SYNC][PERSIST][DEBUG] Failed to serialize processing summary"),
    }
    gateway
        .bulk_insert(&tables.schema, &tables.summary_table, &summary.to_row_set())
        .await?;
    info!(
        file = %summary.file_name,
        table = %tables.summary_table,
        "[SYNC][PERSIST] Processing summary inserted"
    );
    Ok(inserted)
}

/// Cleanup for failures before the ledger claim: drop the staged copy only.
async fn abandon(staged: StagingFile, err: StageError) -> StageError {
    staged.discard().await;
    err
}

/// Cleanup for failures after the ledger claim: drop the staged copy and record the
/// failed attempt so the next run retries it.
async fn fail_attempt(
    c: &Collaborators<'_>,
    claim: &LedgerEntry,
    staged: StagingFile,
    err: StageError,
) -> StageError {
    staged.discard().await;
    let failed = claim.failed(err.to_string(), Utc::now());
    if let Err(e) = c.ledger.upsert(&failed).await {
        warn!(
            file = %claim.file_name,
            error = %e,
            "[SYNC][LEDGER] Could not record failed attempt"
        );
    }
    err
}
