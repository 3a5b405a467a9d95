#![allow(unused)]

//! # contract: collaborator interfaces consumed by the ingestion core
//!
//! Each external concern of the pipeline sits behind one trait here:
//!
//! - [`RemoteSource`]: lists and fetches statement files from the remote drop directory
//! - [`ArchiveStore`]: lists and files fully processed statements
//! - [`ProcessingLedger`]: per-filename processing status
//! - [`StatementParser`]: raw bytes into a [`StatementDocument`]
//! - [`RowValidator`]: raw transaction rows into normalized rows or validation errors
//! - [`PersistenceGateway`]: all-or-nothing bulk insert of a [`RowSet`] into a named table
//!
//! ## Mocking & Testing
//! Every trait is annotated for `mockall`; the mocks are exported behind the
//! `test-export-mocks` feature (on by default) so the CLI crate's tests can use them too.
//!
//! ## Implementations
//! The parser and validator live in this crate ([`crate::statement::FixedWidthParser`],
//! [`crate::validate::SettlementRowValidator`]). Transport, archive directory and
//! database implementations live in the `settlement-sync` crate.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::{automock, predicate::*};
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, FormatError, LedgerError, PersistenceError, TransportError};
use crate::statement::{StatementDocument, StatementHeader, TransactionRecord};
use crate::validate::Validation;

/// Processing status of one filename in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Pending,
    Success,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Success => "success",
            LedgerStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LedgerStatus::Pending),
            "success" => Ok(LedgerStatus::Success),
            "failed" => Ok(LedgerStatus::Failed),
            other => Err(LedgerError::UnknownStatus(other.to_string())),
        }
    }
}

/// Durable processing record for one filename. Never deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub file_name: String,
    pub status: LedgerStatus,
    pub last_attempt_at: DateTime<Utc>,
    pub error_detail: Option<String>,
    /// Number of persistence attempts, this one included.
    pub attempts: u32,
}

impl LedgerEntry {
    /// Claims a new attempt for `file_name`, continuing the attempt count of `previous`.
    pub fn pending(file_name: &str, previous: Option<&LedgerEntry>, now: DateTime<Utc>) -> Self {
        Self {
            file_name: file_name.to_string(),
            status: LedgerStatus::Pending,
            last_attempt_at: now,
            error_detail: None,
            attempts: previous.map_or(0, |p| p.attempts) + 1,
        }
    }

    pub fn succeeded(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: LedgerStatus::Success,
            last_attempt_at: now,
            error_detail: None,
            ..self.clone()
        }
    }

    pub fn failed(&self, detail: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: LedgerStatus::Failed,
            last_attempt_at: now,
            error_detail: Some(detail.into()),
            ..self.clone()
        }
    }
}

/// A single cell handed to the persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Null,
}

/// Column-named rows for one bulk insert. `key_columns` identify a row uniquely; rows
/// whose key already exists in the target table are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub key_columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    pub fn new(columns: &[&str], key_columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<SqlValue>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Checks every row has one value per column and every key column exists.
    pub fn check_shape(&self) -> Result<(), PersistenceError> {
        if let Some(key) = self
            .key_columns
            .iter()
            .find(|k| !self.columns.contains(k))
        {
            return Err(PersistenceError::UnknownKeyColumn(key.clone()));
        }
        if let Some((row, values)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != self.columns.len())
        {
            return Err(PersistenceError::RowWidth {
                row,
                found: values.len(),
                expected: self.columns.len(),
            });
        }
        Ok(())
    }
}

/// The remote drop directory where the provider deposits statement files.
///
/// Implementations open their own session per call and release it on every exit path.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// File names currently available for pickup, in listing order.
    async fn list(&self) -> Result<Vec<String>, TransportError>;

    /// Full contents of one remote file.
    async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, TransportError>;
}

/// Storage for fully processed statements. Presence here means "done".
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Names of all archived statements.
    async fn list(&self) -> Result<BTreeSet<String>, ArchiveError>;

    /// Where `file_name` is (or will be) filed.
    fn location(&self, file_name: &str) -> PathBuf;

    /// Moves the staged file into the archive and returns its archived path.
    async fn store(&self, file_name: &str, staged: &Path) -> Result<PathBuf, ArchiveError>;
}

/// Durable per-filename status records.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ProcessingLedger: Send + Sync {
    async fn get_all(&self) -> Result<BTreeMap<String, LedgerEntry>, LedgerError>;

    async fn get(&self, file_name: &str) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Inserts the entry or replaces the existing one for the same file name.
    async fn upsert(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait StatementParser: Send + Sync {
    fn parse(&self, file_name: &str, bytes: &[u8]) -> Result<StatementDocument, FormatError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait RowValidator: Send + Sync {
    /// Returns [`Validation::Invalid`] with every violation found, or the normalized rows.
    fn validate(&self, header: &StatementHeader, rows: &[TransactionRecord]) -> Validation;
}

/// Bulk loader into a relational store.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Inserts all rows into `schema.table` in one transaction and returns how many were
    /// newly written. Commits nothing on error.
    async fn bulk_insert(
        &self,
        schema: &str,
        table: &str,
        rows: &RowSet,
    ) -> Result<u64, PersistenceError>;
}
