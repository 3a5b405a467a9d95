//! Error taxonomy for the ingestion pipeline.
//!
//! Every collaborator has its own error type so the orchestrator can tell a transport
//! outage from a malformed file from a failed store write. Per-file failures are folded
//! into [`StageError`], which knows the pipeline stage it stopped at; run-level aborts
//! are [`SyncError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::statement::Stage;
use crate::validate::ValidationError;

/// Remote drop directory unreachable, login rejected, or a transfer failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("login rejected for user {user}: {reason}")]
    Auth { user: String, reason: String },

    #[error("remote file {0} not found")]
    NotFound(String),

    #[error("transfer failed: {0}")]
    Transfer(String),
}

/// The statement bytes do not have the expected fixed-width structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("statement is not valid UTF-8 (first invalid byte at offset {0})")]
    Encoding(usize),

    #[error("statement contains no records")]
    Empty,

    #[error("line {line}: expected header record 'A0', found '{found}'")]
    MissingHeader { line: usize, found: String },

    #[error("statement has no trailer record")]
    MissingTrailer,

    #[error("line {line}: unexpected record code '{code}'")]
    UnexpectedRecord { line: usize, code: String },

    #[error("line {line}: record is {len} bytes, at least {need} required")]
    ShortRecord { line: usize, len: usize, need: usize },

    #[error("line {line}: field '{field}' has invalid value '{value}'")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("header field '{field}' is '{found}', expected '{expected}'")]
    HeaderMismatch {
        field: &'static str,
        found: String,
        expected: &'static str,
    },

    #[error("trailer declares {declared} records but the statement has {actual}")]
    RecordCountMismatch { declared: u64, actual: u64 },
}

/// Filing a processed statement into the archive failed.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is already present in the archive")]
    AlreadyArchived(String),
}

/// The processing ledger could not be read or written.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger store error: {0}")]
    Store(String),

    #[error("unknown ledger status '{0}'")]
    UnknownStatus(String),
}

/// A bulk insert was rejected. The gateway commits nothing for the failed call.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("row {row} has {found} values for {expected} columns")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("key column '{0}' is not one of the row set columns")]
    UnknownKeyColumn(String),

    #[error("store write failed: {0}")]
    Store(String),
}

/// Why one file left the pipeline without being archived.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("fetch failed: {0}")]
    Fetch(#[source] TransportError),

    #[error("could not stage {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("FormatError: {0}")]
    Format(#[source] FormatError),

    #[error("{} row validation error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("could not claim ledger entry: {0}")]
    Claim(#[source] LedgerError),

    #[error("persistence failed: {0}")]
    Persistence(#[source] PersistenceError),

    #[error("archive failed: {0}")]
    Archive(#[source] ArchiveError),

    #[error("archived, but the success ledger entry could not be written: {0}")]
    Record(#[source] LedgerError),
}

impl StageError {
    /// The stage the file failed to reach.
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Fetch(_) | StageError::Staging { .. } => Stage::Fetched,
            StageError::Format(_) => Stage::StructurallyValid,
            StageError::Validation(_) => Stage::RowValid,
            StageError::Claim(_) | StageError::Persistence(_) => Stage::Persisted,
            StageError::Archive(_) | StageError::Record(_) => Stage::Archived,
        }
    }
}

/// A failure that aborts the whole run before any file is processed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to list archive: {0}")]
    ArchiveInventory(#[source] ArchiveError),

    #[error("failed to read processing ledger: {0}")]
    LedgerInventory(#[source] LedgerError),

    #[error("failed to prepare staging directory {path}: {source}")]
    StagingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
