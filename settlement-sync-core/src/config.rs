use std::path::PathBuf;

use regex::Regex;
use tracing::{debug, info};

/// Default remote filter: any name containing `EXTRATO`.
pub const DEFAULT_FILE_PATTERN: &str = "EXTRATO";

/// Relational targets for the two writes made per file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTargets {
    pub schema: String,
    pub transactions_table: String,
    pub summary_table: String,
}

impl Default for TableTargets {
    fn default() -> Self {
        Self {
            schema: "main".to_string(),
            transactions_table: "reg_extrato_unica".to_string(),
            summary_table: "processing_files_extratos".to_string(),
        }
    }
}

/// Everything the orchestrator needs for one run. Built once at startup and never
/// re-read mid-run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Local directory holding the in-flight copy of the file being processed.
    pub staging_dir: PathBuf,
    /// Remote names must match this to be considered statements.
    pub file_pattern: Regex,
    pub tables: TableTargets,
}

impl SyncConfig {
    pub fn new(staging_dir: impl Into<PathBuf>, file_pattern: Regex, tables: TableTargets) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            file_pattern,
            tables,
        }
    }

    /// Whether a remote name is a statement this pipeline should look at. Names that
    /// are not a single plain path component are never accepted.
    pub fn accepts(&self, file_name: &str) -> bool {
        is_plain_file_name(file_name) && self.file_pattern.is_match(file_name)
    }

    pub fn trace_loaded(&self) {
        info!(
            staging_dir = %self.staging_dir.display(),
            file_pattern = %self.file_pattern,
            schema = %self.tables.schema,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}
