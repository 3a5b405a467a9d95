//! # Database store
//!
//! The processing ledger and the keyed bulk loader live in one relational database, picked
//! by the scheme of the configured URL:
//!
//! - `postgres://` / `postgresql://`: [`postgres`], the production target (default schema `public`)
//! - `sqlite:`: [`sqlite`], for local runs and tests (default schema `main`)
//!
//! Both backends create their tables idempotently at startup. The transactions table is
//! unique on `(file_name, line_number)` and the summary table on `file_name`, which lets the
//! gateway skip rows an earlier partial attempt already wrote (`ON CONFLICT ... DO NOTHING`).

pub mod postgres;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use settlement_sync_core::config::TableTargets;
use settlement_sync_core::contract::{LedgerEntry, PersistenceGateway, ProcessingLedger, RowSet};
use settlement_sync_core::error::{LedgerError, PersistenceError};
use sqlx::{PgPool, SqlitePool};
use tracing::info;

pub const LEDGER_TABLE: &str = "processing_ledger";

/// Upper bound on bind parameters in one statement.
const MAX_BIND_PARAMS: usize = 30_000;

/// Which database engine a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Sqlite,
    Postgres,
}

impl DatabaseKind {
    pub fn from_url(url: &str) -> Result<Self, PersistenceError> {
        let scheme = url.split_once(':').map(|(scheme, _)| scheme).unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DatabaseKind::Sqlite),
            "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            _ => Err(PersistenceError::Store(format!(
                "unsupported database URL scheme '{scheme}' (expected postgres:// or sqlite:)"
            ))),
        }
    }

    /// Schema tables go to when the configuration names none.
    pub fn default_schema(self) -> &'static str {
        match self {
            DatabaseKind::Sqlite => "main",
            DatabaseKind::Postgres => "public",
        }
    }
}

/// Checks `name` is safe to splice into SQL as an identifier.
pub fn check_identifier(name: &str) -> Result<(), PersistenceError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidIdentifier(name.to_string()))
    }
}

fn qualified(schema: &str, table: &str) -> String {
    format!("\"{schema}\".\"{table}\"")
}

fn check_tables(tables: &TableTargets) -> Result<(), PersistenceError> {
    for ident in [
        tables.schema.as_str(),
        tables.transactions_table.as_str(),
        tables.summary_table.as_str(),
    ] {
        check_identifier(ident)?;
    }
    Ok(())
}

/// The fixed parts of a keyed bulk insert, shared by both backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    /// `INSERT INTO "schema"."table" (columns) `, ready for a `VALUES` list.
    pub prefix: String,
    /// ` ON CONFLICT (keys) DO NOTHING`, or empty when the row set has no key.
    pub on_conflict: String,
    pub rows_per_statement: usize,
}

impl InsertStatement {
    /// Validates the row set and every identifier before anything reaches the database.
    pub fn prepare(schema: &str, table: &str, rows: &RowSet) -> Result<Self, PersistenceError> {
        rows.check_shape()?;
        check_identifier(schema)?;
        check_identifier(table)?;
        for column in &rows.columns {
            check_identifier(column)?;
        }
        let on_conflict = if rows.key_columns.is_empty() {
            String::new()
        } else {
            format!(" ON CONFLICT ({}) DO NOTHING", rows.key_columns.join(", "))
        };
        Ok(Self {
            prefix: format!(
                "INSERT INTO {} ({}) ",
                qualified(schema, table),
                rows.columns.join(", ")
            ),
            on_conflict,
            rows_per_statement: (MAX_BIND_PARAMS / rows.columns.len().max(1)).max(1),
        })
    }
}

fn store_err(e: sqlx::Error) -> PersistenceError {
    PersistenceError::Store(e.to_string())
}

fn ledger_err(e: sqlx::Error) -> LedgerError {
    LedgerError::Store(e.to_string())
}

/// An open connection pool to whichever backend the URL selected.
#[derive(Debug, Clone)]
pub enum Database {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl Database {
    /// Connects for a full run, creating the SQLite file when the URL allows it.
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        let database = match DatabaseKind::from_url(url)? {
            DatabaseKind::Sqlite => Database::Sqlite(sqlite::connect(url).await.map_err(store_err)?),
            DatabaseKind::Postgres => {
                Database::Postgres(postgres::connect(url).await.map_err(store_err)?)
            }
        };
        info!("[SYNC][DB] Database connection established");
        Ok(database)
    }

    /// Connects without creating or changing anything. `None` means there is no database
    /// yet (a SQLite file that does not exist).
    pub async fn connect_read_only(url: &str) -> Result<Option<Self>, PersistenceError> {
        let database = match DatabaseKind::from_url(url)? {
            DatabaseKind::Sqlite => sqlite::connect_read_only(url)
                .await
                .map_err(store_err)?
                .map(Database::Sqlite),
            DatabaseKind::Postgres => Some(Database::Postgres(
                postgres::connect(url).await.map_err(store_err)?,
            )),
        };
        if database.is_some() {
            info!("[SYNC][DB] Read-only database connection established");
        }
        Ok(database)
    }

    pub fn kind(&self) -> DatabaseKind {
        match self {
            Database::Sqlite(_) => DatabaseKind::Sqlite,
            Database::Postgres(_) => DatabaseKind::Postgres,
        }
    }

    /// Creates the ledger, transactions and summary tables if they do not exist.
    pub async fn init_schema(&self, tables: &TableTargets) -> Result<(), PersistenceError> {
        match self {
            Database::Sqlite(pool) => sqlite::init_schema(pool, tables).await,
            Database::Postgres(pool) => postgres::init_schema(pool, tables).await,
        }
    }

    /// Whether the ledger table exists in `schema`.
    pub async fn has_ledger(&self, schema: &str) -> Result<bool, PersistenceError> {
        check_identifier(schema)?;
        match self {
            Database::Sqlite(pool) => sqlite::has_table(pool, schema, LEDGER_TABLE).await,
            Database::Postgres(pool) => postgres::has_table(pool, schema, LEDGER_TABLE).await,
        }
    }

    pub fn ledger(&self, schema: &str) -> Box<dyn ProcessingLedger> {
        match self {
            Database::Sqlite(pool) => Box::new(sqlite::SqliteLedger::new(pool.clone(), schema)),
            Database::Postgres(pool) => Box::new(postgres::PgLedger::new(pool.clone(), schema)),
        }
    }

    pub fn gateway(&self) -> Box<dyn PersistenceGateway> {
        match self {
            Database::Sqlite(pool) => Box::new(sqlite::SqliteGateway::new(pool.clone())),
            Database::Postgres(pool) => Box::new(postgres::PgGateway::new(pool.clone())),
        }
    }

    pub async fn close(&self) {
        match self {
            Database::Sqlite(pool) => pool.close().await,
            Database::Postgres(pool) => pool.close().await,
        }
    }
}

/// Ledger and gateway for a plan against a database that has not been created yet: nothing
/// has been processed, and nothing may be written.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDatabase;

const NO_DATABASE: &str = "no database exists yet and plan mode never creates one";

#[async_trait]
impl ProcessingLedger for NoDatabase {
    async fn get_all(&self) -> Result<BTreeMap<String, LedgerEntry>, LedgerError> {
        Ok(BTreeMap::new())
    }

    async fn get(&self, _file_name: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(None)
    }

    async fn upsert(&self, _entry: &LedgerEntry) -> Result<(), LedgerError> {
        Err(LedgerError::Store(NO_DATABASE.to_string()))
    }
}

#[async_trait]
impl PersistenceGateway for NoDatabase {
    async fn bulk_insert(
        &self,
        _schema: &str,
        _table: &str,
        _rows: &RowSet,
    ) -> Result<u64, PersistenceError> {
        Err(PersistenceError::Store(NO_DATABASE.to_string()))
    }
}
