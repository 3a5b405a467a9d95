//! SQLite backend: the ledger and bulk loader used for local runs and the test suite.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use settlement_sync_core::config::TableTargets;
use settlement_sync_core::contract::{
    LedgerEntry, PersistenceGateway, ProcessingLedger, RowSet, SqlValue,
};
use settlement_sync_core::error::{LedgerError, PersistenceError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

use super::{check_tables, ledger_err, qualified, store_err, InsertStatement, LEDGER_TABLE};

/// Opens a pool for `url`, creating the database file when the URL allows it.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(url)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Opens an existing database file read-only, whatever `mode` the URL asks for.
/// Returns `None` when the file does not exist.
pub async fn connect_read_only(url: &str) -> Result<Option<SqlitePool>, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?;
    if !options.get_filename().exists() {
        debug!(path = %options.get_filename().display(), "[SYNC][DB] No database file yet");
        return Ok(None);
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options.read_only(true).create_if_missing(false))
        .await?;
    Ok(Some(pool))
}

pub async fn has_table(pool: &SqlitePool, schema: &str, table: &str) -> Result<bool, PersistenceError> {
    let sql = format!("SELECT COUNT(*) FROM \"{schema}\".sqlite_master WHERE type = 'table' AND name = ?");
    let found: i64 = sqlx::query_scalar(&sql)
        .bind(table)
        .fetch_one(pool)
        .await
        .map_err(store_err)?;
    Ok(found > 0)
}

pub async fn init_schema(pool: &SqlitePool, tables: &TableTargets) -> Result<(), PersistenceError> {
    check_tables(tables)?;
    let ledger = qualified(&tables.schema, LEDGER_TABLE);
    let transactions = qualified(&tables.schema, &tables.transactions_table);
    let summary = qualified(&tables.schema, &tables.summary_table);

    let statements = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {ledger} (
                file_name TEXT PRIMARY KEY,
                status TEXT NOT NULL CHECK (status IN ('pending', 'success', 'failed')),
                last_attempt_at TEXT NOT NULL,
                error_detail TEXT,
                attempts INTEGER NOT NULL DEFAULT 0
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {transactions} (
                file_name TEXT NOT NULL,
                line_number INTEGER NOT NULL,
                identificacao_loja TEXT NOT NULL,
                data_transacao TEXT NOT NULL,
                codigo_bandeira TEXT NOT NULL,
                codigo_produto TEXT NOT NULL,
                numero_total_parcelas INTEGER NOT NULL,
                valor_bruto_venda INTEGER NOT NULL,
                valor_liquido_venda INTEGER NOT NULL,
                nsu TEXT NOT NULL,
                loaded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (file_name, line_number)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {summary} (
                codigo_registro TEXT NOT NULL,
                versao_layout TEXT NOT NULL,
                data_geracao TEXT NOT NULL,
                hora_geracao TEXT NOT NULL,
                tipo_processamento TEXT NOT NULL,
                destinatario TEXT NOT NULL,
                total_registros INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                file_name TEXT NOT NULL UNIQUE,
                loaded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        ),
    ];
    for sql in &statements {
        sqlx::query(sql).execute(pool).await.map_err(store_err)?;
    }
    info!(schema = %tables.schema, "[SYNC][DB] Schema ready");
    Ok(())
}

/// Processing ledger in the `processing_ledger` table of one schema.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
    table: String,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool, schema: &str) -> Self {
        Self {
            pool,
            table: qualified(schema, LEDGER_TABLE),
        }
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, LedgerError> {
    let status: String = row.try_get("status").map_err(ledger_err)?;
    let attempts: i64 = row.try_get("attempts").map_err(ledger_err)?;
    Ok(LedgerEntry {
        file_name: row.try_get("file_name").map_err(ledger_err)?,
        status: status.parse()?,
        last_attempt_at: row
            .try_get::<DateTime<Utc>, _>("last_attempt_at")
            .map_err(ledger_err)?,
        error_detail: row.try_get("error_detail").map_err(ledger_err)?,
        attempts: u32::try_from(attempts)
            .map_err(|_| LedgerError::Store(format!("invalid attempt count {attempts}")))?,
    })
}

#[async_trait]
impl ProcessingLedger for SqliteLedger {
    async fn get_all(&self) -> Result<BTreeMap<String, LedgerEntry>, LedgerError> {
        let sql = format!(
            "SELECT file_name, status, last_attempt_at, error_detail, attempts FROM {}",
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(ledger_err)?;
        rows.iter()
            .map(|row| entry_from_row(row).map(|e| (e.file_name.clone(), e)))
            .collect()
    }

    async fn get(&self, file_name: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let sql = format!(
            "SELECT file_name, status, last_attempt_at, error_detail, attempts FROM {} WHERE file_name = ?",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(file_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(ledger_err)?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn upsert(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let sql = format!(
            r#"
            INSERT INTO {} (file_name, status, last_attempt_at, error_detail, attempts)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (file_name) DO UPDATE SET
                status = excluded.status,
                last_attempt_at = excluded.last_attempt_at,
                error_detail = excluded.error_detail,
                attempts = excluded.attempts
            "#,
            self.table
        );
        sqlx::query(&sql)
            .bind(&entry.file_name)
            .bind(entry.status.as_str())
            .bind(entry.last_attempt_at)
            .bind(entry.error_detail.as_deref())
            .bind(i64::from(entry.attempts))
            .execute(&self.pool)
            .await
            .map_err(ledger_err)?;
        debug!(file = %entry.file_name, status = %entry.status, "[SYNC][LEDGER] Entry written");
        Ok(())
    }
}

/// Bulk loader that writes every row of a call in one transaction.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn bulk_insert(
        &self,
        schema: &str,
        table: &str,
        rows: &RowSet,
    ) -> Result<u64, PersistenceError> {
        let statement = InsertStatement::prepare(schema, table, rows)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut inserted = 0;
        for chunk in rows.rows.chunks(statement.rows_per_statement) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(statement.prefix.as_str());
            builder.push_values(chunk, |mut values, row| {
                for value in row {
                    match value {
                        SqlValue::Text(text) => values.push_bind(text.clone()),
                        SqlValue::Integer(number) => values.push_bind(*number),
                        SqlValue::Null => values.push_bind(Option::<String>::None),
                    };
                }
            });
            builder.push(statement.on_conflict.as_str());
            let result = builder.build().execute(&mut *tx).await.map_err(store_err)?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(store_err)?;

        info!(
            table = %table,
            rows = rows.len(),
            inserted,
            skipped = rows.len() as u64 - inserted,
            "[SYNC][PERSIST] Bulk insert committed"
        );
        Ok(inserted)
    }
}
