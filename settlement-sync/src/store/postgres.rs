//! PostgreSQL backend: the production ledger and bulk loader.
//!
//! Same tables and keys as the SQLite backend. Integer columns are `BIGINT` so they decode
//! straight into `i64`, and timestamps are `TIMESTAMPTZ`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use settlement_sync_core::config::TableTargets;
use settlement_sync_core::contract::{
    LedgerEntry, PersistenceGateway, ProcessingLedger, RowSet, SqlValue,
};
use settlement_sync_core::error::{LedgerError, PersistenceError};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use super::{check_tables, ledger_err, qualified, store_err, InsertStatement, LEDGER_TABLE};

pub async fn connect(url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(4).connect(url).await
}

pub async fn has_table(pool: &PgPool, schema: &str, table: &str) -> Result<bool, PersistenceError> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = $1 AND table_name = $2
        )
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_one(pool)
    .await
    .map_err(store_err)
}

/// The DDL run by [`init_schema`], in order.
pub fn schema_statements(tables: &TableTargets) -> Result<Vec<String>, PersistenceError> {
    check_tables(tables)?;
    let schema = &tables.schema;
    let ledger = qualified(schema, LEDGER_TABLE);
    let transactions = qualified(schema, &tables.transactions_table);
    let summary = qualified(schema, &tables.summary_table);

    Ok(vec![
        format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {ledger} (
                file_name TEXT PRIMARY KEY,
                status TEXT NOT NULL CHECK (status IN ('pending', 'success', 'failed')),
                last_attempt_at TIMESTAMPTZ NOT NULL,
                error_detail TEXT,
                attempts BIGINT NOT NULL DEFAULT 0
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {transactions} (
                file_name TEXT NOT NULL,
                line_number BIGINT NOT NULL,
                identificacao_loja TEXT NOT NULL,
                data_transacao TEXT NOT NULL,
                codigo_bandeira TEXT NOT NULL,
                codigo_produto TEXT NOT NULL,
                numero_total_parcelas BIGINT NOT NULL,
                valor_bruto_venda BIGINT NOT NULL,
                valor_liquido_venda BIGINT NOT NULL,
                nsu TEXT NOT NULL,
                loaded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
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
                total_registros BIGINT NOT NULL,
                file_path TEXT NOT NULL,
                file_name TEXT NOT NULL UNIQUE,
                loaded_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#
        ),
    ])
}

pub async fn init_schema(pool: &PgPool, tables: &TableTargets) -> Result<(), PersistenceError> {
    for sql in schema_statements(tables)? {
        sqlx::query(&sql).execute(pool).await.map_err(store_err)?;
    }
    info!(schema = %tables.schema, "[SYNC][DB] Schema ready");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
    table: String,
}

impl PgLedger {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            table: qualified(schema, LEDGER_TABLE),
        }
    }
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, LedgerError> {
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
impl ProcessingLedger for PgLedger {
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
            "SELECT file_name, status, last_attempt_at, error_detail, attempts FROM {} WHERE file_name = $1",
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
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (file_name) DO UPDATE SET
                status = EXCLUDED.status,
                last_attempt_at = EXCLUDED.last_attempt_at,
                error_detail = EXCLUDED.error_detail,
                attempts = EXCLUDED.attempts
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
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
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
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(statement.prefix.as_str());
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
