//! Row-level business rules and normalization of raw transaction records.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::contract::{RowSet, RowValidator, SqlValue};
use crate::statement::{StatementHeader, TransactionRecord};

/// One business-rule violation on one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub line: usize,
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.field, self.message)
    }
}

/// Outcome of validating every row of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(Vec<NormalizedTransaction>),
    /// Never empty.
    Invalid(Vec<ValidationError>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTransaction {
    pub file_name: String,
    pub line_number: usize,
    pub store_id: String,
    pub transaction_date: NaiveDate,
    pub card_brand: String,
    pub product_code: String,
    pub installments: u8,
    pub gross_amount_cents: i64,
    pub net_amount_cents: i64,
    pub nsu: String,
}

impl NormalizedTransaction {
    /// Transactions table rows, keyed by `(file_name, line_number)` so a retried load
    /// cannot duplicate them.
    pub fn to_row_set(rows: &[NormalizedTransaction]) -> RowSet {
        let mut set = RowSet::new(
            &[
                "file_name",
                "line_number",
                "identificacao_loja",
                "data_transacao",
                "codigo_bandeira",
                "codigo_produto",
                "numero_total_parcelas",
                "valor_bruto_venda",
                "valor_liquido_venda",
                "nsu",
            ],
            &["file_name", "line_number"],
        );
        for row in rows {
            set.push(vec![
                SqlValue::Text(row.file_name.clone()),
                SqlValue::Integer(row.line_number as i64),
                SqlValue::Text(row.store_id.clone()),
                SqlValue::Text(row.transaction_date.format("%Y-%m-%d").to_string()),
                SqlValue::Text(row.card_brand.clone()),
                SqlValue::Text(row.product_code.clone()),
                SqlValue::Integer(i64::from(row.installments)),
                SqlValue::Integer(row.gross_amount_cents),
                SqlValue::Integer(row.net_amount_cents),
                SqlValue::Text(row.nsu.clone()),
            ]);
        }
        set
    }
}

/// Validates and types settlement lines. Checks every row; never stops at the first
/// violation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SettlementRowValidator;

impl RowValidator for SettlementRowValidator {
    fn validate(&self, header: &StatementHeader, rows: &[TransactionRecord]) -> Validation {
        let mut normalized = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();

        for row in rows {
            let mut row_errors = RowErrors {
                line: row.line_number,
                errors: &mut errors,
            };
            if let Some(valid) = normalize(header, row, &mut row_errors) {
                normalized.push(valid);
            }
        }

        if errors.is_empty() {
            Validation::Valid(normalized)
        } else {
            Validation::Invalid(errors)
        }
    }
}

struct RowErrors<'a> {
    line: usize,
    errors: &'a mut Vec<ValidationError>,
}

impl RowErrors<'_> {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            line: self.line,
            field,
            message: message.into(),
        });
    }
}

fn normalize(
    header: &StatementHeader,
    row: &TransactionRecord,
    errors: &mut RowErrors<'_>,
) -> Option<NormalizedTransaction> {
    let before = errors.errors.len();

    for (field, value) in [
        ("identificacao_loja", &row.store_id),
        ("codigo_bandeira", &row.card_brand),
        ("codigo_produto", &row.product_code),
        ("nsu", &row.nsu),
    ] {
        if value.is_empty() {
            errors.push(field, "must not be blank");
        }
    }

    let transaction_date = match NaiveDate::parse_from_str(&row.transaction_date, "%Y%m%d") {
        Ok(date) if date > header.generated_on => {
            errors.push(
                "data_transacao",
                format!(
                    "{date} is after the statement generation date {}",
                    header.generated_on
                ),
            );
            None
        }
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(
                "data_transacao",
                format!("'{}' is not a YYYYMMDD date", row.transaction_date),
            );
            None
        }
    };

    let installments = match parse_digits(&row.installments) {
        Some(n @ 1..=99) if row.installments.len() == 2 => Some(n as u8),
        _ => {
            errors.push(
                "numero_total_parcelas",
                format!("'{}' is not an installment count in 01..99", row.installments),
            );
            None
        }
    };

    let gross = parse_digits(&row.gross_amount);
    match gross {
        Some(0) => errors.push("valor_bruto_venda", "must be greater than zero"),
        None => errors.push(
            "valor_bruto_venda",
            format!("'{}' is not an amount in cents", row.gross_amount),
        ),
        Some(_) => {}
    }
    let net = parse_digits(&row.net_amount);
    match (net, gross) {
        (None, _) => errors.push(
            "valor_liquido_venda",
            format!("'{}' is not an amount in cents", row.net_amount),
        ),
        (Some(net), Some(gross)) if net > gross => errors.push(
            "valor_liquido_venda",
            format!("net amount {net} exceeds gross amount {gross}"),
        ),
        _ => {}
    }

    if errors.errors.len() != before {
        return None;
    }

    Some(NormalizedTransaction {
        file_name: row.file_name.clone(),
        line_number: row.line_number,
        store_id: row.store_id.clone(),
        transaction_date: transaction_date?,
        card_brand: row.card_brand.clone(),
        product_code: row.product_code.clone(),
        installments: installments?,
        gross_amount_cents: gross?,
        net_amount_cents: net?,
        nsu: row.nsu.clone(),
    })
}

/// Unsigned decimal digits only; no sign, no separators.
fn parse_digits(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
