//! Settlement statement documents and the fixed-width reader for them.
//!
//! A statement is one header record (`A0`), any number of transaction records (`CV`) and
//! one trailer record (`A9`), one record per line. Offsets below are byte offsets,
//! end-exclusive.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::contract::{RowSet, SqlValue, StatementParser};
use crate::error::FormatError;

pub const HEADER_CODE: &str = "A0";
pub const TRANSACTION_CODE: &str = "CV";
pub const TRAILER_CODE: &str = "A9";

/// Pipeline states a file moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Stage {
    Discovered,
    Fetched,
    StructurallyValid,
    RowValid,
    Persisted,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementHeader {
    pub record_code: String,
    pub layout_version: String,
    pub generated_on: NaiveDate,
    pub generated_at: NaiveTime,
    pub processing_type: String,
    pub recipient: String,
}

/// One raw settlement line. Fields are the trimmed fixed-width text; typing happens in
/// [`crate::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub file_name: String,
    pub line_number: usize,
    pub store_id: String,
    pub transaction_date: String,
    pub card_brand: String,
    pub product_code: String,
    pub installments: String,
    pub gross_amount: String,
    pub net_amount: String,
    pub nsu: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementTrailer {
    /// Total records in the file, header and trailer included.
    pub declared_total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDocument {
    pub header: StatementHeader,
    pub transactions: Vec<TransactionRecord>,
    pub trailer: StatementTrailer,
}

impl StatementDocument {
    /// Records actually present: header, transactions and trailer.
    pub fn record_count(&self) -> u64 {
        self.transactions.len() as u64 + 2
    }
}

/// The fixed allow-list a header must match before any row is looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderExpectations {
    pub record_code: &'static str,
    pub layout_version: &'static str,
    pub recipient: &'static str,
}

impl Default for HeaderExpectations {
    fn default() -> Self {
        Self {
            record_code: HEADER_CODE,
            layout_version: "002.0a",
            recipient: "000051309",
        }
    }
}

/// Checks header constants and the trailer record count.
pub fn check_structure(
    document: &StatementDocument,
    expected: &HeaderExpectations,
) -> Result<(), FormatError> {
    let header = &document.header;
    let checks = [
        ("codigo_registro", &header.record_code, expected.record_code),
        ("versao_layout", &header.layout_version, expected.layout_version),
        ("destinatario", &header.recipient, expected.recipient),
    ];
    for (field, found, wanted) in checks {
        if found != wanted {
            return Err(FormatError::HeaderMismatch {
                field,
                found: found.clone(),
                expected: wanted,
            });
        }
    }

    let actual = document.record_count();
    if document.trailer.declared_total != actual {
        return Err(FormatError::RecordCountMismatch {
            declared: document.trailer.declared_total,
            actual,
        });
    }
    Ok(())
}

/// The audit row written next to the transactions of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingSummaryRecord {
    pub record_code: String,
    pub layout_version: String,
    pub generated_on: NaiveDate,
    pub generated_at: NaiveTime,
    pub processing_type: String,
    pub recipient: String,
    pub declared_total: u64,
    pub file_path: String,
    pub file_name: String,
}

impl ProcessingSummaryRecord {
    pub fn new(document: &StatementDocument, file_name: &str, file_path: &str) -> Self {
        let header = &document.header;
        Self {
            record_code: header.record_code.clone(),
            layout_version: header.layout_version.clone(),
            generated_on: header.generated_on,
            generated_at: header.generated_at,
            processing_type: header.processing_type.clone(),
            recipient: header.recipient.clone(),
            declared_total: document.trailer.declared_total,
            file_path: file_path.to_string(),
            file_name: file_name.to_string(),
        }
    }

    /// Single-row table keyed by file name.
    pub fn to_row_set(&self) -> RowSet {
        let mut rows = RowSet::new(
            &[
                "codigo_registro",
                "versao_layout",
                "data_geracao",
                "hora_geracao",
                "tipo_processamento",
                "destinatario",
                "total_registros",
                "file_path",
                "file_name",
            ],
            &["file_name"],
        );
        rows.push(vec![
            SqlValue::Text(self.record_code.clone()),
            SqlValue::Text(self.layout_version.clone()),
            SqlValue::Text(self.generated_on.format("%Y-%m-%d").to_string()),
            SqlValue::Text(self.generated_at.format("%H:%M:%S").to_string()),
            SqlValue::Text(self.processing_type.clone()),
            SqlValue::Text(self.recipient.clone()),
            SqlValue::Integer(self.declared_total as i64),
            SqlValue::Text(self.file_path.clone()),
            SqlValue::Text(self.file_name.clone()),
        ]);
        rows
    }
}

const HEADER_LEN: usize = 32;
const TRANSACTION_LEN: usize = 71;
const TRAILER_LEN: usize = 13;

/// Reads the `A0`/`CV`/`A9` fixed-width layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedWidthParser;

impl StatementParser for FixedWidthParser {
    fn parse(&self, file_name: &str, bytes: &[u8]) -> Result<StatementDocument, FormatError> {
        let text = std::str::from_utf8(bytes).map_err(|e| FormatError::Encoding(e.valid_up_to()))?;

        let records: Vec<(usize, &str)> = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| (idx + 1, line))
            .collect();

        let ((first_no, first), rest) = records.split_first().ok_or(FormatError::Empty)?;
        if record_code(first) != HEADER_CODE {
            return Err(FormatError::MissingHeader {
                line: *first_no,
                found: record_code(first).to_string(),
            });
        }
        let header = parse_header(*first_no, first)?;

        let ((last_no, last), body) = rest.split_last().ok_or(FormatError::MissingTrailer)?;
        if record_code(last) != TRAILER_CODE {
            return Err(FormatError::MissingTrailer);
        }
        let trailer = parse_trailer(*last_no, last)?;

        let transactions = body
            .iter()
            .map(|(line_no, line)| match record_code(line) {
                TRANSACTION_CODE => parse_transaction(file_name, *line_no, line),
                other => Err(FormatError::UnexpectedRecord {
                    line: *line_no,
                    code: other.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StatementDocument {
            header,
            transactions,
            trailer,
        })
    }
}

fn record_code(line: &str) -> &str {
    line.get(0..2).unwrap_or(line)
}

fn require_len(line_no: usize, line: &str, need: usize) -> Result<(), FormatError> {
    if line.len() < need {
        return Err(FormatError::ShortRecord {
            line: line_no,
            len: line.len(),
            need,
        });
    }
    Ok(())
}

fn field<'a>(
    line_no: usize,
    line: &'a str,
    name: &'static str,
    range: std::ops::Range<usize>,
) -> Result<&'a str, FormatError> {
    line.get(range)
        .map(str::trim)
        .ok_or_else(|| FormatError::InvalidField {
            line: line_no,
            field: name,
            value: line.to_string(),
        })
}

fn parse_header(line_no: usize, line: &str) -> Result<StatementHeader, FormatError> {
    require_len(line_no, line, HEADER_LEN)?;

    let raw_date = field(line_no, line, "data_geracao", 8..16)?;
    let generated_on = NaiveDate::parse_from_str(raw_date, "%Y%m%d").map_err(|_| {
        FormatError::InvalidField {
            line: line_no,
            field: "data_geracao",
            value: raw_date.to_string(),
        }
    })?;
    let raw_time = field(line_no, line, "hora_geracao", 16..22)?;
    let generated_at = NaiveTime::parse_from_str(raw_time, "%H%M%S").map_err(|_| {
        FormatError::InvalidField {
            line: line_no,
            field: "hora_geracao",
            value: raw_time.to_string(),
        }
    })?;

    Ok(StatementHeader {
        record_code: field(line_no, line, "codigo_registro", 0..2)?.to_string(),
        layout_version: field(line_no, line, "versao_layout", 2..8)?.to_string(),
        generated_on,
        generated_at,
        processing_type: field(line_no, line, "tipo_processamento", 22..23)?.to_string(),
        recipient: field(line_no, line, "destinatario", 23..32)?.to_string(),
    })
}

fn parse_transaction(
    file_name: &str,
    line_no: usize,
    line: &str,
) -> Result<TransactionRecord, FormatError> {
    require_len(line_no, line, TRANSACTION_LEN)?;
    Ok(TransactionRecord {
        file_name: file_name.to_string(),
        line_number: line_no,
        store_id: field(line_no, line, "identificacao_loja", 2..17)?.to_string(),
        transaction_date: field(line_no, line, "data_transacao", 17..25)?.to_string(),
        card_brand: field(line_no, line, "codigo_bandeira", 25..28)?.to_string(),
        product_code: field(line_no, line, "codigo_produto", 28..31)?.to_string(),
        installments: field(line_no, line, "numero_total_parcelas", 31..33)?.to_string(),
        gross_amount: field(line_no, line, "valor_bruto_venda", 33..46)?.to_string(),
        net_amount: field(line_no, line, "valor_liquido_venda", 46..59)?.to_string(),
        nsu: field(line_no, line, "nsu", 59..71)?.to_string(),
    })
}

fn parse_trailer(line_no: usize, line: &str) -> Result<StatementTrailer, FormatError> {
    require_len(line_no, line, TRAILER_LEN)?;
    let raw = field(line_no, line, "total_registros", 2..13)?;
    let declared_total = raw.parse::<u64>().map_err(|_| FormatError::InvalidField {
        line: line_no,
        field: "total_registros",
        value: raw.to_string(),
    })?;
    Ok(StatementTrailer { declared_total })
}
