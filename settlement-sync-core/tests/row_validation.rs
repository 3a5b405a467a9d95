mod common;

use chrono::NaiveDate;
use common::{header, join, trailer, transaction, Line, RECIPIENT};
use settlement_sync_core::contract::{RowValidator, SqlValue, StatementParser};
use settlement_sync_core::statement::{FixedWidthParser, StatementDocument};
use settlement_sync_core::validate::{NormalizedTransaction, SettlementRowValidator, Validation};

fn document(lines: &[Line<'_>]) -> StatementDocument {
    let mut raw = vec![header(RECIPIENT)];
    raw.extend(lines.iter().map(transaction));
    raw.push(trailer(lines.len() as u64 + 2));
    FixedWidthParser.parse("F1", &join(&raw)).expect("fixture should parse")
}

fn validate(lines: &[Line<'_>]) -> Validation {
    let doc = document(lines);
    SettlementRowValidator.validate(&doc.header, &doc.transactions)
}

#[test]
fn valid_rows_are_normalized() {
    let rows = match validate(&[Line {
        installments: "03",
        gross: "150000",
        net: "146250",
        ..Line::default()
    }]) {
        Validation::Valid(rows) => rows,
        Validation::Invalid(errors) => panic!("expected valid rows, got {errors:?}"),
    };

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.file_name, "F1");
    assert_eq!(row.line_number, 2);
    assert_eq!(row.transaction_date, NaiveDate::from_ymd_opt(2024, 11, 1).unwrap());
    assert_eq!(row.installments, 3);
    assert_eq!(row.gross_amount_cents, 150_000);
    assert_eq!(row.net_amount_cents, 146_250);
}

#[test]
fn every_violation_is_reported_with_its_line() {
    let errors = match validate(&[
        Line {
            installments: "00",
            ..Line::default()
        },
        Line::default(),
        Line {
            date: "20241399",
            gross: "100",
            net: "200",
            ..Line::default()
        },
    ]) {
        Validation::Invalid(errors) => errors,
        Validation::Valid(_) => panic!("expected validation errors"),
    };

    let found: Vec<(usize, &str)> = errors.iter().map(|e| (e.line, e.field)).collect();
    assert_eq!(
        found,
        vec![
            (2, "numero_total_parcelas"),
            (4, "data_transacao"),
            (4, "valor_liquido_venda"),
        ]
    );
}

#[test]
fn transaction_after_generation_date_is_invalid() {
    let errors = match validate(&[Line {
        date: "20241103",
        ..Line::default()
    }]) {
        Validation::Invalid(errors) => errors,
        Validation::Valid(_) => panic!("expected validation errors"),
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "data_transacao");
    assert!(errors[0].message.contains("after the statement generation date"));
}

#[test]
fn blank_codes_and_zero_gross_are_invalid() {
    let errors = match validate(&[Line {
        brand: "",
        nsu: "",
        gross: "0",
        net: "0",
        ..Line::default()
    }]) {
        Validation::Invalid(errors) => errors,
        Validation::Valid(_) => panic!("expected validation errors"),
    };
    let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
    assert_eq!(fields, vec!["codigo_bandeira", "nsu", "valor_bruto_venda"]);
    assert_eq!(
        errors[0].to_string(),
        "line 2: codigo_bandeira: must not be blank"
    );
}

#[test]
fn statement_without_transactions_is_valid_and_empty() {
    assert_eq!(validate(&[]), Validation::Valid(vec![]));
}

#[test]
fn row_set_is_keyed_by_file_and_line() {
    let rows = match validate(&[Line::default(), Line::default()]) {
        Validation::Valid(rows) => rows,
        Validation::Invalid(errors) => panic!("unexpected errors {errors:?}"),
    };
    let set = NormalizedTransaction::to_row_set(&rows);
    set.check_shape().unwrap();
    assert_eq!(
        set.key_columns,
        vec!["file_name".to_string(), "line_number".to_string()]
    );
    assert_eq!(set.rows[1][1], SqlValue::Integer(3));
    assert_eq!(set.rows[0][3], SqlValue::Text("2024-11-01".into()));
}
