//! Header reconciliation: which columns survive and how rows convert.

use overdue_core::{
    error::BacktestError,
    field_index::{FieldIndex, RowContext},
    schema::{FieldSchema, FieldType, Value},
};

fn schema() -> FieldSchema {
    [
        ("agreement_no", FieldType::Text),
        ("balance", FieldType::Float),
        ("overdue_days", FieldType::Int),
        ("not_in_header", FieldType::Float),
    ]
    .into_iter()
    .map(|(n, t)| (n.to_string(), t))
    .collect()
}

fn ctx() -> RowContext<'static> {
    RowContext { file: "loans/2014-01", line: 2 }
}

#[test]
fn kept_columns_are_a_subset_of_the_header() {
    let headers: Vec<Vec<&str>> = vec![
        vec!["agreement_no", "branch", "balance", "overdue_days"],
        vec!["branch", "region"],
        vec![],
        vec!["balance", "balance", "agreement_no"],
    ];
    for header in headers {
        let index = FieldIndex::build(&schema(), &header);
        let raw: Vec<&str> = index.raw_names().collect();
        assert!(index.len() <= raw.len(), "more kept than raw for {header:?}");
        for name in index.names() {
            assert!(index.raw_position(name).is_some(), "{name} kept but not raw");
        }
    }
}

#[test]
fn kept_positions_follow_header_order() {
    let index = FieldIndex::build(&schema(), &["overdue_days", "branch", "agreement_no", "balance"]);
    assert_eq!(index.names().collect::<Vec<_>>(), vec!["overdue_days", "agreement_no", "balance"]);
    assert_eq!(index.position("overdue_days"), Some(0));
    assert_eq!(index.position("balance"), Some(2));
    assert_eq!(index.position("branch"), None);
    assert_eq!(index.raw_position("branch"), Some(1));
    assert_eq!(index.position("not_in_header"), None);
}

#[test]
fn repeated_raw_name_keeps_first_position() {
    let index = FieldIndex::build(&schema(), &["balance", "balance", "agreement_no"]);
    assert_eq!(index.raw_position("balance"), Some(0));
    assert_eq!(index.len(), 2);
}

#[test]
fn converted_row_reads_back_parsed_values() {
    let header = ["agreement_no", "branch", "balance", "overdue_days"];
    let row = ["A-17", "north", " 1520.75", "12 "];
    let s = schema();
    let index = FieldIndex::build(&s, &header);
    let converted = index.convert(&row, ctx()).expect("convert");

    assert_eq!(converted.len(), index.len());
    for name in index.names() {
        let raw = row[index.raw_position(name).expect("raw")];
        let expected = s[name].parse(raw).expect("parse");
        assert_eq!(converted[index.position(name).expect("pos")], expected, "field {name}");
    }
    assert_eq!(converted[1], Value::Float(1520.75));
    assert_eq!(converted[2], Value::Int(12));
}

#[test]
fn short_row_reports_file_and_line() {
    let index = FieldIndex::build(&schema(), &["agreement_no", "branch", "balance"]);
    match index.convert(&["A-1", "north"], ctx()) {
        Err(BacktestError::ShortRow { file, line, expected, actual }) => {
            assert_eq!(file, "loans/2014-01");
            assert_eq!(line, 2);
            assert_eq!(expected, 3);
            assert_eq!(actual, 2);
        }
        other => panic!("expected ShortRow, got {other:?}"),
    }
}

#[test]
fn unparseable_cell_names_the_field() {
    let index = FieldIndex::build(&schema(), &["agreement_no", "overdue_days"]);
    match index.convert(&["A-1", "twelve"], ctx()) {
        Err(BacktestError::ParseValue { field, raw, kind, .. }) => {
            assert_eq!(field, "overdue_days");
            assert_eq!(raw, "twelve");
            assert_eq!(kind, "int");
        }
        other => panic!("expected ParseValue, got {other:?}"),
    }
}

#[test]
fn require_reports_missing_field() {
    let index = FieldIndex::build(&schema(), &["agreement_no"]);
    assert!(matches!(
        index.require("balance", "loan"),
        Err(BacktestError::MissingField { .. })
    ));
}
