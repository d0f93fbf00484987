//! Feature derivation and labelling over small hand-built tables.

use overdue_core::{
    config::BacktestConfig,
    error::BacktestError,
    features::{FeatureBuilder, ProductContactCounter, TransactionCounter},
    field_index::{FieldIndex, RowContext},
    labels::LabelReader,
    table::{accumulate, link_agreement, CustomerAgreementIndex, LoanBook, RecordTable},
    types::{AgreementId, CustomerId, Label},
};

fn customer_table(header: &[&str], rows: &[&[&str]]) -> (FieldIndex, RecordTable<CustomerId>) {
    let config = BacktestConfig::default_test();
    let index = FieldIndex::build(&config.schema, header);
    let mut table = RecordTable::new();
    for (line, &raw) in rows.iter().enumerate() {
        let row = index
            .convert(raw, RowContext { file: "fixture", line: line as u64 + 2 })
            .expect("convert");
        accumulate(&mut table, CustomerId::new(raw[0]), row);
    }
    (index, table)
}

/// (agreement, customer, balance, overdue_days) rows in arrival order.
fn loan_book(rows: &[(&str, &str, &str, &str)]) -> LoanBook {
    let config = BacktestConfig::default_test();
    let index = FieldIndex::build(&config.schema, &["agreement_no", "customer_no", "balance", "overdue_days"]);
    let mut loans = RecordTable::new();
    let mut customers = CustomerAgreementIndex::new();
    for &(a, c, balance, overdue) in rows {
        let row = index
            .convert(&[a, c, balance, overdue], RowContext { file: "fixture", line: 0 })
            .expect("convert");
        link_agreement(&mut customers, CustomerId::new(c), AgreementId::new(a));
        accumulate(&mut loans, AgreementId::new(a), row);
    }
    LoanBook::new(index, loans, customers)
}

#[test]
fn transaction_block_counts_categories() {
    let config = BacktestConfig::default_test();
    let (index, table) = customer_table(
        &["customer_no", "amount", "channel"],
        &[
            &["C1", "10.0", "atm"],
            &["C1", "30.0", "atm"],
            &["C1", "5.0", "branch"],
        ],
    );
    let counter = TransactionCounter::new(&config.features);
    let out = counter.count(&index, &table).expect("count");
    let c1 = &out[&CustomerId::new("C1")];
    let names = counter.feature_names();
    let value = |name: &str| c1[names.iter().position(|n| n == name).expect(name)];

    assert_eq!(value("txn.count"), 3.0);
    assert_eq!(value("txn.amount.sum"), 45.0);
    assert_eq!(value("txn.amount.mean"), 15.0);
    assert_eq!(value("txn.amount.max"), 30.0);
    assert_eq!(value("txn.channel=atm.count"), 2.0);
    assert_eq!(value("txn.channel=pos.count"), 0.0);
}

#[test]
fn product_block_ignores_future_and_blank_dates() {
    let config = BacktestConfig::default_test();
    let (index, table) = customer_table(
        &["customer_no", "product_code", "sign_date"],
        &[
            &["C1", "P1", "2013/01/31"],
            &["C1", "P2", "2014/03/01"],
            &["C1", "P3", "2014/06/01"],
            &["C1", "P4", " "],
        ],
    );
    let out = ProductContactCounter::new(&config.features).count(&index, &table).expect("count");
    // count, recent_count (within 90 days of 2014-03-31), days since latest
    assert_eq!(out[&CustomerId::new("C1")], vec![2.0, 1.0, 30.0]);
}

#[test]
fn malformed_product_date_is_an_error() {
    let config = BacktestConfig::default_test();
    let (index, table) = customer_table(&["customer_no", "sign_date"], &[&["C1", "31-03-2014"]]);
    let result = ProductContactCounter::new(&config.features).count(&index, &table);
    assert!(matches!(result, Err(BacktestError::InvalidDate { .. })));
}

#[test]
fn feature_index_depends_only_on_configuration() {
    let config = BacktestConfig::default_test();
    let builder = FeatureBuilder::new(&config.features);
    let empty = customer_table(&["customer_no", "amount", "channel"], &[]);
    let products = customer_table(&["customer_no", "sign_date"], &[]);

    let small = loan_book(&[("A1", "C1", "10.0", "0")]);
    let large = loan_book(&[("A1", "C1", "10.0", "0"), ("A2", "C2", "5.0", "3"), ("A3", "C2", "1.0", "0")]);
    let (index_a, rows_a) = builder.build(&small, (&empty.0, &empty.1), (&products.0, &products.1)).expect("a");
    let (index_b, rows_b) = builder.build(&large, (&empty.0, &empty.1), (&products.0, &products.1)).expect("b");

    assert_eq!(index_a, index_b);
    assert_eq!(index_a, builder.feature_index());
    assert_eq!(rows_a.len(), 1);
    assert_eq!(rows_b.len(), 2);
    assert!(rows_b.iter().all(|r| r.values.len() == index_b.len()));

    let c2 = &rows_b[1];
    assert_eq!(c2.customer, CustomerId::new("C2"));
    assert_eq!(c2.values[index_b.position("loan.agreement_count").expect("count")], 2.0);
    assert_eq!(c2.values[index_b.position("loan.balance.latest_sum").expect("sum")], 6.0);
    assert_eq!(c2.values[index_b.position("txn.count").expect("txn")], 0.0);
}

#[test]
fn customer_is_overdue_if_any_agreement_is() {
    let config = BacktestConfig::default_test();
    let features = loan_book(&[("A1", "C1", "1.0", "0"), ("A2", "C1", "1.0", "0"), ("A3", "C2", "1.0", "0"), ("A4", "C3", "1.0", "0")]);
    let labels = loan_book(&[
        ("A1", "C1", "1.0", "0"),
        ("A2", "C1", "1.0", "12"),
        ("A3", "C2", "1.0", "30"),
        ("A3", "C2", "1.0", "0"),
    ]);

    let out = LabelReader::new(&config.labels).read(&features.customers, &labels).expect("labels");
    assert_eq!(
        out,
        vec![
            (CustomerId::new("C1"), Label::Overdue),
            (CustomerId::new("C2"), Label::NonOverdue),
            (CustomerId::new("C3"), Label::NonOverdue),
        ]
    );
}
