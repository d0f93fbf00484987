//! Loan filter chain: resolution by name, ordering and pruning.

use overdue_core::{
    config::{BacktestConfig, NamedConfig},
    error::BacktestError,
    field_index::{FieldIndex, RowContext},
    loan_filter::FilterChain,
    table::{accumulate, link_agreement, CustomerAgreementIndex, LoanBook, RecordTable},
    types::{AgreementId, CustomerId},
};
use serde_json::json;

/// (agreement, customer, balance, overdue_days, product_type), one row each.
fn book(rows: &[(&str, &str, &str, &str, &str)]) -> LoanBook {
    let config = BacktestConfig::default_test();
    let header = ["agreement_no", "customer_no", "balance", "overdue_days", "product_type"];
    let index = FieldIndex::build(&config.schema, &header);
    let mut loans = RecordTable::new();
    let mut customers = CustomerAgreementIndex::new();
    for (line, &(a, c, balance, overdue, product)) in rows.iter().enumerate() {
        let row = index
            .convert(&[a, c, balance, overdue, product], RowContext { file: "fixture", line: line as u64 })
            .expect("convert");
        link_agreement(&mut customers, CustomerId::new(c), AgreementId::new(a));
        accumulate(&mut loans, AgreementId::new(a), row);
    }
    LoanBook::new(index, loans, customers)
}

fn sample_book() -> LoanBook {
    book(&[
        ("A1", "C1", "100.0", "0", "car"),
        ("A2", "C1", "-5.0", "0", "card"),
        ("A3", "C2", "-1.0", "10", "card"),
        ("A4", "C3", "20.0", "0", "mortgage"),
        ("A5", "C3", "30.0", "0", "car"),
        ("A6", "C3", "40.0", "0", "car"),
    ])
}

#[test]
fn empty_chain_is_identity() {
    let chain = FilterChain::resolve(&[]).expect("resolve");
    assert!(chain.is_empty());
    let input = sample_book();
    let output = chain.apply(input.clone()).expect("apply");
    assert_eq!(output, input);
}

#[test]
fn numeric_range_prunes_agreements_and_orphaned_customers() {
    let chain = FilterChain::resolve(&[NamedConfig::new(
        "numeric_range",
        json!({ "field": "balance", "min": 0.0 }),
    )])
    .expect("resolve");
    let out = chain.apply(sample_book()).expect("apply");

    assert_eq!(out.agreement_count(), 4);
    assert_eq!(out.customers[&CustomerId::new("C1")], vec![AgreementId::new("A1")]);
    assert!(!out.customers.contains_key(&CustomerId::new("C2")));
    for agreements in out.customers.values() {
        assert!(agreements.iter().all(|a| out.loans.contains_key(a)));
    }
}

#[test]
fn filters_run_in_configured_order() {
    let chain = FilterChain::resolve(&[
        NamedConfig::new("text_in", json!({ "field": "product_type", "values": ["car", "card"] })),
        NamedConfig::new("max_agreements_per_customer", json!({ "max": 1 })),
    ])
    .expect("resolve");
    assert_eq!(chain.names(), vec!["text_in", "max_agreements_per_customer"]);

    let out = chain.apply(sample_book()).expect("apply");
    // C3 keeps A5 and A6 after text_in, then exceeds max=1. C1 keeps two.
    let customers: Vec<&str> = out.customers.keys().map(|c| c.as_str()).collect();
    assert_eq!(customers, vec!["C2"]);
    assert_eq!(out.agreement_count(), 1);
}

#[test]
fn unknown_filter_fails_at_resolution() {
    let result = FilterChain::resolve(&[NamedConfig::new("no_such_filter", json!({}))]);
    assert!(matches!(result, Err(BacktestError::UnknownFilter { name }) if name == "no_such_filter"));
}

#[test]
fn bad_params_are_rejected() {
    let result = FilterChain::resolve(&[NamedConfig::new(
        "numeric_range",
        json!({ "field": "balance", "min": 10.0, "max": 1.0 }),
    )]);
    assert!(matches!(result, Err(BacktestError::InvalidParam { .. })));

    let result = FilterChain::resolve(&[NamedConfig::new("max_agreements_per_customer", json!({}))]);
    assert!(matches!(result, Err(BacktestError::InvalidParam { .. })));
}

#[test]
fn filter_on_wrong_field_type_fails_before_filtering() {
    let chain = FilterChain::resolve(&[NamedConfig::new(
        "text_in",
        json!({ "field": "balance", "values": ["x"] }),
    )])
    .expect("resolve");
    assert!(matches!(chain.apply(sample_book()), Err(BacktestError::InvalidParam { .. })));
}
