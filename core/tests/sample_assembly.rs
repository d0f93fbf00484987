//! Joining sorted features with sorted labels.

use overdue_core::{
    error::BacktestError,
    features::{FeatureIndex, FeatureVector},
    sample_builder::assemble,
    table::CustomerAgreementIndex,
    types::{AgreementId, CustomerId, Label},
};

fn index() -> FeatureIndex {
    FeatureIndex::from_names(vec!["f0".into(), "f1".into()])
}

fn customers() -> CustomerAgreementIndex {
    [
        ("C1", vec!["A1"]),
        ("C2", vec!["A2", "A3"]),
    ]
    .into_iter()
    .map(|(c, agreements)| {
        (CustomerId::new(c), agreements.into_iter().map(AgreementId::new).collect::<Vec<_>>())
    })
    .collect()
}

fn feature(customer: &str, values: Vec<f64>) -> FeatureVector {
    FeatureVector {
        customer: CustomerId::new(customer),
        values,
    }
}

#[test]
fn two_customers_pair_in_order() {
    let features = vec![feature("C1", vec![1.0, 2.0]), feature("C2", vec![3.0, 4.0])];
    let labels = vec![
        (CustomerId::new("C1"), Label::NonOverdue),
        (CustomerId::new("C2"), Label::Overdue),
    ];
    let samples = assemble(index(), &customers(), features, labels).expect("assemble");

    assert_eq!(samples.len(), 2);
    let all: Vec<_> = samples.iter().collect();
    assert_eq!(all[0].customer().as_str(), "C1");
    assert_eq!(all[0].x(), &[1.0, 2.0]);
    assert_eq!(all[0].y(), Label::NonOverdue);
    assert_eq!(all[1].x(), &[3.0, 4.0]);
    assert_eq!(all[1].y(), Label::Overdue);
    assert_eq!(all[1].agreements(), &[AgreementId::new("A2"), AgreementId::new("A3")]);
    assert!(all.iter().all(|s| s.y_pred().is_none()));
}

#[test]
fn diverging_keys_abort_assembly() {
    let features = vec![feature("C1", vec![1.0, 2.0]), feature("C2", vec![3.0, 4.0])];
    let labels = vec![
        (CustomerId::new("C1"), Label::NonOverdue),
        (CustomerId::new("C9"), Label::Overdue),
    ];
    match assemble(index(), &customers(), features, labels) {
        Err(BacktestError::KeyMismatch { position, feature_key, label_key }) => {
            assert_eq!(position, 1);
            assert_eq!(feature_key, "C2");
            assert_eq!(label_key, "C9");
        }
        other => panic!("expected KeyMismatch, got {other:?}"),
    }
}

#[test]
fn length_mismatch_aborts_assembly() {
    let features = vec![feature("C1", vec![1.0, 2.0])];
    let labels = vec![
        (CustomerId::new("C1"), Label::NonOverdue),
        (CustomerId::new("C2"), Label::Overdue),
    ];
    assert!(matches!(
        assemble(index(), &customers(), features, labels),
        Err(BacktestError::LengthMismatch { features: 1, labels: 2 })
    ));
}

#[test]
fn customer_without_agreements_is_an_integrity_error() {
    let features = vec![feature("C7", vec![1.0, 2.0])];
    let labels = vec![(CustomerId::new("C7"), Label::NonOverdue)];
    assert!(matches!(
        assemble(index(), &customers(), features, labels),
        Err(BacktestError::MissingCustomer { .. })
    ));
}

#[test]
fn vector_width_must_match_index() {
    let features = vec![feature("C1", vec![1.0])];
    let labels = vec![(CustomerId::new("C1"), Label::NonOverdue)];
    assert!(matches!(
        assemble(index(), &customers(), features, labels),
        Err(BacktestError::DimensionMismatch { expected: 2, actual: 1 })
    ));
}
