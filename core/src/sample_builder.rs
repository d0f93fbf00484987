//! Sample assembly: joins features and labels into one cohort.
//!
//! Features and labels are produced independently, each sorted by customer,
//! then paired position by position. Every pair must carry the same customer;
//! any divergence aborts the cohort instead of producing misaligned samples.

use crate::{
    config::{FeatureConfig, LabelConfig},
    error::{BacktestError, BacktestResult},
    features::{FeatureBuilder, FeatureIndex, FeatureVector},
    field_index::FieldIndex,
    labels::LabelReader,
    sample::{Sample, Samples},
    table::{CustomerAgreementIndex, LoanBook, RecordTable},
    types::{CustomerId, Label},
};

/// The tables of one cohort, ready for sample assembly.
pub struct CohortTables {
    /// Feature-period loans, already filtered.
    pub feature_loans: LoanBook,
    /// Label-period loans.
    pub label_loans:   LoanBook,
    pub transactions:  (FieldIndex, RecordTable<CustomerId>),
    pub products:      (FieldIndex, RecordTable<CustomerId>),
}

pub struct SamplesBuilder<'a> {
    features: &'a FeatureConfig,
    labels:   &'a LabelConfig,
}

impl<'a> SamplesBuilder<'a> {
    pub fn new(features: &'a FeatureConfig, labels: &'a LabelConfig) -> Self {
        Self { features, labels }
    }

    pub fn build(&self, tables: &CohortTables) -> BacktestResult<Samples> {
        let (index, mut features) = FeatureBuilder::new(self.features).build(
            &tables.feature_loans,
            (&tables.transactions.0, &tables.transactions.1),
            (&tables.products.0, &tables.products.1),
        )?;
        features.sort_by(|a, b| a.customer.cmp(&b.customer));

        let mut labels = LabelReader::new(self.labels)
            .read(&tables.feature_loans.customers, &tables.label_loans)?;
        labels.sort_by(|a, b| a.0.cmp(&b.0));

        assemble(index, &tables.feature_loans.customers, features, labels)
    }
}

/// Pair sorted features with sorted labels and attach each customer's
/// agreements.
pub fn assemble(
    index: FeatureIndex,
    customers: &CustomerAgreementIndex,
    features: Vec<FeatureVector>,
    labels: Vec<(CustomerId, Label)>,
) -> BacktestResult<Samples> {
    if features.len() != labels.len() {
        return Err(BacktestError::LengthMismatch {
            features: features.len(),
            labels: labels.len(),
        });
    }

    let mut samples = Samples::new(index);
    for (position, (feature, (label_customer, y))) in features.into_iter().zip(labels).enumerate() {
        if feature.customer != label_customer {
            return Err(BacktestError::KeyMismatch {
                position,
                feature_key: feature.customer.to_string(),
                label_key: label_customer.to_string(),
            });
        }
        let agreements = customers
            .get(&feature.customer)
            .cloned()
            .ok_or_else(|| BacktestError::MissingCustomer {
                customer: feature.customer.to_string(),
            })?;
        samples.push(Sample::new(feature.customer, agreements, feature.values, y))?;
    }

    log::info!("samples: {} assembled", samples.len());
    Ok(samples)
}
