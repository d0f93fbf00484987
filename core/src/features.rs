//! Per-customer feature derivation.
//!
//! Three counters each contribute a block of columns:
//!   1. loans         (agreement count, latest-value sums, history means)
//!   2. transactions  (TransactionCounter)
//!   3. products      (ProductContactCounter)
//!
//! Column names depend only on configuration, never on the data, so the
//! training and test cohorts always produce the same FeatureIndex.

use crate::{
    config::FeatureConfig,
    error::{BacktestError, BacktestResult},
    field_index::FieldIndex,
    schema::Value,
    table::{LoanBook, RecordTable},
    types::CustomerId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Feature name → column position. Shared by every vector of a cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureIndex {
    names:     Vec<String>,
    positions: HashMap<String, usize>,
}

impl FeatureIndex {
    pub fn from_names(names: Vec<String>) -> Self {
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, positions }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl PartialEq for FeatureIndex {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Eq for FeatureIndex {}

impl From<Vec<String>> for FeatureIndex {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<FeatureIndex> for Vec<String> {
    fn from(index: FeatureIndex) -> Self {
        index.names
    }
}

/// One customer's feature values, aligned to a FeatureIndex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub customer: CustomerId,
    pub values:   Vec<f64>,
}

// ── Transactions ─────────────────────────────────────────────────────────────

/// Counts and summary statistics over each customer's transactions.
pub struct TransactionCounter<'a> {
    config: &'a FeatureConfig,
}

impl<'a> TransactionCounter<'a> {
    pub fn new(config: &'a FeatureConfig) -> Self {
        Self { config }
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names = vec!["txn.count".to_string()];
        for field in &self.config.transaction_fields {
            names.push(format!("txn.{field}.sum"));
            names.push(format!("txn.{field}.mean"));
            names.push(format!("txn.{field}.max"));
        }
        if let Some(category) = &self.config.transaction_category_field {
            for value in &self.config.transaction_categories {
                names.push(format!("txn.{category}={value}.count"));
            }
        }
        names
    }

    pub fn count(
        &self,
        index: &FieldIndex,
        table: &RecordTable<CustomerId>,
    ) -> BacktestResult<BTreeMap<CustomerId, Vec<f64>>> {
        let numeric = self
            .config
            .transaction_fields
            .iter()
            .map(|f| index.require(f, "transaction"))
            .collect::<BacktestResult<Vec<_>>>()?;
        let category = self
            .config
            .transaction_category_field
            .as_deref()
            .map(|f| index.require(f, "transaction"))
            .transpose()?;

        let width = self.feature_names().len();
        let mut out = BTreeMap::new();
        for (customer, columns) in table {
            let rows = columns.first().map_or(0, Vec::len);
            let mut values = Vec::with_capacity(width);
            values.push(rows as f64);

            for &position in &numeric {
                let column = &columns[position];
                let sum: f64 = column.iter().map(Value::as_f64).sum();
                let mean = if column.is_empty() { 0.0 } else { sum / column.len() as f64 };
                let max = column.iter().map(Value::as_f64).reduce(f64::max).unwrap_or(0.0);
                values.extend([sum, mean, max]);
            }

            if let Some(position) = category {
                let column = &columns[position];
                for wanted in &self.config.transaction_categories {
                    let hits = column
                        .iter()
                        .filter(|v| v.as_text() == Some(wanted.as_str()))
                        .count();
                    values.push(hits as f64);
                }
            }

            out.insert(customer.clone(), values);
        }
        Ok(out)
    }
}

// ── Products ─────────────────────────────────────────────────────────────────

/// Product enrollment activity as of a reference date. Enrollments dated
/// after the reference date are not yet observable and are ignored.
pub struct ProductContactCounter<'a> {
    config: &'a FeatureConfig,
}

impl<'a> ProductContactCounter<'a> {
    pub fn new(config: &'a FeatureConfig) -> Self {
        Self { config }
    }

    pub fn feature_names(&self) -> Vec<String> {
        vec![
            "prod.count".into(),
            "prod.recent_count".into(),
            "prod.days_since_latest".into(),
        ]
    }

    pub fn count(
        &self,
        index: &FieldIndex,
        table: &RecordTable<CustomerId>,
    ) -> BacktestResult<BTreeMap<CustomerId, Vec<f64>>> {
        let field = &self.config.product_date_field;
        let position = index.require(field, "product")?;
        let reference = self.config.product_reference_date;

        let mut out = BTreeMap::new();
        for (customer, columns) in table {
            let mut count = 0u64;
            let mut recent = 0u64;
            let mut latest: Option<NaiveDate> = None;

            for value in &columns[position] {
                let raw = value.as_key();
                let raw = raw.trim();
                if raw.is_empty() {
                    continue;
                }
                let date = NaiveDate::parse_from_str(raw, &self.config.product_date_format)
                    .map_err(|_| BacktestError::InvalidDate {
                        customer: customer.to_string(),
                        field: field.clone(),
                        raw: raw.to_string(),
                    })?;
                if date > reference {
                    continue;
                }
                count += 1;
                if (reference - date).num_days() <= self.config.product_recent_days {
                    recent += 1;
                }
                latest = Some(latest.map_or(date, |l| l.max(date)));
            }

            let days_since = latest.map_or(0, |l| (reference - l).num_days());
            out.insert(
                customer.clone(),
                vec![count as f64, recent as f64, days_since as f64],
            );
        }
        Ok(out)
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct FeatureBuilder<'a> {
    config: &'a FeatureConfig,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(config: &'a FeatureConfig) -> Self {
        Self { config }
    }

    pub fn feature_index(&self) -> FeatureIndex {
        let mut names = vec!["loan.agreement_count".to_string()];
        for field in &self.config.loan_fields {
            names.push(format!("loan.{field}.latest_sum"));
            names.push(format!("loan.{field}.history_mean"));
        }
        names.extend(TransactionCounter::new(self.config).feature_names());
        names.extend(ProductContactCounter::new(self.config).feature_names());
        FeatureIndex::from_names(names)
    }

    /// One vector per customer in the loan book, ascending by customer.
    /// Customers without transactions or products get zeros for those blocks.
    pub fn build(
        &self,
        loans: &LoanBook,
        transactions: (&FieldIndex, &RecordTable<CustomerId>),
        products: (&FieldIndex, &RecordTable<CustomerId>),
    ) -> BacktestResult<(FeatureIndex, Vec<FeatureVector>)> {
        let index = self.feature_index();
        let txn_counter = TransactionCounter::new(self.config);
        let prod_counter = ProductContactCounter::new(self.config);
        let txn = txn_counter.count(transactions.0, transactions.1)?;
        let prod = prod_counter.count(products.0, products.1)?;
        let txn_blank = vec![0.0; txn_counter.feature_names().len()];
        let prod_blank = vec![0.0; prod_counter.feature_names().len()];

        let loan_positions = self
            .config
            .loan_fields
            .iter()
            .map(|f| loans.index.require(f, "loan"))
            .collect::<BacktestResult<Vec<_>>>()?;

        let mut features = Vec::with_capacity(loans.customers.len());
        for (customer, agreements) in &loans.customers {
            let mut values = Vec::with_capacity(index.len());
            values.push(agreements.len() as f64);

            for &position in &loan_positions {
                let mut latest_sum = 0.0;
                let mut history_sum = 0.0;
                let mut history_len = 0usize;
                for agreement in agreements {
                    let columns = loans.loans.get(agreement).ok_or_else(|| {
                        BacktestError::MissingAgreement {
                            agreement: agreement.to_string(),
                        }
                    })?;
                    let column = &columns[position];
                    latest_sum += column.last().map_or(0.0, Value::as_f64);
                    history_sum += column.iter().map(Value::as_f64).sum::<f64>();
                    history_len += column.len();
                }
                let history_mean = if history_len == 0 { 0.0 } else { history_sum / history_len as f64 };
                values.extend([latest_sum, history_mean]);
            }

            values.extend_from_slice(txn.get(customer).unwrap_or(&txn_blank));
            values.extend_from_slice(prod.get(customer).unwrap_or(&prod_blank));

            features.push(FeatureVector {
                customer: customer.clone(),
                values,
            });
        }

        log::info!(
            "features: {} customers x {} columns",
            features.len(),
            index.len()
        );
        Ok((index, features))
    }
}
