//! Loan filter chain.
//!
//! RULE: filters run strictly in configured order; each one receives the
//! previous one's LoanBook. Every name is resolved before any file is read.
//! A filter may only shrink the book, and must leave the customer index
//! consistent with the surviving agreements (LoanBook::retain_agreements
//! does this).

use crate::{
    config::{parse_params, NamedConfig},
    error::{BacktestError, BacktestResult},
    field_index::FieldIndex,
    schema::FieldType,
    table::LoanBook,
    types::CustomerId,
};
use serde::Deserialize;
use std::collections::BTreeSet;

/// The contract every loan filter must fulfill.
pub trait LoanFilter {
    /// Stable configuration name.
    fn name(&self) -> &'static str;

    /// Verify the fields this rule reads exist in the loan index.
    fn check(&self, index: &FieldIndex) -> BacktestResult<()>;

    fn filter(&self, book: LoanBook) -> BacktestResult<LoanBook>;
}

/// Resolve a filter by configuration name.
pub fn get_filter(name: &str, params: &serde_json::Value) -> BacktestResult<Box<dyn LoanFilter>> {
    let filter: Box<dyn LoanFilter> = match name {
        NumericRangeFilter::NAME => Box::new(NumericRangeFilter::from_params(params)?),
        TextInFilter::NAME => Box::new(TextInFilter::from_params(params)?),
        MaxAgreementsFilter::NAME => Box::new(MaxAgreementsFilter::from_params(params)?),
        _ => {
            return Err(BacktestError::UnknownFilter {
                name: name.to_string(),
            })
        }
    };
    Ok(filter)
}

#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn LoanFilter>>,
}

impl FilterChain {
    pub fn resolve(configs: &[NamedConfig]) -> BacktestResult<Self> {
        let filters = configs
            .iter()
            .map(|c| get_filter(&c.name, &c.params))
            .collect::<BacktestResult<Vec<_>>>()?;
        Ok(Self { filters })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every filter in order. All field checks happen before the first
    /// filter runs.
    pub fn apply(&self, mut book: LoanBook) -> BacktestResult<LoanBook> {
        for filter in &self.filters {
            filter.check(&book.index)?;
        }
        for filter in &self.filters {
            let before = book.agreement_count();
            book = filter.filter(book)?;
            log::debug!(
                "filter {}: {before} -> {} agreements",
                filter.name(),
                book.agreement_count()
            );
        }
        log::info!(
            "filters: {} agreements, {} customers survive",
            book.agreement_count(),
            book.customer_count()
        );
        Ok(book)
    }
}

fn require_typed(index: &FieldIndex, owner: &str, field: &str, numeric: bool) -> BacktestResult<usize> {
    let position = index.require(field, "loan")?;
    let field_type = index.field_type(position);
    let ok = match field_type {
        Some(FieldType::Float) | Some(FieldType::Int) => numeric,
        Some(FieldType::Text) => !numeric,
        None => false,
    };
    if !ok {
        return Err(BacktestError::InvalidParam {
            owner: owner.to_string(),
            param: "field".into(),
            reason: format!(
                "'{field}' must be a {} field",
                if numeric { "numeric" } else { "text" }
            ),
        });
    }
    Ok(position)
}

// ── numeric_range ───────────────────────────────────────────────────────────

/// Keep agreements whose latest value of a numeric field lies in
/// `[min, max]`. Either bound may be omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct NumericRangeFilter {
    pub field: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl NumericRangeFilter {
    pub const NAME: &'static str = "numeric_range";

    fn from_params(params: &serde_json::Value) -> BacktestResult<Self> {
        let filter: Self = parse_params(Self::NAME, params)?;
        if let (Some(min), Some(max)) = (filter.min, filter.max) {
            if min > max {
                return Err(BacktestError::InvalidParam {
                    owner: Self::NAME.into(),
                    param: "min".into(),
                    reason: format!("min {min} exceeds max {max}"),
                });
            }
        }
        Ok(filter)
    }
}

impl LoanFilter for NumericRangeFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check(&self, index: &FieldIndex) -> BacktestResult<()> {
        require_typed(index, Self::NAME, &self.field, true).map(|_| ())
    }

    fn filter(&self, mut book: LoanBook) -> BacktestResult<LoanBook> {
        let position = require_typed(&book.index, Self::NAME, &self.field, true)?;
        book.retain_agreements(|_, columns| {
            let Some(value) = columns.get(position).and_then(|c| c.last()) else {
                return false;
            };
            let v = value.as_f64();
            self.min.map_or(true, |min| v >= min) && self.max.map_or(true, |max| v <= max)
        });
        Ok(book)
    }
}

// ── text_in ─────────────────────────────────────────────────────────────────

/// Keep agreements whose latest value of a text field is one of `values`.
#[derive(Debug, Clone, Deserialize)]
pub struct TextInFilter {
    pub field: String,
    pub values: BTreeSet<String>,
}

impl TextInFilter {
    pub const NAME: &'static str = "text_in";

    fn from_params(params: &serde_json::Value) -> BacktestResult<Self> {
        parse_params(Self::NAME, params)
    }
}

impl LoanFilter for TextInFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check(&self, index: &FieldIndex) -> BacktestResult<()> {
        require_typed(index, Self::NAME, &self.field, false).map(|_| ())
    }

    fn filter(&self, mut book: LoanBook) -> BacktestResult<LoanBook> {
        let position = require_typed(&book.index, Self::NAME, &self.field, false)?;
        book.retain_agreements(|_, columns| {
            columns
                .get(position)
                .and_then(|c| c.last())
                .and_then(|v| v.as_text())
                .is_some_and(|text| self.values.contains(text))
        });
        Ok(book)
    }
}

// ── max_agreements_per_customer ─────────────────────────────────────────────

/// Drop every agreement of customers holding more than `max` agreements.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxAgreementsFilter {
    pub max: usize,
}

impl MaxAgreementsFilter {
    pub const NAME: &'static str = "max_agreements_per_customer";

    fn from_params(params: &serde_json::Value) -> BacktestResult<Self> {
        parse_params(Self::NAME, params)
    }
}

impl LoanFilter for MaxAgreementsFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check(&self, _index: &FieldIndex) -> BacktestResult<()> {
        Ok(())
    }

    fn filter(&self, mut book: LoanBook) -> BacktestResult<LoanBook> {
        let crowded: BTreeSet<CustomerId> = book
            .customers
            .iter()
            .filter(|(_, agreements)| agreements.len() > self.max)
            .map(|(customer, _)| customer.clone())
            .collect();
        book.drop_customers(&crowded);
        Ok(book)
    }
}
