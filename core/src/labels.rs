//! Ground-truth labels from label-period loan records.

use crate::{
    config::LabelConfig,
    error::BacktestResult,
    table::{latest, CustomerAgreementIndex, LoanBook},
    types::{CustomerId, Label},
};

pub struct LabelReader<'a> {
    config: &'a LabelConfig,
}

impl<'a> LabelReader<'a> {
    pub fn new(config: &'a LabelConfig) -> Self {
        Self { config }
    }

    /// Label every customer of the feature period. A customer is overdue
    /// when any of their agreements shows, in the label period, a latest
    /// overdue value above the threshold. Agreements absent from the label
    /// period count as current.
    pub fn read(
        &self,
        customers: &CustomerAgreementIndex,
        label_book: &LoanBook,
    ) -> BacktestResult<Vec<(CustomerId, Label)>> {
        let position = label_book.index.require(&self.config.overdue_field, "loan")?;

        let labels: Vec<(CustomerId, Label)> = customers
            .iter()
            .map(|(customer, agreements)| {
                let overdue = agreements.iter().any(|agreement| {
                    latest(&label_book.loans, agreement, position)
                        .is_some_and(|v| v.as_f64() > self.config.overdue_threshold)
                });
                let label = if overdue { Label::Overdue } else { Label::NonOverdue };
                (customer.clone(), label)
            })
            .collect();

        let positives = labels.iter().filter(|(_, l)| *l == Label::Overdue).count();
        log::info!("labels: {} customers, {positives} overdue", labels.len());
        Ok(labels)
    }
}
