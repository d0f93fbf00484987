//! In-memory record tables grouped by primary key.
//!
//! For a key `k`, `table[k][column]` is the ordered run of values seen for
//! that column across every row sharing `k`. Within one key all columns have
//! the same length; across keys lengths differ until padded.

use crate::{
    field_index::FieldIndex,
    schema::Value,
    types::{AgreementId, CustomerId},
};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

pub type RecordTable<K> = BTreeMap<K, Vec<Vec<Value>>>;

/// Customer → agreements held, first-seen order, no duplicates.
pub type CustomerAgreementIndex = BTreeMap<CustomerId, Vec<AgreementId>>;

/// Group one converted row under `key`.
pub fn accumulate<K: Ord>(table: &mut RecordTable<K>, key: K, row: Vec<Value>) {
    match table.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(row.into_iter().map(|value| vec![value]).collect());
        }
        Entry::Occupied(mut slot) => {
            for (column, value) in slot.get_mut().iter_mut().zip(row) {
                column.push(value);
            }
        }
    }
}

/// Record that `customer` holds `agreement`.
pub fn link_agreement(index: &mut CustomerAgreementIndex, customer: CustomerId, agreement: AgreementId) {
    let agreements = index.entry(customer).or_default();
    if !agreements.contains(&agreement) {
        agreements.push(agreement);
    }
}

/// Most recent value of one column for one key.
pub fn latest<'a, K: Ord>(table: &'a RecordTable<K>, key: &K, position: usize) -> Option<&'a Value> {
    table.get(key)?.get(position)?.last()
}

/// Length of the longest column sequence in the table.
pub fn max_sequence_len<K>(table: &RecordTable<K>) -> usize {
    table
        .values()
        .flat_map(|columns| columns.iter().map(Vec::len))
        .max()
        .unwrap_or(0)
}

/// The loan table together with its index and customer links.
/// This is the unit every loan filter consumes and returns.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanBook {
    pub index: FieldIndex,
    pub loans: RecordTable<AgreementId>,
    pub customers: CustomerAgreementIndex,
}

impl LoanBook {
    pub fn new(index: FieldIndex, loans: RecordTable<AgreementId>, customers: CustomerAgreementIndex) -> Self {
        Self { index, loans, customers }
    }

    pub fn agreement_count(&self) -> usize {
        self.loans.len()
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }

    /// Keep only agreements for which `keep` holds, then drop agreement
    /// references that no longer resolve and customers left with none.
    /// Surviving keys keep their relative order.
    pub fn retain_agreements<F>(&mut self, mut keep: F)
    where
        F: FnMut(&AgreementId, &[Vec<Value>]) -> bool,
    {
        self.loans.retain(|agreement, columns| keep(agreement, columns));
        let loans = &self.loans;
        self.customers.retain(|_, agreements| {
            agreements.retain(|a| loans.contains_key(a));
            !agreements.is_empty()
        });
    }

    /// Drop every agreement belonging to the given customers.
    pub fn drop_customers(&mut self, customers: &BTreeSet<CustomerId>) {
        let doomed: BTreeSet<AgreementId> = customers
            .iter()
            .filter_map(|c| self.customers.get(c))
            .flatten()
            .cloned()
            .collect();
        self.retain_agreements(|agreement, _| !doomed.contains(agreement));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_appends_per_column_in_arrival_order() {
        let mut table: RecordTable<String> = RecordTable::new();
        accumulate(&mut table, "k".into(), vec![Value::Int(1), Value::Text("a".into())]);
        accumulate(&mut table, "k".into(), vec![Value::Int(2), Value::Text("b".into())]);
        accumulate(&mut table, "j".into(), vec![Value::Int(9), Value::Text("z".into())]);

        let k = &table["k"];
        assert_eq!(k[0], vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(k[1], vec![Value::Text("a".into()), Value::Text("b".into())]);
        assert_eq!(table["j"][0], vec![Value::Int(9)]);
        assert_eq!(max_sequence_len(&table), 2);
    }

    #[test]
    fn latest_reads_the_last_value_of_a_column() {
        let mut table: RecordTable<String> = RecordTable::new();
        accumulate(&mut table, "k".into(), vec![Value::Int(5)]);
        accumulate(&mut table, "k".into(), vec![Value::Int(40)]);

        let key = "k".to_string();
        assert_eq!(latest(&table, &key, 0), Some(&Value::Int(40)));
        assert_eq!(latest(&table, &key, 1), None);
        assert_eq!(latest(&table, &"missing".to_string(), 0), None);
    }

    #[test]
    fn link_agreement_ignores_duplicates() {
        let mut index = CustomerAgreementIndex::new();
        link_agreement(&mut index, CustomerId::new("c1"), AgreementId::new("a1"));
        link_agreement(&mut index, CustomerId::new("c1"), AgreementId::new("a1"));
        link_agreement(&mut index, CustomerId::new("c1"), AgreementId::new("a2"));
        assert_eq!(
            index[&CustomerId::new("c1")],
            vec![AgreementId::new("a1"), AgreementId::new("a2")]
        );
    }
}
