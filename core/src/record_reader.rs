//! Tab-delimited table reading.
//!
//! A table is read from a list of monthly files in order. The first file's
//! header builds the field index; every later header must match it exactly.
//! Every data row must have exactly as many columns as the header. Each row is converted through the index and grouped by its primary
//! key as it arrives.

use crate::{
    config::KeyFields,
    error::{BacktestError, BacktestResult},
    field_index::{FieldIndex, RowContext},
    padding::pad_table,
    schema::{FieldSchema, Value},
    table::{accumulate, link_agreement, CustomerAgreementIndex, LoanBook, RecordTable},
    types::{AgreementId, CustomerId},
};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;

pub struct RecordReader<'a> {
    schema: &'a FieldSchema,
    keys:   &'a KeyFields,
}

impl<'a> RecordReader<'a> {
    pub fn new(schema: &'a FieldSchema, keys: &'a KeyFields) -> Self {
        Self { schema, keys }
    }

    /// Read loan agreements keyed by agreement number, link each agreement
    /// to its customer, then pad every history to a common width.
    pub fn read_loans<P: AsRef<Path>>(&self, files: &[P]) -> BacktestResult<LoanBook> {
        let mut loans: RecordTable<AgreementId> = RecordTable::new();
        let mut customers = CustomerAgreementIndex::new();
        let key_fields = [self.keys.agreement.as_str(), self.keys.customer.as_str()];

        let index = read_rows(self.schema, files, "loan", &key_fields, |keys, row| {
            let agreement = AgreementId::new(row[keys[0]].as_key());
            let customer = CustomerId::new(row[keys[1]].as_key());
            link_agreement(&mut customers, customer, agreement.clone());
            accumulate(&mut loans, agreement, row);
            Ok(())
        })?;

        let width = pad_table(&mut loans, &index);
        log::info!(
            "loan: {} agreements, {} customers, history width {width}",
            loans.len(),
            customers.len()
        );
        Ok(LoanBook::new(index, loans, customers))
    }

    /// Read transaction history keyed by customer number.
    pub fn read_transactions<P: AsRef<Path>>(
        &self,
        files: &[P],
    ) -> BacktestResult<(FieldIndex, RecordTable<CustomerId>)> {
        self.read_customer_table(files, "transaction")
    }

    /// Read product enrollments keyed by customer number.
    pub fn read_products<P: AsRef<Path>>(
        &self,
        files: &[P],
    ) -> BacktestResult<(FieldIndex, RecordTable<CustomerId>)> {
        self.read_customer_table(files, "product")
    }

    fn read_customer_table<P: AsRef<Path>>(
        &self,
        files: &[P],
        table_name: &str,
    ) -> BacktestResult<(FieldIndex, RecordTable<CustomerId>)> {
        let mut table: RecordTable<CustomerId> = RecordTable::new();
        let key_fields = [self.keys.customer.as_str()];

        let index = read_rows(self.schema, files, table_name, &key_fields, |keys, row| {
            let customer = CustomerId::new(row[keys[0]].as_key());
            accumulate(&mut table, customer, row);
            Ok(())
        })?;

        log::info!("{table_name}: {} customers", table.len());
        Ok((index, table))
    }
}

/// Stream every data row of `files` through `on_row`, which receives the
/// converted positions of `key_fields` and the converted row.
fn read_rows<P, F>(
    schema: &FieldSchema,
    files: &[P],
    table_name: &str,
    key_fields: &[&str],
    mut on_row: F,
) -> BacktestResult<FieldIndex>
where
    P: AsRef<Path>,
    F: FnMut(&[usize], Vec<Value>) -> BacktestResult<()>,
{
    if files.is_empty() {
        return Err(anyhow::anyhow!("no input files for {table_name} table").into());
    }

    let mut group: Option<(Vec<String>, FieldIndex, Vec<usize>)> = None;
    let mut total_rows = 0u64;

    for path in files {
        let path = path.as_ref();
        let file = path.display().to_string();
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_path(path)?;

        let mut records = reader.records();
        let header: Vec<String> = loop {
            match records.next() {
                Some(record) => {
                    let record = record?;
                    if !is_blank(&record) {
                        break record.iter().map(|name| name.trim().to_string()).collect();
                    }
                }
                None => return Err(BacktestError::MissingHeader { file }),
            }
        };

        let (first_header, index, key_positions) = match group.take() {
            Some(g) => g,
            None => {
                let index = FieldIndex::build(schema, &header);
                let key_positions = key_fields
                    .iter()
                    .map(|field| index.require(field, table_name))
                    .collect::<BacktestResult<Vec<_>>>()?;
                log::debug!(
                    "{table_name}: header has {} columns, {} kept",
                    header.len(),
                    index.len()
                );
                (header.clone(), index, key_positions)
            }
        };
        if first_header != header {
            return Err(BacktestError::HeaderMismatch { file });
        }

        let mut file_rows = 0u64;
        for record in records {
            let record = record?;
            if is_blank(&record) {
                continue;
            }
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() != first_header.len() {
                return Err(BacktestError::ColumnCount {
                    file,
                    line,
                    expected: first_header.len(),
                    actual: record.len(),
                });
            }
            let fields: Vec<&str> = record.iter().collect();
            let row = index.convert(&fields, RowContext { file: &file, line })?;
            on_row(&key_positions, row)?;
            file_rows += 1;
        }
        log::debug!("{table_name}: {file_rows} rows from {file}");
        total_rows += file_rows;
        group = Some((first_header, index, key_positions));
    }

    log::info!("{table_name}: {total_rows} rows from {} files", files.len());
    group
        .map(|(_, index, _)| index)
        .ok_or_else(|| anyhow::anyhow!("no header read for {table_name} table").into())
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}
