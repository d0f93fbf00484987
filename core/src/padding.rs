//! Left-padding of ragged per-key histories to one uniform width.
//!
//! Padding values go in front so the most recent observations stay at the
//! tail. The target width is recomputed on every call.

use crate::{field_index::FieldIndex, table::{max_sequence_len, RecordTable}};

/// Pad every column of every key to the table-wide maximum length with the
/// column's type default. Returns the width used.
pub fn pad_table<K>(table: &mut RecordTable<K>, index: &FieldIndex) -> usize {
    let max_len = max_sequence_len(table);

    for columns in table.values_mut() {
        for (position, column) in columns.iter_mut().enumerate() {
            if column.len() >= max_len {
                continue;
            }
            let Some(field_type) = index.field_type(position) else {
                continue;
            };
            let missing = max_len - column.len();
            let mut padded = vec![field_type.default_value(); missing];
            padded.append(column);
            *column = padded;
        }
    }

    log::debug!("padded {} keys to width {max_len}", table.len());
    max_len
}
