//! Field index reconciliation between raw file columns and the schema.
//!
//! A raw header is mapped twice:
//!   - `old`: every raw column name → its position in the source row
//!   - `new`: every schema-listed column → a contiguous position in the
//!     converted row, in header order
//!
//! An index is built once per file group and never mutated afterwards.
//! Reading another group builds a fresh index.

use crate::{
    error::{BacktestError, BacktestResult},
    schema::{FieldSchema, FieldType, Value},
};
use std::collections::HashMap;

/// Location of a raw row, for error reporting.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub file: &'a str,
    pub line: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldIndex {
    old: HashMap<String, usize>,
    new: HashMap<String, usize>,
    // Parallel to the converted row.
    kept: Vec<KeptField>,
}

#[derive(Debug, Clone, PartialEq)]
struct KeptField {
    name: String,
    raw_position: usize,
    field_type: FieldType,
}

impl FieldIndex {
    /// Reconcile a header against the schema. Unknown columns are dropped;
    /// a repeated raw name keeps its first position.
    pub fn build<S: AsRef<str>>(schema: &FieldSchema, header: &[S]) -> Self {
        let mut old = HashMap::new();
        let mut new = HashMap::new();
        let mut kept = Vec::new();

        for (position, name) in header.iter().enumerate() {
            let name = name.as_ref().trim();
            if old.contains_key(name) {
                continue;
            }
            old.insert(name.to_string(), position);
            if let Some(field_type) = schema.get(name) {
                new.insert(name.to_string(), kept.len());
                kept.push(KeptField {
                    name: name.to_string(),
                    raw_position: position,
                    field_type: *field_type,
                });
            }
        }

        Self { old, new, kept }
    }

    /// Number of kept columns, i.e. the width of every converted row.
    pub fn len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    /// Position of a kept column in the converted row.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.new.get(name).copied()
    }

    /// Position of any raw column in the source row.
    pub fn raw_position(&self, name: &str) -> Option<usize> {
        self.old.get(name).copied()
    }

    /// Like `position`, but a missing field is a configuration error.
    pub fn require(&self, name: &str, table: &str) -> BacktestResult<usize> {
        self.position(name).ok_or_else(|| BacktestError::MissingField {
            table: table.to_string(),
            field: name.to_string(),
        })
    }

    /// Kept column names in converted-row order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kept.iter().map(|k| k.name.as_str())
    }

    pub fn raw_names(&self) -> impl Iterator<Item = &str> {
        self.old.keys().map(String::as_str)
    }

    pub fn field_type(&self, position: usize) -> Option<FieldType> {
        self.kept.get(position).map(|k| k.field_type)
    }

    /// Parse one raw row into a converted row of width `len()`.
    pub fn convert<S: AsRef<str>>(&self, row: &[S], ctx: RowContext<'_>) -> BacktestResult<Vec<Value>> {
        let needed = self
            .kept
            .iter()
            .map(|k| k.raw_position + 1)
            .max()
            .unwrap_or(0);
        if row.len() < needed {
            return Err(BacktestError::ShortRow {
                file: ctx.file.to_string(),
                line: ctx.line,
                expected: needed,
                actual: row.len(),
            });
        }

        self.kept
            .iter()
            .map(|k| {
                let raw = row[k.raw_position].as_ref();
                k.field_type.parse(raw).ok_or_else(|| BacktestError::ParseValue {
                    file: ctx.file.to_string(),
                    line: ctx.line,
                    field: k.name.clone(),
                    raw: raw.to_string(),
                    kind: k.field_type.name(),
                })
            })
            .collect()
    }
}
