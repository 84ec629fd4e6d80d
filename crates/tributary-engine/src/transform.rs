//! Descriptor-driven cleaning of a raw payload.
//!
//! [`transform`] is pure: the same bytes and descriptor always produce the
//! same records in the same order, and therefore the same clean snapshot.

use std::collections::HashSet;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tributary_types::record::{is_blank, is_missing};
use tributary_types::{DatasetDescriptor, FillRule, Record, TableMapping};

use crate::errors::ParseError;

/// Row counts after each cleaning step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformStats {
    pub parsed: usize,
    pub dropped_incomplete: usize,
    pub filled: usize,
    pub duplicates_removed: usize,
    pub filtered_out: usize,
    pub emitted: usize,
}

/// Output of [`transform`]: rows holding exactly the table's source fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecordSet {
    pub records: Vec<Record>,
    pub stats: TransformStats,
}

impl CleanedRecordSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// JSON array of row objects, keys in column order.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; plain JSON maps do not fail in practice.
    pub fn to_snapshot(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(&self.records).map(Bytes::from)
    }
}

/// Run the cleaning steps in their fixed order: extract, drop incomplete
/// rows, fill, dedup, drop columns, filter, derive, project.
///
/// # Errors
///
/// Returns [`ParseError`] when the payload or a cleaned row does not match
/// the descriptor.
pub fn transform(raw: &[u8], descriptor: &DatasetDescriptor) -> Result<CleanedRecordSet, ParseError> {
    let payload: Value = serde_json::from_slice(raw)?;
    let mut records = extract_records(payload, &descriptor.records_path)?;
    let mut stats = TransformStats {
        parsed: records.len(),
        ..TransformStats::default()
    };

    if descriptor.drop_incomplete_rows {
        let before = records.len();
        drop_incomplete(&mut records, descriptor);
        stats.dropped_incomplete = before - records.len();
    }

    stats.filled = apply_fill(&mut records, &descriptor.fill);

    if let Some(key) = &descriptor.dedup_key {
        let before = records.len();
        dedup_first(&mut records, key);
        stats.duplicates_removed = before - records.len();
    }

    for record in &mut records {
        for column in &descriptor.columns_to_drop {
            record.remove(column);
        }
    }

    if let Some(filter) = &descriptor.filter {
        let before = records.len();
        records.retain(|r| filter.matches(r));
        stats.filtered_out = before - records.len();
    }

    for record in &mut records {
        for derived in &descriptor.derived {
            let value = derived.derivation.compute(record);
            record.insert(derived.name.clone(), value);
        }
    }

    let records = project(records, &descriptor.table)?;
    stats.emitted = records.len();

    tracing::debug!(dataset = %descriptor.name, ?stats, "Transform complete");
    Ok(CleanedRecordSet { records, stats })
}

fn extract_records(mut payload: Value, path: &str) -> Result<Vec<Record>, ParseError> {
    let target = payload
        .pointer_mut(path)
        .map(Value::take)
        .ok_or_else(|| ParseError::PathNotFound {
            path: path.to_string(),
        })?;

    let items = match target {
        Value::Array(items) => items,
        other => {
            return Err(ParseError::NotAList {
                path: path.to_string(),
                found: kind(&other),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(ParseError::NotAnObject {
                index,
                found: kind(&other),
            }),
        })
        .collect()
}

fn drop_incomplete(records: &mut Vec<Record>, descriptor: &DatasetDescriptor) {
    let fillable = descriptor.fillable_fields();
    let required: Vec<String> = match &descriptor.required_fields {
        Some(fields) => fields.clone(),
        None => observed_fields(records),
    };
    let required: Vec<&str> = required
        .iter()
        .map(String::as_str)
        .filter(|f| !fillable.contains(f))
        .collect();

    records.retain(|r| required.iter().all(|f| !is_missing(r.get(*f))));
}

/// Union of keys across all records, first-seen order.
fn observed_fields(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    for record in records {
        for key in record.keys() {
            if seen.insert(key.as_str()) {
                fields.push(key.clone());
            }
        }
    }
    fields
}

fn apply_fill(records: &mut [Record], rules: &[FillRule]) -> usize {
    let mut filled = 0;
    for record in records.iter_mut() {
        for rule in rules {
            if is_blank(record.get(&rule.field)) {
                record.insert(rule.field.clone(), rule.value.clone());
                filled += 1;
            }
        }
    }
    filled
}

/// Keep the first record per distinct key value. Absent keys group with null.
fn dedup_first(records: &mut Vec<Record>, key: &str) {
    let mut seen = HashSet::new();
    records.retain(|r| {
        let value = r.get(key).unwrap_or(&Value::Null);
        seen.insert(value.to_string())
    });
}

fn project(records: Vec<Record>, table: &TableMapping) -> Result<Vec<Record>, ParseError> {
    records
        .into_iter()
        .enumerate()
        .map(|(row, record)| {
            let mut out = Record::new();
            for mapping in &table.columns {
                let field = mapping.source_field();
                let value = record.get(field).ok_or_else(|| ParseError::MissingColumn {
                    row,
                    column: mapping.column.clone(),
                    field: field.to_string(),
                })?;
                out.insert(field.to_string(), value.clone());
            }
            Ok(out)
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
