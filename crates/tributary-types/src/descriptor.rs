//! Dataset descriptors: per-dataset cleaning rules and table mapping.
//!
//! Descriptors are plain data. They deserialize from the `dataset:` section
//! of a run file, and the built-in ones live in [`crate::presets`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifier::validate_identifier;
use crate::record::Record;

/// Cleaning, filtering and loading rules for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetDescriptor {
    pub name: String,
    /// Blob key of the raw snapshot.
    pub raw_key: String,
    /// Blob key of the clean snapshot.
    pub clean_key: String,
    /// JSON Pointer to the record list; empty means the payload root.
    #[serde(default)]
    pub records_path: String,
    #[serde(default)]
    pub drop_incomplete_rows: bool,
    /// Fields checked by `drop_incomplete_rows`. Defaults to every field
    /// seen in the payload. Fillable fields are never required.
    #[serde(default)]
    pub required_fields: Option<Vec<String>>,
    #[serde(default)]
    pub fill: Vec<FillRule>,
    #[serde(default)]
    pub dedup_key: Option<String>,
    #[serde(default)]
    pub columns_to_drop: Vec<String>,
    #[serde(default)]
    pub filter: Option<FilterPredicate>,
    #[serde(default)]
    pub derived: Vec<DerivedField>,
    pub table: TableMapping,
}

/// Default substituted when a field is absent, null or `""`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRule {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
}

/// Row predicate: `field <op> value`. An absent field compares as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FilterPredicate {
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => *actual == self.value,
            FilterOp::Ne => *actual != self.value,
        }
    }
}

/// A field computed from the cleaned row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedField {
    pub name: String,
    #[serde(flatten)]
    pub derivation: Derivation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    /// First `max_chars` characters of a string field; null otherwise.
    Truncate { source: String, max_chars: usize },
}

impl Derivation {
    pub fn compute(&self, record: &Record) -> Value {
        match self {
            Self::Truncate { source, max_chars } => match record.get(source) {
                Some(Value::String(s)) => Value::String(s.chars().take(*max_chars).collect()),
                _ => Value::Null,
            },
        }
    }

    fn source(&self) -> &str {
        match self {
            Self::Truncate { source, .. } => source,
        }
    }
}

/// Target table and its ordered column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableMapping {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnMapping>,
}

impl TableMapping {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.column.as_str())
    }

    pub fn source_fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(ColumnMapping::source_field)
    }

    /// `schema.name`, or just `name`, unquoted. For logs.
    pub fn display_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// One table column and the record field it is bound from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ColumnSpec")]
pub struct ColumnMapping {
    pub column: String,
    pub field: String,
}

impl ColumnMapping {
    pub fn new(column: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            field: field.into(),
        }
    }

    /// Column whose source field has the same name.
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            field: name,
        }
    }

    pub fn source_field(&self) -> &str {
        &self.field
    }
}

/// Accepts `- url` as shorthand for `- { column: url, field: url }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnSpec {
    Name(String),
    Mapped {
        column: String,
        #[serde(default)]
        field: Option<String>,
    },
}

impl From<ColumnSpec> for ColumnMapping {
    fn from(spec: ColumnSpec) -> Self {
        match spec {
            ColumnSpec::Name(name) => Self::same(name),
            ColumnSpec::Mapped { column, field } => {
                let field = field.unwrap_or_else(|| column.clone());
                Self { column, field }
            }
        }
    }
}

/// Every problem found in a descriptor (or a set of descriptors).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dataset '{dataset}' failed validation:\n  - {}", .problems.join("\n  - "))]
pub struct DescriptorError {
    pub dataset: String,
    pub problems: Vec<String>,
}

impl DatasetDescriptor {
    /// Fields with a fill rule; exempt from the incomplete-row check.
    pub fn fillable_fields(&self) -> HashSet<&str> {
        self.fill.iter().map(|f| f.field.as_str()).collect()
    }

    /// Check internal consistency, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns a [`DescriptorError`] listing every rule that failed.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name must not be empty".to_string());
        }
        if self.raw_key.trim().is_empty() {
            problems.push("raw_key must not be empty".to_string());
        }
        if self.clean_key.trim().is_empty() {
            problems.push("clean_key must not be empty".to_string());
        }
        if !self.raw_key.is_empty() && self.raw_key == self.clean_key {
            problems.push(format!(
                "raw_key and clean_key must differ (both '{}')",
                self.raw_key
            ));
        }
        if !self.records_path.is_empty() && !self.records_path.starts_with('/') {
            problems.push(format!(
                "records_path '{}' must be empty or a JSON Pointer starting with '/'",
                self.records_path
            ));
        }

        let dropped: HashSet<&str> = self.columns_to_drop.iter().map(String::as_str).collect();

        if let Some(key) = &self.dedup_key {
            if dropped.contains(key.as_str()) {
                problems.push(format!("dedup_key '{key}' is also listed in columns_to_drop"));
            }
        }

        let mut derived_names = HashSet::new();
        for derived in &self.derived {
            if !derived_names.insert(derived.name.as_str()) {
                problems.push(format!("derived field '{}' is defined twice", derived.name));
            }
            if dropped.contains(derived.derivation.source()) {
                problems.push(format!(
                    "derived field '{}' reads '{}', which is dropped first",
                    derived.name,
                    derived.derivation.source()
                ));
            }
            let Derivation::Truncate { max_chars, .. } = &derived.derivation;
            if *max_chars == 0 {
                problems.push(format!("derived field '{}' truncates to 0 characters", derived.name));
            }
        }

        self.validate_table(&dropped, &derived_names, &mut problems);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DescriptorError {
                dataset: self.name.clone(),
                problems,
            })
        }
    }

    fn validate_table(
        &self,
        dropped: &HashSet<&str>,
        derived: &HashSet<&str>,
        problems: &mut Vec<String>,
    ) {
        let table = &self.table;
        if let Some(schema) = &table.schema {
            if let Err(e) = validate_identifier(schema) {
                problems.push(format!("table schema: {e}"));
            }
        }
        if let Err(e) = validate_identifier(&table.name) {
            problems.push(format!("table name: {e}"));
        }
        if table.columns.is_empty() {
            problems.push(format!("table '{}' has no columns", table.name));
        }

        let mut seen = HashSet::new();
        let mut fields = HashSet::new();
        for mapping in &table.columns {
            if let Err(e) = validate_identifier(&mapping.column) {
                problems.push(format!("column: {e}"));
            }
            if !seen.insert(mapping.column.as_str()) {
                problems.push(format!("column '{}' is listed twice", mapping.column));
            }
            let field = mapping.source_field();
            // A row carries one value per field, so two columns cannot share one.
            if !fields.insert(field) {
                problems.push(format!(
                    "column '{}' maps to field '{field}', which another column already uses",
                    mapping.column
                ));
            }
            if dropped.contains(field) && !derived.contains(field) {
                problems.push(format!(
                    "column '{}' maps to field '{field}', which is in columns_to_drop",
                    mapping.column
                ));
            }
        }
    }
}

/// Check that a set of datasets can share one blob namespace.
///
/// # Errors
///
/// Returns a [`DescriptorError`] naming every duplicated dataset name or key.
pub fn validate_registry(descriptors: &[DatasetDescriptor]) -> Result<(), DescriptorError> {
    let mut problems = Vec::new();
    let mut names = HashSet::new();
    let mut keys: Vec<(&str, &str)> = Vec::new();

    for d in descriptors {
        if !names.insert(d.name.as_str()) {
            problems.push(format!("dataset name '{}' is registered twice", d.name));
        }
        for key in [d.raw_key.as_str(), d.clean_key.as_str()] {
            if let Some((owner, _)) = keys.iter().find(|(_, k)| *k == key) {
                problems.push(format!(
                    "key '{key}' of dataset '{}' collides with dataset '{owner}'",
                    d.name
                ));
            } else {
                keys.push((d.name.as_str(), key));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(DescriptorError {
            dataset: "registry".to_string(),
            problems,
        })
    }
}
