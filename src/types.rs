//! Core record types flowing through a tabulation job.
//!
//! A reader produces [`RawRecord`]s keyed by source attribute name; the pipeline turns each
//! into an [`OutputRecord`] laid out by the dataset's [`OutputSchema`].

use std::collections::HashMap;

/// One record as read from the input, source attribute name -> raw value.
///
/// Records are ephemeral: they are produced one at a time and dropped after transformation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: HashMap<String, String>,
}

impl RawRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any existing value for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Insert a value only if `name` has no value yet.
    ///
    /// Markup readers use this so the first matching descendant wins.
    pub fn insert_first(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_insert_with(|| value.into());
    }

    /// Returns the raw value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Returns the raw value for `name`, or `""` when the attribute is absent.
    pub fn value_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// Number of attributes in this record.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Ordered list of output column names for one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    /// Column names in output order.
    pub columns: Vec<String>,
}

impl OutputSchema {
    /// Create a schema from columns (duplicates are removed, first occurrence wins).
    pub fn new(columns: Vec<String>) -> Self {
        let mut out: Vec<String> = Vec::with_capacity(columns.len());
        for c in columns {
            if !out.contains(&c) {
                out.push(c);
            }
        }
        Self { columns: out }
    }

    /// Iterate column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// A blank record with every column present.
    pub fn blank_record(&self) -> OutputRecord {
        OutputRecord {
            values: vec![String::new(); self.columns.len()],
        }
    }
}

/// One output row. Values are stored in the same order as the [`OutputSchema`] columns and
/// every column is present (blank if unbound or unresolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    /// Row values, aligned with the schema columns.
    pub values: Vec<String>,
}

impl OutputRecord {
    /// Returns the value for `column` using `schema` for the lookup.
    pub fn get<'a>(&'a self, schema: &OutputSchema, column: &str) -> Option<&'a str> {
        schema
            .index_of(column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// True if every value is blank.
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(String::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_schema_dedups_and_indexes() {
        let schema = OutputSchema::new(vec![
            "name".to_string(),
            "city".to_string(),
            "name".to_string(),
        ]);
        assert_eq!(schema.columns, vec!["name", "city"]);
        assert_eq!(schema.index_of("city"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn raw_record_missing_attribute_is_empty() {
        let rec: RawRecord = [("NAME", "Acme")].into_iter().collect();
        assert_eq!(rec.value_or_empty("NAME"), "Acme");
        assert_eq!(rec.value_or_empty("CITY"), "");
        assert_eq!(rec.get("CITY"), None);
    }

    #[test]
    fn insert_first_keeps_earliest_value() {
        let mut rec = RawRecord::new();
        rec.insert_first("Name", "outer");
        rec.insert_first("Name", "inner");
        assert_eq!(rec.get("Name"), Some("outer"));
    }

    #[test]
    fn blank_record_has_every_column() {
        let schema = OutputSchema::new(vec!["a".to_string(), "b".to_string()]);
        let rec = schema.blank_record();
        assert_eq!(rec.values.len(), 2);
        assert!(rec.is_blank());
        assert_eq!(rec.get(&schema, "b"), Some(""));
    }
}
