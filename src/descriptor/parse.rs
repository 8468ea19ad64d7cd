//! Structural and semantic validation of descriptor documents.

use std::collections::HashSet;
use std::path::PathBuf;

use encoding_rs::Encoding;
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::ColumnGroups;
use crate::error::{DescriptorError, DescriptorResult};

use super::{Binding, ColumnBinding, Descriptor, FORMAT_KEYS, FilterSpec, FormatSpec, ROOT_KEYS};

pub(super) fn descriptor_from_json(doc: &Value, groups: &ColumnGroups) -> DescriptorResult<Descriptor> {
    let root = doc.as_object().ok_or_else(|| wrong_type("(root)", "an object"))?;

    for key in root.keys() {
        if !ROOT_KEYS.contains(&key.as_str()) {
            return Err(DescriptorError::UnknownKey { key: key.clone() });
        }
    }

    let localfile = required_str(root, "localfile")?;
    if localfile.trim().is_empty() {
        return Err(invalid("localfile", "must not be empty"));
    }

    let url = optional_str(root, "url")?;
    if let Some(url) = url {
        if !url.contains("://") {
            return Err(invalid("url", format!("'{url}' is not an absolute url")));
        }
    }

    let format = parse_format(root)?;

    let encoding = match optional_str(root, "encoding")? {
        Some(label) => Some(
            Encoding::for_label(label.as_bytes())
                .ok_or_else(|| invalid("encoding", format!("'{label}' is not a known encoding")))?,
        ),
        None => None,
    };

    let schema_groups = parse_schema_groups(root, groups)?;
    let permitted_columns = permitted_columns(&schema_groups, groups);
    let bindings = parse_schema(root, &schema_groups, groups, &permitted_columns)?;
    let filter = parse_filter(root)?;

    let parse_address = optional_str(root, "parse_address")?.map(str::to_string);
    if let Some(column) = &parse_address {
        if !bindings.iter().any(|b| &b.column == column) {
            return Err(invalid(
                "parse_address",
                format!("column '{column}' is not bound in 'schema'"),
            ));
        }
    }

    let localfile = PathBuf::from(localfile);
    let name = localfile
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(Descriptor {
        name,
        localfile,
        url: url.map(str::to_string),
        format,
        encoding,
        bindings,
        filter,
        schema_groups,
        permitted_columns,
        provider: optional_str(root, "provider")?.map(str::to_string),
        licence: optional_str(root, "licence")?.map(str::to_string),
        source: optional_str(root, "source")?.map(str::to_string),
        parse_address,
    })
}

fn parse_format(root: &Map<String, Value>) -> DescriptorResult<FormatSpec> {
    let format = root
        .get("format")
        .ok_or_else(|| missing("format"))?
        .as_object()
        .ok_or_else(|| wrong_type("format", "an object"))?;

    for key in format.keys() {
        if !FORMAT_KEYS.contains(&key.as_str()) {
            return Err(DescriptorError::UnknownKey {
                key: format!("format.{key}"),
            });
        }
    }

    let kind = required_str(format, "type").map_err(|e| nest("format", e))?;
    match kind {
        "csv" | "delimited" => {
            if format.contains_key("header") {
                return Err(conflict("format.header", "format.type"));
            }
            Ok(FormatSpec::Delimited {
                delimiter: single_ascii(format, "delimiter")?,
                quote: single_ascii(format, "quote")?,
            })
        }
        "xml" | "markup" => {
            for key in ["delimiter", "quote"] {
                if format.contains_key(key) {
                    return Err(conflict(&format!("format.{key}"), "format.type"));
                }
            }
            let header = required_str(format, "header").map_err(|e| nest("format", e))?;
            if header.trim().is_empty() {
                return Err(invalid("format.header", "must not be empty"));
            }
            Ok(FormatSpec::Markup {
                record_element: header.to_string(),
            })
        }
        other => Err(invalid(
            "format.type",
            format!("unsupported format '{other}' (expected csv or xml)"),
        )),
    }
}

fn single_ascii(format: &Map<String, Value>, key: &str) -> DescriptorResult<u8> {
    let dotted = format!("format.{key}");
    let s = format
        .get(key)
        .ok_or_else(|| missing(&dotted))?
        .as_str()
        .ok_or_else(|| wrong_type(&dotted, "a single ASCII character"))?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => Err(wrong_type(&dotted, "a single ASCII character")),
    }
}

fn parse_schema_groups(root: &Map<String, Value>, groups: &ColumnGroups) -> DescriptorResult<Vec<String>> {
    let declared: Vec<String> = match root.get("schema_groups") {
        None => return Ok(groups.keys().cloned().collect()),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let s = item
                    .as_str()
                    .ok_or_else(|| wrong_type(&format!("schema_groups[{i}]"), "a string"))?;
                out.push(s.to_string());
            }
            out
        }
        Some(_) => return Err(wrong_type("schema_groups", "a string or a list of strings")),
    };

    if declared.is_empty() {
        return Err(invalid("schema_groups", "must name at least one group"));
    }
    for group in &declared {
        if !groups.contains_key(group) {
            return Err(DescriptorError::UnknownGroup {
                key: "schema_groups".to_string(),
                group: group.clone(),
            });
        }
    }
    Ok(declared)
}

fn permitted_columns(schema_groups: &[String], groups: &ColumnGroups) -> Vec<String> {
    let mut seen = HashSet::new();
    schema_groups
        .iter()
        .filter_map(|g| groups.get(g))
        .flatten()
        .filter(|c| seen.insert(c.as_str()))
        .cloned()
        .collect()
}

fn parse_schema(
    root: &Map<String, Value>,
    schema_groups: &[String],
    groups: &ColumnGroups,
    permitted: &[String],
) -> DescriptorResult<Vec<ColumnBinding>> {
    let schema = root
        .get("schema")
        .ok_or_else(|| missing("schema"))?
        .as_object()
        .ok_or_else(|| wrong_type("schema", "an object"))?;

    let mut bindings: Vec<ColumnBinding> = Vec::new();
    let mut push = |key: String, column: &str, binding: Binding| -> DescriptorResult<()> {
        if bindings.iter().any(|b| b.column == column) {
            return Err(DescriptorError::DuplicateColumn {
                key,
                column: column.to_string(),
            });
        }
        bindings.push(ColumnBinding {
            column: column.to_string(),
            binding,
        });
        Ok(())
    };

    for (name, node) in schema {
        let key = format!("schema.{name}");
        match node {
            Value::Object(children) => {
                if !schema_groups.contains(name) {
                    return Err(DescriptorError::UnknownGroup {
                        key,
                        group: name.clone(),
                    });
                }
                let group_columns = groups.get(name).map(Vec::as_slice).unwrap_or_default();
                for (column, child) in children {
                    let child_key = format!("{key}.{column}");
                    if !group_columns.contains(column) {
                        return Err(DescriptorError::UnknownColumn {
                            key: child_key,
                            column: column.clone(),
                        });
                    }
                    let binding = leaf_binding(&child_key, child)?;
                    push(child_key, column, binding)?;
                }
            }
            leaf => {
                if !permitted.contains(name) {
                    return Err(DescriptorError::UnknownColumn {
                        key,
                        column: name.clone(),
                    });
                }
                let binding = leaf_binding(&key, leaf)?;
                push(key, name, binding)?;
            }
        }
    }

    if bindings.is_empty() {
        return Err(invalid("schema", "binds no output columns"));
    }
    Ok(bindings)
}

fn leaf_binding(key: &str, node: &Value) -> DescriptorResult<Binding> {
    match node {
        Value::String(s) => Ok(Binding::from_str_value(s)),
        Value::Array(items) => {
            if items.is_empty() {
                return Err(invalid(key, "list binding is empty"));
            }
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                parts.push(
                    item.as_str()
                        .ok_or_else(|| wrong_type(&format!("{key}[{i}]"), "a string"))?,
                );
            }
            Ok(Binding::from_list(parts))
        }
        _ => Err(wrong_type(key, "a string, a list of strings, or a group object")),
    }
}

fn parse_filter(root: &Map<String, Value>) -> DescriptorResult<FilterSpec> {
    let Some(node) = root.get("filter") else {
        return Ok(FilterSpec::default());
    };
    let filter = node.as_object().ok_or_else(|| wrong_type("filter", "an object"))?;

    let mut rules = Vec::with_capacity(filter.len());
    for (attribute, pattern) in filter {
        let key = format!("filter.{attribute}");
        let pattern = pattern
            .as_str()
            .ok_or_else(|| wrong_type(&key, "a string (regular expression)"))?;
        let regex = Regex::new(pattern).map_err(|source| DescriptorError::InvalidPattern {
            key: key.clone(),
            source,
        })?;
        rules.push((attribute.clone(), regex));
    }
    Ok(FilterSpec::new(rules))
}

fn required_str<'a>(obj: &'a Map<String, Value>, key: &str) -> DescriptorResult<&'a str> {
    obj.get(key)
        .ok_or_else(|| missing(key))?
        .as_str()
        .ok_or_else(|| wrong_type(key, "a string"))
}

fn optional_str<'a>(obj: &'a Map<String, Value>, key: &str) -> DescriptorResult<Option<&'a str>> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v.as_str().map(Some).ok_or_else(|| wrong_type(key, "a string")),
    }
}

/// Prefix the key of an error raised while looking inside a nested object.
fn nest(parent: &str, err: DescriptorError) -> DescriptorError {
    match err {
        DescriptorError::MissingKey { key } => missing(&format!("{parent}.{key}")),
        DescriptorError::WrongType { key, expected } => DescriptorError::WrongType {
            key: format!("{parent}.{key}"),
            expected,
        },
        other => other,
    }
}

fn missing(key: &str) -> DescriptorError {
    DescriptorError::MissingKey { key: key.to_string() }
}

fn wrong_type(key: &str, expected: &'static str) -> DescriptorError {
    DescriptorError::WrongType {
        key: key.to_string(),
        expected,
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> DescriptorError {
    DescriptorError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn conflict(key: &str, other: &str) -> DescriptorError {
    DescriptorError::Conflict {
        key: key.to_string(),
        other: other.to_string(),
    }
}
