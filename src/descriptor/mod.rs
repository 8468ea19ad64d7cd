//! Dataset descriptors.
//!
//! A descriptor is a JSON document describing one dataset: where its input lives, how to
//! read it and how to map its attributes onto the standard output columns.
//!
//! ```json
//! {
//!   "localfile": "springfield_businesses.csv",
//!   "url": "https://example.org/open-data/businesses.csv",
//!   "format": { "type": "csv", "delimiter": ",", "quote": "\"" },
//!   "encoding": "utf-8",
//!   "schema_groups": ["business", "address"],
//!   "schema": {
//!     "legal_name": "NAME",
//!     "address": {
//!       "street_name": ["STREET", "force:Street"],
//!       "city": "force:Springfield"
//!     }
//!   },
//!   "filter": { "STATUS": "^(Active|Open)$" },
//!   "provider": "City of Springfield"
//! }
//! ```
//!
//! Key names are a contract with descriptor authors; see [`ROOT_KEYS`] and [`FORMAT_KEYS`].
//! Parsing validates the whole document before any record is read and never touches the
//! dataset itself.

mod binding;
mod parse;

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use regex::Regex;

use crate::config::ColumnGroups;
use crate::error::{DescriptorError, DescriptorResult};

pub use binding::{Binding, ColumnBinding, FORCE_PREFIX, Segment};

/// Keys accepted at the root of a descriptor.
pub const ROOT_KEYS: [&str; 11] = [
    "localfile",
    "url",
    "format",
    "encoding",
    "schema",
    "schema_groups",
    "filter",
    "provider",
    "licence",
    "source",
    "parse_address",
];

/// Keys accepted inside `format`.
pub const FORMAT_KEYS: [&str; 4] = ["type", "delimiter", "quote", "header"];

/// Input format with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSpec {
    /// Delimited text; the first record is the header.
    Delimited { delimiter: u8, quote: u8 },
    /// Element-tagged markup; each `record_element` is one record.
    Markup { record_element: String },
}

impl FormatSpec {
    /// Short tag used in logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Delimited { .. } => "delimited",
            Self::Markup { .. } => "markup",
        }
    }
}

/// Conjunctive record filter: every attribute must match its pattern.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    rules: Vec<(String, Regex)>,
}

impl FilterSpec {
    pub(crate) fn new(rules: Vec<(String, Regex)>) -> Self {
        Self { rules }
    }

    /// Attribute/pattern pairs in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &Regex)> {
        self.rules.iter().map(|(a, r)| (a.as_str(), r))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A parsed, validated dataset descriptor. Immutable once built.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Human-readable dataset name (descriptor file stem, else the input file name).
    pub name: String,
    /// Input file, relative to the input directory unless absolute.
    pub localfile: PathBuf,
    /// Remote location the input can be retrieved from.
    pub url: Option<String>,
    pub format: FormatSpec,
    /// Declared input encoding; `None` means detect.
    pub encoding: Option<&'static Encoding>,
    /// Column bindings in declaration order.
    pub bindings: Vec<ColumnBinding>,
    pub filter: FilterSpec,
    /// Column groups the dataset draws its output columns from.
    pub schema_groups: Vec<String>,
    /// Permitted output columns, in group order.
    pub permitted_columns: Vec<String>,
    pub provider: Option<String>,
    pub licence: Option<String>,
    pub source: Option<String>,
    /// Output column whose resolved value goes to the address parser.
    pub parse_address: Option<String>,
}

impl Descriptor {
    /// Parse and validate a descriptor document against the configured column groups.
    pub fn parse(raw: &[u8], groups: &ColumnGroups) -> DescriptorResult<Self> {
        let doc: serde_json::Value = serde_json::from_slice(raw)?;
        parse::descriptor_from_json(&doc, groups)
    }

    /// Read, parse and validate a descriptor file. The dataset name is the file stem.
    pub fn load(path: impl AsRef<Path>, groups: &ColumnGroups) -> DescriptorResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut descriptor = Self::parse(&raw, groups)?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            descriptor.name = stem.to_string();
        }
        Ok(descriptor)
    }

    /// Binding for `column`, if the schema binds it.
    pub fn binding_for(&self, column: &str) -> Option<&Binding> {
        self.bindings
            .iter()
            .find(|b| b.column == column)
            .map(|b| &b.binding)
    }

    /// Input path under `input_dir` (absolute `localfile`s are used as is).
    pub fn input_path(&self, input_dir: &Path) -> PathBuf {
        if self.localfile.is_absolute() {
            self.localfile.clone()
        } else {
            input_dir.join(&self.localfile)
        }
    }

    /// Output file name: the input file stem with a `.csv` extension.
    pub fn output_file_name(&self) -> PathBuf {
        let stem = self
            .localfile
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| self.name.clone().into());
        let mut name = PathBuf::from(stem);
        name.set_extension("csv");
        name
    }
}
