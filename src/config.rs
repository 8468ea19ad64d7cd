//! Run configuration.
//!
//! The configuration file is TOML with two tables:
//!
//! ```toml
//! [general]
//! root_directory = "/srv/tabulate"
//! target_encoding = "utf-8"
//! output_encoding_errors = "replace"
//! clean_whitespace = true
//!
//! [labels]
//! business = ["legal_name", "trade_name"]
//! address = ["full_addr", "street_no", "street_name", "city", "postal_code"]
//! ```
//!
//! `[labels]` declares the permitted output column groups that descriptors refer to through
//! `schema_groups`. Command-line overrides are layered on top with [`RunOverrides`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::reader::encoding::CandidateEncodings;
use crate::reader::{MalformedRowPolicy, ReaderOptions};
use crate::transform::{CaseFold, EncodingErrorPolicy, OutputEncoding, TransformOptions};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "TABULATE_CONFIG";

/// File name looked up in the user configuration directory.
pub const CONFIG_FILE_NAME: &str = "tabulate.toml";

/// Column names the engine emits itself; groups may not declare them.
pub const RESERVED_COLUMNS: [&str; 2] = ["idx", "provider"];

/// Named groups of permitted output columns, group name -> ordered column names.
pub type ColumnGroups = BTreeMap<String, Vec<String>>;

/// Parsed and validated configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralOptions,
    #[serde(default)]
    pub labels: ColumnGroups,
}

/// The `[general]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralOptions {
    /// Directory holding `data/input`, `data/output`, `sources` and the cache.
    pub root_directory: PathBuf,
    pub target_encoding: OutputEncoding,
    pub output_encoding_errors: EncodingErrorPolicy,
    pub add_index: bool,
    pub clean_whitespace: bool,
    pub lowercase_output: bool,
    pub titlecase_output: bool,
    pub uppercase_output: bool,
    pub drop_empty_rows: bool,
    pub malformed_rows: MalformedRowPolicy,
    /// Ordered decode candidates tried when a descriptor declares no encoding.
    pub input_encodings: Vec<String>,
    /// Default worker count when the command line does not give one.
    pub workers: usize,
    pub log_level: Option<String>,
}

impl Default for GeneralOptions {
    fn default() -> Self {
        Self {
            root_directory: PathBuf::from("."),
            target_encoding: OutputEncoding::default(),
            output_encoding_errors: EncodingErrorPolicy::default(),
            add_index: false,
            clean_whitespace: false,
            lowercase_output: false,
            titlecase_output: false,
            uppercase_output: false,
            drop_empty_rows: false,
            malformed_rows: MalformedRowPolicy::default(),
            input_encodings: CandidateEncodings::DEFAULT_LABELS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            workers: 1,
            log_level: None,
        }
    }
}

/// Directory layout under the root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sources_dir: PathBuf,
    pub cache_path: PathBuf,
}

impl Layout {
    /// Standard layout rooted at `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            input_dir: root.join("data").join("input"),
            output_dir: root.join("data").join("output"),
            sources_dir: root.join("sources"),
            cache_path: root.join(".cache").join("tabulate.cache"),
        }
    }

    /// Create every directory of the layout (existing ones are left alone).
    pub fn create_all(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.input_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.sources_dir)?;
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Per-run overrides of configuration options, typically from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub target_encoding: Option<OutputEncoding>,
    pub output_encoding_errors: Option<EncodingErrorPolicy>,
    pub add_index: Option<bool>,
    pub clean_whitespace: Option<bool>,
    pub lowercase_output: Option<bool>,
    pub titlecase_output: Option<bool>,
    pub uppercase_output: Option<bool>,
    pub malformed_rows: Option<MalformedRowPolicy>,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file location: `$TABULATE_CONFIG`, else the user config dir.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(p) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(p));
        }
        dirs::config_dir().map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Check option values and column groups.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (group, columns) in &self.labels {
            if columns.is_empty() {
                return Err(ConfigError::Invalid {
                    option: format!("labels.{group}"),
                    reason: "group declares no columns".to_string(),
                });
            }
            for column in columns {
                if RESERVED_COLUMNS.contains(&column.as_str()) {
                    return Err(ConfigError::Invalid {
                        option: format!("labels.{group}"),
                        reason: format!("column name '{column}' is reserved"),
                    });
                }
            }
        }

        CandidateEncodings::from_labels(&self.general.input_encodings).map_err(|label| {
            ConfigError::Invalid {
                option: "general.input_encodings".to_string(),
                reason: format!("'{label}' is not a known encoding"),
            }
        })?;

        if self.general.workers == 0 {
            return Err(ConfigError::Invalid {
                option: "general.workers".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Apply command-line overrides in place.
    pub fn apply_overrides(&mut self, o: &RunOverrides) {
        let g = &mut self.general;
        if let Some(v) = o.target_encoding {
            g.target_encoding = v;
        }
        if let Some(v) = o.output_encoding_errors {
            g.output_encoding_errors = v;
        }
        if let Some(v) = o.add_index {
            g.add_index = v;
        }
        if let Some(v) = o.clean_whitespace {
            g.clean_whitespace = v;
        }
        if let Some(v) = o.lowercase_output {
            g.lowercase_output = v;
        }
        if let Some(v) = o.titlecase_output {
            g.titlecase_output = v;
        }
        if let Some(v) = o.uppercase_output {
            g.uppercase_output = v;
        }
        if let Some(v) = o.malformed_rows {
            g.malformed_rows = v;
        }
    }

    /// Directory layout for this configuration.
    pub fn layout(&self) -> Layout {
        Layout::under(&self.general.root_directory)
    }

    /// Effective case folding: lower beats title beats upper.
    pub fn case_fold(&self) -> CaseFold {
        let g = &self.general;
        if g.lowercase_output {
            CaseFold::Lower
        } else if g.titlecase_output {
            CaseFold::Title
        } else if g.uppercase_output {
            CaseFold::Upper
        } else {
            CaseFold::None
        }
    }

    /// Options for the transform pipeline.
    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            clean_whitespace: self.general.clean_whitespace,
            case: self.case_fold(),
            add_index: self.general.add_index,
            drop_empty_rows: self.general.drop_empty_rows,
            output_encoding: self.general.target_encoding,
            encoding_errors: self.general.output_encoding_errors,
        }
    }

    /// Options for record readers.
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            // Validated in `validate`; an invalid list falls back to the defaults.
            candidates: CandidateEncodings::from_labels(&self.general.input_encodings)
                .unwrap_or_default(),
            malformed_rows: self.general.malformed_rows,
        }
    }
}
