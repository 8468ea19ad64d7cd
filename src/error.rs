use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for a whole dataset job.
pub type TabulateResult<T> = Result<T, TabulateError>;

/// Result type for descriptor parsing and validation.
pub type DescriptorResult<T> = Result<T, DescriptorError>;

/// Result type for record readers.
pub type ReadResult<T> = Result<T, ReadError>;

/// A descriptor that is malformed or semantically invalid.
///
/// Every variant names the offending key (dotted, e.g. `format.delimiter`) so the
/// message can be acted on without opening the source.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The descriptor is not a JSON document.
    #[error("descriptor is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The descriptor file could not be read.
    #[error("failed to read descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{key}' is required")]
    MissingKey { key: String },

    #[error("'{key}' is not a recognised key")]
    UnknownKey { key: String },

    #[error("'{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("'{key}' has an invalid value: {reason}")]
    InvalidValue { key: String, reason: String },

    /// Two keys were set that may not appear together.
    #[error("'{key}' cannot be combined with '{other}'")]
    Conflict { key: String, other: String },

    /// An output column outside the permitted column groups.
    #[error("'{key}' binds column '{column}' which is not in the permitted column groups")]
    UnknownColumn { key: String, column: String },

    #[error("'{key}' names column group '{group}' which is not configured")]
    UnknownGroup { key: String, group: String },

    #[error("'{key}' binds column '{column}' more than once")]
    DuplicateColumn { key: String, column: String },

    #[error("'{key}' is not a valid regular expression: {source}")]
    InvalidPattern {
        key: String,
        #[source]
        source: regex::Error,
    },
}

impl DescriptorError {
    /// The dotted key the error refers to, if it refers to one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Json(_) | Self::Io { .. } => None,
            Self::MissingKey { key }
            | Self::UnknownKey { key }
            | Self::WrongType { key, .. }
            | Self::InvalidValue { key, .. }
            | Self::Conflict { key, .. }
            | Self::UnknownColumn { key, .. }
            | Self::UnknownGroup { key, .. }
            | Self::DuplicateColumn { key, .. }
            | Self::InvalidPattern { key, .. } => Some(key),
        }
    }
}

/// An invalid run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration syntax: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration option '{option}': {reason}")]
    Invalid { option: String, reason: String },
}

/// Fatal input problem for one dataset (undecodable bytes, broken structure).
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No candidate encoding decoded the whole input cleanly.
    #[error("could not decode {path} with any of [{tried}]")]
    Undecodable { path: PathBuf, tried: String },

    #[error("delimited input error: {0}")]
    Csv(#[from] csv::Error),

    #[error("markup input error at byte {position}: {message}")]
    Markup { position: u64, message: String },

    #[error("input has no header record")]
    MissingHeader,
}

/// A failure tied to a single record. Depending on policy it aborts the dataset
/// or is routed to the error sink while processing continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("row {row}: address parser failed for column '{column}': {message}")]
    AddressParse {
        row: u64,
        column: String,
        message: String,
    },

    #[error("row {row}: column '{column}' has characters unrepresentable in {encoding}")]
    Unencodable {
        row: u64,
        column: String,
        encoding: &'static str,
    },
}

/// Explicit parse-failure signal from an address parser.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AddressParseError {
    pub message: String,
}

impl AddressParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of the redundancy cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache store {path} is corrupt at line {line}")]
    Corrupt { path: PathBuf, line: usize },

    #[error("cache lock poisoned")]
    Poisoned,
}

/// Failure to retrieve a remote dataset.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("retrieval of {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("failed to store {url} at {path}: {source}")]
    Io {
        url: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no retrieval backend available for {url}")]
    Unsupported { url: String },
}

/// Terminal error for one dataset job.
///
/// Errors never cross job boundaries: the coordinator records one of these per failed
/// descriptor and keeps going.
#[derive(Debug, Error)]
pub enum TabulateError {
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("read error: {0}")]
    Read(#[from] ReadError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("retrieval error: {0}")]
    Fetch(#[from] FetchError),

    #[error("output error for {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output csv error: {0}")]
    OutputCsv(#[from] csv::Error),

    #[error("input file {path} does not exist")]
    MissingInput { path: PathBuf },

    /// The descriptor asks for address parsing but no parser was supplied.
    #[error("descriptor requests address parsing but no address parser is configured")]
    NoAddressParser,

    /// The run was interrupted before this job could finish.
    #[error("interrupted")]
    Cancelled,
}

/// A failure that prevents a run from starting at all.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("cache store unavailable: {0}")]
    Cache(#[from] CacheError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_errors_name_their_key() {
        let err = DescriptorError::MissingKey {
            key: "format.delimiter".to_string(),
        };
        assert_eq!(err.key(), Some("format.delimiter"));
        assert_eq!(err.to_string(), "'format.delimiter' is required");

        let err = DescriptorError::UnknownColumn {
            key: "schema.nme".to_string(),
            column: "nme".to_string(),
        };
        assert!(err.to_string().contains("schema.nme"));
        assert!(err.to_string().contains("permitted column groups"));
    }

    #[test]
    fn job_error_wraps_descriptor_error() {
        let err: TabulateError = DescriptorError::UnknownKey {
            key: "colour".to_string(),
        }
        .into();
        assert!(matches!(err, TabulateError::Descriptor(_)));
        assert_eq!(err.to_string(), "descriptor error: 'colour' is not a recognised key");
    }
}
