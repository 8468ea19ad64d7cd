//! Record readers.
//!
//! A reader is a lazy producer of [`RawRecord`]s for one input file. Readers are not seekable
//! and not shared: every job opens a fresh one through a [`ReaderFactory`].
//!
//! Format-specific implementations:
//! - [`delimited`]
//! - [`markup`]

pub mod delimited;
pub mod encoding;
pub mod markup;

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::descriptor::{Descriptor, FormatSpec};
use crate::error::{ReadError, ReadResult};
use crate::types::RawRecord;

pub use delimited::DelimitedReader;
pub use encoding::{CandidateEncodings, DecodingReader};
pub use markup::MarkupReader;

/// Counters a reader keeps while streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Records produced.
    pub records: u64,
    /// Rows dropped for not matching the header's structure.
    pub malformed_rows: u64,
}

/// How dropped malformed rows are reported. They are counted either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRowPolicy {
    /// Log a warning per dropped row.
    #[default]
    Warn,
    /// Only count; the job summary carries the total.
    Count,
}

impl FromStr for MalformedRowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "count" => Ok(Self::Count),
            other => Err(format!("unknown malformed row policy '{other}' (expected warn or count)")),
        }
    }
}

impl fmt::Display for MalformedRowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warn => "warn",
            Self::Count => "count",
        })
    }
}

/// Options shared by all readers of a run.
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Tried in order when a descriptor declares no encoding.
    pub candidates: CandidateEncodings,
    pub malformed_rows: MalformedRowPolicy,
}

/// A lazy, forward-only record source.
pub trait RecordReader {
    /// Next record, `Ok(None)` at end of input. An error is fatal for the dataset.
    fn next_record(&mut self) -> ReadResult<Option<RawRecord>>;

    /// Counters so far.
    fn stats(&self) -> ReaderStats;
}

/// Opens a reader for a descriptor's input file.
///
/// The coordinator only talks to this trait, so tests can observe or replace reader creation.
pub trait ReaderFactory: Send + Sync {
    fn open(
        &self,
        descriptor: &Descriptor,
        path: &Path,
        options: &ReaderOptions,
    ) -> ReadResult<Box<dyn RecordReader>>;
}

/// Opens readers on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileReaderFactory;

impl ReaderFactory for FileReaderFactory {
    fn open(
        &self,
        descriptor: &Descriptor,
        path: &Path,
        options: &ReaderOptions,
    ) -> ReadResult<Box<dyn RecordReader>> {
        open_reader(descriptor, path, options)
    }
}

/// Open `path` according to the descriptor's format and encoding.
pub fn open_reader(
    descriptor: &Descriptor,
    path: &Path,
    options: &ReaderOptions,
) -> ReadResult<Box<dyn RecordReader>> {
    let encoding = match descriptor.encoding {
        Some(enc) => enc,
        None => options.candidates.detect(path)?,
    };
    let file = File::open(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let input = DecodingReader::new(BufReader::new(file), encoding);

    tracing::debug!(
        path = %path.display(),
        format = descriptor.format.tag(),
        encoding = encoding.name(),
        "opening reader"
    );

    Ok(match &descriptor.format {
        FormatSpec::Delimited { delimiter, quote } => Box::new(DelimitedReader::new(
            input,
            *delimiter,
            *quote,
            options.malformed_rows,
        )?),
        FormatSpec::Markup { record_element } => {
            Box::new(MarkupReader::new(BufReader::new(input), record_element.clone()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnGroups;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("COUNT".parse::<MalformedRowPolicy>(), Ok(MalformedRowPolicy::Count));
        assert!("silent".parse::<MalformedRowPolicy>().is_err());
    }

    #[test]
    fn opens_cp1252_input_by_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shops.csv");
        std::fs::write(&path, b"NAME;CITY\nCaf\xe9;Montr\xe9al\n").unwrap();

        let mut groups = ColumnGroups::new();
        groups.insert("g".to_string(), vec!["name".to_string()]);
        let d = Descriptor::parse(
            br#"{"localfile": "shops.csv", "format": {"type": "csv", "delimiter": ";", "quote": "\""},
                 "schema": {"name": "NAME"}}"#,
            &groups,
        )
        .unwrap();

        let mut r = FileReaderFactory.open(&d, &path, &ReaderOptions::default()).unwrap();
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.get("NAME"), Some("Café"));
        assert_eq!(rec.get("CITY"), Some("Montréal"));
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn declared_encoding_skips_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shops.xml");
        std::fs::write(&path, b"<r><Shop><Name>Caf\xe9</Name></Shop></r>").unwrap();

        let mut groups = ColumnGroups::new();
        groups.insert("g".to_string(), vec!["name".to_string()]);
        let d = Descriptor::parse(
            br#"{"localfile": "shops.xml", "encoding": "latin1",
                 "format": {"type": "xml", "header": "Shop"}, "schema": {"name": "Name"}}"#,
            &groups,
        )
        .unwrap();

        let options = ReaderOptions {
            candidates: CandidateEncodings::new(vec![encoding_rs::UTF_8]),
            ..Default::default()
        };
        let mut r = open_reader(&d, &path, &options).unwrap();
        assert_eq!(r.next_record().unwrap().unwrap().get("Name"), Some("Café"));
    }
}
