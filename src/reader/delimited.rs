//! Delimited-text record reader.

use std::io::Read;

use csv::StringRecord;

use crate::error::{ReadError, ReadResult};
use crate::types::RawRecord;

use super::{MalformedRowPolicy, ReaderStats, RecordReader};

/// Leading artifacts some producers put before the first header field.
const LEADING_ARTIFACTS: [char; 2] = ['\u{feff}', '\u{200b}'];

/// Reads delimited text whose first record is the attribute-name header.
///
/// Rows whose field count differs from the header are dropped and counted; they never
/// abort the dataset.
pub struct DelimitedReader<R: Read> {
    rdr: csv::Reader<R>,
    header: Vec<String>,
    record: StringRecord,
    policy: MalformedRowPolicy,
    stats: ReaderStats,
}

impl<R: Read> DelimitedReader<R> {
    /// Wrap a UTF-8 byte stream and consume its header record.
    pub fn new(input: R, delimiter: u8, quote: u8, policy: MalformedRowPolicy) -> ReadResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .quote(quote)
            .from_reader(input);

        let mut first = StringRecord::new();
        if !rdr.read_record(&mut first)? {
            return Err(ReadError::MissingHeader);
        }
        let mut header: Vec<String> = first.iter().map(str::to_string).collect();
        if let Some(h) = header.first_mut() {
            *h = h.trim_start_matches(LEADING_ARTIFACTS).to_string();
        }

        Ok(Self {
            rdr,
            header,
            record: StringRecord::new(),
            policy,
            stats: ReaderStats::default(),
        })
    }

    /// Attribute names from the header, artifacts stripped.
    pub fn header(&self) -> &[String] {
        &self.header
    }
}

impl<R: Read> RecordReader for DelimitedReader<R> {
    fn next_record(&mut self) -> ReadResult<Option<RawRecord>> {
        loop {
            if !self.rdr.read_record(&mut self.record)? {
                return Ok(None);
            }

            if self.record.len() != self.header.len() {
                self.stats.malformed_rows += 1;
                let line = self.record.position().map(|p| p.line()).unwrap_or_default();
                match self.policy {
                    MalformedRowPolicy::Warn => tracing::warn!(
                        line,
                        fields = self.record.len(),
                        expected = self.header.len(),
                        "dropping malformed row"
                    ),
                    MalformedRowPolicy::Count => tracing::trace!(line, "dropping malformed row"),
                }
                continue;
            }

            self.stats.records += 1;
            let mut raw = RawRecord::new();
            for (name, value) in self.header.iter().zip(self.record.iter()) {
                raw.insert_first(name.as_str(), value);
            }
            return Ok(Some(raw));
        }
    }

    fn stats(&self) -> ReaderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str, policy: MalformedRowPolicy) -> (Vec<RawRecord>, ReaderStats) {
        let mut r = DelimitedReader::new(input.as_bytes(), b',', b'"', policy).unwrap();
        let mut out = Vec::new();
        while let Some(rec) = r.next_record().unwrap() {
            out.push(rec);
        }
        (out, r.stats())
    }

    #[test]
    fn header_keys_each_record() {
        let (recs, stats) = read_all("NAME,CITY\nAcme,Springfield\n\"Bolt, Inc\",\n", MalformedRowPolicy::Warn);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].get("CITY"), Some("Springfield"));
        assert_eq!(recs[1].get("NAME"), Some("Bolt, Inc"));
        assert_eq!(recs[1].get("CITY"), Some(""));
        assert_eq!(stats.records, 2);
        assert_eq!(stats.malformed_rows, 0);
    }

    #[test]
    fn byte_order_mark_is_stripped_from_first_header_field() {
        let (recs, _) = read_all("\u{feff}NAME,CITY\nAcme,Springfield\n", MalformedRowPolicy::Warn);
        assert_eq!(recs[0].get("NAME"), Some("Acme"));

        let r = DelimitedReader::new("\u{200b}ID\n1\n".as_bytes(), b',', b'"', MalformedRowPolicy::Warn).unwrap();
        assert_eq!(r.header(), ["ID"]);
    }

    #[test]
    fn short_and_long_rows_are_dropped_and_counted() {
        let (recs, stats) = read_all(
            "A,B,C\n1,2,3\n4,5\n6,7,8,9\n10,11,12\n",
            MalformedRowPolicy::Count,
        );
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].get("A"), Some("10"));
        assert_eq!(stats.malformed_rows, 2);
    }

    #[test]
    fn custom_delimiter_and_quote() {
        let mut r = DelimitedReader::new("a;b\n'x;y';z\n".as_bytes(), b';', b'\'', MalformedRowPolicy::Warn).unwrap();
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.get("a"), Some("x;y"));
        assert_eq!(rec.get("b"), Some("z"));
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = DelimitedReader::new(&b""[..], b',', b'"', MalformedRowPolicy::Warn).err().unwrap();
        assert!(matches!(err, ReadError::MissingHeader));
    }
}
