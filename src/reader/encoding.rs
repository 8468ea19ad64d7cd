//! Input character encoding detection and decoding.
//!
//! When a descriptor does not declare an encoding, [`CandidateEncodings::detect`] decodes the
//! whole input once with each candidate in order and picks the first one that produces no
//! invalid sequence. This is a heuristic, not a guarantee: single-byte encodings such as
//! windows-1252 accept almost any byte sequence, so text in some other single-byte encoding
//! will "decode" as whichever such candidate comes first. Put strict encodings (UTF-8) first.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use encoding_rs::{Decoder, DecoderResult, Encoding};

use crate::error::{ReadError, ReadResult};

const CHUNK: usize = 8192;

/// Ordered, finite list of encodings tried when none is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEncodings {
    encodings: Vec<&'static Encoding>,
}

impl CandidateEncodings {
    /// Labels of the default candidates.
    pub const DEFAULT_LABELS: [&'static str; 2] = ["utf-8", "cp1252"];

    /// Build from WHATWG encoding labels. Returns the first unknown label on failure.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, String> {
        let mut encodings = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            let enc = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| label.to_string())?;
            if !encodings.contains(&enc) {
                encodings.push(enc);
            }
        }
        Ok(Self { encodings })
    }

    pub fn new(encodings: Vec<&'static Encoding>) -> Self {
        Self { encodings }
    }

    pub fn encodings(&self) -> &[&'static Encoding] {
        &self.encodings
    }

    /// Pick the first candidate that decodes the whole file without errors.
    pub fn detect(&self, path: &Path) -> ReadResult<&'static Encoding> {
        for &encoding in &self.encodings {
            let file = File::open(path).map_err(|source| ReadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let clean = decodes_cleanly(encoding, BufReader::new(file)).map_err(|source| ReadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if clean {
                tracing::debug!(path = %path.display(), encoding = encoding.name(), "detected input encoding");
                return Ok(encoding);
            }
            tracing::debug!(path = %path.display(), encoding = encoding.name(), "candidate encoding rejected");
        }
        Err(ReadError::Undecodable {
            path: path.to_path_buf(),
            tried: self
                .encodings
                .iter()
                .map(|e| e.name())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

impl Default for CandidateEncodings {
    fn default() -> Self {
        Self {
            encodings: vec![encoding_rs::UTF_8, encoding_rs::WINDOWS_1252],
        }
    }
}

/// True if `input` decodes under `encoding` with no malformed sequence.
pub fn decodes_cleanly(encoding: &'static Encoding, mut input: impl Read) -> io::Result<bool> {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let mut buf = [0u8; CHUNK];
    let mut out = vec![0u8; CHUNK * 4];
    loop {
        let n = input.read(&mut buf)?;
        let last = n == 0;
        let mut src = &buf[..n];
        loop {
            let (result, read, _) = decoder.decode_to_utf8_without_replacement(src, &mut out, last);
            src = &src[read..];
            match result {
                DecoderResult::InputEmpty => break,
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(_, _) => return Ok(false),
            }
        }
        if last {
            return Ok(true);
        }
    }
}

/// Adapts a byte stream in some encoding into a UTF-8 byte stream.
///
/// Malformed input surfaces as an [`io::ErrorKind::InvalidData`] error. Byte-order marks are
/// passed through as U+FEFF; readers strip them where they matter.
pub struct DecodingReader<R> {
    inner: R,
    encoding: &'static Encoding,
    decoder: Decoder,
    input: Box<[u8]>,
    in_start: usize,
    in_end: usize,
    eof: bool,
    output: Box<[u8]>,
    out_start: usize,
    out_end: usize,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            decoder: encoding.new_decoder_without_bom_handling(),
            input: vec![0u8; CHUNK].into_boxed_slice(),
            in_start: 0,
            in_end: 0,
            eof: false,
            output: vec![0u8; CHUNK * 4].into_boxed_slice(),
            out_start: 0,
            out_end: 0,
            finished: false,
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.out_start < self.out_end {
                let n = buf.len().min(self.out_end - self.out_start);
                buf[..n].copy_from_slice(&self.output[self.out_start..self.out_start + n]);
                self.out_start += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            if self.in_start == self.in_end && !self.eof {
                let n = self.inner.read(&mut self.input)?;
                self.in_start = 0;
                self.in_end = n;
                self.eof = n == 0;
            }

            let (result, read, written) = self.decoder.decode_to_utf8_without_replacement(
                &self.input[self.in_start..self.in_end],
                &mut self.output,
                self.eof,
            );
            self.in_start += read;
            self.out_start = 0;
            self.out_end = written;

            match result {
                DecoderResult::Malformed(_, _) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid {} byte sequence", self.encoding.name()),
                    ));
                }
                DecoderResult::InputEmpty if self.eof => self.finished = true,
                DecoderResult::InputEmpty | DecoderResult::OutputFull => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_labels_resolve_to_defaults() {
        let c = CandidateEncodings::from_labels(&CandidateEncodings::DEFAULT_LABELS).unwrap();
        assert_eq!(c, CandidateEncodings::default());
    }

    #[test]
    fn unknown_label_is_reported() {
        assert_eq!(
            CandidateEncodings::from_labels(&["utf-8", "klingon"]).unwrap_err(),
            "klingon"
        );
    }

    #[test]
    fn latin1_bytes_are_not_clean_utf8() {
        let bytes = b"caf\xe9";
        assert!(!decodes_cleanly(encoding_rs::UTF_8, &bytes[..]).unwrap());
        assert!(decodes_cleanly(encoding_rs::WINDOWS_1252, &bytes[..]).unwrap());
    }

    #[test]
    fn decoding_reader_transcodes_to_utf8() {
        let mut out = String::new();
        DecodingReader::new(&b"caf\xe9 cr\xe8me"[..], encoding_rs::WINDOWS_1252)
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "café crème");
    }

    #[test]
    fn decoding_reader_rejects_malformed_input() {
        let mut out = String::new();
        let err = DecodingReader::new(&b"ok \xff"[..], encoding_rs::UTF_8)
            .read_to_string(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn detect_falls_back_to_later_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, b"NAME\nZo\xeb\n").unwrap();
        let enc = CandidateEncodings::default().detect(&path).unwrap();
        assert_eq!(enc, encoding_rs::WINDOWS_1252);

        let strict = CandidateEncodings::new(vec![encoding_rs::UTF_8]);
        assert!(matches!(
            strict.detect(&path),
            Err(ReadError::Undecodable { .. })
        ));
    }
}
