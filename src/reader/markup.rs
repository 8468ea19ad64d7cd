//! Element-tagged markup record reader.
//!
//! Each occurrence of the record-boundary element is one record. Every descendant element
//! contributes its text under two keys: its local name (the first element to open wins, so an
//! outer element shadows a nested one of the same name) and its path relative to the record,
//! joined with `/` (`Location/Latitude`). Elements absent from a record simply have no key, so
//! bindings resolve them to `""`.
//!
//! An element's text is the character data before its first child element, kept byte for byte:
//! no trimming or whitespace folding happens here.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{ReadError, ReadResult};
use crate::types::RawRecord;

use super::{ReaderStats, RecordReader};

/// Open descendant element: its local name and the text collected so far.
struct Open {
    name: String,
    text: String,
    /// This element owns the record's slot for `name`.
    claims_name: bool,
    /// A child element has opened; later text belongs to no key.
    has_child: bool,
}

impl Open {
    fn new(name: String, record: &RawRecord, ancestors: &[Open]) -> Self {
        let claims_name = record.get(&name).is_none()
            && !ancestors.iter().any(|o| o.claims_name && o.name == name);
        Self {
            name,
            text: String::new(),
            claims_name,
            has_child: false,
        }
    }
}

pub struct MarkupReader<R: BufRead> {
    reader: Reader<R>,
    record_element: String,
    buf: Vec<u8>,
    stats: ReaderStats,
}

impl<R: BufRead> MarkupReader<R> {
    /// Wrap a UTF-8 byte stream.
    pub fn new(input: R, record_element: impl Into<String>) -> Self {
        let reader = Reader::from_reader(input);
        Self {
            reader,
            record_element: record_element.into(),
            buf: Vec::new(),
            stats: ReaderStats::default(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ReadError {
        ReadError::Markup {
            position: self.reader.buffer_position() as u64,
            message: message.into(),
        }
    }

    /// Collect one record; the opening boundary tag has just been consumed.
    fn read_record(&mut self) -> ReadResult<RawRecord> {
        let mut record = RawRecord::new();
        let mut stack: Vec<Open> = Vec::new();

        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map(Event::into_owned)
                .map_err(|e| e.to_string());
            let event = match event {
                Ok(ev) => ev,
                Err(message) => return Err(self.error(message)),
            };

            match event {
                Event::Start(e) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.has_child = true;
                    }
                    let open = Open::new(local_name(e.local_name().as_ref()), &record, &stack);
                    stack.push(open);
                }
                Event::Empty(e) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.has_child = true;
                    }
                    let open = Open::new(local_name(e.local_name().as_ref()), &record, &stack);
                    insert_value(&mut record, &stack, open);
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| self.error(e.to_string()))?;
                    if let Some(top) = stack.last_mut().filter(|o| !o.has_child) {
                        top.text.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut().filter(|o| !o.has_child) {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::End(_) => match stack.pop() {
                    Some(open) => insert_value(&mut record, &stack, open),
                    None => return Ok(record),
                },
                Event::Eof => {
                    return Err(self.error(format!(
                        "input ended inside <{}>",
                        self.record_element
                    )));
                }
                _ => {}
            }
        }
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn insert_value(record: &mut RawRecord, ancestors: &[Open], open: Open) {
    if !ancestors.is_empty() {
        let mut path: Vec<&str> = ancestors.iter().map(|o| o.name.as_str()).collect();
        path.push(&open.name);
        record.insert_first(path.join("/"), open.text.clone());
    }
    if open.claims_name {
        record.insert_first(open.name, open.text);
    }
}

impl<R: BufRead> RecordReader for MarkupReader<R> {
    fn next_record(&mut self) -> ReadResult<Option<RawRecord>> {
        loop {
            self.buf.clear();
            let boundary = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => e.local_name().as_ref() == self.record_element.as_bytes(),
                Ok(Event::Empty(e)) => {
                    if e.local_name().as_ref() == self.record_element.as_bytes() {
                        self.stats.records += 1;
                        return Ok(Some(RawRecord::new()));
                    }
                    false
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => false,
                Err(e) => {
                    return Err(ReadError::Markup {
                        position: self.reader.buffer_position() as u64,
                        message: e.to_string(),
                    });
                }
            };
            if boundary {
                let record = self.read_record()?;
                self.stats.records += 1;
                return Ok(Some(record));
            }
        }
    }

    fn stats(&self) -> ReaderStats {
        self.stats
    }
}
