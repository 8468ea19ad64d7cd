//! Transform pipeline: raw records to output records.
//!
//! For every raw record the [`Pipeline`]:
//!
//! 1. evaluates the descriptor's filter (a record failing any rule is skipped, not an error)
//! 2. resolves each bound column (attribute copy, space-joined concatenation, literal)
//! 3. optionally sends the `parse_address` column to an [`AddressParser`] and spreads the
//!    returned components over the unbound address columns
//! 4. normalises whitespace and folds case
//!
//! [`Pipeline::encode`] then converts a finished record into output-encoded fields, and
//! [`OutputWriter`] streams those to a temporary file that is renamed into place on success.

pub mod address;
pub mod clean;
pub mod encode;
pub mod filter;
pub mod output;

use std::borrow::Cow;

use crate::descriptor::{Binding, Descriptor, Segment};
use crate::error::{RecordError, TabulateError, TabulateResult};
use crate::types::{OutputRecord, OutputSchema, RawRecord};

pub use address::{AddressComponent, AddressComponents, AddressParser};
pub use clean::CaseFold;
pub use encode::{EncodingErrorPolicy, OutputEncoding};
pub use output::OutputWriter;

/// Name of the optional leading row-number column.
pub const INDEX_COLUMN: &str = "idx";

/// Name of the trailing column carrying the descriptor's `provider`.
pub const PROVIDER_COLUMN: &str = "provider";

/// Output shaping options, uniform across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub clean_whitespace: bool,
    pub case: CaseFold,
    /// Prepend an `idx` column numbering emitted rows from 0.
    pub add_index: bool,
    /// Skip rows whose mapped values are all blank.
    pub drop_empty_rows: bool,
    pub output_encoding: OutputEncoding,
    pub encoding_errors: EncodingErrorPolicy,
}

/// What the pipeline decided for one raw record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Emit(OutputRecord),
    /// Failed a filter rule.
    Filtered,
    /// Every mapped value was blank and empty rows are dropped.
    Empty,
}

/// Source of one output column's value.
#[derive(Debug)]
enum Slot<'d> {
    Index,
    Provider(&'d str),
    Bound(&'d Binding),
    /// Filled from the address parser; blank otherwise.
    Component(AddressComponent),
    Unbound,
}

/// Per-dataset transform state. Single-threaded; one per job.
pub struct Pipeline<'a> {
    descriptor: &'a Descriptor,
    options: TransformOptions,
    schema: OutputSchema,
    slots: Vec<Slot<'a>>,
    address: Option<(&'a str, &'a dyn AddressParser)>,
    rows_seen: u64,
    rows_emitted: u64,
}

impl<'a> Pipeline<'a> {
    /// Build the output layout for `descriptor`.
    ///
    /// Fails with [`TabulateError::NoAddressParser`] if the descriptor asks for address parsing
    /// and `address_parser` is `None`.
    pub fn new(
        descriptor: &'a Descriptor,
        options: TransformOptions,
        address_parser: Option<&'a dyn AddressParser>,
    ) -> TabulateResult<Self> {
        let address = match (&descriptor.parse_address, address_parser) {
            (Some(column), Some(parser)) => Some((column.as_str(), parser)),
            (Some(_), None) => return Err(TabulateError::NoAddressParser),
            (None, _) => None,
        };

        let mut columns = Vec::with_capacity(descriptor.permitted_columns.len() + 2);
        let mut slots = Vec::with_capacity(columns.capacity());

        if options.add_index {
            columns.push(INDEX_COLUMN.to_string());
            slots.push(Slot::Index);
        }
        for column in &descriptor.permitted_columns {
            let slot = match descriptor.binding_for(column) {
                Some(binding) => Slot::Bound(binding),
                None => AddressComponent::ALL
                    .into_iter()
                    .find(|c| address.is_some() && c.column() == column.as_str())
                    .map_or(Slot::Unbound, Slot::Component),
            };
            columns.push(column.clone());
            slots.push(slot);
        }
        if let Some(provider) = &descriptor.provider {
            columns.push(PROVIDER_COLUMN.to_string());
            slots.push(Slot::Provider(provider));
        }

        Ok(Self {
            descriptor,
            options,
            schema: OutputSchema::new(columns),
            slots,
            address,
            rows_seen: 0,
            rows_emitted: 0,
        })
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    /// Raw records seen so far; also the 1-based number of the current record.
    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }

    /// Transform one raw record. Non-fatal per-record errors go to `on_error`.
    pub fn apply(&mut self, raw: &RawRecord, on_error: &mut dyn FnMut(RecordError)) -> Disposition {
        self.rows_seen += 1;

        if !filter::keep(&self.descriptor.filter, raw) {
            return Disposition::Filtered;
        }

        let mut values: Vec<String> = self
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Bound(binding) => resolve(binding, raw),
                Slot::Provider(p) => (*p).to_string(),
                Slot::Index | Slot::Component(_) | Slot::Unbound => String::new(),
            })
            .collect();

        if let Some((column, parser)) = self.address {
            self.parse_address(column, parser, &mut values, on_error);
        }

        for (slot, value) in self.slots.iter().zip(values.iter_mut()) {
            if !matches!(slot, Slot::Index) {
                self.post_process(value);
            }
        }

        if self.options.drop_empty_rows
            && self
                .slots
                .iter()
                .zip(&values)
                .all(|(slot, v)| matches!(slot, Slot::Index | Slot::Provider(_)) || v.is_empty())
        {
            return Disposition::Empty;
        }

        if self.options.add_index {
            if let Some(i) = self.slots.iter().position(|s| matches!(s, Slot::Index)) {
                values[i] = self.rows_emitted.to_string();
            }
        }
        self.rows_emitted += 1;

        Disposition::Emit(OutputRecord { values })
    }

    /// Encode a record's values for output.
    ///
    /// Under the strict policy an unrepresentable character is returned as an error and
    /// should abort the dataset; otherwise it is reported to `on_error` and replaced or dropped.
    pub fn encode<'r>(
        &self,
        record: &'r OutputRecord,
        on_error: &mut dyn FnMut(RecordError),
    ) -> Result<Vec<Cow<'r, [u8]>>, RecordError> {
        let mut fields = Vec::with_capacity(record.values.len());
        for (column, value) in self.schema.column_names().zip(&record.values) {
            let unencodable = || RecordError::Unencodable {
                row: self.rows_seen,
                column: column.to_string(),
                encoding: self.options.output_encoding.label(),
            };
            match encode::encode_value(value, self.options.output_encoding, self.options.encoding_errors) {
                Ok(encoded) => {
                    if encoded.lossy {
                        on_error(unencodable());
                    }
                    fields.push(encoded.bytes);
                }
                Err(encode::Unrepresentable) => return Err(unencodable()),
            }
        }
        Ok(fields)
    }

    fn parse_address(
        &self,
        column: &str,
        parser: &dyn AddressParser,
        values: &mut [String],
        on_error: &mut dyn FnMut(RecordError),
    ) {
        let Some(source_idx) = self.schema.index_of(column) else {
            return;
        };
        let address = values[source_idx].clone();
        if address.trim().is_empty() {
            return;
        }

        match parser.parse(&address) {
            Ok(parts) => {
                for (slot, value) in self.slots.iter().zip(values.iter_mut()) {
                    if let Slot::Component(component) = slot {
                        if let Some(v) = parts.get(*component) {
                            *value = v.to_string();
                        }
                    }
                }
            }
            Err(e) => on_error(RecordError::AddressParse {
                row: self.rows_seen,
                column: column.to_string(),
                message: e.message,
            }),
        }
    }

    fn post_process(&self, value: &mut String) {
        if self.options.clean_whitespace {
            if let Cow::Owned(cleaned) = clean::collapse_whitespace(value) {
                *value = cleaned;
            }
        }
        if self.options.case != CaseFold::None {
            *value = clean::fold_case(value, self.options.case).into_owned();
        }
    }
}

/// Resolve a binding against one raw record. Missing attributes resolve to `""`.
pub fn resolve(binding: &Binding, raw: &RawRecord) -> String {
    match binding {
        Binding::Attribute(a) => raw.value_or_empty(a).to_string(),
        Binding::Literal(l) => l.clone(),
        Binding::Concat(segments) => segments
            .iter()
            .map(|s| match s {
                Segment::Attribute(a) => raw.value_or_empty(a),
                Segment::Literal(l) => l.as_str(),
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnGroups;
    use crate::error::AddressParseError;

    fn groups() -> ColumnGroups {
        let mut g = ColumnGroups::new();
        g.insert(
            "address".to_string(),
            vec![
                "full_addr".to_string(),
                "street_no".to_string(),
                "street_name".to_string(),
                "city".to_string(),
            ],
        );
        g
    }

    fn descriptor(json: &str) -> Descriptor {
        Descriptor::parse(json.as_bytes(), &groups()).unwrap()
    }

    fn emit(p: &mut Pipeline<'_>, raw: &RawRecord) -> Vec<String> {
        match p.apply(raw, &mut |e| panic!("unexpected record error: {e}")) {
            Disposition::Emit(r) => r.values,
            other => panic!("expected a row, got {other:?}"),
        }
    }

    struct Stub;

    impl AddressParser for Stub {
        fn parse(&self, address: &str) -> Result<AddressComponents, AddressParseError> {
            match address.split_once(' ') {
                Some((no, street)) => Ok(AddressComponents::from_labelled([
                    ("house_number", no),
                    ("road", street),
                ])),
                None => Err(AddressParseError::new("no house number")),
            }
        }
    }

    #[test]
    fn layout_has_index_first_and_provider_last() {
        let d = descriptor(
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "schema": {"city": "CITY"}, "provider": "Springfield"}"#,
        );
        let options = TransformOptions {
            add_index: true,
            ..Default::default()
        };
        let mut p = Pipeline::new(&d, options, None).unwrap();
        assert_eq!(
            p.schema().columns,
            vec!["idx", "full_addr", "street_no", "street_name", "city", "provider"]
        );

        let raw: RawRecord = [("CITY", "Shelbyville")].into_iter().collect();
        assert_eq!(emit(&mut p, &raw), vec!["0", "", "", "", "Shelbyville", "Springfield"]);
        assert_eq!(emit(&mut p, &raw)[0], "1");
    }

    #[test]
    fn cleaning_and_case_apply_to_every_binding_kind() {
        let d = descriptor(
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "schema": {"street_name": ["NAME", "force:  avenue "], "city": "force:  north   haverbrook"}}"#,
        );
        let options = TransformOptions {
            clean_whitespace: true,
            case: CaseFold::Title,
            ..Default::default()
        };
        let mut p = Pipeline::new(&d, options, None).unwrap();
        let raw: RawRecord = [("NAME", " ELM\t")].into_iter().collect();
        let row = emit(&mut p, &raw);
        assert_eq!(row[p.schema().index_of("street_name").unwrap()], "Elm Avenue");
        assert_eq!(row[p.schema().index_of("city").unwrap()], "North Haverbrook");
    }

    #[test]
    fn empty_rows_are_dropped_only_when_asked() {
        let d = descriptor(
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "schema": {"city": "CITY"}, "provider": "P"}"#,
        );
        let raw = RawRecord::new();

        let mut keep = Pipeline::new(&d, TransformOptions::default(), None).unwrap();
        assert!(matches!(keep.apply(&raw, &mut |_| {}), Disposition::Emit(_)));

        let options = TransformOptions {
            drop_empty_rows: true,
            add_index: true,
            ..Default::default()
        };
        let mut drop = Pipeline::new(&d, options, None).unwrap();
        assert_eq!(drop.apply(&raw, &mut |_| {}), Disposition::Empty);
        let city: RawRecord = [("CITY", "x")].into_iter().collect();
        assert_eq!(emit(&mut drop, &city)[0], "0");
    }

    #[test]
    fn address_components_fill_unbound_columns() {
        let d = descriptor(
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "parse_address": "full_addr",
                "schema": {"full_addr": "ADDR", "city": "force:Springfield"}}"#,
        );
        let stub = Stub;
        let mut p = Pipeline::new(&d, TransformOptions::default(), Some(&stub)).unwrap();

        let raw: RawRecord = [("ADDR", "742 Evergreen Terrace")].into_iter().collect();
        assert_eq!(
            emit(&mut p, &raw),
            vec!["742 Evergreen Terrace", "742", "Evergreen Terrace", "Springfield"]
        );

        let mut errors = Vec::new();
        let raw: RawRecord = [("ADDR", "Nowhere")].into_iter().collect();
        let out = p.apply(&raw, &mut |e| errors.push(e));
        assert!(matches!(out, Disposition::Emit(_)));
        assert_eq!(
            errors,
            vec![RecordError::AddressParse {
                row: 2,
                column: "full_addr".to_string(),
                message: "no house number".to_string(),
            }]
        );
    }

    #[test]
    fn address_parsing_requires_a_parser() {
        let d = descriptor(
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "parse_address": "full_addr", "schema": {"full_addr": "ADDR"}}"#,
        );
        assert!(matches!(
            Pipeline::new(&d, TransformOptions::default(), None),
            Err(TabulateError::NoAddressParser)
        ));
    }

    #[test]
    fn encode_reports_lossy_fields() {
        let d = descriptor(
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "schema": {"city": "CITY"}}"#,
        );
        let raw: RawRecord = [("CITY", "Łódź")].into_iter().collect();

        let strict = TransformOptions {
            output_encoding: OutputEncoding::Cp1252,
            ..Default::default()
        };
        let mut p = Pipeline::new(&d, strict, None).unwrap();
        let Disposition::Emit(rec) = p.apply(&raw, &mut |_| {}) else {
            panic!("expected a row");
        };
        assert!(matches!(
            p.encode(&rec, &mut |_| {}),
            Err(RecordError::Unencodable { row: 1, .. })
        ));

        let replace = TransformOptions {
            encoding_errors: EncodingErrorPolicy::Replace,
            ..strict
        };
        let p = Pipeline::new(&d, replace, None).unwrap();
        let mut errors = Vec::new();
        let fields = p.encode(&rec, &mut |e| errors.push(e)).unwrap();
        assert_eq!(&*fields[3], b"?\xf3d?");
        assert_eq!(errors.len(), 1);
    }
}
