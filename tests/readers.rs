use std::path::Path;

use rust_data_tabulate::config::ColumnGroups;
use rust_data_tabulate::descriptor::Descriptor;
use rust_data_tabulate::error::ReadError;
use rust_data_tabulate::reader::{
    CandidateEncodings, MalformedRowPolicy, ReaderOptions, RecordReader, open_reader,
};
use rust_data_tabulate::types::RawRecord;

fn groups() -> ColumnGroups {
    let mut g = ColumnGroups::new();
    g.insert(
        "business".to_string(),
        vec!["name".to_string(), "city".to_string(), "latitude".to_string()],
    );
    g
}

fn csv_descriptor(localfile: &str, extra: &str) -> Descriptor {
    let doc = format!(
        r#"{{"localfile": "{localfile}", "format": {{"type": "csv", "delimiter": ",", "quote": "\""}},
            "schema": {{"name": "NAME"}}{extra}}}"#
    );
    Descriptor::parse(doc.as_bytes(), &groups()).unwrap()
}

fn drain(reader: &mut dyn RecordReader) -> Vec<RawRecord> {
    let mut out = Vec::new();
    while let Some(r) = reader.next_record().unwrap() {
        out.push(r);
    }
    out
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn windows_1252_input_is_detected_and_decoded() {
    let dir = tempfile::tempdir().unwrap();
    // "Caf\xe9" is not valid UTF-8.
    let path = write(dir.path(), "shops.csv", b"NAME,CITY\nCaf\xe9 Rouge,Qu\xe9bec\n");
    let d = csv_descriptor("shops.csv", "");

    let mut reader = open_reader(&d, &path, &ReaderOptions::default()).unwrap();
    let records = drain(reader.as_mut());

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("NAME"), Some("Café Rouge"));
    assert_eq!(records[0].get("CITY"), Some("Québec"));
}

#[test]
fn declared_encoding_skips_detection() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "shops.csv", b"NAME\nZ\xfcrich\n");
    let d = csv_descriptor("shops.csv", r#", "encoding": "latin1""#);
    let options = ReaderOptions {
        candidates: CandidateEncodings::from_labels(&["utf-8"]).unwrap(),
        ..Default::default()
    };

    let mut reader = open_reader(&d, &path, &options).unwrap();
    assert_eq!(drain(reader.as_mut())[0].get("NAME"), Some("Zürich"));
}

#[test]
fn input_no_candidate_can_decode_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "shops.csv", b"NAME\n\xff\xfe\xfd\n");
    let d = csv_descriptor("shops.csv", "");
    let options = ReaderOptions {
        candidates: CandidateEncodings::from_labels(&["utf-8"]).unwrap(),
        ..Default::default()
    };

    let err = open_reader(&d, &path, &options).err().unwrap();
    match err {
        ReadError::Undecodable { tried, .. } => assert_eq!(tried, "UTF-8"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn byte_order_mark_does_not_leak_into_the_first_attribute() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "shops.csv", "\u{feff}NAME,CITY\nAcme,Springfield\n".as_bytes());
    let d = csv_descriptor("shops.csv", "");

    let mut reader = open_reader(&d, &path, &ReaderOptions::default()).unwrap();
    let records = drain(reader.as_mut());
    assert_eq!(records[0].get("NAME"), Some("Acme"));
}

#[test]
fn rows_with_wrong_field_count_are_dropped_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "shops.csv",
        b"NAME,CITY\nAcme,Springfield\nBroken\nBolt,Shelbyville\nToo,many,fields\n",
    );
    let d = csv_descriptor("shops.csv", "");

    for policy in [MalformedRowPolicy::Warn, MalformedRowPolicy::Count] {
        let options = ReaderOptions {
            malformed_rows: policy,
            ..Default::default()
        };
        let mut reader = open_reader(&d, &path, &options).unwrap();
        let records = drain(reader.as_mut());

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("NAME"), Some("Bolt"));
        assert_eq!(reader.stats().malformed_rows, 2);
        assert_eq!(reader.stats().records, 2);
    }
}

#[test]
fn quoted_fields_keep_embedded_delimiters_and_newlines() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "shops.csv",
        b"NAME,CITY\n\"Acme, Inc.\",\"Spring\nfield\"\n",
    );
    let d = csv_descriptor("shops.csv", "");

    let mut reader = open_reader(&d, &path, &ReaderOptions::default()).unwrap();
    let records = drain(reader.as_mut());
    assert_eq!(records[0].get("NAME"), Some("Acme, Inc."));
    assert_eq!(records[0].get("CITY"), Some("Spring\nfield"));
}

#[test]
fn markup_file_yields_one_record_per_boundary_element() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "stations.xml",
        br#"<?xml version="1.0" encoding="UTF-8"?>
<Stations>
  <Station><Name>North</Name><Location><Latitude>45.1</Latitude></Location></Station>
  <Station><Name>South</Name><Location/></Station>
  <Note>not a record</Note>
</Stations>"#,
    );
    let d = Descriptor::parse(
        br#"{"localfile": "stations.xml", "format": {"type": "xml", "header": "Station"},
             "schema": {"name": "Name", "latitude": "Latitude"}}"#,
        &groups(),
    )
    .unwrap();

    let mut reader = open_reader(&d, &path, &ReaderOptions::default()).unwrap();
    let records = drain(reader.as_mut());

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("Location/Latitude"), Some("45.1"));
    assert_eq!(records[1].get("Latitude"), None);
    assert_eq!(reader.stats().records, 2);
}

#[test]
fn truncated_markup_file_fails_the_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "stations.xml", b"<Stations><Station><Name>North</Name>");
    let d = Descriptor::parse(
        br#"{"localfile": "stations.xml", "format": {"type": "xml", "header": "Station"},
             "schema": {"name": "Name"}}"#,
        &groups(),
    )
    .unwrap();

    let mut reader = open_reader(&d, &path, &ReaderOptions::default()).unwrap();
    assert!(matches!(reader.next_record(), Err(ReadError::Markup { .. })));
}
