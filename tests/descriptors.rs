use std::path::Path;

use rust_data_tabulate::config::{ColumnGroups, Config};
use rust_data_tabulate::descriptor::{Binding, Descriptor, FormatSpec, Segment};
use rust_data_tabulate::error::DescriptorError;

fn groups() -> ColumnGroups {
    Config::from_toml_str(
        r#"
        [labels]
        business = ["legal_name", "trade_name"]
        address = ["street_no", "street_name", "city", "postal_code"]
        "#,
    )
    .unwrap()
    .labels
}

#[test]
fn load_names_the_dataset_after_the_descriptor_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("springfield.json");
    std::fs::write(
        &path,
        r#"{
            "localfile": "springfield_businesses.csv",
            "url": "https://example.org/open-data/businesses.csv",
            "format": {"type": "csv", "delimiter": ";", "quote": "'"},
            "encoding": "windows-1252",
            "schema_groups": ["business", "address"],
            "schema": {
                "legal_name": "NAME",
                "address": {
                    "street_name": ["STREET_NO", "force:-", "STREET"],
                    "city": "force:Springfield"
                }
            },
            "filter": {"STATUS": "^Active$"},
            "provider": "City of Springfield",
            "licence": "OGL"
        }"#,
    )
    .unwrap();

    let d = Descriptor::load(&path, &groups()).unwrap();

    assert_eq!(d.name, "springfield");
    assert_eq!(
        d.format,
        FormatSpec::Delimited {
            delimiter: b';',
            quote: b'\''
        }
    );
    assert_eq!(d.encoding.map(|e| e.name()), Some("windows-1252"));
    assert_eq!(
        d.permitted_columns,
        vec!["legal_name", "trade_name", "street_no", "street_name", "city", "postal_code"]
    );
    assert_eq!(
        d.binding_for("street_name"),
        Some(&Binding::Concat(vec![
            Segment::Attribute("STREET_NO".to_string()),
            Segment::Literal("-".to_string()),
            Segment::Attribute("STREET".to_string()),
        ]))
    );
    assert_eq!(
        d.binding_for("city"),
        Some(&Binding::Literal("Springfield".to_string()))
    );
    assert_eq!(d.binding_for("trade_name"), None);
    assert_eq!(d.filter.rules().count(), 1);
    assert_eq!(d.licence.as_deref(), Some("OGL"));
    assert_eq!(d.output_file_name(), Path::new("springfield_businesses.csv"));
}

#[test]
fn markup_descriptor_carries_record_element() {
    let d = Descriptor::parse(
        br#"{"localfile": "stations.xml", "format": {"type": "xml", "header": "Station"},
             "schema_groups": "address", "schema": {"city": "Town"}}"#,
        &groups(),
    )
    .unwrap();

    assert_eq!(
        d.format,
        FormatSpec::Markup {
            record_element: "Station".to_string()
        }
    );
    assert_eq!(d.encoding, None);
    assert_eq!(d.schema_groups, vec!["address"]);
}

#[test]
fn every_rejection_names_the_offending_key() {
    let cases: [(&str, &str); 7] = [
        (
            r#"{"format": {"type": "csv", "delimiter": ",", "quote": "\""}, "schema": {"city": "C"}}"#,
            "localfile",
        ),
        (
            r#"{"localfile": "a.csv", "format": {"type": "csv", "quote": "\""}, "schema": {"city": "C"}}"#,
            "format.delimiter",
        ),
        (
            r#"{"localfile": "a.xml", "format": {"type": "xml"}, "schema": {"city": "C"}}"#,
            "format.header",
        ),
        (
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "schema": {"phone": "P"}}"#,
            "schema.phone",
        ),
        (
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "schema_groups": ["business"], "schema": {"city": "C"}}"#,
            "schema.city",
        ),
        (
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "schema": {"city": "C"}, "filter": {"STATUS": "(open"}}"#,
            "filter.STATUS",
        ),
        (
            r#"{"localfile": "a.csv", "format": {"type": "csv", "delimiter": ",", "quote": "\""},
                "schema": {"city": "C"}, "colour": "red"}"#,
            "colour",
        ),
    ];

    for (doc, key) in cases {
        let err = Descriptor::parse(doc.as_bytes(), &groups()).unwrap_err();
        assert_eq!(err.key(), Some(key), "{doc}");
        assert!(err.to_string().contains(key), "{err}");
    }
}

#[test]
fn missing_descriptor_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Descriptor::load(dir.path().join("absent.json"), &groups()).unwrap_err();
    assert!(matches!(err, DescriptorError::Io { .. }));
    assert_eq!(err.key(), None);
}

#[test]
fn malformed_json_is_rejected_before_validation() {
    let err = Descriptor::parse(b"{\"localfile\": ", &groups()).unwrap_err();
    assert!(matches!(err, DescriptorError::Json(_)));
}
