//! Record filtering.

use crate::descriptor::FilterSpec;
use crate::types::RawRecord;

/// Returns `true` if `record` passes every rule of `filter`.
///
/// A rule matches when its pattern is found anywhere in the attribute's raw value. A missing
/// attribute is tested as `""`. An empty filter keeps every record.
pub fn keep(filter: &FilterSpec, record: &RawRecord) -> bool {
    filter
        .rules()
        .all(|(attribute, pattern)| pattern.is_match(record.value_or_empty(attribute)))
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::keep;
    use crate::descriptor::FilterSpec;
    use crate::types::RawRecord;

    fn filter(rules: &[(&str, &str)]) -> FilterSpec {
        FilterSpec::new(
            rules
                .iter()
                .map(|(a, p)| (a.to_string(), Regex::new(p).unwrap()))
                .collect(),
        )
    }

    #[test]
    fn empty_filter_keeps_everything() {
        assert!(keep(&FilterSpec::default(), &RawRecord::new()));
    }

    #[test]
    fn all_rules_must_match() {
        let f = filter(&[("STATUS", "^Active$"), ("TYPE", "Retail")]);

        let both: RawRecord = [("STATUS", "Active"), ("TYPE", "Retail store")].into_iter().collect();
        let one: RawRecord = [("STATUS", "Active"), ("TYPE", "Wholesale")].into_iter().collect();

        assert!(keep(&f, &both));
        assert!(!keep(&f, &one));
    }

    #[test]
    fn missing_attribute_is_tested_as_empty() {
        assert!(keep(&filter(&[("NOTE", "^$")]), &RawRecord::new()));
        assert!(!keep(&filter(&[("NOTE", ".")]), &RawRecord::new()));
    }
}
