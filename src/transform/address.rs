//! Address-parsing collaborator.
//!
//! The engine never tokenises addresses itself. A descriptor's `parse_address` column is sent
//! to an [`AddressParser`] and the labelled components it returns fill the address component
//! columns (`street_no`, `street_name`, `unit`, `city`, `region`, `country`, `postal_code`).

use std::sync::Mutex;
#[cfg(feature = "remote")]
use std::time::Duration;

use crate::error::AddressParseError;

/// One labelled part of an address, named after its output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressComponent {
    Unit,
    StreetNo,
    StreetName,
    City,
    Region,
    Country,
    PostalCode,
}

impl AddressComponent {
    pub const ALL: [AddressComponent; 7] = [
        Self::Unit,
        Self::StreetNo,
        Self::StreetName,
        Self::City,
        Self::Region,
        Self::Country,
        Self::PostalCode,
    ];

    /// Output column this component fills.
    pub fn column(self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::StreetNo => "street_no",
            Self::StreetName => "street_name",
            Self::City => "city",
            Self::Region => "region",
            Self::Country => "country",
            Self::PostalCode => "postal_code",
        }
    }

    /// Map a libpostal-style label (`house_number`, `road`, `state`, ...) to a component.
    pub fn from_parser_label(label: &str) -> Option<Self> {
        match label {
            "unit" => Some(Self::Unit),
            "house_number" => Some(Self::StreetNo),
            "road" => Some(Self::StreetName),
            "city" => Some(Self::City),
            "state" => Some(Self::Region),
            "country" => Some(Self::Country),
            "postcode" | "postal_code" => Some(Self::PostalCode),
            _ => None,
        }
    }
}

/// Structured result of one parse call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressComponents {
    parts: Vec<(AddressComponent, String)>,
}

impl AddressComponents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a component. A repeated component is appended with a space.
    pub fn push(&mut self, component: AddressComponent, value: impl AsRef<str>) {
        let value = value.as_ref();
        if let Some((_, existing)) = self.parts.iter_mut().find(|(c, _)| *c == component) {
            existing.push(' ');
            existing.push_str(value);
        } else {
            self.parts.push((component, value.to_string()));
        }
    }

    /// Build from parser labels; unknown labels are skipped.
    pub fn from_labelled<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut out = Self::new();
        for (label, value) in pairs {
            if let Some(component) = AddressComponent::from_parser_label(label) {
                out.push(component, value);
            }
        }
        out
    }

    pub fn get(&self, component: AddressComponent) -> Option<&str> {
        self.parts
            .iter()
            .find(|(c, _)| *c == component)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (AddressComponent, &str)> {
        self.parts.iter().map(|(c, v)| (*c, v.as_str()))
    }
}

/// Parses one free-form address into labelled components.
pub trait AddressParser: Send + Sync {
    fn parse(&self, address: &str) -> Result<AddressComponents, AddressParseError>;
}

impl<P: AddressParser + ?Sized> AddressParser for std::sync::Arc<P> {
    fn parse(&self, address: &str) -> Result<AddressComponents, AddressParseError> {
        (**self).parse(address)
    }
}

/// Serialises calls into a parser that must not be used concurrently.
pub struct Serialized<P> {
    inner: Mutex<P>,
}

impl<P> Serialized<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

impl<P: AddressParser> AddressParser for Serialized<P> {
    fn parse(&self, address: &str) -> Result<AddressComponents, AddressParseError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| AddressParseError::new("address parser lock poisoned"))?;
        guard.parse(address)
    }
}

/// Retries failed calls up to `attempts` times in total.
pub struct Retrying<P> {
    inner: P,
    attempts: usize,
}

impl<P> Retrying<P> {
    pub fn new(inner: P, attempts: usize) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
        }
    }
}

impl<P: AddressParser> AddressParser for Retrying<P> {
    fn parse(&self, address: &str) -> Result<AddressComponents, AddressParseError> {
        let mut last = None;
        for attempt in 1..=self.attempts {
            match self.inner.parse(address) {
                Ok(parts) => return Ok(parts),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "address parse attempt failed");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| AddressParseError::new("no attempt made")))
    }
}

/// Client for a libpostal-style HTTP service.
///
/// Sends `GET {endpoint}?address=...` and expects `[{"label": "...", "value": "..."}, ...]`.
#[cfg(feature = "remote")]
pub struct HttpAddressParser {
    client: reqwest::blocking::Client,
    endpoint: String,
}

#[cfg(feature = "remote")]
#[derive(serde::Deserialize)]
struct LabelledPart {
    label: String,
    value: String,
}

#[cfg(feature = "remote")]
impl HttpAddressParser {
    const TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(endpoint: impl Into<String>) -> Result<Self, AddressParseError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| AddressParseError::new(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[cfg(feature = "remote")]
impl AddressParser for HttpAddressParser {
    fn parse(&self, address: &str) -> Result<AddressComponents, AddressParseError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address)])
            .send()
            .map_err(|e| AddressParseError::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AddressParseError::new(format!("parser service returned {status}")));
        }

        let parts: Vec<LabelledPart> = response
            .json()
            .map_err(|e| AddressParseError::new(e.to_string()))?;
        Ok(AddressComponents::from_labelled(
            parts.iter().map(|p| (p.label.as_str(), p.value.as_str())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Flaky {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl AddressParser for Flaky {
        fn parse(&self, _address: &str) -> Result<AddressComponents, AddressParseError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(AddressParseError::new("busy"))
            } else {
                Ok(AddressComponents::from_labelled([("road", "main st")]))
            }
        }
    }

    #[test]
    fn labels_map_to_columns() {
        let parts = AddressComponents::from_labelled([
            ("house_number", "12"),
            ("road", "main st"),
            ("state", "il"),
            ("postcode", "62701"),
            ("suburb", "downtown"),
        ]);
        assert_eq!(parts.get(AddressComponent::StreetNo), Some("12"));
        assert_eq!(parts.get(AddressComponent::Region), Some("il"));
        assert_eq!(parts.get(AddressComponent::PostalCode), Some("62701"));
        assert_eq!(parts.iter().count(), 4);
        assert_eq!(AddressComponent::StreetName.column(), "street_name");
    }

    #[test]
    fn repeated_label_is_joined() {
        let parts = AddressComponents::from_labelled([("unit", "apt"), ("unit", "4")]);
        assert_eq!(parts.get(AddressComponent::Unit), Some("apt 4"));
    }

    #[test]
    fn retrying_gives_up_after_attempts() {
        let ok = Retrying::new(Flaky { calls: AtomicUsize::new(0), fail_first: 2 }, 3);
        assert!(ok.parse("x").is_ok());

        let flaky = Flaky { calls: AtomicUsize::new(0), fail_first: 5 };
        let failing = Retrying::new(flaky, 2);
        assert_eq!(failing.parse("x"), Err(AddressParseError::new("busy")));
        assert_eq!(failing.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn serialized_parser_delegates() {
        let p = Serialized::new(Flaky { calls: AtomicUsize::new(0), fail_first: 0 });
        assert_eq!(
            p.parse("12 main st").unwrap().get(AddressComponent::StreetName),
            Some("main st")
        );
    }
}
