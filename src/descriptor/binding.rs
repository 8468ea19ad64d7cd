//! Output column bindings.

/// Prefix marking a literal value in a schema binding, e.g. `"force:Unknown"`.
pub const FORCE_PREFIX: &str = "force:";

/// One element of a concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Value of a source attribute (empty if the record lacks it).
    Attribute(String),
    /// Constant spliced in at this position.
    Literal(String),
}

impl Segment {
    /// Interpret a schema string: `force:` prefixed strings are literals.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(FORCE_PREFIX) {
            Some(literal) => Self::Literal(literal.to_string()),
            None => Self::Attribute(raw.to_string()),
        }
    }
}

/// How one output column gets its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Copy a single source attribute.
    Attribute(String),
    /// Join segments with a single space, in order.
    Concat(Vec<Segment>),
    /// Same constant on every row.
    Literal(String),
}

impl Binding {
    /// Binding for a single schema string.
    pub fn from_str_value(raw: &str) -> Self {
        match Segment::parse(raw) {
            Segment::Attribute(a) => Self::Attribute(a),
            Segment::Literal(l) => Self::Literal(l),
        }
    }

    /// Binding for a list of schema strings.
    pub fn from_list<'a>(items: impl IntoIterator<Item = &'a str>) -> Self {
        Self::Concat(items.into_iter().map(Segment::parse).collect())
    }

    /// Source attributes this binding reads.
    pub fn attributes(&self) -> Vec<&str> {
        match self {
            Self::Attribute(a) => vec![a.as_str()],
            Self::Literal(_) => Vec::new(),
            Self::Concat(segments) => segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Attribute(a) => Some(a.as_str()),
                    Segment::Literal(_) => None,
                })
                .collect(),
        }
    }
}

/// An output column paired with its binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub column: String,
    pub binding: Binding,
}
