//! Whitespace normalisation and case folding.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Case folding applied to every output value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseFold {
    #[default]
    None,
    Lower,
    /// First letter of every word upper case, the rest lower case.
    Title,
    Upper,
}

impl FromStr for CaseFold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lower" => Ok(Self::Lower),
            "title" => Ok(Self::Title),
            "upper" => Ok(Self::Upper),
            other => Err(format!("unknown case fold '{other}'")),
        }
    }
}

impl fmt::Display for CaseFold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Lower => "lower",
            Self::Title => "title",
            Self::Upper => "upper",
        })
    }
}

/// Collapse runs of whitespace to one space and trim both ends.
pub fn collapse_whitespace(value: &str) -> Cow<'_, str> {
    let mut prev_space = true;
    let needs_work = value.chars().any(|c| {
        let bad = c.is_whitespace() && (prev_space || c != ' ');
        prev_space = c.is_whitespace();
        bad
    }) || value.ends_with(char::is_whitespace);
    if !needs_work {
        return Cow::Borrowed(value);
    }
    Cow::Owned(value.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Apply `fold` to `value`.
pub fn fold_case(value: &str, fold: CaseFold) -> Cow<'_, str> {
    match fold {
        CaseFold::None => Cow::Borrowed(value),
        CaseFold::Lower => Cow::Owned(value.to_lowercase()),
        CaseFold::Upper => Cow::Owned(value.to_uppercase()),
        CaseFold::Title => Cow::Owned(title_case(value)),
    }
}

/// Word starts are letters that follow a non-letter.
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
