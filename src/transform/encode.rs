//! Output character encoding.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{EncoderResult, Encoding};
use serde::Deserialize;

/// Byte substituted for an unrepresentable character under [`EncodingErrorPolicy::Replace`].
pub const REPLACEMENT: u8 = b'?';

/// Character encoding of output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum OutputEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "cp1252", alias = "windows-1252")]
    Cp1252,
}

impl OutputEncoding {
    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Cp1252 => "cp1252",
        }
    }

    fn encoding(self) -> &'static Encoding {
        match self {
            Self::Utf8 => encoding_rs::UTF_8,
            Self::Cp1252 => encoding_rs::WINDOWS_1252,
        }
    }
}

impl FromStr for OutputEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "cp1252" | "windows-1252" => Ok(Self::Cp1252),
            other => Err(format!("unsupported output encoding '{other}' (expected utf-8 or cp1252)")),
        }
    }
}

impl fmt::Display for OutputEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What to do with a character the output encoding cannot represent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingErrorPolicy {
    /// Abort the dataset.
    #[default]
    Strict,
    /// Substitute [`REPLACEMENT`].
    Replace,
    /// Drop the character.
    Ignore,
}

impl FromStr for EncodingErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "replace" => Ok(Self::Replace),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!(
                "unknown encoding error policy '{other}' (expected strict, replace or ignore)"
            )),
        }
    }
}

impl fmt::Display for EncodingErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Replace => "replace",
            Self::Ignore => "ignore",
        })
    }
}

/// An encoded output value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded<'a> {
    pub bytes: Cow<'a, [u8]>,
    /// True if characters were replaced or dropped.
    pub lossy: bool,
}

/// `value` holds a character the target encoding cannot represent and the policy is strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unrepresentable;

/// Encode `value` for output under `policy`.
pub fn encode_value(
    value: &str,
    target: OutputEncoding,
    policy: EncodingErrorPolicy,
) -> Result<Encoded<'_>, Unrepresentable> {
    if target == OutputEncoding::Utf8 || value.is_ascii() {
        return Ok(Encoded {
            bytes: Cow::Borrowed(value.as_bytes()),
            lossy: false,
        });
    }

    let mut encoder = target.encoding().new_encoder();
    let capacity = encoder
        .max_buffer_length_from_utf8_without_replacement(value.len())
        .unwrap_or(value.len() * 4);
    let mut out = vec![0u8; capacity.max(1)];
    let mut written_total = 0;
    let mut src = value;
    let mut lossy = false;

    loop {
        let (result, read, written) =
            encoder.encode_from_utf8_without_replacement(src, &mut out[written_total..], true);
        written_total += written;
        src = &src[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => out.resize(out.len() * 2, 0),
            EncoderResult::Unmappable(_) => match policy {
                EncodingErrorPolicy::Strict => return Err(Unrepresentable),
                EncodingErrorPolicy::Replace => {
                    if written_total == out.len() {
                        out.resize(out.len() * 2, 0);
                    }
                    out[written_total] = REPLACEMENT;
                    written_total += 1;
                    lossy = true;
                }
                EncodingErrorPolicy::Ignore => lossy = true,
            },
        }
    }

    out.truncate(written_total);
    Ok(Encoded {
        bytes: Cow::Owned(out),
        lossy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through_borrowed() {
        let e = encode_value("Zoë ✓", OutputEncoding::Utf8, EncodingErrorPolicy::Strict).unwrap();
        assert!(matches!(e.bytes, Cow::Borrowed(_)));
        assert!(!e.lossy);
    }

    #[test]
    fn cp1252_maps_latin_characters() {
        let e = encode_value("café €5", OutputEncoding::Cp1252, EncodingErrorPolicy::Strict).unwrap();
        assert_eq!(&*e.bytes, b"caf\xe9 \x805");
    }

    #[test]
    fn unrepresentable_character_follows_policy() {
        let value = "a✓b";
        assert_eq!(
            encode_value(value, OutputEncoding::Cp1252, EncodingErrorPolicy::Strict),
            Err(Unrepresentable)
        );

        let replaced = encode_value(value, OutputEncoding::Cp1252, EncodingErrorPolicy::Replace).unwrap();
        assert_eq!(&*replaced.bytes, b"a?b");
        assert!(replaced.lossy);

        let ignored = encode_value(value, OutputEncoding::Cp1252, EncodingErrorPolicy::Ignore).unwrap();
        assert_eq!(&*ignored.bytes, b"ab");
        assert!(ignored.lossy);
    }

    #[test]
    fn labels_parse_with_aliases() {
        assert_eq!("UTF8".parse::<OutputEncoding>(), Ok(OutputEncoding::Utf8));
        assert_eq!("windows-1252".parse::<OutputEncoding>(), Ok(OutputEncoding::Cp1252));
        assert!("latin9".parse::<OutputEncoding>().is_err());
        assert_eq!("Replace".parse::<EncodingErrorPolicy>(), Ok(EncodingErrorPolicy::Replace));
    }
}
