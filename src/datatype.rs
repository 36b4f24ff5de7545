// used to print out readable forms of a data type
use std::fmt;
// used when parsing a kind from its textual name
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{CanopyError, Result};
use crate::validate;

/// Instants are whole seconds, as stored in `ValidFrom` and `ValidTo`.
pub type Instant = i64;

/// `ValidTo` of a value with no known expiry.
pub const END_OF_TIME: Instant = i32::MAX as Instant;

/// The current instant, used when no query instant is configured.
pub fn now() -> Instant {
    chrono::Utc::now().timestamp()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    PositiveInteger,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Text => "text",
            ValueKind::PositiveInteger => "positive_integer",
        }
    }
}
impl FromStr for ValueKind {
    type Err = CanopyError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(ValueKind::Text),
            "positive_integer" => Ok(ValueKind::PositiveInteger),
            other => Err(CanopyError::Validation(format!(
                "kind ({}) is not valid",
                other
            ))),
        }
    }
}
impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed leaf payload. Exactly one of the two value slots of a
/// `NodeValue` row is populated, matching the variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scalar {
    Text(String),
    PositiveInteger(i64),
}

impl Scalar {
    /// Builds a scalar of an explicit kind, rejecting integers that are not
    /// plain decimal digits.
    pub fn new(kind: ValueKind, raw: &str) -> Result<Self> {
        match kind {
            ValueKind::Text => Ok(Scalar::Text(raw.to_string())),
            ValueKind::PositiveInteger => {
                if !validate::is_digits(raw) {
                    return Err(CanopyError::Validation(format!(
                        "value ({}) is not a positive integer",
                        raw
                    )));
                }
                raw.parse::<i64>().map(Scalar::PositiveInteger).map_err(|e| {
                    CanopyError::Validation(format!("value ({}) is out of range: {}", raw, e))
                })
            }
        }
    }
    /// Classifies raw leaf text. Digit strings in canonical form (no leading
    /// zeros) that fit the integer column become positive integers, anything
    /// else stays text so that it reads back unchanged.
    pub fn classify(raw: &str) -> Self {
        if validate::is_canonical_digits(raw) {
            if let Ok(n) = raw.parse::<i64>() {
                return Scalar::PositiveInteger(n);
            }
        }
        Scalar::Text(raw.to_string())
    }
    pub fn kind(&self) -> ValueKind {
        match self {
            Scalar::Text(_) => ValueKind::Text,
            Scalar::PositiveInteger(_) => ValueKind::PositiveInteger,
        }
    }
    pub fn text_slot(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            Scalar::PositiveInteger(_) => None,
        }
    }
    pub fn int_slot(&self) -> Option<i64> {
        match self {
            Scalar::Text(_) => None,
            Scalar::PositiveInteger(n) => Some(*n),
        }
    }
    /// Rebuilds a scalar from the two value slots of a row; `None` when
    /// neither is populated.
    pub fn from_slots(text: Option<String>, int: Option<i64>) -> Option<Self> {
        match (text, int) {
            (Some(s), _) => Some(Scalar::Text(s)),
            (None, Some(n)) => Some(Scalar::PositiveInteger(n)),
            (None, None) => None,
        }
    }
}
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::PositiveInteger(n) => write!(f, "{}", n),
        }
    }
}
impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Scalar::Text(s) => serializer.serialize_str(s),
            Scalar::PositiveInteger(n) => serializer.serialize_i64(*n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(Scalar::classify("42"), Scalar::PositiveInteger(42));
        assert_eq!(Scalar::classify("0"), Scalar::PositiveInteger(0));
        assert_eq!(Scalar::classify("x1"), Scalar::Text("x1".into()));
        assert_eq!(Scalar::classify(""), Scalar::Text("".into()));
        assert_eq!(Scalar::classify("-3"), Scalar::Text("-3".into()));
        // leading zeros would not survive the integer column
        assert_eq!(Scalar::classify("007"), Scalar::Text("007".into()));
        assert_eq!(
            Scalar::classify("99999999999999999999"),
            Scalar::Text("99999999999999999999".into())
        );
    }

    #[test]
    fn explicit_kinds() {
        assert_eq!(
            Scalar::new(ValueKind::PositiveInteger, "007").unwrap(),
            Scalar::PositiveInteger(7)
        );
        assert!(Scalar::new(ValueKind::PositiveInteger, "7a").is_err());
        assert!("var_char".parse::<ValueKind>().is_err());
        assert_eq!("text".parse::<ValueKind>().unwrap(), ValueKind::Text);
    }

    #[test]
    fn slots() {
        let s = Scalar::PositiveInteger(5);
        assert_eq!(s.int_slot(), Some(5));
        assert_eq!(s.text_slot(), None);
        assert_eq!(Scalar::from_slots(None, None), None);
        assert_eq!(
            Scalar::from_slots(Some("a".into()), None),
            Some(Scalar::Text("a".into()))
        );
    }
}
