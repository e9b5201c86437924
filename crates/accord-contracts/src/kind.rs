use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ContractError;

/// JSON shape a generated value takes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    String,
    Number,
    Integer,
    Boolean,
}

/// Named value generators ("any alphanumeric string", "any uuid", ...). The stub side produces
/// a fresh value satisfying the kind; the verification side checks shape and pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GeneratedKind {
    AlphaUnicode,
    AlphaNumeric,
    Number,
    Integer,
    PositiveInt,
    Double,
    Hex,
    Boolean,
    Uuid,
    Email,
    Url,
    HttpsUrl,
    IpAddress,
    Hostname,
    NonBlankString,
    NonEmptyString,
    Date,
    DateTime,
    Time,
    Iso8601WithOffset,
}

const DATE: &str = r"(\d\d\d\d)-(0[1-9]|1[012])-(0[1-9]|[12][0-9]|3[01])";
const TIME: &str = r"(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])";

static KIND_REGEXES: Lazy<HashMap<GeneratedKind, Regex>> = Lazy::new(|| {
    GeneratedKind::ALL
        .iter()
        .map(|kind| {
            let anchored = format!("^(?:{})$", kind.pattern());
            (*kind, Regex::new(&anchored).expect("generated kind regex"))
        })
        .collect()
});

impl GeneratedKind {
    pub const ALL: [GeneratedKind; 20] = [
        GeneratedKind::AlphaUnicode,
        GeneratedKind::AlphaNumeric,
        GeneratedKind::Number,
        GeneratedKind::Integer,
        GeneratedKind::PositiveInt,
        GeneratedKind::Double,
        GeneratedKind::Hex,
        GeneratedKind::Boolean,
        GeneratedKind::Uuid,
        GeneratedKind::Email,
        GeneratedKind::Url,
        GeneratedKind::HttpsUrl,
        GeneratedKind::IpAddress,
        GeneratedKind::Hostname,
        GeneratedKind::NonBlankString,
        GeneratedKind::NonEmptyString,
        GeneratedKind::Date,
        GeneratedKind::DateTime,
        GeneratedKind::Time,
        GeneratedKind::Iso8601WithOffset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratedKind::AlphaUnicode => "anyAlphaUnicode",
            GeneratedKind::AlphaNumeric => "anyAlphaNumeric",
            GeneratedKind::Number => "anyNumber",
            GeneratedKind::Integer => "anyInteger",
            GeneratedKind::PositiveInt => "anyPositiveInt",
            GeneratedKind::Double => "anyDouble",
            GeneratedKind::Hex => "anyHex",
            GeneratedKind::Boolean => "anyBoolean",
            GeneratedKind::Uuid => "anyUuid",
            GeneratedKind::Email => "anyEmail",
            GeneratedKind::Url => "anyUrl",
            GeneratedKind::HttpsUrl => "anyHttpsUrl",
            GeneratedKind::IpAddress => "anyIpAddress",
            GeneratedKind::Hostname => "anyHostname",
            GeneratedKind::NonBlankString => "anyNonBlankString",
            GeneratedKind::NonEmptyString => "anyNonEmptyString",
            GeneratedKind::Date => "anyDate",
            GeneratedKind::DateTime => "anyDateTime",
            GeneratedKind::Time => "anyTime",
            GeneratedKind::Iso8601WithOffset => "anyIso8601WithOffset",
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            GeneratedKind::Number | GeneratedKind::Double => Shape::Number,
            GeneratedKind::Integer | GeneratedKind::PositiveInt => Shape::Integer,
            GeneratedKind::Boolean => Shape::Boolean,
            _ => Shape::String,
        }
    }

    /// Unanchored pattern describing the textual form of values of this kind.
    pub fn pattern(&self) -> &'static str {
        match self {
            GeneratedKind::AlphaUnicode => r"[\p{L}]+",
            GeneratedKind::AlphaNumeric => r"[\p{L}\p{N}]+",
            GeneratedKind::Number => r"-?(\d*\.\d+|\d+)",
            GeneratedKind::Integer => r"-?\d+",
            GeneratedKind::PositiveInt => r"[1-9]\d*",
            GeneratedKind::Double => r"-?\d*\.\d+",
            GeneratedKind::Hex => r"[a-fA-F0-9]+",
            GeneratedKind::Boolean => r"(true|false)",
            GeneratedKind::Uuid => {
                r"[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}"
            }
            GeneratedKind::Email => r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,6}",
            GeneratedKind::Url => {
                r"(https?|ftp|file)://[-a-zA-Z0-9+&@#/%?=~_|!:,.;]*[-a-zA-Z0-9+&@#/%=~_|]"
            }
            GeneratedKind::HttpsUrl => {
                r"https://[-a-zA-Z0-9+&@#/%?=~_|!:,.;]*[-a-zA-Z0-9+&@#/%=~_|]"
            }
            GeneratedKind::IpAddress => {
                r"((25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(25[0-5]|2[0-4]\d|[01]?\d\d?)"
            }
            GeneratedKind::Hostname => {
                r"[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*"
            }
            GeneratedKind::NonBlankString => r"\s*\S[\S\s]*",
            GeneratedKind::NonEmptyString => r"[\S\s]+",
            GeneratedKind::Date => DATE,
            GeneratedKind::DateTime => concat!(
                r"(\d\d\d\d)-(0[1-9]|1[012])-(0[1-9]|[12][0-9]|3[01])",
                r"T(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])"
            ),
            GeneratedKind::Time => TIME,
            GeneratedKind::Iso8601WithOffset => concat!(
                r"([0-9]{4})-(1[0-2]|0[1-9])-(3[01]|0[1-9]|[12][0-9])",
                r"T(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])",
                r"(\.\d+)?(Z|[+-][01]\d:[0-5]\d)"
            ),
        }
    }

    /// Anchored regex matching the full textual form.
    pub fn regex(&self) -> &'static Regex {
        KIND_REGEXES.get(self).expect("every kind has a compiled regex")
    }

    /// Checks a value taken from a header, query parameter or URL.
    pub fn accepts_text(&self, text: &str) -> bool {
        self.regex().is_match(text)
    }

    /// Checks a typed body value: the JSON shape must agree with the kind before the
    /// pattern is applied to its textual form.
    pub fn accepts_json(&self, value: &Value) -> bool {
        match (self.shape(), value) {
            (Shape::String, Value::String(s)) => self.accepts_text(s),
            // JSON numbers may print in exponent form, so the type alone decides.
            (Shape::Number, Value::Number(n)) => *self != GeneratedKind::Double || n.is_f64(),
            (Shape::Integer, Value::Number(n)) => {
                (n.is_i64() || n.is_u64()) && self.accepts_text(&n.to_string())
            }
            (Shape::Boolean, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for GeneratedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratedKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        let wanted = wanted.strip_suffix("()").unwrap_or(wanted);
        GeneratedKind::ALL
            .iter()
            .find(|kind| {
                let name = kind.as_str();
                name.eq_ignore_ascii_case(wanted) || name[3..].eq_ignore_ascii_case(wanted)
            })
            .copied()
            .ok_or_else(|| ContractError::InvalidValue(format!("unknown generator `{s}`")))
    }
}

impl TryFrom<String> for GeneratedKind {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GeneratedKind> for String {
    fn from(kind: GeneratedKind) -> Self {
        kind.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_parse_with_or_without_prefix() {
        assert_eq!(
            "anyAlphaUnicode".parse::<GeneratedKind>().unwrap(),
            GeneratedKind::AlphaUnicode
        );
        assert_eq!("uuid()".parse::<GeneratedKind>().unwrap(), GeneratedKind::Uuid);
        assert!("anyThing".parse::<GeneratedKind>().is_err());
    }

    #[test]
    fn alpha_unicode_accepts_letters_only() {
        let kind = GeneratedKind::AlphaUnicode;
        assert!(kind.accepts_json(&json!("alice")));
        assert!(kind.accepts_json(&json!("Zoë")));
        assert!(!kind.accepts_json(&json!("al1ce")));
        assert!(!kind.accepts_json(&json!("")));
    }

    #[test]
    fn json_shape_is_enforced() {
        assert!(GeneratedKind::Integer.accepts_json(&json!(42)));
        assert!(!GeneratedKind::Integer.accepts_json(&json!("42")));
        assert!(!GeneratedKind::Integer.accepts_json(&json!(4.5)));
        assert!(GeneratedKind::Integer.accepts_text("42"));
        assert!(GeneratedKind::Boolean.accepts_json(&json!(false)));
        assert!(!GeneratedKind::Uuid.accepts_json(&json!(1)));
    }

    #[test]
    fn exponent_form_numbers_are_numbers() {
        assert!(GeneratedKind::Number.accepts_json(&json!(1e21)));
        assert!(GeneratedKind::Number.accepts_json(&json!(-3)));
        assert!(GeneratedKind::Double.accepts_json(&json!(1.5e-7)));
        assert!(GeneratedKind::Double.accepts_json(&json!(2.0)));
        assert!(!GeneratedKind::Double.accepts_json(&json!(3)));
        assert!(!GeneratedKind::Number.accepts_json(&json!("1e21")));
    }
}
