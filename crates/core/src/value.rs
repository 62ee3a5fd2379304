use std::borrow::Cow;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Map key carrying a non-finite number, which JSON has no literal for.
const NON_FINITE_KEY: &str = "nonFinite";

/// A rule operand: the editor stores whatever the user typed, so a value is
/// either a number or free text.
///
/// Finite numbers serialize as bare numbers and text as bare strings. NaN and
/// the infinities serialize as `{"nonFinite": "NaN" | "inf" | "-inf"}`.
#[derive(Debug, Clone)]
pub enum RuleValue {
    Number(f64),
    Text(String),
}

impl PartialEq for RuleValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.total_cmp(b).is_eq()
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for RuleValue {}

impl RuleValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Empty text, or a number that is not a number at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Number(n) => n.is_nan(),
            Self::Text(s) => s.is_empty(),
        }
    }

    /// Numeric reading of the value. Text is parsed after trimming; empty or
    /// non-finite input yields `None`.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Number(n) => Cow::Owned(n.to_string()),
        }
    }
}

impl Serialize for RuleValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Self::Number(n) => {
                let label = if n.is_nan() {
                    "NaN"
                } else if n.is_sign_positive() {
                    "inf"
                } else {
                    "-inf"
                };
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(NON_FINITE_KEY, label)?;
                map.end()
            }
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

struct RuleValueVisitor;

impl<'de> Visitor<'de> for RuleValueVisitor {
    type Value = RuleValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number, a string or a non-finite number marker")
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> Result<RuleValue, E> {
        Ok(RuleValue::Number(n))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<RuleValue, E> {
        Ok(RuleValue::Number(n as f64))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<RuleValue, E> {
        Ok(RuleValue::Number(n as f64))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<RuleValue, E> {
        Ok(RuleValue::Text(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<RuleValue, E> {
        Ok(RuleValue::Text(s))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RuleValue, A::Error> {
        let Some((key, label)) = map.next_entry::<String, String>()? else {
            return Err(de::Error::missing_field(NON_FINITE_KEY));
        };
        if key != NON_FINITE_KEY {
            return Err(de::Error::unknown_field(&key, &[NON_FINITE_KEY]));
        }
        if map.next_key::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::custom("non-finite marker has extra fields"));
        }
        match label.parse::<f64>() {
            Ok(n) if !n.is_finite() => Ok(RuleValue::Number(n)),
            _ => Err(de::Error::invalid_value(
                de::Unexpected::Str(&label),
                &"NaN, inf or -inf",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for RuleValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RuleValueVisitor)
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<f64> for RuleValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for RuleValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for RuleValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}
