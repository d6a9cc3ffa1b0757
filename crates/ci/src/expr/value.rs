//! Runtime values of the expression language.
//!
//! Coercion follows the workflow expression rules: mismatched types compare as
//! numbers, strings compare case-insensitively, and `null`, `false`, `0`,
//! `NaN` and `''` are falsy.

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;

/// A value produced by evaluating an expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// `null`, also the result of missing properties
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// All numbers are doubles
    Number(f64),
    /// String
    String(String),
    /// Array (from `fromJSON` or list-valued contexts)
    Array(Vec<Value>),
    /// Object; lookups are case-insensitive
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Empty object.
    #[must_use]
    pub fn object() -> Self {
        Self::Object(IndexMap::new())
    }

    /// Build an object from string pairs.
    pub fn string_object<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Self::String(v.into())))
                .collect(),
        )
    }

    /// Insert into an object value; no-op for other kinds.
    pub fn insert(&mut self, key: impl Into<String>, value: Self) {
        if let Self::Object(map) = self {
            map.insert(key.into(), value);
        }
    }

    /// Case-insensitive property lookup. Missing properties are `Null`.
    #[must_use]
    pub fn get(&self, key: &str) -> Self {
        match self {
            Self::Object(map) => map
                .get(key)
                .or_else(|| {
                    map.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(key))
                        .map(|(_, v)| v)
                })
                .cloned()
                .unwrap_or(Self::Null),
            _ => Self::Null,
        }
    }

    /// Index access: string keys on objects, numeric indexes on arrays.
    #[must_use]
    pub fn index(&self, index: &Self) -> Self {
        match (self, index) {
            (Self::Object(_), _) => self.get(&index.to_display_string()),
            (Self::Array(items), _) => {
                let n = index.to_number();
                if n.is_finite() && n >= 0.0 && n.fract() == 0.0 {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    items.get(n as usize).cloned().unwrap_or(Self::Null)
                } else {
                    Self::Null
                }
            }
            _ => Self::Null,
        }
    }

    /// Truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Array(_) | Self::Object(_) => true,
        }
    }

    /// Numeric coercion used by comparisons.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => parse_number(s.trim()).unwrap_or(f64::NAN),
            Self::Array(_) | Self::Object(_) => f64::NAN,
        }
    }

    /// String form used when interpolating into templates.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Array(_) | Self::Object(_) => self.to_json_pretty(),
        }
    }

    /// Loose equality.
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::String(a), Self::String(b)) => a.to_lowercase() == b.to_lowercase(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Array(_) | Self::Object(_), _) | (_, Self::Array(_) | Self::Object(_)) => {
                false
            }
            _ => self.to_number() == other.to_number(),
        }
    }

    /// Loose ordering; `None` when the operands are not comparable (NaN).
    #[must_use]
    pub fn loose_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
            (Self::Array(_) | Self::Object(_), _) | (_, Self::Array(_) | Self::Object(_)) => None,
            _ => self.to_number().partial_cmp(&other.to_number()),
        }
    }

    /// Convert into JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_default()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Parse a numeric literal: decimal, exponent, or `0x` hexadecimal.
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() {
        return Some(0.0);
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        #[allow(clippy::cast_precision_loss)]
        i64::from_str_radix(hex, 16).ok().map(|v| v as f64)?
    } else if digits.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
        && digits.starts_with(|c: char| c.is_ascii_digit() || c == '.')
    {
        digits.parse::<f64>().ok()?
    } else {
        return None;
    };
    Some(if negative { -value } else { value })
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}
