//! Typed claim model
//!
//! Every claim keeps its original textual form next to a parsed form, so
//! downstream consumers can use typed values while diagnostics show exactly
//! what the token carried.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Parsed form of a claim value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedClaim {
    /// Plain string
    String(String),
    /// Ordered set of strings (duplicates removed, order preserved)
    StringSet(Vec<String>),
    /// Whole number
    Integer(i64),
    /// Boolean
    Boolean(bool),
    /// Point in time (epoch seconds in the token)
    Instant(DateTime<Utc>),
    /// Nested JSON object
    Map(Map<String, Value>),
}

/// A claim: the original textual form plus its parsed form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimValue {
    /// The claim exactly as it appeared in the token body
    pub original: String,
    /// Typed interpretation
    pub parsed: ParsedClaim,
}

impl ClaimValue {
    /// Interpret a raw JSON claim with the default rules: strings, booleans
    /// and integers map directly, all-string arrays become ordered sets,
    /// objects stay nested maps, anything else keeps its JSON text form.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let original = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let parsed = match value {
            Value::String(s) => ParsedClaim::String(s.clone()),
            Value::Bool(b) => ParsedClaim::Boolean(*b),
            Value::Number(n) => n.as_i64().map_or_else(
                || ParsedClaim::String(n.to_string()),
                ParsedClaim::Integer,
            ),
            Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                match strings {
                    Some(set) => ParsedClaim::StringSet(dedup_preserving_order(set)),
                    None => ParsedClaim::String(value.to_string()),
                }
            }
            Value::Object(map) => ParsedClaim::Map(map.clone()),
            Value::Null => ParsedClaim::String(String::new()),
        };
        Self { original, parsed }
    }

    /// Wrap an already-parsed form, deriving the textual form from it.
    #[must_use]
    pub fn from_parsed(parsed: ParsedClaim) -> Self {
        let original = match &parsed {
            ParsedClaim::String(s) => s.clone(),
            ParsedClaim::StringSet(set) => set.join(" "),
            ParsedClaim::Integer(n) => n.to_string(),
            ParsedClaim::Boolean(b) => b.to_string(),
            ParsedClaim::Instant(at) => at.timestamp().to_string(),
            ParsedClaim::Map(map) => Value::Object(map.clone()).to_string(),
        };
        Self { original, parsed }
    }

    /// The parsed string, when this claim is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.parsed {
            ParsedClaim::String(s) => Some(s),
            _ => None,
        }
    }

    /// The parsed string set, when this claim is one.
    #[must_use]
    pub fn as_string_set(&self) -> Option<&[String]> {
        match &self.parsed {
            ParsedClaim::StringSet(set) => Some(set),
            _ => None,
        }
    }

    /// The parsed integer, when this claim is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self.parsed {
            ParsedClaim::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// The parsed boolean, when this claim is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self.parsed {
            ParsedClaim::Boolean(b) => Some(b),
            _ => None,
        }
    }

    /// The parsed instant, when this claim is one.
    #[must_use]
    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self.parsed {
            ParsedClaim::Instant(at) => Some(at),
            _ => None,
        }
    }
}

/// All claims of a token body, keyed by claim name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClaimMap {
    inner: HashMap<String, ClaimValue>,
}

impl ClaimMap {
    /// Interpret every member of a token body with the default rules.
    #[must_use]
    pub fn from_object(body: &Map<String, Value>) -> Self {
        let inner = body
            .iter()
            .map(|(name, value)| (name.clone(), ClaimValue::from_json(value)))
            .collect();
        Self { inner }
    }

    /// Look up a claim by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.inner.get(name)
    }

    /// Replace or insert a claim (used by mappers).
    pub fn set(&mut self, name: impl Into<String>, value: ClaimValue) {
        self.inner.insert(name.into(), value);
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the map holds no claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over `(name, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClaimValue)> {
        self.inner.iter()
    }
}

/// Walk a dotted path (`"cnf.jkt"`) through nested objects to a string leaf.
#[must_use]
pub fn nested_str<'a>(body: &'a Map<String, Value>, path: &str) -> Option<&'a str> {
    nested_value(body, path)?.as_str()
}

/// Walk a dotted path through nested objects to any leaf value.
#[must_use]
pub fn nested_value<'a>(body: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = body.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
