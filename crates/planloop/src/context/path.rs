//! Typed reference paths into the execution context.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

use super::resolver::STORE_KEY;

/// Leading segment that marks a string argument as a context reference.
pub const REF_PREFIX: &str = "context";

/// One step of a reference path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{key}"),
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A parsed `context.<root>.<segment>...` reference.
///
/// The root names a result key; the remaining segments walk into the stored
/// JSON value. All-digit segments are parsed as indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefPath {
    root: String,
    segments: Vec<Segment>,
}

impl RefPath {
    /// Returns true if `raw` uses the reference syntax at all.
    pub fn is_reference(raw: &str) -> bool {
        raw.strip_prefix(REF_PREFIX)
            .map(|rest| rest.starts_with('.'))
            .unwrap_or(false)
    }

    /// Parse a reference string. Malformed paths are rejected here, before
    /// any step runs.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let rest = raw
            .strip_prefix(REF_PREFIX)
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(|| {
                CoreError::InvalidInput(format!("reference must start with '{REF_PREFIX}.': {raw}"))
            })?;

        let mut parts = rest.split('.');
        let root = match parts.next() {
            Some(root) if !root.trim().is_empty() => root.trim().to_string(),
            _ => {
                return Err(CoreError::InvalidInput(format!(
                    "reference has no root key: {raw}"
                )))
            }
        };
        if root == STORE_KEY {
            return Err(CoreError::InvalidInput(format!(
                "reference may not target the reserved key '{STORE_KEY}'"
            )));
        }

        let mut segments = Vec::new();
        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                return Err(CoreError::InvalidInput(format!(
                    "reference has an empty segment: {raw}"
                )));
            }
            if part.bytes().all(|b| b.is_ascii_digit()) {
                let index = part.parse::<usize>().map_err(|_| {
                    CoreError::InvalidInput(format!("index out of range in reference: {raw}"))
                })?;
                segments.push(Segment::Index(index));
            } else {
                segments.push(Segment::Key(part.to_string()));
            }
        }

        Ok(Self { root, segments })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl fmt::Display for RefPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{REF_PREFIX}.{}", self.root)?;
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for RefPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RefPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RefPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A tool or validation argument: either a literal or a reference that is
/// resolved right before the call executes.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Literal(Value),
    Ref(RefPath),
}

impl ArgValue {
    /// Classify a raw JSON argument. Strings using the reference syntax must
    /// parse as a valid path.
    pub fn from_json(value: Value) -> CoreResult<Self> {
        match value {
            Value::String(raw) if RefPath::is_reference(&raw) => {
                Ok(ArgValue::Ref(RefPath::parse(&raw)?))
            }
            other => Ok(ArgValue::Literal(other)),
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, ArgValue::Ref(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Literal(value) => value.clone(),
            ArgValue::Ref(path) => Value::String(path.to_string()),
        }
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        ArgValue::Literal(value)
    }
}

impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ArgValue::from_json(value).map_err(serde::de::Error::custom)
    }
}
