//! Domain structs for the store layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// A stored record: a flat JSON object.
pub type Record = Map<String, Value>;

/// Lookup criteria for [`Store::get_record`](super::Store::get_record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum RecordQuery {
    Id {
        id: String,
    },
    FieldEquals {
        field: String,
        value: Value,
        #[serde(default)]
        case_insensitive: bool,
    },
}

impl RecordQuery {
    pub fn by_id(id: impl Into<String>) -> Self {
        RecordQuery::Id { id: id.into() }
    }

    pub fn field_eq(field: impl Into<String>, value: Value) -> Self {
        RecordQuery::FieldEquals {
            field: field.into(),
            value,
            case_insensitive: false,
        }
    }

    /// Case-insensitive string match on `field`.
    pub fn field_eq_ci(field: impl Into<String>, value: impl Into<String>) -> Self {
        RecordQuery::FieldEquals {
            field: field.into(),
            value: Value::String(value.into()),
            case_insensitive: true,
        }
    }

    pub fn matches(&self, id_field: &str, record: &Record) -> bool {
        match self {
            RecordQuery::Id { id } => record_id(record, id_field).as_deref() == Some(id.as_str()),
            RecordQuery::FieldEquals {
                field,
                value,
                case_insensitive,
            } => match (record.get(field), value) {
                (Some(Value::String(actual)), Value::String(expected)) if *case_insensitive => {
                    actual.to_lowercase() == expected.to_lowercase()
                }
                (Some(actual), expected) => actual == expected,
                (None, _) => false,
            },
        }
    }
}

/// Read a record's id as a string; numeric ids are stringified.
pub fn record_id(record: &Record, id_field: &str) -> Option<String> {
    match record.get(id_field)? {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// How a single field changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    /// Add to the current numeric value (missing counts as zero).
    Delta(f64),
    /// Replace the current value.
    Set(Value),
}

/// A change to one field of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub field: String,
    pub op: MutationOp,
}

impl Mutation {
    pub fn delta(field: impl Into<String>, delta: f64) -> Self {
        Self {
            field: field.into(),
            op: MutationOp::Delta(delta),
        }
    }

    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: MutationOp::Set(value),
        }
    }

    /// Apply to a record in place. Integer fields stay integers when the
    /// delta is integral.
    pub fn apply(&self, record: &mut Record) -> CoreResult<()> {
        let next = match &self.op {
            MutationOp::Set(value) => value.clone(),
            MutationOp::Delta(delta) => {
                let current = record.get(&self.field).cloned().unwrap_or(Value::from(0));
                match current {
                    Value::Number(n) if n.is_i64() && delta.fract() == 0.0 => {
                        let base = n.as_i64().unwrap_or_default();
                        exact_i64(*delta)
                            .and_then(|delta| base.checked_add(delta))
                            .map(Value::from)
                            .ok_or_else(|| {
                                CoreError::InvalidInput(format!(
                                    "delta {delta} on '{}' overflows an integer",
                                    self.field
                                ))
                            })?
                    }
                    Value::Number(n) => {
                        let base = n.as_f64().unwrap_or_default();
                        serde_json::Number::from_f64(base + delta)
                            .map(Value::Number)
                            .ok_or_else(|| {
                                CoreError::InvalidInput(format!(
                                    "delta on '{}' produced a non-finite number",
                                    self.field
                                ))
                            })?
                    }
                    other => {
                        return Err(CoreError::InvalidInput(format!(
                            "cannot apply delta to non-numeric field '{}': {other}",
                            self.field
                        )))
                    }
                }
            }
        };
        record.insert(self.field.clone(), next);
        Ok(())
    }
}

/// `n` as an `i64` when it is integral and in range.
pub(crate) fn exact_i64(n: f64) -> Option<i64> {
    const BOUND: f64 = 9_223_372_036_854_775_808.0; // 2^63
    (n.fract() == 0.0 && (-BOUND..BOUND).contains(&n)).then(|| n as i64)
}
