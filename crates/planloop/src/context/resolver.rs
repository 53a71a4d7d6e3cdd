//! Execution context owned by a single plan run.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::store::Store;

use super::path::{ArgValue, RefPath, Segment};

/// Reserved key binding the store handle. Never usable as a result key.
pub const STORE_KEY: &str = "__store__";

/// Why a reference could not be resolved. A reference that reaches a JSON
/// `null` is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown context key '{root}' in {path}")]
    UnknownRoot { path: String, root: String },
    #[error("missing field '{segment}' in {path}")]
    MissingField { path: String, segment: String },
    #[error("cannot read '{segment}' from {found} in {path}")]
    TypeMismatch {
        path: String,
        segment: String,
        found: String,
    },
}

/// Result values produced so far in one plan run, plus the store handle.
pub struct ExecutionContext {
    results: BTreeMap<String, Value>,
    store: Arc<dyn Store>,
}

impl ExecutionContext {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            results: BTreeMap::new(),
            store,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Store a tool output under `key`. Reusing a key overwrites the
    /// previous value and returns it.
    pub fn insert(&mut self, key: &str, value: Value) -> CoreResult<Option<Value>> {
        if key == STORE_KEY {
            return Err(CoreError::InvalidInput(format!(
                "result key '{STORE_KEY}' is reserved"
            )));
        }
        let previous = self.results.insert(key.to_string(), value);
        if previous.is_some() {
            tracing::warn!(result_key = key, "result key reused, previous value overwritten");
        }
        Ok(previous)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }

    pub fn results(&self) -> &BTreeMap<String, Value> {
        &self.results
    }

    /// Walk a reference path through the stored results.
    pub fn resolve_path(&self, path: &RefPath) -> Result<&Value, ResolveError> {
        let mut current = self
            .results
            .get(path.root())
            .ok_or_else(|| ResolveError::UnknownRoot {
                path: path.to_string(),
                root: path.root().to_string(),
            })?;

        for segment in path.segments() {
            current = match (current, segment) {
                (Value::Object(map), Segment::Key(key)) => map.get(key),
                (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
                (Value::Array(items), Segment::Index(index)) => items.get(*index),
                (other, segment) => {
                    return Err(ResolveError::TypeMismatch {
                        path: path.to_string(),
                        segment: segment.to_string(),
                        found: json_type_name(other).to_string(),
                    })
                }
            }
            .ok_or_else(|| ResolveError::MissingField {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
        }

        Ok(current)
    }

    /// Resolve one argument; literals pass through unchanged.
    pub fn resolve(&self, value: &ArgValue) -> Result<Value, ResolveError> {
        match value {
            ArgValue::Literal(literal) => Ok(literal.clone()),
            ArgValue::Ref(path) => self.resolve_path(path).cloned(),
        }
    }

    /// Resolve a whole argument map, stopping at the first failure.
    pub fn resolve_args(
        &self,
        args: &BTreeMap<String, ArgValue>,
    ) -> Result<Map<String, Value>, ResolveError> {
        let mut resolved = Map::new();
        for (name, value) in args {
            resolved.insert(name.clone(), self.resolve(value)?);
        }
        Ok(resolved)
    }
}

/// Returns a human-readable name for the JSON type of a value.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
