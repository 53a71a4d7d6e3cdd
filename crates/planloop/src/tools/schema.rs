//! Tool schema types and argument access.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::store::types::exact_i64;
use crate::store::Store;

/// What a tool does to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reads records, no side effects.
    Read,
    /// Writes to the store.
    Mutate,
    /// Pure computation over its arguments.
    Compute,
    /// Asserts a condition; usable in a step's validations.
    Validation,
}

/// An argument-name variant and the canonical name it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub from: String,
    pub to: String,
}

/// Declared signature of a tool. Serialized as the tool catalog handed to
/// the plan collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ToolKind,
    /// Arguments that must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Groups where at least one member must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<Vec<String>>,
    /// Alias table, in priority order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Alias>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, kind: ToolKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            required: Vec::new(),
            any_of: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn require(mut self, names: &[&str]) -> Self {
        self.required.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn require_any(mut self, names: &[&str]) -> Self {
        self.any_of.push(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn alias(mut self, from: &str, to: &str) -> Self {
        self.aliases.push(Alias {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    /// Names of required arguments not satisfied by `present`. An unmet
    /// `any_of` group is reported as its members joined by `|`.
    pub fn missing(&self, present: impl Fn(&str) -> bool) -> Vec<String> {
        let mut missing: Vec<String> = self
            .required
            .iter()
            .filter(|name| !present(name))
            .cloned()
            .collect();
        for group in &self.any_of {
            if !group.iter().any(|name| present(name)) {
                missing.push(group.join("|"));
            }
        }
        missing
    }
}

/// Resolved, canonical arguments handed to a tool handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.values
    }

    /// Present and not null.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    /// Present, possibly null.
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> CoreResult<&str> {
        self.opt_str(name)?
            .ok_or_else(|| missing_argument(name))
    }

    pub fn opt_str(&self, name: &str) -> CoreResult<Option<&str>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(CoreError::InvalidInput(format!(
                "argument '{name}' must be a string, got {other}"
            ))),
        }
    }

    /// Numbers, and strings holding numbers, are accepted.
    pub fn f64(&self, name: &str) -> CoreResult<f64> {
        self.opt_f64(name)?.ok_or_else(|| missing_argument(name))
    }

    pub fn opt_f64(&self, name: &str) -> CoreResult<Option<f64>> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => as_number(value).map(Some).ok_or_else(|| {
                CoreError::InvalidInput(format!("argument '{name}' must be numeric, got {value}"))
            }),
        }
    }

    pub fn i64(&self, name: &str) -> CoreResult<i64> {
        self.opt_i64(name)?.ok_or_else(|| missing_argument(name))
    }

    pub fn opt_i64(&self, name: &str) -> CoreResult<Option<i64>> {
        match self.opt_f64(name)? {
            None => Ok(None),
            Some(n) => exact_i64(n).map(Some).ok_or_else(|| {
                CoreError::InvalidInput(format!("argument '{name}' must be an in-range integer, got {n}"))
            }),
        }
    }
}

/// Numeric view of a JSON value, accepting numeric strings.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn missing_argument(name: &str) -> CoreError {
    CoreError::InvalidInput(format!("missing argument '{name}'"))
}

/// Handler type: takes canonical args and the store, returns a JSON result.
pub type ToolHandler = Box<dyn Fn(&ToolArgs, &dyn Store) -> CoreResult<Value> + Send + Sync>;

/// Complete tool definition: signature plus handler.
pub struct ToolDefinition {
    pub spec: ToolSpec,
    pub handler: ToolHandler,
}

impl ToolDefinition {
    pub fn new(
        spec: ToolSpec,
        handler: impl Fn(&ToolArgs, &dyn Store) -> CoreResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            spec,
            handler: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}
