//! Typed plan model in the collaborator's wire format.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::context::{ArgValue, STORE_KEY};
use crate::error::{CoreError, CoreResult};

use super::fingerprint::Fingerprint;

/// Ordered steps plus the collaborator's reasoning. Step order is execution
/// order; a revision produces a new `Plan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub reasoning: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position; missing numbers are filled in from the step's index.
    #[serde(rename = "step_number", default)]
    pub number: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: Vec<ToolCall>,
    #[serde(default)]
    pub validations: Vec<Validation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(rename = "use", alias = "tool")]
    pub tool: String,
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: BTreeMap<String, ArgValue>,
    pub result_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    #[serde(default = "default_validation_name")]
    pub name: String,
    #[serde(rename = "use_tool", alias = "tool")]
    pub tool: String,
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: BTreeMap<String, ArgValue>,
}

fn default_validation_name() -> String {
    "validation".to_string()
}

/// `price_from: "context.x.price"` is read as `price`. The suffix is only
/// dropped for references, and never over an explicit key.
fn deserialize_args<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, ArgValue>, D::Error> {
    let raw = BTreeMap::<String, ArgValue>::deserialize(deserializer)?;
    let mut args = BTreeMap::new();
    let mut renamed = Vec::new();
    for (key, value) in raw {
        match key.strip_suffix("_from") {
            Some(base) if value.is_ref() && !base.is_empty() => renamed.push((base.to_string(), value)),
            _ => {
                args.insert(key, value);
            }
        }
    }
    for (key, value) in renamed {
        args.entry(key).or_insert(value);
    }
    Ok(args)
}

impl Plan {
    pub fn new(reasoning: impl Into<String>, steps: Vec<Step>) -> Self {
        let mut plan = Self {
            reasoning: reasoning.into(),
            steps,
        };
        plan.number_steps();
        plan
    }

    /// Fill in missing step numbers from position.
    pub(crate) fn number_steps(&mut self) {
        for (index, step) in self.steps.iter_mut().enumerate() {
            if step.number == 0 {
                step.number = index as u32 + 1;
            }
        }
    }

    /// Structural checks that do not need a tool registry.
    pub fn validate(&self) -> CoreResult<()> {
        for step in &self.steps {
            for call in &step.tools {
                if call.tool.trim().is_empty() {
                    return Err(CoreError::MalformedPlan(format!(
                        "step {} has a tool call without a tool name",
                        step.number
                    )));
                }
                if call.result_key.trim().is_empty() || call.result_key == STORE_KEY {
                    return Err(CoreError::MalformedPlan(format!(
                        "step {} uses invalid result key '{}'",
                        step.number, call.result_key
                    )));
                }
            }
            if let Some(v) = step.validations.iter().find(|v| v.tool.trim().is_empty()) {
                return Err(CoreError::MalformedPlan(format!(
                    "validation '{}' in step {} has no tool",
                    v.name, step.number
                )));
            }
        }
        Ok(())
    }

    pub fn fingerprint(&self) -> CoreResult<Fingerprint> {
        Fingerprint::of(self)
    }
}

impl Step {
    pub fn new(number: u32, description: impl Into<String>) -> Self {
        Self {
            number,
            description: description.into(),
            tools: Vec::new(),
            validations: Vec::new(),
        }
    }

    pub fn tool(mut self, call: ToolCall) -> Self {
        self.tools.push(call);
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }
}

impl ToolCall {
    /// Build a call from a JSON args object. Reference strings must parse.
    pub fn new(
        tool: impl Into<String>,
        args: serde_json::Value,
        result_key: impl Into<String>,
    ) -> CoreResult<Self> {
        Ok(Self {
            tool: tool.into(),
            args: args_from_json(args)?,
            result_key: result_key.into(),
        })
    }
}

impl Validation {
    pub fn new(
        name: impl Into<String>,
        tool: impl Into<String>,
        args: serde_json::Value,
    ) -> CoreResult<Self> {
        Ok(Self {
            name: name.into(),
            tool: tool.into(),
            args: args_from_json(args)?,
        })
    }
}

fn args_from_json(args: serde_json::Value) -> CoreResult<BTreeMap<String, ArgValue>> {
    match args {
        serde_json::Value::Null => Ok(BTreeMap::new()),
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| Ok((k, ArgValue::from_json(v)?)))
            .collect(),
        other => Err(CoreError::MalformedPlan(format!(
            "arguments must be an object, got {other}"
        ))),
    }
}
