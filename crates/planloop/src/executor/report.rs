//! Execution report types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::plan::Fingerprint;
use crate::tools::ToolInvocationRecord;

/// Step Runner states. Only `Passed` and `Failed` appear in a finished
/// report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    RunningTools,
    RunningValidations,
    Passed,
    Failed,
}

/// Why a step failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepFailure {
    #[error("unknown tool '{tool}'")]
    UnknownTool { tool: String },

    #[error("'{tool}' cannot be used as a validation")]
    NotAValidation { tool: String },

    #[error("missing required arguments for '{tool}': {missing:?}")]
    MissingArguments { tool: String, missing: Vec<String> },

    #[error("unresolved reference in '{tool}' arguments: {reason}")]
    UnresolvedReference { tool: String, reason: String },

    #[error("tool '{tool}' failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("validation '{name}' failed")]
    ValidationFailed {
        name: String,
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<Value>,
    },
}

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub result_key: String,
    /// Resolved, canonical arguments; absent when resolution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation: Option<ToolInvocationRecord>,
}

/// One evaluated validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub name: String,
    pub tool: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation: Option<ToolInvocationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub number: u32,
    pub description: String,
    pub status: StepState,
    pub tools: Vec<ToolOutcome>,
    pub validations: Vec<ValidationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

impl StepRecord {
    pub fn passed(&self) -> bool {
        self.status == StepState::Passed
    }
}

/// The step that halted a run and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortReason {
    pub step: u32,
    pub cause: StepFailure,
}

/// Result of one Plan Executor run. Only steps that actually ran are listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub plan_fingerprint: Fingerprint,
    pub steps: Vec<StepRecord>,
    pub success: bool,
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReason>,
}

impl ExecutionReport {
    pub fn failed_steps(&self) -> Vec<u32> {
        self.steps
            .iter()
            .filter(|s| !s.passed())
            .map(|s| s.number)
            .collect()
    }

    pub fn passed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.passed()).count()
    }

    /// Human-readable one-line outcome.
    pub fn summary(&self) -> String {
        if self.success {
            return format!("Successfully executed {} steps.", self.steps.len());
        }
        match &self.abort {
            Some(abort) => format!(
                "Execution stopped at step {} due to {}.",
                abort.step, abort.cause
            ),
            None => format!("Execution failed at step(s): {:?}", self.failed_steps()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(number: u32, status: StepState, failure: Option<StepFailure>) -> StepRecord {
        StepRecord {
            number,
            description: format!("step {number}"),
            status,
            tools: Vec::new(),
            validations: Vec::new(),
            failure,
        }
    }

    fn report(steps: Vec<StepRecord>, abort: Option<AbortReason>) -> ExecutionReport {
        let success = steps.iter().all(|s| s.passed());
        ExecutionReport {
            run_id: Uuid::new_v4(),
            plan_fingerprint: Fingerprint::of_bytes(b"plan"),
            success,
            aborted: abort.is_some(),
            abort,
            steps,
        }
    }

    #[test]
    fn summary_on_success() {
        let r = report(vec![step(1, StepState::Passed, None), step(2, StepState::Passed, None)], None);
        assert_eq!(r.summary(), "Successfully executed 2 steps.");
    }

    #[test]
    fn summary_on_abort() {
        let cause = StepFailure::ValidationFailed {
            name: "stock_ok".into(),
            tool: "assert_sufficient_stock".into(),
            detail: Some(json!({"ok": false})),
        };
        let r = report(
            vec![step(1, StepState::Passed, None), step(2, StepState::Failed, Some(cause.clone()))],
            Some(AbortReason { step: 2, cause }),
        );
        assert_eq!(r.summary(), "Execution stopped at step 2 due to validation 'stock_ok' failed.");
    }

    #[test]
    fn summary_lists_failed_steps_without_abort() {
        let cause = StepFailure::UnknownTool { tool: "x".into() };
        let r = report(
            vec![
                step(1, StepState::Failed, Some(cause.clone())),
                step(2, StepState::Passed, None),
                step(3, StepState::Failed, Some(cause)),
            ],
            None,
        );
        assert_eq!(r.summary(), "Execution failed at step(s): [1, 3]");
        assert_eq!(r.passed_steps(), 1);
    }

    #[test]
    fn failure_serializes_with_kind_tag() {
        let value = serde_json::to_value(StepFailure::MissingArguments {
            tool: "compute_total".into(),
            missing: vec!["price".into()],
        })
        .unwrap();
        assert_eq!(value["kind"], json!("missing_arguments"));
        assert_eq!(value["missing"], json!(["price"]));
    }
}
