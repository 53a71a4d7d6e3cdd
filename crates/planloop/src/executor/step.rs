//! Step Runner: tool calls, then validations, for one step.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::context::{ArgValue, ExecutionContext};
use crate::error::{CoreError, CoreResult};
use crate::plan::{Step, ToolCall, Validation};
use crate::tools::builtin::truthy;
use crate::tools::ToolRegistry;

use super::report::{StepFailure, StepRecord, StepState, ToolOutcome, ValidationOutcome};

pub(crate) struct StepRunner<'a> {
    registry: &'a ToolRegistry,
}

struct Progress {
    state: StepState,
    number: u32,
}

impl Progress {
    fn advance(&mut self, next: StepState) {
        tracing::debug!(step = self.number, from = ?self.state, to = ?next, "step transition");
        self.state = next;
    }
}

impl<'a> StepRunner<'a> {
    pub(crate) fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Run one step to `Passed` or `Failed`. `Err` only for fatal errors.
    pub(crate) fn run(&self, step: &Step, ctx: &mut ExecutionContext) -> CoreResult<StepRecord> {
        let mut progress = Progress {
            state: StepState::Pending,
            number: step.number,
        };
        let mut record = StepRecord {
            number: step.number,
            description: step.description.clone(),
            status: StepState::Pending,
            tools: Vec::with_capacity(step.tools.len()),
            validations: Vec::with_capacity(step.validations.len()),
            failure: None,
        };

        progress.advance(StepState::RunningTools);
        for call in &step.tools {
            let (outcome, failure) = self.run_tool(call, ctx)?;
            record.tools.push(outcome);
            if let Some(failure) = failure {
                return Ok(fail(record, &mut progress, failure));
            }
        }

        progress.advance(StepState::RunningValidations);
        for validation in &step.validations {
            let (outcome, failure) = self.run_validation(validation, ctx)?;
            record.validations.push(outcome);
            if let Some(failure) = failure {
                tracing::warn!(step = step.number, validation = %validation.name, "validation failed");
                return Ok(fail(record, &mut progress, failure));
            }
        }

        progress.advance(StepState::Passed);
        record.status = progress.state;
        Ok(record)
    }

    fn run_tool(
        &self,
        call: &ToolCall,
        ctx: &mut ExecutionContext,
    ) -> CoreResult<(ToolOutcome, Option<StepFailure>)> {
        let mut outcome = ToolOutcome {
            tool: call.tool.clone(),
            result_key: call.result_key.clone(),
            args: None,
            output: None,
            error: None,
            invocation: None,
        };

        if self.registry.lookup(&call.tool).is_none() {
            let failure = StepFailure::UnknownTool {
                tool: call.tool.clone(),
            };
            outcome.error = Some(failure.to_string());
            return Ok((outcome, Some(failure)));
        }

        let args = match self.prepare(&call.tool, &call.args, ctx) {
            Ok(args) => args,
            Err(failure) => {
                outcome.error = Some(failure.to_string());
                return Ok((outcome, Some(failure)));
            }
        };
        outcome.args = Some(args.clone());

        match self.registry.dispatch_recorded(&call.tool, args, ctx.store()) {
            Ok(executed) => {
                outcome.invocation = Some(executed.invocation);
                outcome.output = Some(executed.result.clone());
                if let Err(e) = ctx.insert(&call.result_key, executed.result) {
                    let failure = StepFailure::ToolError {
                        tool: call.tool.clone(),
                        message: e.to_string(),
                    };
                    outcome.error = Some(failure.to_string());
                    return Ok((outcome, Some(failure)));
                }
                Ok((outcome, None))
            }
            Err(failed) => {
                outcome.invocation = failed.invocation;
                let failure = dispatch_failure(&call.tool, failed.error)?;
                outcome.error = Some(failure.to_string());
                Ok((outcome, Some(failure)))
            }
        }
    }

    fn run_validation(
        &self,
        validation: &Validation,
        ctx: &ExecutionContext,
    ) -> CoreResult<(ValidationOutcome, Option<StepFailure>)> {
        let mut outcome = ValidationOutcome {
            name: validation.name.clone(),
            tool: validation.tool.clone(),
            ok: false,
            result: None,
            error: None,
            invocation: None,
        };

        if let Err(e) = self.registry.lookup_validation(&validation.tool) {
            let failure = match e {
                CoreError::UnknownTool(tool) => StepFailure::UnknownTool { tool },
                _ => StepFailure::NotAValidation {
                    tool: validation.tool.clone(),
                },
            };
            outcome.error = Some(failure.to_string());
            return Ok((outcome, Some(failure)));
        }

        let args = match self.prepare(&validation.tool, &validation.args, ctx) {
            Ok(args) => args,
            Err(failure) => {
                outcome.error = Some(failure.to_string());
                return Ok((outcome, Some(failure)));
            }
        };

        let result = match self.registry.dispatch_recorded(&validation.tool, args, ctx.store()) {
            Ok(executed) => {
                outcome.invocation = Some(executed.invocation);
                executed.result
            }
            Err(failed) => {
                outcome.invocation = failed.invocation;
                let failure = dispatch_failure(&validation.tool, failed.error)?;
                outcome.error = Some(failure.to_string());
                return Ok((outcome, Some(failure)));
            }
        };

        outcome.ok = ok_flag(&result);
        outcome.result = Some(result.clone());
        if outcome.ok {
            return Ok((outcome, None));
        }
        let failure = StepFailure::ValidationFailed {
            name: validation.name.clone(),
            tool: validation.tool.clone(),
            detail: Some(result),
        };
        Ok((outcome, Some(failure)))
    }

    /// Resolve references, then canonicalize names. An alias whose
    /// reference resolves to null does not shadow the next alias.
    fn prepare(
        &self,
        tool: &str,
        raw: &BTreeMap<String, ArgValue>,
        ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, StepFailure> {
        let resolved = ctx
            .resolve_args(raw)
            .map_err(|e| StepFailure::UnresolvedReference {
                tool: tool.to_string(),
                reason: e.to_string(),
            })?;
        Ok(self.registry.canonicalize(tool, &resolved))
    }
}

fn fail(mut record: StepRecord, progress: &mut Progress, failure: StepFailure) -> StepRecord {
    progress.advance(StepState::Failed);
    record.status = progress.state;
    record.failure = Some(failure);
    record
}

/// Step-level failure for a dispatch error; fatal errors pass through.
fn dispatch_failure(tool: &str, err: CoreError) -> CoreResult<StepFailure> {
    Ok(match err {
        e if e.is_fatal() => return Err(e),
        CoreError::UnknownTool(tool) => StepFailure::UnknownTool { tool },
        CoreError::MissingArguments { tool, missing } => StepFailure::MissingArguments { tool, missing },
        CoreError::Resolution(e) => StepFailure::UnresolvedReference {
            tool: tool.to_string(),
            reason: e.to_string(),
        },
        CoreError::Tool { tool, message } => StepFailure::ToolError { tool, message },
        other => StepFailure::ToolError {
            tool: tool.to_string(),
            message: other.to_string(),
        },
    })
}

/// A validation result's `ok` flag; results without one hold.
fn ok_flag(result: &Value) -> bool {
    result.get("ok").map(truthy).unwrap_or(true)
}
