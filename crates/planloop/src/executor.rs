//! Plan Executor: runs a plan's steps in order and reports on them.

mod report;
mod step;


use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::context::ExecutionContext;
use crate::error::CoreResult;
use crate::plan::Plan;
use crate::store::SharedStore;
use crate::tools::ToolRegistry;

pub use report::{
    AbortReason, ExecutionReport, StepFailure, StepRecord, StepState, ToolOutcome,
    ValidationOutcome,
};

use step::StepRunner;

/// Stateless between runs; each run owns its [`ExecutionContext`].
///
/// Store mutations made before a failing step are not rolled back. Plans are
/// expected to put guarding validations ahead of the mutations they protect.
pub struct PlanExecutor<'a> {
    registry: &'a ToolRegistry,
    config: ExecutorConfig,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(registry: &'a ToolRegistry, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    /// Execute against a fresh context over `store`.
    pub fn execute_on(&self, plan: &Plan, store: SharedStore) -> CoreResult<ExecutionReport> {
        let mut ctx = ExecutionContext::new(store);
        self.execute(plan, &mut ctx)
    }

    /// Step failures are recorded in the report. `Err` is returned only for
    /// fatal store errors.
    #[tracing::instrument(skip_all, fields(steps = plan.steps.len()))]
    pub fn execute(&self, plan: &Plan, ctx: &mut ExecutionContext) -> CoreResult<ExecutionReport> {
        let run_id = Uuid::now_v7();
        let plan_fingerprint = plan.fingerprint()?;
        tracing::info!(%run_id, plan = plan_fingerprint.short(), "executing plan");

        let runner = StepRunner::new(self.registry);
        let mut steps = Vec::with_capacity(plan.steps.len());
        let mut abort = None;

        for step in &plan.steps {
            let record = runner.run(step, ctx)?;
            let failure = record.failure.clone();
            steps.push(record);

            if let Some(cause) = failure {
                if self.config.stop_on_failed_validation {
                    tracing::info!(%run_id, step = step.number, %cause, "aborting plan");
                    abort = Some(AbortReason {
                        step: step.number,
                        cause,
                    });
                    break;
                }
            }
        }

        let success = abort.is_none() && steps.iter().all(|s| s.passed());
        let report = ExecutionReport {
            run_id,
            plan_fingerprint,
            steps,
            success,
            aborted: abort.is_some(),
            abort,
        };
        tracing::info!(%run_id, success, "{}", report.summary());
        Ok(report)
    }
}
