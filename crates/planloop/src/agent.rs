//! Request pipeline: draft a plan, optionally reflect on it, then execute.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::collaborator::PlanCollaborator;
use crate::config::ExecutorConfig;
use crate::error::CoreResult;
use crate::executor::{ExecutionReport, PlanExecutor};
use crate::plan::{parse_plan, parse_revision, Plan, Revision, FALLBACK_CRITIQUE};
use crate::refine::{PlanRefinement, RefinementController, RefinementPolicy, RefinementSession};
use crate::store::SharedStore;
use crate::tools::{ToolRegistry, ToolSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentOptions {
    /// Run one critique-and-revise pass on the draft before executing.
    pub use_reflection: bool,
    pub stop_on_failed_validation: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            use_reflection: true,
            stop_on_failed_validation: true,
        }
    }
}

/// Everything one request went through.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    /// `None` when the collaborator's draft could not be parsed.
    pub draft_plan: Option<Plan>,
    pub reflection: Option<Revision>,
    pub final_plan: Option<Plan>,
    pub report: Option<ExecutionReport>,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_explanation: Option<String>,
}

/// Result of [`PlanAgent::refine_and_commit`].
#[derive(Debug, Clone, Serialize)]
pub struct CommitOutcome {
    pub session: RefinementSession<Plan>,
    /// Execution against the real store; `None` when nothing passed.
    pub report: Option<ExecutionReport>,
}

impl CommitOutcome {
    pub fn committed(&self) -> bool {
        self.report.as_ref().map(|r| r.success).unwrap_or(false)
    }
}

pub struct PlanAgent {
    registry: ToolRegistry,
    collaborator: Arc<dyn PlanCollaborator>,
}

impl PlanAgent {
    pub fn new(registry: ToolRegistry, collaborator: Arc<dyn PlanCollaborator>) -> Self {
        Self {
            registry,
            collaborator,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one request against `store`.
    ///
    /// Collaborator trouble short of unavailability ends in an unsuccessful
    /// outcome rather than an error.
    #[tracing::instrument(skip_all, fields(reflection = options.use_reflection))]
    pub async fn handle(
        &self,
        request: &str,
        store: SharedStore,
        options: AgentOptions,
    ) -> CoreResult<AgentOutcome> {
        let catalog = self.registry.catalog();

        let draft = match self.collaborator.generate_plan(request, &catalog).await {
            Ok(text) => parse_plan(&text),
            Err(e) => Err(e),
        };
        let draft = match draft {
            Ok(plan) => plan,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "no usable draft plan");
                return Ok(AgentOutcome {
                    draft_plan: None,
                    reflection: None,
                    final_plan: None,
                    report: None,
                    success: false,
                    message: format!("Could not produce a plan: {e}"),
                    error_explanation: None,
                });
            }
        };

        let reflection = if options.use_reflection {
            Some(self.reflect(request, &draft, &catalog).await?)
        } else {
            None
        };
        let final_plan = reflection
            .as_ref()
            .map(|r| r.revised_plan.clone())
            .unwrap_or_else(|| draft.clone());

        let config = ExecutorConfig {
            stop_on_failed_validation: options.stop_on_failed_validation,
        };
        let report = PlanExecutor::new(&self.registry, config).execute_on(&final_plan, store)?;

        let error_explanation = if !report.success && options.use_reflection {
            self.explain(request, &report).await?
        } else {
            None
        };

        Ok(AgentOutcome {
            draft_plan: Some(draft),
            reflection,
            final_plan: Some(final_plan),
            success: report.success,
            message: report.summary(),
            report: Some(report),
            error_explanation,
        })
    }

    /// Refine a plan in sandboxed dry runs, then execute the best plan once
    /// against `store` if it passed there.
    #[tracing::instrument(skip_all)]
    pub async fn refine_and_commit(
        &self,
        request: &str,
        store: SharedStore,
        policy: RefinementPolicy,
        cancel: &CancellationToken,
    ) -> CoreResult<CommitOutcome> {
        let controller = RefinementController::new(policy)?;
        let task = PlanRefinement::new(&*self.collaborator, &self.registry, store.clone(), request);
        let session = controller.run(&task, cancel).await?;

        let report = match session.final_record() {
            Some(record) if record.success() => match &record.artifact {
                Some(plan) => {
                    tracing::info!(iteration = record.iteration, "committing refined plan");
                    Some(PlanExecutor::new(&self.registry, ExecutorConfig::default()).execute_on(plan, store)?)
                }
                None => None,
            },
            _ => {
                tracing::info!(status = ?session.status, "no passing plan, store left untouched");
                None
            }
        };

        Ok(CommitOutcome { session, report })
    }

    async fn reflect(&self, request: &str, draft: &Plan, catalog: &[ToolSpec]) -> CoreResult<Revision> {
        match self
            .collaborator
            .critique_and_revise(request, draft, None, catalog)
            .await
        {
            Ok(text) => Ok(parse_revision(&text, draft)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "reflection failed, keeping draft");
                Ok(Revision {
                    critique: FALLBACK_CRITIQUE.to_string(),
                    revised_plan: draft.clone(),
                    fell_back: true,
                })
            }
        }
    }

    async fn explain(&self, request: &str, report: &ExecutionReport) -> CoreResult<Option<String>> {
        match self.collaborator.explain_failure(request, report).await {
            Ok(explanation) => Ok(explanation),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "could not explain failure");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{shop, ScriptedPlanner, GUARDED, OVERSELL};
    use crate::tools::builtin::{self, INVENTORY};
    use serde_json::json;

    fn agent(planner: ScriptedPlanner) -> PlanAgent {
        PlanAgent::new(builtin::customer_service().unwrap(), Arc::new(planner))
    }

    #[tokio::test]
    async fn reflection_revises_the_draft_before_execution() {
        let store = shop();
        let agent = agent(ScriptedPlanner::new(&[OVERSELL], &[GUARDED]));
        let outcome = agent
            .handle("buy 2 X", store.clone(), AgentOptions::default())
            .await
            .unwrap();

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.message, "Successfully executed 3 steps.");
        assert_eq!(outcome.draft_plan.unwrap().steps.len(), 2);
        let reflection = outcome.reflection.unwrap();
        assert_eq!(reflection.critique, "check stock before mutating");
        assert!(!reflection.fell_back);
        assert_eq!(outcome.final_plan.unwrap().steps.len(), 3);
        assert!(outcome.error_explanation.is_none());
        assert_eq!(store.snapshot(INVENTORY)[0]["quantity_in_stock"], json!(8));
    }

    #[tokio::test]
    async fn failed_execution_is_explained() {
        let store = shop();
        let agent = agent(
            ScriptedPlanner::new(&[OVERSELL], &["looks fine to me"]).explaining("only 10 in stock"),
        );
        let outcome = agent
            .handle("buy 50 X", store.clone(), AgentOptions::default())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.reflection.unwrap().fell_back);
        assert_eq!(outcome.message, "Execution stopped at step 2 due to validation 'stock_ok' failed.");
        assert_eq!(outcome.error_explanation.as_deref(), Some("only 10 in stock"));
        // the unguarded mutation is not rolled back
        assert_eq!(store.snapshot(INVENTORY)[0]["quantity_in_stock"], json!(-40));
    }

    #[tokio::test]
    async fn without_reflection_the_draft_runs_and_is_not_explained() {
        let agent = agent(ScriptedPlanner::new(&[OVERSELL], &[]).explaining("unused"));
        let options = AgentOptions {
            use_reflection: false,
            ..Default::default()
        };
        let outcome = agent.handle("buy 50 X", shop(), options).await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.reflection.is_none());
        assert_eq!(outcome.draft_plan, outcome.final_plan);
        assert!(outcome.error_explanation.is_none());
    }

    #[tokio::test]
    async fn malformed_draft_is_an_unsuccessful_outcome() {
        let store = shop();
        let agent = agent(ScriptedPlanner::new(&["I cannot help with that."], &[]));
        let outcome = agent
            .handle("buy", store.clone(), AgentOptions::default())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.draft_plan.is_none());
        assert!(outcome.report.is_none());
        assert!(outcome.message.starts_with("Could not produce a plan"));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_collaborator_is_an_error() {
        let agent = agent(ScriptedPlanner::new(&[], &[]));
        let result = agent.handle("buy", shop(), AgentOptions::default()).await;
        assert!(matches!(result, Err(crate::CoreError::CollaboratorUnavailable(_))));
    }

    #[tokio::test]
    async fn refine_and_commit_writes_only_the_passing_plan() {
        let store = shop();
        let planner = ScriptedPlanner::new(&[OVERSELL], &[GUARDED]);
        let agent = agent(planner);
        let outcome = agent
            .refine_and_commit("buy 2 X", store.clone(), RefinementPolicy::medium(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.committed());
        assert_eq!(outcome.session.iterations(), 2);
        assert_eq!(store.mutation_count(), 1);
        assert_eq!(store.snapshot(INVENTORY)[0]["quantity_in_stock"], json!(8));
    }

    #[tokio::test]
    async fn refine_and_commit_leaves_store_alone_without_a_pass() {
        let store = shop();
        let agent = agent(ScriptedPlanner::new(&[OVERSELL], &["no changes"]));
        let outcome = agent
            .refine_and_commit("buy 50 X", store.clone(), RefinementPolicy::strong(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.committed());
        assert!(outcome.report.is_none());
        assert_eq!(store.mutation_count(), 0);
    }
}
