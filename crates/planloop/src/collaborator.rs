//! Contracts for the LLM-calling collaborators.
//!
//! Implementations own prompts and provider access. They return raw text for
//! plans so the core can repair and parse it; an unreachable provider is
//! reported as [`CoreError::CollaboratorUnavailable`](crate::CoreError).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::executor::ExecutionReport;
use crate::plan::Plan;
use crate::tools::ToolSpec;

#[async_trait]
pub trait PlanCollaborator: Send + Sync {
    /// Draft a plan for `request` using only tools from `catalog`.
    async fn generate_plan(&self, request: &str, catalog: &[ToolSpec]) -> CoreResult<String>;

    /// Critique `plan` and return `{"critique": ..., "revised_plan": ...}`.
    /// `report` is the plan's last execution, when there was one.
    async fn critique_and_revise(
        &self,
        request: &str,
        plan: &Plan,
        report: Option<&ExecutionReport>,
        catalog: &[ToolSpec],
    ) -> CoreResult<String>;

    /// Plain-language account of a failed execution.
    async fn explain_failure(
        &self,
        _request: &str,
        _report: &ExecutionReport,
    ) -> CoreResult<Option<String>> {
        Ok(None)
    }
}

/// Evaluator verdict on a generated artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Generator and evaluator for non-plan artifacts (SQL, chart code, ...).
#[async_trait]
pub trait ArtifactCollaborator: Send + Sync {
    type Artifact: Clone + Serialize + Send + Sync;

    async fn generate_artifact(
        &self,
        topic: &str,
        feedback: Option<&str>,
    ) -> CoreResult<Self::Artifact>;

    async fn evaluate(&self, topic: &str, artifact: &Self::Artifact) -> CoreResult<Evaluation>;
}
