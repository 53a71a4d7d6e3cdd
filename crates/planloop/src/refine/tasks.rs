//! Refinement tasks for plans and for opaque artifacts.

use async_trait::async_trait;

use crate::collaborator::{ArtifactCollaborator, PlanCollaborator};
use crate::config::ExecutorConfig;
use crate::context::ExecutionContext;
use crate::error::CoreResult;
use crate::executor::PlanExecutor;
use crate::plan::{parse_plan, parse_revision, Plan};
use crate::store::SharedStore;
use crate::tools::{ToolRegistry, ToolSpec};

use super::controller::RefinementTask;
use super::session::{Assessment, IterationRecord};

/// Plan variant: draft, then critique-and-revise against the last
/// execution report. Every assessment runs on a fresh fork of `store`, so
/// the real store is never written during refinement.
pub struct PlanRefinement<'a> {
    collaborator: &'a dyn PlanCollaborator,
    registry: &'a ToolRegistry,
    store: SharedStore,
    request: String,
    catalog: Vec<ToolSpec>,
    executor: ExecutorConfig,
}

impl<'a> PlanRefinement<'a> {
    pub fn new(
        collaborator: &'a dyn PlanCollaborator,
        registry: &'a ToolRegistry,
        store: SharedStore,
        request: impl Into<String>,
    ) -> Self {
        Self {
            collaborator,
            registry,
            store,
            request: request.into(),
            catalog: registry.catalog(),
            executor: ExecutorConfig::default(),
        }
    }

    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = config;
        self
    }
}

#[async_trait]
impl<'a> RefinementTask for PlanRefinement<'a> {
    type Artifact = Plan;

    async fn generate(&self, previous: Option<&IterationRecord<Plan>>) -> CoreResult<Plan> {
        let prior = previous.and_then(|r| r.artifact.as_ref().map(|plan| (r, plan)));
        let Some((record, plan)) = prior else {
            let text = self
                .collaborator
                .generate_plan(&self.request, &self.catalog)
                .await?;
            return parse_plan(&text);
        };

        let report = record.assessment().and_then(|a| a.report.as_ref());
        let text = self
            .collaborator
            .critique_and_revise(&self.request, plan, report, &self.catalog)
            .await?;
        let revision = parse_revision(&text, plan);
        tracing::debug!(critique = %revision.critique, fell_back = revision.fell_back, "plan revised");
        Ok(revision.revised_plan)
    }

    async fn assess(&self, plan: &Plan) -> CoreResult<Assessment> {
        let sandbox = self.store.fork()?;
        let mut ctx = ExecutionContext::new(sandbox);
        let report = PlanExecutor::new(self.registry, self.executor.clone()).execute(plan, &mut ctx)?;

        let total = plan.steps.len();
        let score = if total == 0 {
            if report.success { 1.0 } else { 0.0 }
        } else {
            report.passed_steps() as f64 / total as f64
        };
        Ok(Assessment {
            success: report.success,
            score: Some(score),
            feedback: Some(report.summary()),
            report: Some(report),
        })
    }
}

/// Artifact variant: generate with the last cycle's feedback, then evaluate.
pub struct ArtifactRefinement<'a, C: ArtifactCollaborator> {
    collaborator: &'a C,
    topic: String,
}

impl<'a, C: ArtifactCollaborator> ArtifactRefinement<'a, C> {
    pub fn new(collaborator: &'a C, topic: impl Into<String>) -> Self {
        Self {
            collaborator,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl<'a, C: ArtifactCollaborator> RefinementTask for ArtifactRefinement<'a, C> {
    type Artifact = C::Artifact;

    async fn generate(
        &self,
        previous: Option<&IterationRecord<C::Artifact>>,
    ) -> CoreResult<C::Artifact> {
        let feedback = previous.and_then(|r| r.feedback());
        self.collaborator
            .generate_artifact(&self.topic, feedback)
            .await
    }

    async fn assess(&self, artifact: &C::Artifact) -> CoreResult<Assessment> {
        let evaluation = self.collaborator.evaluate(&self.topic, artifact).await?;
        Ok(Assessment {
            success: evaluation.success,
            score: evaluation.score,
            feedback: evaluation.feedback,
            report: None,
        })
    }
}
