//! Adaptive Iteration Controller.

use std::future::Future;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::plan::Fingerprint;

use super::policy::RefinementPolicy;
use super::session::{best_index, Assessment, CycleOutcome, IterationRecord, RefinementSession, SessionStatus};

/// One refinable task: something that produces an artifact and can judge it.
#[async_trait]
pub trait RefinementTask: Send + Sync {
    type Artifact: Clone + Serialize + Send + Sync;

    /// Produce an artifact. `previous` is `None` on the first cycle and the
    /// latest record afterwards, which may be a failed cycle with no artifact.
    async fn generate(
        &self,
        previous: Option<&IterationRecord<Self::Artifact>>,
    ) -> CoreResult<Self::Artifact>;

    async fn assess(&self, artifact: &Self::Artifact) -> CoreResult<Assessment>;

    fn fingerprint(&self, artifact: &Self::Artifact) -> CoreResult<Fingerprint> {
        Fingerprint::of(artifact)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop(SessionStatus),
}

/// Decide what follows the last record in `records`.
///
/// `best` indexes the best record among those *before* the last one.
pub fn decide<A>(records: &[IterationRecord<A>], best: Option<usize>, policy: &RefinementPolicy) -> Decision {
    let Some(current) = records.last() else {
        return Decision::Continue;
    };
    let n = records.len() as u32;

    if n < policy.min_iterations && n < policy.max_iterations {
        return Decision::Continue;
    }

    if policy.stop_on_success && current.success() {
        return Decision::Stop(SessionStatus::Succeeded);
    }

    if policy.stop_on_convergence && records.len() >= 2 {
        let previous = &records[records.len() - 2];
        if let (Some(a), Some(b)) = (&current.fingerprint, &previous.fingerprint) {
            if a == b {
                return Decision::Stop(SessionStatus::Converged);
            }
        }
    }

    if let Some(best) = best.and_then(|i| records[..records.len() - 1].get(i)) {
        if current.regressed_from(best) {
            return Decision::Stop(SessionStatus::RevertedToBest);
        }
    }

    if n >= policy.max_iterations {
        return Decision::Stop(SessionStatus::Exhausted);
    }

    Decision::Continue
}

/// Runs generate/assess/decide cycles under a [`RefinementPolicy`].
#[derive(Debug, Clone)]
pub struct RefinementController {
    policy: RefinementPolicy,
}

impl RefinementController {
    pub fn new(policy: RefinementPolicy) -> CoreResult<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &RefinementPolicy {
        &self.policy
    }

    /// Run a session to a terminal status. Cycle failures become records;
    /// only fatal collaborator or store errors are returned as `Err`.
    #[tracing::instrument(skip_all, fields(max_iterations = self.policy.max_iterations))]
    pub async fn run<T: RefinementTask>(
        &self,
        task: &T,
        cancel: &CancellationToken,
    ) -> CoreResult<RefinementSession<T::Artifact>> {
        let id = Uuid::now_v7();
        let mut records: Vec<IterationRecord<T::Artifact>> = Vec::new();

        let status = loop {
            if cancel.is_cancelled() {
                tracing::info!(session = %id, "refinement cancelled");
                break SessionStatus::Cancelled;
            }

            let best_before = best_index(&records);
            let iteration = records.len() as u32 + 1;
            let record = self.cycle(task, iteration, records.last()).await?;
            tracing::debug!(
                iteration,
                success = record.success(),
                failed = record.failure().is_some(),
                "cycle finished"
            );
            records.push(record);

            match decide(&records, best_before, &self.policy) {
                Decision::Continue => continue,
                Decision::Stop(status) => {
                    if status == SessionStatus::RevertedToBest {
                        tracing::warn!(iteration, "refinement regressed, keeping best-so-far");
                    }
                    break status;
                }
            }
        };

        let best = best_index(&records);
        tracing::info!(session = %id, ?status, iterations = records.len(), "refinement finished");
        Ok(RefinementSession {
            id,
            records,
            best,
            status,
        })
    }

    async fn cycle<T: RefinementTask>(
        &self,
        task: &T,
        iteration: u32,
        previous: Option<&IterationRecord<T::Artifact>>,
    ) -> CoreResult<IterationRecord<T::Artifact>> {
        let started_at = Utc::now();
        let failed = |reason: String| IterationRecord {
            iteration,
            started_at,
            artifact: None,
            fingerprint: None,
            outcome: CycleOutcome::Failed(reason),
        };

        let artifact = match self.call(task.generate(previous)).await {
            Ok(artifact) => artifact,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(iteration, error = %e, "generation failed");
                return Ok(failed(e.to_string()));
            }
        };

        let fingerprint = match task.fingerprint(&artifact) {
            Ok(fp) => Some(fp),
            Err(e) => {
                tracing::warn!(iteration, error = %e, "could not fingerprint artifact");
                None
            }
        };

        let outcome = match self.call(task.assess(&artifact)).await {
            Ok(assessment) => CycleOutcome::Assessed(assessment),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(iteration, error = %e, "assessment failed");
                CycleOutcome::Failed(e.to_string())
            }
        };

        Ok(IterationRecord {
            iteration,
            started_at,
            artifact: Some(artifact),
            fingerprint,
            outcome,
        })
    }

    async fn call<F, V>(&self, fut: F) -> CoreResult<V>
    where
        F: Future<Output = CoreResult<V>>,
    {
        match self.policy.call_timeout() {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| CoreError::Timeout(limit.as_millis() as u64))?,
            None => fut.await,
        }
    }
}
