//! Iteration records and refinement sessions.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::ExecutionReport;
use crate::plan::Fingerprint;

/// Quality signal for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub success: bool,
    /// Higher is better. Compared only when success flags are equal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Present for plan artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ExecutionReport>,
}

impl Assessment {
    pub fn new(success: bool) -> Self {
        Self {
            success,
            score: None,
            feedback: None,
            report: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CycleOutcome {
    Assessed(Assessment),
    /// Generation or assessment failed: malformed output, timeout, logic
    /// error. Counts against the budget.
    Failed(String),
}

/// One generate/assess cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord<A> {
    /// 1-based.
    pub iteration: u32,
    pub started_at: DateTime<Utc>,
    pub artifact: Option<A>,
    pub fingerprint: Option<Fingerprint>,
    pub outcome: CycleOutcome,
}

impl<A> IterationRecord<A> {
    pub fn success(&self) -> bool {
        matches!(&self.outcome, CycleOutcome::Assessed(a) if a.success)
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        match &self.outcome {
            CycleOutcome::Assessed(a) => Some(a),
            CycleOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.outcome {
            CycleOutcome::Failed(reason) => Some(reason),
            CycleOutcome::Assessed(_) => None,
        }
    }

    /// Feedback to carry into the next generation.
    pub fn feedback(&self) -> Option<&str> {
        match &self.outcome {
            CycleOutcome::Assessed(a) => a.feedback.as_deref(),
            CycleOutcome::Failed(reason) => Some(reason),
        }
    }

    /// Ordering used to pick the best record: failed cycles rank lowest,
    /// then success, then score.
    pub(crate) fn rank(&self) -> Option<(bool, f64)> {
        self.assessment().map(|a| {
            let score = a.score.unwrap_or(if a.success { 1.0 } else { 0.0 });
            (a.success, score)
        })
    }

    /// A failed cycle only regresses from a successful best; it otherwise
    /// spends budget like any other unsuccessful cycle.
    pub(crate) fn regressed_from(&self, best: &Self) -> bool {
        match &self.outcome {
            CycleOutcome::Failed(_) => best.success(),
            CycleOutcome::Assessed(_) => self.compare(best).is_lt(),
        }
    }

    pub(crate) fn compare(&self, other: &Self) -> Ordering {
        match (self.rank(), other.rank()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some((s1, q1)), Some((s2, q2))) => s1
                .cmp(&s2)
                .then(q1.partial_cmp(&q2).unwrap_or(Ordering::Equal)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Succeeded,
    Converged,
    Exhausted,
    RevertedToBest,
    Cancelled,
}

/// Full history of one refinement task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementSession<A> {
    pub id: Uuid,
    pub records: Vec<IterationRecord<A>>,
    /// Index into `records`.
    pub best: Option<usize>,
    pub status: SessionStatus,
}

impl<A> RefinementSession<A> {
    /// The record the session reports as its output.
    pub fn final_record(&self) -> Option<&IterationRecord<A>> {
        self.best.and_then(|i| self.records.get(i))
    }

    pub fn final_artifact(&self) -> Option<&A> {
        self.final_record().and_then(|r| r.artifact.as_ref())
    }

    pub fn iterations(&self) -> usize {
        self.records.len()
    }

    pub fn succeeded(&self) -> bool {
        self.final_record().map(|r| r.success()).unwrap_or(false)
    }
}

/// Index of the best record; ties go to the later record.
pub(crate) fn best_index<A>(records: &[IterationRecord<A>]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, record) in records.iter().enumerate() {
        match best {
            Some(b) if record.compare(&records[b]) == Ordering::Less => {}
            _ => best = Some(i),
        }
    }
    best
}
