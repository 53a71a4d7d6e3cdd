//! Per-call timing and status, kept for every dispatched tool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schema::ToolKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub tool: String,
    pub kind: ToolKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Zero when the clock went backwards.
    pub duration_ms: u64,
    pub status: InvocationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolInvocationRecord {
    pub fn new(
        tool: impl Into<String>,
        kind: ToolKind,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        status: InvocationStatus,
    ) -> Self {
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            tool: tool.into(),
            kind,
            started_at,
            ended_at,
            duration_ms,
            status,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status == InvocationStatus::Success
    }
}
