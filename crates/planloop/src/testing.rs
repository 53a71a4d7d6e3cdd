//! Shared fixtures for unit tests: a seeded shop and a scripted planner.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::collaborator::PlanCollaborator;
use crate::error::{CoreError, CoreResult};
use crate::executor::ExecutionReport;
use crate::plan::Plan;
use crate::store::{MemoryStore, Record};
use crate::tools::builtin::{INVENTORY, TRANSACTIONS};
use crate::tools::ToolSpec;

/// Buys 50 of X with the stock check after the mutation.
pub(crate) const OVERSELL: &str = r#"{"reasoning":"buy 50","steps":[
  {"step_number":1,"description":"lookup","tools":[{"use":"lookup_product","args":{"name":"X"},"result_key":"prod"}]},
  {"step_number":2,"description":"buy","tools":[{"use":"update_inventory","args":{"item_id":"context.prod.item.item_id","delta":-50},"result_key":"upd"}],
   "validations":[{"name":"stock_ok","use_tool":"assert_nonnegative_stock","args":{"item_id":"context.prod.item.item_id"}}]}]}"#;

/// Revision that checks stock first and buys 2.
pub(crate) const GUARDED: &str = r#"{"critique":"check stock before mutating","revised_plan":{"reasoning":"buy 2","steps":[
  {"step_number":1,"description":"lookup","tools":[{"use":"lookup_product","args":{"name":"X"},"result_key":"prod"}]},
  {"step_number":2,"description":"check","validations":[{"name":"enough","use_tool":"assert_sufficient_stock","args":{"item_id":"context.prod.item.item_id","qty":2}}]},
  {"step_number":3,"description":"buy","tools":[{"use":"update_inventory","args":{"item_id":"context.prod.item.item_id","delta":-2},"result_key":"upd"}]}]}}"#;

pub(crate) fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

/// Item X: 10 in stock at 5.0, no transactions.
pub(crate) fn shop() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_collection(
                INVENTORY,
                "item_id",
                vec![record(json!({"item_id": "X", "name": "X", "quantity_in_stock": 10, "price": 5}))],
            )
            .with_collection(TRANSACTIONS, "transaction_id", Vec::new()),
    )
}

/// Replays canned responses; runs dry once a queue is empty.
pub(crate) struct ScriptedPlanner {
    drafts: Mutex<VecDeque<String>>,
    revisions: Mutex<VecDeque<String>>,
    explanation: Option<String>,
    /// Whether each critique call received an execution report.
    pub(crate) seen_reports: Mutex<Vec<bool>>,
}

impl ScriptedPlanner {
    pub(crate) fn new(drafts: &[&str], revisions: &[&str]) -> Self {
        Self {
            drafts: Mutex::new(drafts.iter().map(|s| s.to_string()).collect()),
            revisions: Mutex::new(revisions.iter().map(|s| s.to_string()).collect()),
            explanation: None,
            seen_reports: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn explaining(mut self, explanation: &str) -> Self {
        self.explanation = Some(explanation.to_string());
        self
    }
}

#[async_trait]
impl PlanCollaborator for ScriptedPlanner {
    async fn generate_plan(&self, _request: &str, catalog: &[ToolSpec]) -> CoreResult<String> {
        assert!(!catalog.is_empty());
        self.drafts
            .lock()
            .pop_front()
            .ok_or_else(|| CoreError::CollaboratorUnavailable("no more drafts".into()))
    }

    async fn critique_and_revise(
        &self,
        _request: &str,
        _plan: &Plan,
        report: Option<&ExecutionReport>,
        _catalog: &[ToolSpec],
    ) -> CoreResult<String> {
        self.seen_reports.lock().push(report.is_some());
        self.revisions
            .lock()
            .pop_front()
            .ok_or_else(|| CoreError::CollaboratorUnavailable("no more revisions".into()))
    }

    async fn explain_failure(&self, _request: &str, _report: &ExecutionReport) -> CoreResult<Option<String>> {
        Ok(self.explanation.clone())
    }
}
