pub mod error;
pub mod config;

pub mod store;
pub mod context;
pub mod tools;
pub mod plan;
pub mod executor;
pub mod refine;
pub mod collaborator;
pub mod agent;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::agent::{AgentOptions, AgentOutcome, CommitOutcome, PlanAgent};
pub use crate::collaborator::{ArtifactCollaborator, Evaluation, PlanCollaborator};
pub use crate::config::{EngineConfig, ExecutorConfig};
pub use crate::error::{CoreError, CoreResult};
pub use crate::executor::{ExecutionReport, PlanExecutor};
pub use crate::plan::{parse_plan, Plan};
pub use crate::refine::{RefinementController, RefinementPolicy, RefinementSession, SessionStatus};
pub use crate::store::{MemoryStore, SharedStore, Store};
pub use crate::tools::ToolRegistry;
