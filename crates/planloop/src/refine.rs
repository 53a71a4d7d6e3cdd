//! Adaptive refinement: generate, assess, decide.

pub mod controller;
pub mod policy;
pub mod session;
pub mod tasks;


pub use controller::{decide, Decision, RefinementController, RefinementTask};
pub use policy::RefinementPolicy;
pub use session::{Assessment, CycleOutcome, IterationRecord, RefinementSession, SessionStatus};
pub use tasks::{ArtifactRefinement, PlanRefinement};
