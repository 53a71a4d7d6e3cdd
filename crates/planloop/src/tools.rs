//! Tool registry, argument canonicalization and dispatch.

pub mod builtin;
pub mod canonical;
pub mod invocation;
pub mod registry;
pub mod schema;

pub use canonical::canonicalize;
pub use invocation::{InvocationStatus, ToolInvocationRecord};
pub use registry::{DispatchFailure, ExecutionResult, ToolRegistry};
pub use schema::{Alias, ToolArgs, ToolDefinition, ToolHandler, ToolKind, ToolSpec};
