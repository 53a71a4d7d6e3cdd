use crate::context::ResolveError;

/// Unified error type for the planloop crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Invalid input provided by the caller or by a plan.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Collaborator output could not be parsed into a plan, even after repair.
    #[error("malformed plan: {0}")]
    MalformedPlan(String),
    /// No tool is registered under this name.
    #[error("unknown tool: '{0}'")]
    UnknownTool(String),
    /// Required arguments still absent after canonicalization.
    #[error("missing required args for tool '{tool}': {missing:?}")]
    MissingArguments { tool: String, missing: Vec<String> },
    /// A context reference could not be resolved.
    #[error("unresolved reference: {0}")]
    Resolution(#[from] ResolveError),
    /// A dispatched tool raised an error.
    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },
    /// A collaborator call exceeded its deadline.
    #[error("timed out after {0} ms")]
    Timeout(u64),
    /// The store backing the execution context is unreachable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// The LLM collaborator is unreachable.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
    /// Operation is not supported by this implementation.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Configuration could not be loaded or failed validation.
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("json error: {0}")]
    Json(String),
    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Connectivity failures of the core's dependencies. These are the only
    /// errors allowed to escape a plan execution or a refinement session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::StoreUnavailable(_) | CoreError::CollaboratorUnavailable(_)
        )
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Json(err.to_string())
    }
}

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;
