//! Tool registry and dispatch.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::store::Store;

use super::canonical::canonicalize;
use super::invocation::{InvocationStatus, ToolInvocationRecord};
use super::schema::{ToolArgs, ToolDefinition, ToolKind, ToolSpec};

/// Result of a successful tool execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The JSON value returned by the tool handler.
    pub result: Value,
    /// The invocation record capturing timing and status.
    pub invocation: ToolInvocationRecord,
}

/// A dispatch that did not produce a result.
#[derive(Debug, Clone)]
pub struct DispatchFailure {
    pub error: CoreError,
    /// Present when the handler ran.
    pub invocation: Option<ToolInvocationRecord>,
}

impl DispatchFailure {
    fn before_handler(error: CoreError) -> Self {
        Self {
            error,
            invocation: None,
        }
    }
}

/// Lookup table from tool name to definition, built explicitly at startup.
/// Several registries (one per domain) can coexist.
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Names are unique within a registry.
    pub fn register(&mut self, tool: ToolDefinition) -> CoreResult<()> {
        if self.tools.contains_key(tool.name()) {
            return Err(CoreError::InvalidInput(format!(
                "duplicate tool: {}",
                tool.name()
            )));
        }
        self.tools.insert(tool.name().to_string(), tool);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// Look up a tool that may appear in a step's validations.
    pub fn lookup_validation(&self, name: &str) -> CoreResult<&ToolDefinition> {
        let tool = self
            .lookup(name)
            .ok_or_else(|| CoreError::UnknownTool(name.to_string()))?;
        if tool.spec.kind != ToolKind::Validation {
            return Err(CoreError::InvalidInput(format!(
                "'{name}' is not a validation tool"
            )));
        }
        Ok(tool)
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    /// Tool signatures sorted by name, for the plan collaborator.
    pub fn catalog(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Canonicalize argument names for `name`. Unknown tools pass through.
    pub fn canonicalize(&self, name: &str, args: &Map<String, Value>) -> Map<String, Value> {
        match self.lookup(name) {
            Some(tool) => canonicalize(&tool.spec, args),
            None => args.clone(),
        }
    }

    /// Required arguments absent from `args`. A present null satisfies the
    /// signature; the tool decides what null means.
    pub fn missing_required(&self, name: &str, args: &Map<String, Value>) -> CoreResult<Vec<String>> {
        let tool = self
            .lookup(name)
            .ok_or_else(|| CoreError::UnknownTool(name.to_string()))?;
        Ok(tool.spec.missing(|arg| args.contains_key(arg)))
    }

    /// Run a tool: lookup, signature check, handler.
    ///
    /// Handler errors come back as [`CoreError::Tool`], except fatal store
    /// errors which propagate unchanged.
    pub fn dispatch(
        &self,
        name: &str,
        args: Map<String, Value>,
        store: &dyn Store,
    ) -> CoreResult<ExecutionResult> {
        self.dispatch_recorded(name, args, store)
            .map_err(|failure| failure.error)
    }

    /// Like [`dispatch`](Self::dispatch), but a failure keeps the invocation
    /// record when the handler got to run.
    pub fn dispatch_recorded(
        &self,
        name: &str,
        args: Map<String, Value>,
        store: &dyn Store,
    ) -> Result<ExecutionResult, DispatchFailure> {
        let tool = self
            .lookup(name)
            .ok_or_else(|| DispatchFailure::before_handler(CoreError::UnknownTool(name.to_string())))?;

        let missing = tool.spec.missing(|arg| args.contains_key(arg));
        if !missing.is_empty() {
            return Err(DispatchFailure::before_handler(CoreError::MissingArguments {
                tool: name.to_string(),
                missing,
            }));
        }

        let args = ToolArgs::new(args);
        let started_at = Utc::now();
        let handler_result = (tool.handler)(&args, store);
        let ended_at = Utc::now();

        match handler_result {
            Ok(result) => {
                let invocation = ToolInvocationRecord::new(
                    name,
                    tool.spec.kind,
                    started_at,
                    ended_at,
                    InvocationStatus::Success,
                );
                tracing::debug!(tool = name, duration_ms = invocation.duration_ms, "tool executed");
                Ok(ExecutionResult { result, invocation })
            }
            Err(e) => {
                tracing::debug!(tool = name, error = %e, "tool failed");
                let invocation = ToolInvocationRecord::new(
                    name,
                    tool.spec.kind,
                    started_at,
                    ended_at,
                    InvocationStatus::Failed,
                )
                .with_error(e.to_string());
                let error = if e.is_fatal() {
                    e
                } else {
                    CoreError::Tool {
                        tool: name.to_string(),
                        message: tool_message(e),
                    }
                };
                Err(DispatchFailure {
                    error,
                    invocation: Some(invocation),
                })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn tool_message(err: CoreError) -> String {
    match err {
        CoreError::InvalidInput(msg) | CoreError::Internal(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn make_tool(name: &str, kind: ToolKind) -> ToolDefinition {
        ToolDefinition::new(
            ToolSpec::new(name, kind).require(&["name"]),
            |_args, _store| Ok(json!({"ok": true})),
        )
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_registry() {
        let reg = ToolRegistry::new();
        assert_eq!(reg.len(), 0);
        assert!(reg.is_empty());
        assert!(reg.lookup("any").is_none());
        assert!(reg.catalog().is_empty());
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(make_tool("read_file", ToolKind::Read)).unwrap();
        assert_eq!(reg.lookup("read_file").unwrap().name(), "read_file");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_tool_is_rejected() {
        let mut reg = ToolRegistry::new();
        reg.register(make_tool("dup", ToolKind::Read)).unwrap();
        let err = reg.register(make_tool("dup", ToolKind::Read)).unwrap_err();
        assert!(err.to_string().contains("duplicate tool"));
    }

    #[test]
    fn catalog_is_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(make_tool("b", ToolKind::Read)).unwrap();
        reg.register(make_tool("a", ToolKind::Compute)).unwrap();
        let names: Vec<String> = reg.catalog().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(reg.names(), vec!["a", "b"]);
    }

    #[test]
    fn lookup_validation_rejects_action_tools() {
        let mut reg = ToolRegistry::new();
        reg.register(make_tool("assert_true", ToolKind::Validation)).unwrap();
        reg.register(make_tool("update", ToolKind::Mutate)).unwrap();
        assert!(reg.lookup_validation("assert_true").is_ok());
        assert!(matches!(reg.lookup_validation("update"), Err(CoreError::InvalidInput(_))));
        assert!(matches!(reg.lookup_validation("nope"), Err(CoreError::UnknownTool(_))));
    }

    #[test]
    fn unknown_tool_is_not_dispatched() {
        let reg = ToolRegistry::new();
        let store = MemoryStore::new();
        let result = reg.dispatch("nonexistent", Map::new(), &store);
        assert!(matches!(result, Err(CoreError::UnknownTool(_))));
    }

    #[test]
    fn missing_args_are_rejected_before_the_handler_runs() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolDefinition::new(
            ToolSpec::new("guarded", ToolKind::Mutate).require(&["name"]),
            |_args, _store| Err(CoreError::Internal("handler should not run".into())),
        ))
        .unwrap();
        let store = MemoryStore::new();
        let failure = reg.dispatch_recorded("guarded", Map::new(), &store).unwrap_err();
        assert!(failure.invocation.is_none());
        assert_eq!(
            failure.error,
            CoreError::MissingArguments {
                tool: "guarded".into(),
                missing: vec!["name".into()]
            }
        );
    }

    #[test]
    fn present_null_satisfies_signature() {
        let reg = {
            let mut reg = ToolRegistry::new();
            reg.register(make_tool("t", ToolKind::Validation)).unwrap();
            reg
        };
        assert!(reg
            .missing_required("t", &args(json!({"name": null})))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn successful_dispatch_records_invocation() {
        let mut reg = ToolRegistry::new();
        reg.register(make_tool("echo", ToolKind::Compute)).unwrap();
        let store = MemoryStore::new();
        let out = reg.dispatch("echo", args(json!({"name": "x"})), &store).unwrap();
        assert_eq!(out.result, json!({"ok": true}));
        assert_eq!(out.invocation.tool, "echo");
        assert_eq!(out.invocation.status, InvocationStatus::Success);
    }

    #[test]
    fn handler_failure_becomes_tool_error() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolDefinition::new(
            ToolSpec::new("boom", ToolKind::Mutate),
            |_args, _store| Err(CoreError::InvalidInput("item_not_found".into())),
        ))
        .unwrap();
        let store = MemoryStore::new();
        let failure = reg.dispatch_recorded("boom", Map::new(), &store).unwrap_err();
        assert_eq!(
            failure.error,
            CoreError::Tool {
                tool: "boom".into(),
                message: "item_not_found".into()
            }
        );
        let invocation = failure.invocation.unwrap();
        assert_eq!(invocation.status, InvocationStatus::Failed);
        assert_eq!(invocation.error.as_deref(), Some("invalid input: item_not_found"));
    }

    #[test]
    fn store_unavailable_propagates_unchanged() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolDefinition::new(
            ToolSpec::new("read", ToolKind::Read),
            |_args, _store| Err(CoreError::StoreUnavailable("connection refused".into())),
        ))
        .unwrap();
        let store = MemoryStore::new();
        let err = reg.dispatch("read", Map::new(), &store).unwrap_err();
        assert!(err.is_fatal());
    }
}
