//! Refinement policy presets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Thresholds the controller runs with. The controller itself has no
/// opinion about generator strength; pick a preset or build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementPolicy {
    pub max_iterations: u32,
    /// Cycles to run before any stop condition is considered.
    pub min_iterations: u32,
    pub stop_on_success: bool,
    pub stop_on_convergence: bool,
    /// Per collaborator call. `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,
}

impl RefinementPolicy {
    /// Reliable generators: one confirmation cycle at most.
    pub fn strong() -> Self {
        Self::preset(2, 1, true)
    }

    pub fn medium() -> Self {
        Self::preset(3, 1, true)
    }

    /// Weak generators: always refine at least once, never trust a
    /// first-pass success.
    pub fn weak() -> Self {
        Self::preset(5, 2, false)
    }

    fn preset(max_iterations: u32, min_iterations: u32, stop_on_success: bool) -> Self {
        Self {
            max_iterations,
            min_iterations,
            stop_on_success,
            stop_on_convergence: true,
            call_timeout_ms: None,
        }
    }

    /// Preset for a model identifier such as `gpt-4o-mini` or
    /// `claude-3-opus-20240229`.
    pub fn for_model(model: &str) -> Self {
        let model = model.to_lowercase();
        let is = |needle: &str| model.contains(needle);

        if is("gpt-4o-mini") || is("gpt-3.5") || is("claude-3-sonnet") {
            Self::medium()
        } else if is("gpt-4") || is("claude-3.5") || is("claude-3-5") || is("claude-3-opus") {
            Self::strong()
        } else {
            Self::weak()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.max_iterations == 0 {
            return Err(CoreError::Config("max_iterations must be at least 1".into()));
        }
        if self.min_iterations > self.max_iterations {
            return Err(CoreError::Config(format!(
                "min_iterations ({}) exceeds max_iterations ({})",
                self.min_iterations, self.max_iterations
            )));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(CoreError::Config("call_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self::medium()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let strong = RefinementPolicy::strong();
        assert_eq!((strong.max_iterations, strong.min_iterations, strong.stop_on_success), (2, 1, true));
        let weak = RefinementPolicy::weak();
        assert_eq!((weak.max_iterations, weak.min_iterations, weak.stop_on_success), (5, 2, false));
        assert!(weak.stop_on_convergence);
    }

    #[test]
    fn model_selection() {
        assert_eq!(RefinementPolicy::for_model("gpt-4-turbo"), RefinementPolicy::strong());
        assert_eq!(RefinementPolicy::for_model("claude-3-opus-20240229"), RefinementPolicy::strong());
        assert_eq!(RefinementPolicy::for_model("claude-3.5-sonnet"), RefinementPolicy::strong());
        assert_eq!(RefinementPolicy::for_model("gpt-4o-mini"), RefinementPolicy::medium());
        assert_eq!(RefinementPolicy::for_model("GPT-3.5-turbo"), RefinementPolicy::medium());
        assert_eq!(RefinementPolicy::for_model("llama-3-8b"), RefinementPolicy::weak());
    }

    #[test]
    fn validate_rejects_bad_bounds() {
        let mut policy = RefinementPolicy::medium();
        policy.max_iterations = 0;
        assert!(policy.validate().is_err());

        let mut policy = RefinementPolicy::medium();
        policy.min_iterations = 4;
        assert!(policy.validate().is_err());

        assert!(RefinementPolicy::weak().with_timeout(Duration::from_secs(30)).validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let policy: RefinementPolicy = serde_json::from_str(r#"{"max_iterations": 4}"#).unwrap();
        assert_eq!(policy.max_iterations, 4);
        assert_eq!(policy.min_iterations, 1);
        assert!(policy.stop_on_success);
    }
}
