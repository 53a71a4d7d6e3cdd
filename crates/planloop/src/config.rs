//! Engine configuration: JSON file plus environment overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::refine::RefinementPolicy;

pub const ENV_MAX_ITERATIONS: &str = "PLANLOOP_MAX_ITERATIONS";
pub const ENV_STOP_ON_FAILED_VALIDATION: &str = "PLANLOOP_STOP_ON_FAILED_VALIDATION";
pub const ENV_MODEL: &str = "PLANLOOP_MODEL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Halt the plan at the first failed step. Turning this off runs every
    /// step, which is only useful for diagnostics.
    pub stop_on_failed_validation: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            stop_on_failed_validation: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub executor: ExecutorConfig,
    /// Explicit refinement policy. When absent the preset for `model` is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementPolicy>,
    /// Generator model identifier, used only to pick a policy preset.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
}

impl EngineConfig {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|error| {
            CoreError::Config(format!("failed to read config {}: {error}", path.display()))
        })?;
        let config: EngineConfig = serde_json::from_str(&data).map_err(|error| {
            CoreError::Config(format!("failed to parse config {}: {error}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise; environment overrides
    /// apply either way.
    pub fn load_or_default(path: Option<&Path>) -> CoreResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> CoreResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> CoreResult<()> {
        if self.model.is_empty() {
            if let Some(model) = var(ENV_MODEL) {
                self.model = model;
            }
        }
        if let Some(raw) = var(ENV_STOP_ON_FAILED_VALIDATION) {
            self.executor.stop_on_failed_validation = parse_bool(ENV_STOP_ON_FAILED_VALIDATION, &raw)?;
        }
        if let Some(raw) = var(ENV_MAX_ITERATIONS) {
            let max: u32 = raw.trim().parse().map_err(|_| {
                CoreError::Config(format!("{ENV_MAX_ITERATIONS} must be a positive integer, got '{raw}'"))
            })?;
            let mut policy = self.refinement_policy();
            policy.max_iterations = max;
            policy.min_iterations = policy.min_iterations.min(max);
            self.refinement = Some(policy);
        }
        self.validate()
    }

    /// The explicit policy, or the preset for the configured model.
    pub fn refinement_policy(&self) -> RefinementPolicy {
        match &self.refinement {
            Some(policy) => policy.clone(),
            None if !self.model.is_empty() => RefinementPolicy::for_model(&self.model),
            None => RefinementPolicy::default(),
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.refinement_policy().validate()
    }
}

fn parse_bool(key: &str, raw: &str) -> CoreResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Config(format!("{key} must be a boolean, got '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(config.executor.stop_on_failed_validation);
        assert_eq!(config.refinement_policy(), RefinementPolicy::medium());
    }

    #[test]
    fn model_selects_preset() {
        let config = EngineConfig {
            model: "gpt-4-turbo".into(),
            ..Default::default()
        };
        assert_eq!(config.refinement_policy(), RefinementPolicy::strong());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"executor": {{"stop_on_failed_validation": false}}, "refinement": {{"max_iterations": 4, "min_iterations": 2, "stop_on_success": false}}}}"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert!(!config.executor.stop_on_failed_validation);
        let policy = config.refinement_policy();
        assert_eq!(policy.max_iterations, 4);
        assert_eq!(policy.min_iterations, 2);
        assert!(policy.stop_on_convergence);
    }

    #[test]
    fn load_rejects_invalid_policy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"refinement": {{"max_iterations": 1, "min_iterations": 3}}}}"#).unwrap();
        assert!(matches!(EngineConfig::load(file.path()), Err(CoreError::Config(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn env_overrides() {
        let mut config = EngineConfig {
            refinement: Some(RefinementPolicy::weak()),
            ..Default::default()
        };
        config
            .apply_overrides(vars(&[
                (ENV_MAX_ITERATIONS, "1"),
                (ENV_STOP_ON_FAILED_VALIDATION, "off"),
            ]))
            .unwrap();
        assert!(!config.executor.stop_on_failed_validation);
        let policy = config.refinement_policy();
        assert_eq!(policy.max_iterations, 1);
        assert_eq!(policy.min_iterations, 1);
    }

    #[test]
    fn env_model_fills_empty_model_only() {
        let mut config = EngineConfig::default();
        config.apply_overrides(vars(&[(ENV_MODEL, "llama-3")])).unwrap();
        assert_eq!(config.refinement_policy(), RefinementPolicy::weak());

        let mut config = EngineConfig {
            model: "gpt-4".into(),
            ..Default::default()
        };
        config.apply_overrides(vars(&[(ENV_MODEL, "llama-3")])).unwrap();
        assert_eq!(config.model, "gpt-4");
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut config = EngineConfig::default();
        assert!(config.apply_overrides(vars(&[(ENV_MAX_ITERATIONS, "many")])).is_err());
        assert!(config
            .apply_overrides(vars(&[(ENV_STOP_ON_FAILED_VALIDATION, "maybe")]))
            .is_err());
    }
}
