//! Declarative `key.path=value` configuration overrides
//!
//! Overrides are parsed against a fixed set of recognized keys and applied in
//! order after the configuration file has been loaded. Unknown keys and values
//! of the wrong type are rejected up front, before a run starts.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;
use super::validation::validate_config;

/// A configuration key that can be overridden
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideKey {
    SolverCommand,
    SolverWorkingDir,
    /// `solver.env.<NAME>`
    SolverEnv(String),
    EvaluatorCommand,
    Concurrency,
    PreloadOutput,
    StartingIndex,
    SkipHardQuery,
    SamplingMode,
    EvaluationMethod,
    InferenceEvaluation,
    MaxRetries,
    Reflection,
    SaveFailedTries,
    EnsembleSize,
}

const SIMPLE_PATHS: &[&str] = &[
    "solver.command",
    "solver.working_dir",
    "evaluator.command",
    "run.concurrency",
    "run.preload_output",
    "run.starting_index",
    "run.skip_hard_query",
    "run.sampling_mode",
    "run.evaluation_method",
    "run.inference_evaluation",
    "run.max_retries",
    "run.reflection",
    "run.save_failed_tries",
    "run.ensemble_size",
];

impl OverrideKey {
    /// Resolve a dotted key path
    pub fn parse(path: &str) -> Option<Self> {
        if let Some(name) = path.strip_prefix("solver.env.") {
            if name.is_empty() {
                return None;
            }
            return Some(Self::SolverEnv(name.to_string()));
        }
        let key = match path {
            "solver.command" => Self::SolverCommand,
            "solver.working_dir" => Self::SolverWorkingDir,
            "evaluator.command" => Self::EvaluatorCommand,
            "run.concurrency" => Self::Concurrency,
            "run.preload_output" => Self::PreloadOutput,
            "run.starting_index" => Self::StartingIndex,
            "run.skip_hard_query" => Self::SkipHardQuery,
            "run.sampling_mode" => Self::SamplingMode,
            "run.evaluation_method" => Self::EvaluationMethod,
            "run.inference_evaluation" => Self::InferenceEvaluation,
            "run.max_retries" => Self::MaxRetries,
            "run.reflection" => Self::Reflection,
            "run.save_failed_tries" => Self::SaveFailedTries,
            "run.ensemble_size" => Self::EnsembleSize,
            _ => return None,
        };
        Some(key)
    }

    /// Recognized key paths, for error messages
    pub fn known_paths() -> Vec<&'static str> {
        let mut paths = SIMPLE_PATHS.to_vec();
        paths.push("solver.env.<NAME>");
        paths
    }
}

/// One parsed `key=value` override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOverride {
    pub key: OverrideKey,
    pub value: String,
    expr: String,
}

impl ConfigOverride {
    /// Parse `key.path=value`
    pub fn parse(expr: &str) -> Result<Self> {
        let (path, value) = expr.split_once('=').ok_or_else(|| ConfigError::InvalidOverride {
            expr: expr.to_string(),
            message: "expected key=value".to_string(),
        })?;

        let key = OverrideKey::parse(path.trim()).ok_or_else(|| ConfigError::InvalidOverride {
            expr: expr.to_string(),
            message: format!(
                "unknown key (expected one of: {})",
                OverrideKey::known_paths().join(", ")
            ),
        })?;

        Ok(Self {
            key,
            value: value.trim().to_string(),
            expr: expr.to_string(),
        })
    }

    /// Apply this override to a configuration
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        debug!(expr = %self.expr, "applying config override");
        match &self.key {
            OverrideKey::SolverCommand => config.solver.command = self.optional_string(),
            OverrideKey::SolverWorkingDir => {
                config.solver.working_dir = self.optional_string().map(PathBuf::from)
            }
            OverrideKey::SolverEnv(name) => {
                config.solver.env.insert(name.clone(), self.value.clone());
            }
            OverrideKey::EvaluatorCommand => config.evaluator.command = self.optional_string(),
            OverrideKey::Concurrency => config.run.concurrency = self.parse_value()?,
            OverrideKey::PreloadOutput => config.run.preload_output = self.parse_bool()?,
            OverrideKey::StartingIndex => config.run.starting_index = self.parse_value()?,
            OverrideKey::SkipHardQuery => config.run.skip_hard_query = self.parse_bool()?,
            OverrideKey::SamplingMode => config.run.sampling_mode = self.parse_bool()?,
            OverrideKey::EvaluationMethod => {
                config.run.evaluation_method = self.parse_value()?
            }
            OverrideKey::InferenceEvaluation => {
                config.run.inference_evaluation = self.parse_value()?
            }
            OverrideKey::MaxRetries => config.run.max_retries = self.parse_value()?,
            OverrideKey::Reflection => config.run.reflection = self.parse_bool()?,
            OverrideKey::SaveFailedTries => config.run.save_failed_tries = self.parse_bool()?,
            OverrideKey::EnsembleSize => config.run.ensemble_size = self.parse_value()?,
        }
        Ok(())
    }

    fn optional_string(&self) -> Option<String> {
        match self.value.as_str() {
            "" | "null" | "none" => None,
            v => Some(v.to_string()),
        }
    }

    fn parse_bool(&self) -> Result<bool> {
        match self.value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(self.invalid("expected a boolean")),
        }
    }

    fn parse_value<T>(&self) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.value
            .parse::<T>()
            .map_err(|e| self.invalid(&e.to_string()))
    }

    fn invalid(&self, message: &str) -> crate::error::SortieError {
        ConfigError::InvalidOverride {
            expr: self.expr.clone(),
            message: message.to_string(),
        }
        .into()
    }
}

/// Parse and apply a list of overrides, then re-validate the result
pub fn apply_overrides(config: &mut Config, exprs: &[String]) -> Result<()> {
    for expr in exprs {
        ConfigOverride::parse(expr)?.apply(config)?;
    }
    validate_config(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceEvaluation;

    #[test]
    fn test_parse_known_key() {
        let o = ConfigOverride::parse("run.concurrency = 4").unwrap();
        assert_eq!(o.key, OverrideKey::Concurrency);
        assert_eq!(o.value, "4");
    }

    #[test]
    fn test_parse_unknown_key() {
        let err = ConfigOverride::parse("run.nope=1").unwrap_err();
        assert!(err.to_string().contains("unknown key"));
    }

    #[test]
    fn test_parse_missing_equals() {
        assert!(ConfigOverride::parse("run.concurrency").is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            &[
                "run.concurrency=2".to_string(),
                "run.reflection=true".to_string(),
                "run.inference_evaluation=no_answer+no_ask_llm".to_string(),
                "solver.command=agent --fast".to_string(),
                "solver.env.API_BASE=http://localhost:3000".to_string(),
            ],
        )
        .unwrap();

        assert_eq!(config.run.concurrency, 2);
        assert!(config.run.reflection);
        assert_eq!(
            config.run.inference_evaluation,
            InferenceEvaluation::NoAnswerNoAskLlm
        );
        assert_eq!(config.solver.command.as_deref(), Some("agent --fast"));
        assert_eq!(
            config.solver.env.get("API_BASE").map(String::as_str),
            Some("http://localhost:3000")
        );
    }

    #[test]
    fn test_apply_rejects_bad_value() {
        let mut config = Config::default();
        assert!(apply_overrides(&mut config, &["run.max_retries=many".to_string()]).is_err());
        assert!(apply_overrides(&mut config, &["run.reflection=maybe".to_string()]).is_err());
    }

    #[test]
    fn test_apply_revalidates() {
        let mut config = Config::default();
        assert!(apply_overrides(&mut config, &["run.concurrency=0".to_string()]).is_err());
    }

    #[test]
    fn test_null_clears_command() {
        let mut config = Config::default();
        config.evaluator.command = Some("judge".to_string());
        apply_overrides(&mut config, &["evaluator.command=null".to_string()]).unwrap();
        assert!(config.evaluator.command.is_none());
    }
}
