//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{Config, EvaluationMethod};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_run(config)?;
    validate_solver(config)?;
    validate_evaluator(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_run(config: &Config) -> Result<()> {
    if config.run.concurrency == 0 {
        return Err(ConfigError::InvalidValue {
            field: "run.concurrency".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    if config.run.max_retries == 0 {
        return Err(ConfigError::InvalidValue {
            field: "run.max_retries".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    if config.run.ensemble_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "run.ensemble_size".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_solver(config: &Config) -> Result<()> {
    if let Some(command) = &config.solver.command {
        if command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "solver.command".to_string(),
                message: "command cannot be empty".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn validate_evaluator(config: &Config) -> Result<()> {
    let has_command = config
        .evaluator
        .command
        .as_ref()
        .is_some_and(|c| !c.trim().is_empty());

    if config.run.inference_evaluation.uses_judge() && !has_command {
        return Err(ConfigError::InvalidValue {
            field: "evaluator.command".to_string(),
            message: format!(
                "required for inference evaluation '{}'",
                config.run.inference_evaluation
            ),
        }
        .into());
    }

    if config.run.sampling_mode
        && config.run.evaluation_method == EvaluationMethod::LlmScore
        && !has_command
    {
        return Err(ConfigError::InvalidValue {
            field: "evaluator.command".to_string(),
            message: "required for evaluation method 'llm_score'".to_string(),
        }
        .into());
    }

    Ok(())
}
