//! Exit codes for the CLI

use sortie_core::{ConfigError, RunError, SortieError};
use sortie_tasks::{BatchError, JournalError, SourceError};

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Task input missing or unreadable
pub const INPUT_ERROR: i32 = 3;

/// Output journal could not be written
pub const JOURNAL_ERROR: i32 = 4;

/// Map an error to the process exit code
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SortieError>() {
            match e {
                SortieError::Config(_) | SortieError::Run(RunError::NoSolver) => {
                    return CONFIG_ERROR
                }
                SortieError::Run(RunError::InputNotFound(_)) => return INPUT_ERROR,
                SortieError::Run(RunError::JournalUnavailable { .. }) => return JOURNAL_ERROR,
                _ => {}
            }
        }
        if cause.is::<ConfigError>() {
            return CONFIG_ERROR;
        }
        if cause.is::<SourceError>() {
            return INPUT_ERROR;
        }
        if cause.is::<BatchError>() || cause.is::<JournalError>() {
            return JOURNAL_ERROR;
        }
    }
    ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::path::PathBuf;

    #[test]
    fn test_config_errors() {
        let err = anyhow::Error::from(SortieError::from(ConfigError::MissingField(
            "solver.command".to_string(),
        )));
        assert_eq!(for_error(&err), CONFIG_ERROR);

        let err = anyhow::Error::from(SortieError::from(RunError::NoSolver));
        assert_eq!(for_error(&err), CONFIG_ERROR);
    }

    #[test]
    fn test_wrapped_errors() {
        let err: anyhow::Result<()> = Err(SortieError::from(RunError::InputNotFound(
            PathBuf::from("tasks.jsonl"),
        ))
        .into());
        let err = err.context("reading tasks").unwrap_err();
        assert_eq!(for_error(&err), INPUT_ERROR);
    }

    #[test]
    fn test_other_errors() {
        assert_eq!(for_error(&anyhow::anyhow!("boom")), ERROR);
    }
}
