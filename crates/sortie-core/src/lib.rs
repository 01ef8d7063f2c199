//! Sortie Core - Shared configuration and error types
//!
//! This crate provides the error taxonomy and the configuration layer
//! (file loading, validation, declarative overrides) used by the task
//! engine and the CLI.

pub mod config;
pub mod error;

pub use config::{Config, EvaluationMethod, InferenceEvaluation, RunConfig};
pub use error::{ConfigError, Result, RunError, SortieError};
