//! Configuration system for Sortie

pub mod defaults;
mod loader;
pub mod overrides;
mod types;
pub mod validation;

pub use defaults::*;
pub use loader::*;
pub use overrides::{apply_overrides, ConfigOverride, OverrideKey};
pub use types::*;
pub use validation::*;
