//! CLI commands

mod init;
mod run;
mod score;

pub use init::InitCommand;
pub use run::RunCommand;
pub use score::ScoreCommand;
