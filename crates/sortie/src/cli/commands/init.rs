//! Init command

use std::path::PathBuf;

use clap::Args;
use console::style;
use dialoguer::{Confirm, Select};
use tracing::info;

use sortie_core::config::{validate_config, Config, DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_YAML};

use crate::cli::{output, Cli};

/// Configuration file formats `init` can write
const FORMATS: &[&str] = &["yaml", "toml"];

/// Initialize a new Sortie configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Use defaults without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, yes = self.yes, "executing init command");
        let cwd = std::env::current_dir()?;
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_YAML));

        if config_path.exists() && !self.force {
            if self.yes {
                anyhow::bail!(
                    "Configuration file already exists at {}. Use --force to overwrite.",
                    config_path.display()
                );
            }

            let overwrite = Confirm::new()
                .with_prompt(format!(
                    "Configuration file already exists at {}. Overwrite?",
                    config_path.display()
                ))
                .default(false)
                .interact()?;

            if !overwrite {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        let format = if self.yes {
            FORMATS[0]
        } else {
            let selection = Select::new()
                .with_prompt("Configuration format")
                .items(FORMATS)
                .default(0)
                .interact()?;
            FORMATS[selection]
        };

        let config_path = config_path_for(config_path, format);
        let content = render_config(format)?;
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, &content)?;
        info!(path = %config_path.display(), format, "configuration written");

        if !cli.quiet {
            output::success(&format!("Created configuration at {}", output::path(&config_path)));
            println!();
            println!("Next steps:");
            println!(
                "  1. Set {} in {} to your agent command",
                style("solver.command").bold(),
                config_path.display()
            );
            println!(
                "  2. Run {} to process a task file",
                style("sortie run -i tasks.jsonl -o results.jsonl").cyan()
            );
            println!(
                "  3. Run {} to re-score the results",
                style("sortie score results.jsonl").cyan()
            );
        }

        Ok(())
    }
}

/// Swap a `.yaml` extension for `.toml` when writing TOML
fn config_path_for(path: PathBuf, format: &str) -> PathBuf {
    if format == "toml" && path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
        path.with_extension("toml")
    } else {
        path
    }
}

/// Render the starter configuration in the chosen format
fn render_config(format: &str) -> anyhow::Result<String> {
    let config: Config = serde_yaml::from_str(DEFAULT_CONFIG_TEMPLATE)?;
    validate_config(&config)?;
    if format == "toml" {
        Ok(toml::to_string_pretty(&config)?)
    } else {
        Ok(DEFAULT_CONFIG_TEMPLATE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_for_toml() {
        assert_eq!(
            config_path_for(PathBuf::from("sortie.yaml"), "toml"),
            PathBuf::from("sortie.toml")
        );
        assert_eq!(
            config_path_for(PathBuf::from("sortie.yaml"), "yaml"),
            PathBuf::from("sortie.yaml")
        );
        assert_eq!(
            config_path_for(PathBuf::from("custom.conf"), "toml"),
            PathBuf::from("custom.conf")
        );
    }

    #[test]
    fn test_rendered_configs_parse_back() {
        let yaml: Config = serde_yaml::from_str(&render_config("yaml").unwrap()).unwrap();
        let toml: Config = toml::from_str(&render_config("toml").unwrap()).unwrap();
        assert_eq!(yaml, toml);
        assert!(yaml.solver.command.is_some());
    }
}
