//! Default configuration values

use super::types::Config;

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "sortie.yaml";

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "sortie.toml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".sortie.yaml";

/// Environment variable used to resolve task file references
pub const FILE_BASE_DIR_ENV: &str = "FILE_BASE_DIR";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_YAML,
        DEFAULT_CONFIG_TOML,
        ALT_CONFIG_FILE,
        ".sortie.toml",
    ]
}

/// Generate default configuration YAML
pub fn default_config_yaml() -> String {
    let config = Config::default();
    serde_yaml::to_string(&config).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Sortie Configuration

solver:
  # Invoked once per attempt. The prompt arrives on stdin; the command must
  # print a session JSON object on stdout.
  command: "my-agent --json"
  env: {}

evaluator:
  # Needed only for gpt_judge / llm_score evaluation.
  command: null

run:
  concurrency: 10
  preload_output: true
  starting_index: 0
  skip_hard_query: false
  sampling_mode: false
  evaluation_method: disabled
  inference_evaluation: disabled
  max_retries: 3
  reflection: false
  save_failed_tries: false
  ensemble_size: 5
"#;
