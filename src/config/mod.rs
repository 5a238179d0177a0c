// Configuration management
// TOML settings under the base directory plus the interactive setup flow

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, LlmConfig, OllamaConfig, PromptConfig, SourcesConfig,
    optional_credential, require_credential,
};

/// Get the default base directory path
#[inline]
pub fn get_base_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_base_dir()
}
