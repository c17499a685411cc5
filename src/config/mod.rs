// Configuration management module
// TOML settings, environment overrides and interactive setup

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, IndexBackend, IndexConfig, OllamaConfig, ServiceConfig,
};

