pub mod ask;
pub mod chat;
pub mod init;
pub mod serve;
pub mod tools;

use sleuth_config::AppConfig;
use std::path::{Path, PathBuf};

/// The config file in use: `--config` or the default location.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load configuration with environment overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load_with_env(&config_path(path))
        .map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  WARNING: No API key configured.");
        eprintln!("  Set SLEUTH_API_KEY (or GROQ_API_KEY / OPENROUTER_API_KEY / OPENAI_API_KEY),");
        eprintln!("  or add `api_key` to {}", config_path(path).display());
        eprintln!();
    }
    Ok(config)
}
