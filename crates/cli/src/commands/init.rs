//! `sleuth init`: write a default config file.

use sleuth_config::AppConfig;
use std::path::Path;

pub async fn run(config: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_path(config);

    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Edit it, or re-run with --force to overwrite.");
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;

    println!("Wrote {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set an API key: export SLEUTH_API_KEY=...");
    println!("  2. Point [database] url at your transactions database");
    println!("  3. Point [knowledge] at Qdrant or a local documents file");
    println!("  4. sleuth ask \"What are the main types of credit card fraud?\"");
    Ok(())
}
