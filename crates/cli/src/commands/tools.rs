//! `sleuth tools`: list the tools the current config registers.

use std::path::Path;

pub async fn run(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config)?;
    let router = sleuth_providers::router::build_from_config(&config);
    let registry = sleuth_tools::build_registry(&config, &router).await?;

    if registry.is_empty() {
        println!("No tools enabled.");
        return Ok(());
    }

    for def in registry.definitions() {
        println!("{}", def.name);
        println!("  {}", def.description);
        println!();
    }
    Ok(())
}
