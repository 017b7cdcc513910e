//! `sleuth serve`: start the HTTP API.

use std::path::Path;

pub async fn run(config: Option<&Path>, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }

    println!("  Sleuth API on http://{}:{}", config.gateway.host, config.gateway.port);
    println!("    GET  /health");
    println!("    POST /chat");

    sleuth_gateway::start(config).await
}
