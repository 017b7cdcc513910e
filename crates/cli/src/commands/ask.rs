//! `sleuth ask`: one question, printed answer and evidence.

use sleuth_agent::AgentResponse;
use std::path::Path;

pub async fn run(config: Option<&Path>, question: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config)?;
    let agent = sleuth_agent::build_service(&config).await?;

    eprint!("  Thinking...");
    let result = agent.get_response(question, &[]).await;
    eprint!("\r              \r");

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_response(&result);
    }
    Ok(())
}

/// Print an answer followed by its sources and executed queries.
pub fn print_response(result: &AgentResponse) {
    println!("{}", result.response);

    if !result.chunks.is_empty() {
        println!();
        println!("Sources:");
        for (i, chunk) in result.chunks.iter().enumerate() {
            let preview: String = chunk.content.chars().take(160).collect();
            let source = chunk
                .metadata
                .get("source")
                .and_then(|s| s.as_str())
                .map(|s| format!(" ({s})"))
                .unwrap_or_default();
            println!("  [{}] {}{}", i + 1, preview.replace('\n', " "), source);
        }
    }

    if !result.queries.is_empty() {
        println!();
        println!("Queries:");
        for query in &result.queries {
            println!("  {query}");
        }
    }
}
