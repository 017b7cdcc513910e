//! `sleuth chat`: interactive session with in-process history.

use sleuth_core::message::HistoryEntry;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config)?;
    let agent = sleuth_agent::build_service(&config).await?;

    println!();
    println!("  Sleuth interactive mode");
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Tools:     {}", agent.tool_names().join(", "));
    println!();
    println!("  Type your question and press Enter. 'exit' or Ctrl+D quits.");
    println!();

    let mut history: Vec<HistoryEntry> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let result = agent.get_response(question, &history).await;
        eprint!("\r     \r");

        println!();
        super::ask::print_response(&result);
        println!();

        history.push(HistoryEntry::user(question));
        history.push(HistoryEntry::assistant(result.response));
    }

    println!();
    Ok(())
}
