//! Wire an [`AgentService`] from configuration.

use sleuth_config::AppConfig;
use sleuth_core::error::Error;
use sleuth_core::event::EventBus;
use sleuth_providers::router::build_from_config;
use sleuth_tools::SqlxExecutor;
use std::sync::Arc;
use tracing::info;

use crate::dispatcher::ToolDispatcher;
use crate::eval::FaithfulnessJudge;
use crate::orchestrator::Orchestrator;
use crate::session::{AgentService, SessionOptions};

/// Build the provider router, the tool registry and the agent loop.
pub async fn build_service(config: &AppConfig) -> Result<AgentService, Error> {
    let router = build_from_config(config);
    let provider = router.default().ok_or_else(|| Error::Config {
        message: format!("Provider '{}' is not available", config.default_provider),
    })?;

    let tools = Arc::new(sleuth_tools::build_registry(config, &router).await?);
    let event_bus = Arc::new(EventBus::default());

    let dispatcher = ToolDispatcher::new(tools, event_bus.clone())
        .with_parallel(config.agent.parallel_tool_calls);

    let mut orchestrator = Orchestrator::new(provider, &config.default_model, dispatcher, event_bus.clone())
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_max_rounds(config.agent.max_rounds);
    if let Some(prompt) = &config.agent.system_prompt {
        orchestrator = orchestrator.with_system_prompt(prompt);
    }

    info!(
        provider = %config.default_provider,
        model = %config.default_model,
        "Agent service ready"
    );

    Ok(AgentService::new(
        orchestrator,
        SessionOptions::from(&config.agent),
        event_bus,
    ))
}

/// Build the answer judge: the `[eval]` provider and model, plus a database
/// connection when one is configured, for re-running statements.
pub async fn build_judge(config: &AppConfig) -> Result<FaithfulnessJudge, Error> {
    let router = build_from_config(config);
    let name = config.eval.provider.as_deref();
    let provider = router.get_or_default(name).ok_or_else(|| Error::Config {
        message: format!("Unknown eval provider: {}", name.unwrap_or(&config.default_provider)),
    })?;
    let model = config
        .eval
        .model
        .clone()
        .unwrap_or_else(|| config.default_model.clone());

    let mut judge = FaithfulnessJudge::new(provider, model);
    let database = &config.database;
    if let (true, Some(url)) = (database.enabled, database.url.as_deref()) {
        let executor = SqlxExecutor::connect(url, database.max_connections).await?;
        judge = judge.with_executor(Arc::new(executor), database.max_rows);
    }

    info!(model = %judge.model(), "Answer judge ready");
    Ok(judge)
}
