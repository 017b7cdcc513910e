//! Built-in tools for Sleuth.
//!
//! Two tools give the agent its reach:
//! - `knowledge_lookup` retrieves reference passages on fraud theory
//! - `database_query` turns a data question into SQL and runs it
//!
//! Both return their evidence (passages, statements) inside the
//! [`ToolResult`](sleuth_core::ToolResult) so the agent loop can collect it.

pub mod database;
pub mod knowledge;
pub mod retriever;
pub mod sql_executor;
pub mod text_to_sql;

use sleuth_config::{AppConfig, KnowledgeBackend};
use sleuth_core::error::Error;
use sleuth_core::tool::{Tool, ToolRegistry};
use sleuth_providers::ProviderRouter;
use std::sync::Arc;
use tracing::{info, warn};

pub use database::DatabaseQueryTool;
pub use knowledge::KnowledgeLookupTool;
pub use retriever::{InMemoryRetriever, QdrantRetriever, Retriever};
pub use sql_executor::SqlxExecutor;
pub use text_to_sql::{LlmQueryGenerator, QueryGenerator, QueryRows, StatementExecutor, TextToSql};

fn config_error(message: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
    }
}

/// Build the tool registry described by `config`.
///
/// Connects the database pool up front, so a bad `database.url` fails here
/// rather than on the first question.
pub async fn build_registry(config: &AppConfig, providers: &ProviderRouter) -> Result<ToolRegistry, Error> {
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();

    if config.knowledge.enabled {
        tools.push(Arc::new(build_knowledge_tool(config, providers)?));
    }

    if config.database.enabled {
        match config.database.url.as_deref() {
            Some(url) => tools.push(Arc::new(build_database_tool(config, providers, url).await?)),
            None => warn!("Database tool enabled but no database.url configured, skipping"),
        }
    }

    let registry = ToolRegistry::new(tools);
    info!(tools = ?registry.names(), "Tool registry ready");
    Ok(registry)
}

fn build_knowledge_tool(config: &AppConfig, providers: &ProviderRouter) -> Result<KnowledgeLookupTool, Error> {
    let knowledge = &config.knowledge;

    let retriever: Arc<dyn Retriever> = match knowledge.backend {
        KnowledgeBackend::Local => {
            let path = knowledge
                .documents_file
                .as_deref()
                .ok_or_else(|| config_error("knowledge.documents_file is required for the local backend"))?;
            let retriever = InMemoryRetriever::from_json_file(path)?;
            info!(documents = retriever.len(), path = %path.display(), "Loaded local knowledge base");
            Arc::new(retriever)
        }
        KnowledgeBackend::Qdrant => {
            let name = knowledge.embedding_provider.as_deref();
            let embedder = providers
                .get_or_default(name)
                .ok_or_else(|| config_error(format!("Unknown embedding provider: {}", name.unwrap_or("default"))))?;
            Arc::new(QdrantRetriever::new(
                &knowledge.qdrant_url,
                &knowledge.collection,
                embedder,
                &knowledge.embedding_model,
            ))
        }
    };

    Ok(KnowledgeLookupTool::new(retriever, knowledge.top_k))
}

async fn build_database_tool(
    config: &AppConfig,
    providers: &ProviderRouter,
    url: &str,
) -> Result<DatabaseQueryTool, Error> {
    let database = &config.database;

    let name = database.coder_provider.as_deref();
    let coder = providers
        .get_or_default(name)
        .ok_or_else(|| config_error(format!("Unknown SQL coder provider: {}", name.unwrap_or("default"))))?;
    let model = database
        .coder_model
        .clone()
        .unwrap_or_else(|| config.default_model.clone());

    let mut generator =
        LlmQueryGenerator::new(coder, model).with_dialect(sql_executor::dialect_for_url(url));
    if let Some(schema) = database
        .load_schema()
        .map_err(|e| config_error(e.to_string()))?
    {
        generator = generator.with_schema(schema);
    }

    let executor = SqlxExecutor::connect(url, database.max_connections).await?;

    Ok(DatabaseQueryTool::new(
        TextToSql::new(Arc::new(generator), Arc::new(executor)),
        database.max_rows,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn local_config(path: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.knowledge.backend = KnowledgeBackend::Local;
        config.knowledge.documents_file = Some(path.to_path_buf());
        config
    }

    #[tokio::test]
    async fn registry_without_database_url_has_knowledge_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"content": "Skimming copies card data."}}]"#).unwrap();

        let config = local_config(file.path());
        let router = sleuth_providers::router::build_from_config(&config);
        let registry = build_registry(&config, &router).await.unwrap();

        assert_eq!(registry.names(), ["knowledge_lookup"]);
    }

    #[tokio::test]
    async fn registry_with_sqlite_has_both_tools() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();

        let mut config = local_config(file.path());
        config.database.url = Some("sqlite::memory:".into());
        config.database.max_connections = 1;
        let router = sleuth_providers::router::build_from_config(&config);
        let registry = build_registry(&config, &router).await.unwrap();

        assert_eq!(registry.names(), ["database_query", "knowledge_lookup"]);
    }

    #[tokio::test]
    async fn disabled_tools_are_not_registered() {
        let mut config = AppConfig::default();
        config.knowledge.enabled = false;
        config.database.enabled = false;
        let router = sleuth_providers::router::build_from_config(&config);
        let registry = build_registry(&config, &router).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn missing_documents_file_is_config_error() {
        let mut config = AppConfig::default();
        config.knowledge.backend = KnowledgeBackend::Local;
        let router = sleuth_providers::router::build_from_config(&config);
        let result = build_registry(&config, &router).await;
        assert!(matches!(result, Err(Error::Config { .. })), "{result:?}");
    }
}
