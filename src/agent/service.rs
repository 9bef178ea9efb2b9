use crate::agent::contracts::AskResponse;
use crate::agent::memory::ConversationState;
use crate::agent::prompts;
use crate::cache::ResultCache;
use crate::config::Config;
use crate::error::{AnalystError, Result};
use crate::execution::{QueryExecutor, ResponseFormat, TapClient};
use crate::llm::{self, parse_translation, LlmProvider};
use crate::schema::SchemaRegistry;
use crate::sql::{extract_columns, extract_table, QueryValidator};
use crate::viz::build_visualization;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TITLE: &str = "Query Results";

/// Question → query → rows → chart, one turn at a time
pub struct ExoplanetAgent {
    llm: Arc<dyn LlmProvider>,
    schema: Arc<SchemaRegistry>,
    validator: QueryValidator,
    executor: QueryExecutor,
    query_timeout: Duration,
    default_limit: u32,
    max_limit: u32,
}

impl ExoplanetAgent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        schema: Arc<SchemaRegistry>,
        executor: QueryExecutor,
        config: &Config,
    ) -> Self {
        Self {
            llm,
            validator: QueryValidator::new(schema.clone()),
            schema,
            executor,
            query_timeout: config.query_timeout,
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }

    /// Wire up the real collaborators: schema file, TAP endpoint, on-disk
    /// cache and the configured LLM provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let schema = Arc::new(SchemaRegistry::load(&config.schema_path)?);
        let service = Arc::new(TapClient::new(config.tap_url.clone())?);
        let cache = Arc::new(ResultCache::new(config.cache_dir.clone()).with_default_ttl(config.cache_ttl_secs));
        let llm: Arc<dyn LlmProvider> = Arc::from(llm::provider_from_config(config)?);

        Ok(Self::new(llm, schema, QueryExecutor::new(service, cache), config))
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Answer one question. Failures at any stage come back as an
    /// unsuccessful response; the conversation state only changes on success.
    pub async fn ask(&self, state: &mut ConversationState, question: &str) -> AskResponse {
        info!("Processing question: {}", question);

        let system = prompts::system_prompt(&self.schema, &state.table, self.default_limit, self.max_limit);
        let user = prompts::user_message(question, &state.context());

        info!("Calling LLM provider {}", self.llm.name());
        let reply = match self.llm.send(&system, &user).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("LLM call failed: {}", e);
                return AskResponse::failure(e.to_string(), None);
            }
        };
        debug!("LLM response received, {} chars", reply.len());

        let translation = match parse_translation(&reply) {
            Ok(t) => t,
            Err(e) => {
                warn!("{}", e);
                return AskResponse::failure(e.to_string(), None);
            }
        };
        let sql = translation.sql.trim().to_string();
        info!("Generated SQL: {}", sql);

        let table = extract_table(&sql).unwrap_or_else(|| state.table.clone());
        let validation = self.validator.validate(&sql, &table);
        for warning in &validation.warnings {
            debug!("Validation warning: {}", warning);
        }
        if !validation.is_valid {
            let err = AnalystError::Validation(validation.errors);
            warn!("{}", err);
            return AskResponse::failure(err.to_string(), Some(sql));
        }

        let result = self
            .executor
            .execute(&validation.normalized_query, self.query_timeout, ResponseFormat::Json, true)
            .await;
        if !result.success {
            let error = result.error.unwrap_or_else(|| "Query failed".to_string());
            return AskResponse::failure(error, Some(sql));
        }

        let request = translation.visualization;
        let title = request
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let visualization = build_visualization(
            request.kind,
            title,
            request.description.clone().unwrap_or_default(),
            result.rows,
            request.fields(),
            request.labels(),
            request.scales(),
        );

        // Rows stay out of the conversation history.
        let mut snapshot = serde_json::to_value(&visualization).ok();
        if let Some(Value::Object(map)) = snapshot.as_mut() {
            map.remove("data");
        }
        if self.schema.get_table_schema(&table).is_ok() {
            state.table = table;
        }
        state.update(Some(&sql), snapshot, Vec::new(), extract_columns(&sql));

        AskResponse {
            success: true,
            sql: Some(sql),
            row_count: result.row_count,
            error: None,
            visualization: Some(visualization),
            cached: result.served_from_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::execution::executor::tests::{planet_rows, StubTap};
    use crate::execution::{Row, TapResponse};
    use crate::schema::registry::tests::test_registry;
    use crate::viz::ChartKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and keeps every user message it saw
    struct StubLlm {
        replies: Mutex<VecDeque<String>>,
        seen: Mutex<Vec<String>>,
    }

    impl StubLlm {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn send(&self, _system: &str, user: &str) -> Result<String> {
            self.seen.lock().unwrap().push(user.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AnalystError::Llm("no more replies".to_string()))
        }
    }

    fn kepid_rows() -> TapResponse {
        let rows = (1..=3)
            .map(|id| {
                let mut row = Row::new();
                row.insert("kepid".to_string(), serde_json::json!(id));
                row
            })
            .collect();
        TapResponse::Rows(rows)
    }

    const BAR_REPLY: &str = r#"{"sql": "SELECT pl_name, pl_rade FROM pscomppars ORDER BY pl_rade DESC LIMIT 3", "visualization": {"type": "bar_chart", "title": "Largest planets", "x_field": "pl_name", "y_field": "pl_rade"}}"#;

    fn agent(llm: Arc<StubLlm>, tap: Arc<StubTap>) -> ExoplanetAgent {
        let executor = QueryExecutor::new(tap, Arc::new(ResultCache::in_memory()));
        ExoplanetAgent::new(llm, Arc::new(test_registry()), executor, &Config::default())
    }

    #[tokio::test]
    async fn test_ask_success() {
        let llm = StubLlm::new(&[BAR_REPLY]);
        let tap = StubTap::new(Ok(planet_rows()));
        let agent = agent(llm.clone(), tap.clone());
        let mut state = ConversationState::default();

        let response = agent.ask(&mut state, "What are the largest planets?").await;
        assert!(response.success, "{:?}", response.error);
        assert_eq!(response.row_count, Some(3));
        assert!(!response.cached);

        let viz = response.visualization.unwrap();
        assert_eq!(viz.kind, ChartKind::BarChart);
        assert_eq!(viz.title, "Largest planets");
        assert_eq!(viz.data.len(), 3);
        assert_eq!(viz.fields.y.as_deref(), Some("pl_rade"));

        assert_eq!(
            tap.calls()[0].0,
            "SELECT TOP 3 pl_name, pl_rade FROM pscomppars ORDER BY pl_rade DESC"
        );
        assert_eq!(state.last_sql.as_deref(), response.sql.as_deref());
        assert_eq!(state.selected_columns, vec!["pl_name", "pl_rade"]);
        assert!(state.last_visualization.as_ref().unwrap().get("data").is_none());
        assert!(llm.seen()[0].contains("No previous context."));
    }

    #[tokio::test]
    async fn test_invalid_sql_never_executes() {
        let llm = StubLlm::new(&[r#"{"sql": "SELECT * FROM pscomppars LIMIT 10", "visualization": {"type": "table"}}"#]);
        let tap = StubTap::new(Ok(planet_rows()));
        let agent = agent(llm, tap.clone());
        let mut state = ConversationState::default();

        let response = agent.ask(&mut state, "show me everything").await;
        assert!(!response.success);
        let error = response.error.unwrap();
        assert!(error.starts_with("Invalid SQL: "), "{}", error);
        assert!(error.contains("SELECT * is not allowed"));
        assert_eq!(response.sql.as_deref(), Some("SELECT * FROM pscomppars LIMIT 10"));
        assert!(response.visualization.is_none());
        assert!(tap.calls().is_empty());
        assert!(state.history.is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_carries_context_and_cache() {
        let llm = StubLlm::new(&[BAR_REPLY, BAR_REPLY]);
        let tap = StubTap::new(Ok(planet_rows()));
        let agent = agent(llm.clone(), tap.clone());
        let mut state = ConversationState::default();

        assert!(agent.ask(&mut state, "largest planets").await.success);
        let second = agent.ask(&mut state, "same again").await;
        assert!(second.success);
        assert!(second.cached);
        assert_eq!(tap.calls().len(), 1);

        let seen = llm.seen();
        assert!(seen[1].contains("Previous query: SELECT pl_name, pl_rade FROM pscomppars"));
        assert!(seen[1].contains("Selected columns: pl_name, pl_rade"));
        assert_eq!(state.history.len(), 2);
    }

    #[tokio::test]
    async fn test_defaults_for_sparse_visualization() {
        let llm = StubLlm::new(&[r#"Here you go: {"sql": "SELECT pl_name FROM pscomppars LIMIT 3"}"#]);
        let agent = agent(llm, StubTap::new(Ok(planet_rows())));
        let mut state = ConversationState::default();

        let viz = agent.ask(&mut state, "list planets").await.visualization.unwrap();
        assert_eq!(viz.kind, ChartKind::Table);
        assert_eq!(viz.title, "Query Results");
        assert_eq!(viz.description, "");
    }

    #[tokio::test]
    async fn test_upstream_failures() {
        let mut state = ConversationState::default();

        let agent_a = agent(StubLlm::new(&["no json here"]), StubTap::new(Ok(planet_rows())));
        let response = agent_a.ask(&mut state, "anything").await;
        assert!(response.error.unwrap().contains("Could not parse LLM response"));
        assert!(response.sql.is_none());

        let agent_b = agent(StubLlm::new(&[]), StubTap::new(Ok(planet_rows())));
        let response = agent_b.ask(&mut state, "anything").await;
        assert!(response.error.unwrap().starts_with("LLM error"));

        let failing_tap = StubTap::new(Err(RemoteError::Http {
            status: 500,
            body: "boom".to_string(),
        }));
        let agent_c = agent(StubLlm::new(&[BAR_REPLY]), failing_tap);
        let response = agent_c.ask(&mut state, "largest planets").await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("HTTP 500: boom"));
        assert!(response.sql.is_some());
        assert!(state.last_sql.is_none());
    }

    #[tokio::test]
    async fn test_query_against_other_table_moves_state() {
        let llm = StubLlm::new(&[r#"{"sql": "SELECT kepid FROM keplernames LIMIT 3", "visualization": {"type": "table"}}"#]);
        let agent = agent(llm, StubTap::new(Ok(kepid_rows())));
        let mut state = ConversationState::default();

        let response = agent.ask(&mut state, "kepler ids").await;
        assert!(response.success, "{:?}", response.error);
        assert_eq!(state.table, "keplernames");
    }
}
