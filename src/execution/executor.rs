//! Query Executor
//!
//! Normalizes a query into ADQL, serves repeats from the result cache and
//! otherwise calls the TAP endpoint. The read-only policy is checked again
//! right before the remote call so a mutating statement never leaves the
//! process, whatever happened upstream.

use crate::cache::ResultCache;
use crate::execution::result::ExecutionResult;
use crate::execution::tap::{ResponseFormat, TapResponse, TapService};
use crate::sql::{forbidden_keywords_in, is_select, normalize_query};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct QueryExecutor {
    service: Arc<dyn TapService>,
    cache: Arc<ResultCache>,
}

impl QueryExecutor {
    pub fn new(service: Arc<dyn TapService>, cache: Arc<ResultCache>) -> Self {
        Self { service, cache }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub async fn execute(
        &self,
        query: &str,
        timeout: Duration,
        format: ResponseFormat,
        use_cache: bool,
    ) -> ExecutionResult {
        let query = normalize_query(query);
        let cacheable = use_cache && format.is_structured();

        if cacheable {
            if let Some(hit) = self.cache.lookup(&query) {
                info!("Serving {} rows from cache", hit.row_count.unwrap_or(0));
                return hit;
            }
        }

        if !is_select(&query) {
            warn!("Refusing non-SELECT statement");
            return ExecutionResult::failure("Only SELECT queries are allowed");
        }
        if let Some(keyword) = forbidden_keywords_in(&query).first() {
            warn!("Refusing statement containing {}", keyword);
            return ExecutionResult::failure(format!("Forbidden operation: {}", keyword));
        }

        let started = Instant::now();
        let response = match self.service.sync(&query, format, timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!("TAP query failed after {:?}: {}", started.elapsed(), e);
                return ExecutionResult::from_remote_error(&e);
            }
        };

        match response {
            TapResponse::Rows(rows) if format.is_structured() => {
                let result = ExecutionResult::from_rows(rows);
                info!(
                    "TAP query returned {} rows in {:?}",
                    result.rows.len(),
                    started.elapsed()
                );
                if cacheable {
                    self.cache.store_default(&query, &result);
                }
                result
            }
            TapResponse::Rows(rows) => {
                // A text format that still came back decoded; hand it through as text.
                ExecutionResult::from_text(serde_json::Value::from(rows).to_string())
            }
            TapResponse::Text(body) if format.is_structured() => {
                ExecutionResult::failure(format!("Invalid JSON response: {}", preview(&body)))
            }
            TapResponse::Text(body) => ExecutionResult::from_text(body),
        }
    }
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
