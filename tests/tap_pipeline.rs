mod common;

use common::{FakeTap, Reply, PLANETS_JSON};
use exo_analyst::cache::ResultCache;
use exo_analyst::execution::{QueryExecutor, ResponseFormat, TapClient, TapService};
use exo_analyst::schema::{SchemaRegistry, REFRESH_TABLES};
use exo_analyst::RemoteError;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn executor_for(tap: &FakeTap, cache: ResultCache) -> QueryExecutor {
    let client = TapClient::new(tap.url.clone()).unwrap();
    QueryExecutor::new(Arc::new(client), Arc::new(cache))
}

#[tokio::test]
async fn test_json_rows_are_counted_and_cached() {
    let tap = FakeTap::start(|_, _| Reply::ok(PLANETS_JSON)).await;
    let executor = executor_for(&tap, ResultCache::in_memory());

    let first = executor
        .execute(
            "SELECT pl_name, pl_rade, pl_bmasse FROM pscomppars LIMIT 3",
            TIMEOUT,
            ResponseFormat::Json,
            true,
        )
        .await;
    assert!(first.success, "{:?}", first.error);
    assert_eq!(first.row_count, Some(3));
    assert_eq!(first.columns(), vec!["pl_bmasse", "pl_name", "pl_rade"]);

    assert_eq!(
        tap.requests(),
        vec![(
            "SELECT TOP 3 pl_name, pl_rade, pl_bmasse FROM pscomppars".to_string(),
            "json".to_string()
        )]
    );

    let second = executor
        .execute(
            "select pl_name, pl_rade, pl_bmasse from pscomppars limit 3;",
            TIMEOUT,
            ResponseFormat::Json,
            true,
        )
        .await;
    assert!(second.served_from_cache);
    assert_eq!(second.rows, first.rows);
    assert_eq!(tap.hits(), 1);
}

#[tokio::test]
async fn test_durable_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let tap = FakeTap::start(|_, _| Reply::ok(PLANETS_JSON)).await;
    let query = "SELECT pl_name FROM pscomppars LIMIT 3";

    let executor = executor_for(&tap, ResultCache::new(dir.path()));
    assert!(executor.execute(query, TIMEOUT, ResponseFormat::Json, true).await.success);

    let restarted = executor_for(&tap, ResultCache::new(dir.path()));
    assert_eq!(restarted.cache().stats().memory_entries, 0);
    assert_eq!(restarted.cache().stats().file_entries, 1);

    let result = restarted.execute(query, TIMEOUT, ResponseFormat::Json, true).await;
    assert!(result.served_from_cache);
    assert_eq!(result.row_count, Some(3));
    assert_eq!(tap.hits(), 1);
}

#[tokio::test]
async fn test_http_error_is_reported_and_not_cached() {
    let tap = FakeTap::start(|_, _| Reply::status(400, "ERROR: syntax error near TOPP")).await;
    let executor = executor_for(&tap, ResultCache::in_memory());

    for _ in 0..2 {
        let result = executor
            .execute("SELECT pl_name FROM pscomppars", TIMEOUT, ResponseFormat::Json, true)
            .await;
        assert!(!result.success);
        assert!(!result.retriable);
        assert_eq!(result.row_count, Some(0));
        assert_eq!(
            result.error.as_deref(),
            Some("HTTP 400: ERROR: syntax error near TOPP")
        );
    }
    assert_eq!(tap.hits(), 2);
}

#[tokio::test]
async fn test_malformed_json_body() {
    let tap = FakeTap::start(|_, _| Reply::ok("<VOTABLE>not json</VOTABLE>")).await;
    let client = TapClient::new(tap.url.clone()).unwrap();

    let err = client
        .sync("SELECT pl_name FROM pscomppars", ResponseFormat::Json, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::MalformedBody(_)));
    assert!(!err.is_retriable());
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let tap = FakeTap::start(|_, _| Reply::ok(PLANETS_JSON).delayed(Duration::from_secs(3))).await;
    let client = TapClient::new(tap.url.clone()).unwrap();

    let err = client
        .sync("SELECT pl_name FROM pscomppars", ResponseFormat::Json, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::Timeout);
    assert!(err.is_retriable());
    assert_eq!(err.to_string(), "Query timed out. Try adding LIMIT or more filters.");
}

#[tokio::test]
async fn test_csv_passes_through_as_text() {
    let tap = FakeTap::start(|_, format| {
        assert_eq!(format, "csv");
        Reply::ok("pl_name,pl_rade\nK2-18 b,2.61\n")
    })
    .await;
    let executor = executor_for(&tap, ResultCache::in_memory());

    let result = executor
        .execute("SELECT pl_name, pl_rade FROM pscomppars", TIMEOUT, ResponseFormat::Csv, true)
        .await;
    assert!(result.success);
    assert_eq!(result.row_count, None);
    assert_eq!(result.raw.as_deref(), Some("pl_name,pl_rade\nK2-18 b,2.61\n"));
    assert_eq!(executor.cache().stats().memory_entries, 0);
}

#[tokio::test]
async fn test_schema_refresh_replaces_tables_and_persists() {
    let tap = FakeTap::start(|query, _| {
        assert!(query.contains("TAP_SCHEMA.columns"));
        if query.contains("'keplernames'") {
            Reply::ok(r#"[{"column_name": "kepid", "datatype": "int", "description": "Kepler ID", "unit": null}]"#)
        } else {
            Reply::ok(
                r#"[
                    {"column_name": "pl_name", "datatype": "char", "description": "Planet Name", "unit": null},
                    {"column_name": "pl_insol", "datatype": "double", "description": "Insolation Flux", "unit": "earthFlux"}
                ]"#,
            )
        }
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema").join("columns.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        r#"{"pscomppars": {"description": "Composite parameters", "columns": {"pl_name": {"type": "char", "description": "Planet Name"}}}}"#,
    )
    .unwrap();

    let registry = SchemaRegistry::load(&path).unwrap();
    let client = TapClient::new(tap.url.clone()).unwrap();
    registry.refresh(&client, REFRESH_TABLES, TIMEOUT).await.unwrap();

    assert_eq!(tap.hits(), REFRESH_TABLES.len());
    assert_eq!(registry.table_names(), vec!["keplernames", "ps", "pscomppars"]);
    let pscomppars = registry.get_table_schema("pscomppars").unwrap();
    assert_eq!(pscomppars.description, "Composite parameters");
    assert_eq!(pscomppars.columns["pl_insol"].unit.as_deref(), Some("earthFlux"));

    let reloaded = SchemaRegistry::load(&path).unwrap();
    assert!(reloaded.get_columns("keplernames").unwrap().contains("kepid"));
}

#[tokio::test]
async fn test_failed_refresh_keeps_current_schema() {
    let tap = FakeTap::start(|_, _| Reply::status(503, "maintenance")).await;
    let registry = SchemaRegistry::from_json_str(
        r#"{"pscomppars": {"description": "Composite", "columns": {"pl_name": {"type": "char", "description": "Planet Name"}}}}"#,
    )
    .unwrap();
    let client = TapClient::new(tap.url.clone()).unwrap();

    assert!(registry.refresh(&client, REFRESH_TABLES, TIMEOUT).await.is_err());
    assert_eq!(registry.table_names(), vec!["pscomppars"]);
}
