use exo_analyst::agent::{AskResponse, ConversationState, ExoplanetAgent};
use exo_analyst::cache::ResultCache;
use exo_analyst::concepts;
use exo_analyst::config::{Config, LlmProviderKind};
use exo_analyst::execution::{QueryExecutor, ResponseFormat, TapClient};
use exo_analyst::schema::{SchemaRegistry, REFRESH_TABLES};
use exo_analyst::sql::{build_query, suggest_fix, QueryValidator};
use exo_analyst::viz::{column_label, suggest_chart_kind};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "exo-analyst")]
#[command(about = "Ask the NASA Exoplanet Archive questions in plain English")]
#[command(version)]
struct Args {
    /// TAP service root (or set NASA_TAP_URL)
    #[arg(long, global = true)]
    tap_url: Option<String>,

    /// Result cache directory (or set EXO_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Schema document (or set EXO_SCHEMA_PATH)
    #[arg(long, global = true)]
    schema_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a question, run it and print the chart descriptor
    Ask {
        /// The question; omit it to start an interactive session
        question: Option<String>,

        /// openai or anthropic (or set LLM_PROVIDER)
        #[arg(long)]
        provider: Option<String>,

        /// Model name (or set LLM_MODEL)
        #[arg(long)]
        model: Option<String>,

        /// API key for the chosen provider (or set OPENAI_API_KEY / ANTHROPIC_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a query against the read-only policy and the schema
    Validate {
        query: String,

        #[arg(short, long, default_value = "pscomppars")]
        table: String,
    },
    /// Run an ADQL query directly
    Query {
        query: String,

        /// json, csv, tsv or votable
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Always go to the remote service
        #[arg(long)]
        no_cache: bool,
    },
    /// Assemble a query from parts
    Build {
        /// Comma-separated column list
        columns: String,

        #[arg(short, long, default_value = "pscomppars")]
        table: String,

        #[arg(long = "where")]
        where_clause: Option<String>,

        #[arg(long)]
        order_by: Option<String>,

        #[arg(long)]
        limit: Option<u32>,
    },
    /// Re-read column metadata from the TAP service and rewrite the schema document
    RefreshSchema,
    /// Show result cache counts
    CacheStats,
    /// Drop every cached result
    CacheClear,
    /// Look up a named astronomical concept (omit the name to list them all)
    Concept { name: Option<String> },
    /// Suggest a chart kind for a set of result columns
    SuggestChart {
        /// Column names
        columns: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(url) = args.tap_url {
        config.tap_url = url.trim_end_matches('/').to_string();
    }
    if let Some(dir) = args.cache_dir {
        config.cache_dir = dir;
    }
    if let Some(path) = args.schema_path {
        config.schema_path = path;
    }

    match args.command {
        Commands::Ask { question, provider, model, api_key, json } => {
            if let Some(provider) = provider {
                config.llm_provider = provider.parse()?;
            }
            if let Some(model) = model {
                config.llm_model = model;
            }
            if let Some(key) = api_key {
                match config.llm_provider {
                    LlmProviderKind::OpenAi => config.openai_api_key = Some(key),
                    LlmProviderKind::Anthropic => config.anthropic_api_key = Some(key),
                }
            }
            run_ask(&config, question, json).await
        }
        Commands::Validate { query, table } => run_validate(&config, &query, &table),
        Commands::Query { query, format, no_cache } => run_query(&config, &query, &format, !no_cache).await,
        Commands::Build { columns, table, where_clause, order_by, limit } => {
            let columns: Vec<&str> = columns.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();
            println!(
                "{}",
                build_query(
                    &columns,
                    &table,
                    where_clause.as_deref(),
                    order_by.as_deref(),
                    limit.unwrap_or(config.default_limit),
                    config.max_limit,
                )
            );
            Ok(())
        }
        Commands::RefreshSchema => run_refresh_schema(&config).await,
        Commands::CacheStats => {
            let stats = open_cache(&config).stats();
            println!("Memory entries: {}", stats.memory_entries);
            println!("File entries:   {}", stats.file_entries);
            if let Some(dir) = stats.cache_dir {
                println!("Directory:      {}", dir.display());
            }
            Ok(())
        }
        Commands::CacheClear => {
            open_cache(&config).clear();
            println!("Cache cleared");
            Ok(())
        }
        Commands::Concept { name } => {
            run_concept(name.as_deref());
            Ok(())
        }
        Commands::SuggestChart { columns } => {
            println!("{:?}", suggest_chart_kind(&columns));
            for column in &columns {
                println!("  {} -> {}", column, column_label(column));
            }
            Ok(())
        }
    }
}

fn open_cache(config: &Config) -> ResultCache {
    ResultCache::new(config.cache_dir.clone()).with_default_ttl(config.cache_ttl_secs)
}

fn load_schema(config: &Config) -> Result<Arc<SchemaRegistry>> {
    let schema = SchemaRegistry::load(&config.schema_path)
        .with_context(|| format!("Failed to load schema from {}", config.schema_path.display()))?;
    Ok(Arc::new(schema))
}

async fn run_ask(config: &Config, question: Option<String>, json: bool) -> Result<()> {
    let agent = ExoplanetAgent::from_config(config).context("Failed to start the agent")?;
    let mut state = ConversationState::for_table(config.default_table.clone());

    if let Some(question) = question {
        let response = agent.ask(&mut state, &question).await;
        return print_response(&response, json);
    }

    println!("Ask about exoplanets. ':clear' resets the conversation, 'quit' exits.");
    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            ":clear" => {
                state.clear();
                println!("Conversation cleared");
            }
            question => {
                let response = agent.ask(&mut state, question).await;
                print_response(&response, json)?;
            }
        }
    }
    Ok(())
}

fn print_response(response: &AskResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    if let Some(sql) = &response.sql {
        println!("\nSQL:\n{}", sql);
    }
    if !response.success {
        println!("\nError: {}", response.error.as_deref().unwrap_or("unknown error"));
        return Ok(());
    }

    println!(
        "\nRows: {}{}",
        response.row_count.unwrap_or(0),
        if response.cached { " (cached)" } else { "" }
    );
    if let Some(viz) = &response.visualization {
        println!("Chart: {:?} - {}", viz.kind, viz.title);
        if !viz.description.is_empty() {
            println!("       {}", viz.description);
        }
        for row in viz.data.iter().take(10) {
            println!("  {}", serde_json::Value::Object(row.clone()));
        }
        if viz.data.len() > 10 {
            println!("  ... {} more", viz.data.len() - 10);
        }
    }
    Ok(())
}

fn run_validate(config: &Config, query: &str, table: &str) -> Result<()> {
    let validator = QueryValidator::new(load_schema(config)?);
    let result = validator.validate(query, table);

    println!("Valid: {}", result.is_valid);
    for error in &result.errors {
        println!("  error: {}", error);
        if let Some(fix) = suggest_fix(error, query) {
            println!("    fix: {}", fix);
        }
    }
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
    if result.is_valid {
        println!("\n{}", result.normalized_query);
    }
    Ok(())
}

async fn run_query(config: &Config, query: &str, format: &str, use_cache: bool) -> Result<()> {
    let format: ResponseFormat = format.parse()?;
    let service = Arc::new(TapClient::new(config.tap_url.clone())?);
    let executor = QueryExecutor::new(service, Arc::new(open_cache(config)));

    let result = executor.execute(query, config.query_timeout, format, use_cache).await;
    if !result.success {
        anyhow::bail!(result.error.unwrap_or_else(|| "Query failed".to_string()));
    }

    match &result.raw {
        Some(body) => print!("{}", body),
        None => {
            info!(
                "{} rows{}",
                result.row_count.unwrap_or(0),
                if result.served_from_cache { " (cached)" } else { "" }
            );
            println!("{}", serde_json::to_string_pretty(&result.rows)?);
        }
    }
    Ok(())
}

async fn run_refresh_schema(config: &Config) -> Result<()> {
    let schema = load_schema(config)?;
    let service = TapClient::new(config.tap_url.clone())?;

    schema
        .refresh(&service, REFRESH_TABLES, config.query_timeout)
        .await
        .context("Schema refresh failed")?;

    for name in schema.table_names() {
        let columns = schema.get_columns(&name)?;
        println!("{}: {} columns", name, columns.len());
    }
    Ok(())
}

fn run_concept(name: Option<&str>) {
    match name {
        Some(name) => match concepts::lookup(name) {
            Some(concept) => {
                println!("{}: {}", concept.name, concept.condition);
                println!("  {}", concept.description);
                println!("  columns: {}", concept.columns.join(", "));
            }
            None => println!("Unknown concept '{}'", name),
        },
        None => {
            for concept in concepts::all() {
                println!("{:<22} {}", concept.name, concept.condition);
            }
        }
    }
}
