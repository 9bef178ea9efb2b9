//! Runtime configuration
//!
//! Values come from the process environment (a `.env` file is loaded by the
//! binary through `dotenv`). Every field has a default so the library can be
//! used without any environment at all.

use crate::error::{AnalystError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const NASA_TAP_URL: &str = "https://exoplanetarchive.ipac.caltech.edu/TAP";
pub const DEFAULT_TABLE: &str = "pscomppars";
pub const DEFAULT_LIMIT: u32 = 1000;
pub const MAX_LIMIT: u32 = 10_000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 900;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 60;

/// Which hosted model family answers translation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    OpenAi,
    Anthropic,
}

impl FromStr for LlmProviderKind {
    type Err = AnalystError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(AnalystError::Config(format!("Unknown LLM provider: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tap_url: String,
    pub llm_provider: LlmProviderKind,
    pub llm_model: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub schema_path: PathBuf,
    pub default_table: String,
    pub query_timeout: Duration,
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tap_url: NASA_TAP_URL.to_string(),
            llm_provider: LlmProviderKind::OpenAi,
            llm_model: "gpt-4o".to_string(),
            openai_api_key: None,
            anthropic_api_key: None,
            cache_dir: PathBuf::from(".cache"),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            schema_path: PathBuf::from("data/schema/columns.json"),
            default_table: DEFAULT_TABLE.to_string(),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

impl Config {
    /// Build configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let llm_provider = match std::env::var("LLM_PROVIDER") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.llm_provider,
        };

        Ok(Self {
            tap_url: env_or("NASA_TAP_URL", defaults.tap_url)
                .trim_end_matches('/')
                .to_string(),
            llm_provider,
            llm_model: env_or("LLM_MODEL", defaults.llm_model),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            cache_dir: std::env::var("EXO_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_ttl_secs: env_parse("EXO_CACHE_TTL", defaults.cache_ttl_secs)?,
            schema_path: std::env::var("EXO_SCHEMA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.schema_path),
            default_table: env_or("EXO_DEFAULT_TABLE", defaults.default_table),
            query_timeout: Duration::from_secs(env_parse(
                "EXO_QUERY_TIMEOUT",
                DEFAULT_QUERY_TIMEOUT_SECS,
            )?),
            default_limit: env_parse("DEFAULT_LIMIT", defaults.default_limit)?,
            max_limit: env_parse("MAX_LIMIT", defaults.max_limit)?,
        })
    }

    /// API key for the configured provider, if one is set
    pub fn active_api_key(&self) -> Option<&str> {
        match self.llm_provider {
            LlmProviderKind::OpenAi => self.openai_api_key.as_deref(),
            LlmProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AnalystError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<LlmProviderKind>().unwrap(), LlmProviderKind::OpenAi);
        assert_eq!(" anthropic ".parse::<LlmProviderKind>().unwrap(), LlmProviderKind::Anthropic);
        assert!("gemini".parse::<LlmProviderKind>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_ttl_secs, 900);
        assert_eq!(config.default_table, "pscomppars");
        assert_eq!(config.max_limit, 10_000);
        assert!(config.active_api_key().is_none());
    }
}
