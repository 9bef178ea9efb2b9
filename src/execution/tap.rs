//! TAP endpoint client
//!
//! The archive exposes a synchronous query resource: `GET {base}/sync` with
//! `query` (ADQL text) and `format` parameters. JSON responses are an array of
//! row objects; every other format is opaque text.

use crate::error::{AnalystError, RemoteError, Result};
use crate::execution::result::Row;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Longest slice of an error body kept in diagnostics
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Csv,
    Tsv,
    Votable,
}

impl ResponseFormat {
    pub fn as_param(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
            ResponseFormat::Csv => "csv",
            ResponseFormat::Tsv => "tsv",
            ResponseFormat::Votable => "votable",
        }
    }

    /// Only JSON is decoded into rows (and therefore counted and cached)
    pub fn is_structured(&self) -> bool {
        matches!(self, ResponseFormat::Json)
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

impl FromStr for ResponseFormat {
    type Err = AnalystError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "votable" | "xml" => Ok(Self::Votable),
            other => Err(AnalystError::Config(format!("Unsupported response format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TapResponse {
    Rows(Vec<Row>),
    Text(String),
}

impl TapResponse {
    pub fn into_rows(self) -> std::result::Result<Vec<Row>, RemoteError> {
        match self {
            TapResponse::Rows(rows) => Ok(rows),
            TapResponse::Text(_) => Err(RemoteError::MalformedBody(
                "expected JSON rows, got a text body".to_string(),
            )),
        }
    }
}

/// Remote synchronous query capability
#[async_trait]
pub trait TapService: Send + Sync {
    async fn sync(
        &self,
        query: &str,
        format: ResponseFormat,
        timeout: Duration,
    ) -> std::result::Result<TapResponse, RemoteError>;
}

pub struct TapClient {
    base_url: String,
    client: Client,
}

impl TapClient {
    /// # Arguments
    /// * `base_url` - TAP service root, e.g. "https://exoplanetarchive.ipac.caltech.edu/TAP"
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AnalystError::Config(format!("Failed to create HTTP client for TAP: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TapService for TapClient {
    async fn sync(
        &self,
        query: &str,
        format: ResponseFormat,
        timeout: Duration,
    ) -> std::result::Result<TapResponse, RemoteError> {
        let url = format!("{}/sync", self.base_url);
        debug!("TAP GET {} format={}", url, format);

        let response = self
            .client
            .get(&url)
            .query(&[("query", query), ("format", format.as_param())])
            .timeout(timeout)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let body = response.text().await.map_err(RemoteError::from_reqwest)?;
        if !format.is_structured() {
            return Ok(TapResponse::Text(body));
        }

        serde_json::from_str::<Vec<Row>>(&body)
            .map(TapResponse::Rows)
            .map_err(|e| RemoteError::MalformedBody(e.to_string()))
    }
}
