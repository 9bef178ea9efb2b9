use crate::config::{Config, LlmProviderKind};
use crate::error::{AnalystError, Result};
use crate::viz::{AxisLabels, AxisScales, ChartKind, FieldBindings, ScaleKind};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const RESPONSE_PREFIX_LEN: usize = 200;

lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap();
}

/// Chart choice made by the model alongside the query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationRequest {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: ChartKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub x_field: Option<String>,
    #[serde(default)]
    pub y_field: Option<String>,
    #[serde(default)]
    pub color_field: Option<String>,
    #[serde(default)]
    pub size_field: Option<String>,
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default)]
    pub y_label: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub x_scale: ScaleKind,
    #[serde(default, deserialize_with = "lenient")]
    pub y_scale: ScaleKind,
}

impl VisualizationRequest {
    pub fn fields(&self) -> FieldBindings {
        FieldBindings {
            x: self.x_field.clone(),
            y: self.y_field.clone(),
            color: self.color_field.clone(),
            size: self.size_field.clone(),
        }
    }

    pub fn labels(&self) -> AxisLabels {
        AxisLabels {
            x: self.x_label.clone(),
            y: self.y_label.clone(),
        }
    }

    pub fn scales(&self) -> AxisScales {
        AxisScales {
            x: self.x_scale,
            y: self.y_scale,
        }
    }
}

/// Null or unrecognized values fall back to the default instead of failing
/// the whole response.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

/// The two-field object the model must produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub sql: String,
    #[serde(default)]
    pub visualization: VisualizationRequest,
}

/// A hosted chat model: one system instruction, one user message, text back
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, system_instruction: &str, user_message: &str) -> Result<String>;
}

pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, OPENAI_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn send(&self, system_instruction: &str, user_message: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_instruction},
                {"role": "user", "content": user_message},
            ],
            "temperature": 0.1,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalystError::Llm(format!("LLM API call failed: {}", e)))?;

        let value = read_json(response).await?;
        openai_content(&value)
    }
}

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, ANTHROPIC_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn send(&self, system_instruction: &str, user_message: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 4096,
            "system": system_instruction,
            "messages": [{"role": "user", "content": user_message}],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalystError::Llm(format!("LLM API call failed: {}", e)))?;

        let value = read_json(response).await?;
        anthropic_text(&value)
    }
}

/// Pick the provider named in the configuration. Done once, at startup.
pub fn provider_from_config(config: &Config) -> Result<Box<dyn LlmProvider>> {
    let api_key = config
        .active_api_key()
        .map(str::to_string)
        .ok_or_else(|| AnalystError::Config(format!("No API key configured for {:?}", config.llm_provider)))?;

    info!("Using LLM provider {:?}, model {}", config.llm_provider, config.llm_model);
    Ok(match config.llm_provider {
        LlmProviderKind::OpenAi => Box::new(OpenAiProvider::new(api_key, config.llm_model.clone())?),
        LlmProviderKind::Anthropic => Box::new(AnthropicProvider::new(api_key, config.llm_model.clone())?),
    })
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| AnalystError::Config(format!("Failed to create HTTP client for LLM: {}", e)))
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| AnalystError::Llm(format!("Failed to read LLM response: {}", e)))?;

    if !status.is_success() {
        return Err(AnalystError::Llm(format!(
            "LLM API returned {}: {}",
            status,
            prefix(&text, 500)
        )));
    }
    serde_json::from_str(&text).map_err(|e| AnalystError::Llm(format!("LLM API returned invalid JSON: {}", e)))
}

fn openai_content(value: &Value) -> Result<String> {
    value["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AnalystError::Llm("No message content in chat completion".to_string()))
}

fn anthropic_text(value: &Value) -> Result<String> {
    value["content"]
        .as_array()
        .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
        .map(str::to_string)
        .ok_or_else(|| AnalystError::Llm("No text block in message response".to_string()))
}

/// Decode the model's reply into a `Translation`.
///
/// Tried in order: the whole reply as JSON, the first fenced code block, the
/// first balanced top-level `{...}` in the text.
pub fn parse_translation(response: &str) -> Result<Translation> {
    let object = extract_object(response).ok_or_else(|| AnalystError::TranslationParse {
        reason: "no JSON object found".to_string(),
        response_prefix: prefix(response, RESPONSE_PREFIX_LEN),
    })?;

    serde_json::from_value(object).map_err(|e| AnalystError::TranslationParse {
        reason: e.to_string(),
        response_prefix: prefix(response, RESPONSE_PREFIX_LEN),
    })
}

fn extract_object(response: &str) -> Option<Value> {
    let as_object = |text: &str| serde_json::from_str::<Value>(text).ok().filter(Value::is_object);

    if let Some(value) = as_object(response.trim()) {
        return Some(value);
    }

    if let Some(caps) = FENCED_JSON.captures(response) {
        debug!("LLM reply wrapped in a code fence");
        if let Some(value) = as_object(&caps[1]) {
            return Some(value);
        }
    }

    first_balanced_object(response).and_then(as_object)
}

/// First `{...}` whose braces balance, ignoring braces inside string literals
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn prefix(text: &str, len: usize) -> String {
    text.chars().take(len).collect()
}
