//! Execution Result - what one TAP call hands back to the caller

use crate::error::RemoteError;
use serde::{Deserialize, Serialize};

/// One result row: column name → value
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,

    /// Structured rows (empty for failures and non-JSON formats)
    #[serde(default)]
    pub rows: Vec<Row>,

    /// Number of rows; `None` when the body was passed through as text
    pub row_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Raw body for csv / tsv / votable responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,

    #[serde(default)]
    pub served_from_cache: bool,

    /// The failure was transient (timeout, connection) and the same query may succeed later
    #[serde(default)]
    pub retriable: bool,
}

impl ExecutionResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            success: true,
            rows,
            row_count: Some(row_count),
            error: None,
            raw: None,
            served_from_cache: false,
            retriable: false,
        }
    }

    pub fn from_text(body: String) -> Self {
        Self {
            success: true,
            rows: Vec::new(),
            row_count: None,
            error: None,
            raw: Some(body),
            served_from_cache: false,
            retriable: false,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            row_count: Some(0),
            error: Some(error.into()),
            raw: None,
            served_from_cache: false,
            retriable: false,
        }
    }

    pub fn from_remote_error(err: &RemoteError) -> Self {
        Self {
            retriable: err.is_retriable(),
            ..Self::failure(err.to_string())
        }
    }

    /// Column names in first-row order
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }
}
