use crate::viz::VisualizationSpec;
use serde::{Deserialize, Serialize};

/// Outcome of one question, ready to hand to a front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub success: bool,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub row_count: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub visualization: Option<VisualizationSpec>,
    #[serde(default)]
    pub cached: bool,
}

impl AskResponse {
    pub fn failure(error: impl Into<String>, sql: Option<String>) -> Self {
        Self {
            success: false,
            sql,
            row_count: None,
            error: Some(error.into()),
            visualization: None,
            cached: false,
        }
    }
}
