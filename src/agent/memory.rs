use crate::config::DEFAULT_TABLE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A named WHERE condition carried across turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub condition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sql: Option<String>,
    pub visualization: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub last_sql: Option<String>,
    #[serde(default)]
    pub last_visualization: Option<Value>,
    /// Insertion-ordered; re-adding a name replaces its condition in place
    #[serde(default)]
    pub active_filters: Vec<Filter>,
    #[serde(default)]
    pub selected_columns: Vec<String>,
    pub table: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::for_table(DEFAULT_TABLE)
    }
}

impl ConversationState {
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            last_sql: None,
            last_visualization: None,
            active_filters: Vec::new(),
            selected_columns: Vec::new(),
            table: table.into(),
            history: Vec::new(),
        }
    }

    /// Record a turn. Empty values leave the previous ones in place, but
    /// every call appends to the history.
    pub fn update(
        &mut self,
        sql: Option<&str>,
        visualization: Option<Value>,
        filters: Vec<Filter>,
        columns: Vec<String>,
    ) {
        if let Some(sql) = sql.filter(|s| !s.is_empty()) {
            self.last_sql = Some(sql.to_string());
        }
        if let Some(viz) = visualization.clone().filter(|v| !v.is_null()) {
            self.last_visualization = Some(viz);
        }
        for filter in filters {
            self.add_filter(filter.name, filter.condition);
        }
        if !columns.is_empty() {
            self.selected_columns = columns;
        }

        self.history.push(HistoryEntry {
            sql: sql.map(str::to_string),
            visualization,
        });
    }

    /// Plain-text summary of the previous turn; empty before the first query
    pub fn context(&self) -> String {
        let Some(last_sql) = &self.last_sql else {
            return String::new();
        };

        let filters = self
            .active_filters
            .iter()
            .map(|f| format!("{}={}", f.name, f.condition))
            .collect::<Vec<_>>()
            .join(", ");
        let columns = self.selected_columns.join(", ");

        format!(
            "Previous query: {}\nActive filters: {}\nSelected columns: {}",
            last_sql,
            if filters.is_empty() { "none" } else { filters.as_str() },
            if columns.is_empty() { "none" } else { columns.as_str() },
        )
    }

    /// Forget everything except the table being queried
    pub fn clear(&mut self) {
        let table = std::mem::take(&mut self.table);
        *self = Self::for_table(table);
    }

    pub fn add_filter(&mut self, name: impl Into<String>, condition: impl Into<String>) {
        let name = name.into();
        let condition = condition.into();
        match self.active_filters.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.condition = condition,
            None => self.active_filters.push(Filter { name, condition }),
        }
    }

    pub fn remove_filter(&mut self, name: &str) {
        self.active_filters.retain(|f| f.name != name);
    }

    /// All active filter conditions joined with AND
    pub fn combined_where(&self) -> Option<String> {
        if self.active_filters.is_empty() {
            return None;
        }
        Some(
            self.active_filters
                .iter()
                .map(|f| f.condition.as_str())
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }
}

/// Per-session conversation states, owned by whoever serves requests
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, ConversationState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for a session (a fresh one if never seen)
    pub fn get(&self, session_id: &str) -> ConversationState {
        self.lock().get(session_id).cloned().unwrap_or_default()
    }

    pub fn put(&self, session_id: &str, state: ConversationState) {
        self.lock().insert(session_id.to_string(), state);
    }

    pub fn clear(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConversationState>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
