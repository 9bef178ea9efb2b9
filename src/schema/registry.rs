use crate::error::{AnalystError, Result};
use crate::execution::tap::{ResponseFormat, TapService};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Tables fetched by a schema refresh
pub const REFRESH_TABLES: &[&str] = &["ps", "pscomppars", "keplernames"];

/// Upper bound on "did you mean" candidates per unknown column
const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(rename = "type", default = "default_type")]
    pub data_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "units")]
    pub unit: Option<String>,
}

fn default_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTable {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub columns: BTreeMap<String, ColumnInfo>,
}

pub type TableSet = BTreeMap<String, SchemaTable>;

/// Outcome of checking a list of column names against one table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnCheck {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
    pub suggestions: BTreeMap<String, Vec<String>>,
}

pub struct SchemaRegistry {
    source: Option<PathBuf>,
    tables: RwLock<Arc<TableSet>>,
}

impl SchemaRegistry {
    /// Load the static schema document
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let tables = parse_table_set(&raw)?;
        info!("Loaded schema for {} tables from {}", tables.len(), path.display());
        Ok(Self {
            source: Some(path.to_path_buf()),
            tables: RwLock::new(Arc::new(tables)),
        })
    }

    /// Build a registry from an in-memory document (no backing file)
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(Self::from_tables(parse_table_set(raw)?))
    }

    pub fn from_tables(tables: TableSet) -> Self {
        Self {
            source: None,
            tables: RwLock::new(Arc::new(tables)),
        }
    }

    /// Current table set; readers keep a consistent view even across a refresh
    pub fn snapshot(&self) -> Arc<TableSet> {
        match self.tables.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    pub fn get_table_schema(&self, table_name: &str) -> Result<SchemaTable> {
        let tables = self.snapshot();
        tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| AnalystError::SchemaNotFound {
                table: table_name.to_string(),
                available: tables.keys().cloned().collect(),
            })
    }

    pub fn get_columns(&self, table_name: &str) -> Result<BTreeSet<String>> {
        Ok(self.get_table_schema(table_name)?.columns.into_keys().collect())
    }

    pub fn get_column_info(&self, column: &str, table_name: &str) -> Result<Option<ColumnInfo>> {
        Ok(self.get_table_schema(table_name)?.columns.get(column).cloned())
    }

    /// Split `columns` into known and unknown, with substring-based suggestions
    /// for the unknown ones.
    pub fn validate_columns<S: AsRef<str>>(&self, columns: &[S], table_name: &str) -> Result<ColumnCheck> {
        let table = self.get_table_schema(table_name)?;
        let mut check = ColumnCheck::default();

        for column in columns {
            let column = column.as_ref();
            if table.columns.contains_key(column) {
                if !check.valid.iter().any(|c| c == column) {
                    check.valid.push(column.to_string());
                }
                continue;
            }
            if check.invalid.iter().any(|c| c == column) {
                continue;
            }
            check.invalid.push(column.to_string());

            let similar = suggest_similar(column, table.columns.keys());
            if !similar.is_empty() {
                check.suggestions.insert(column.to_string(), similar);
            }
        }

        Ok(check)
    }

    /// Re-fetch column metadata from `TAP_SCHEMA.columns` and swap the whole
    /// table set in. Any failure leaves the current set untouched.
    pub async fn refresh(&self, service: &dyn TapService, tables: &[&str], timeout: Duration) -> Result<()> {
        let current = self.snapshot();
        let mut fresh = TableSet::new();

        for table in tables {
            let query = format!(
                "SELECT column_name, datatype, description, unit FROM TAP_SCHEMA.columns WHERE table_name = '{}'",
                table
            );
            let rows = service
                .sync(&query, ResponseFormat::Json, timeout)
                .await?
                .into_rows()?;

            let mut columns = BTreeMap::new();
            for row in rows {
                let Some(name) = row.get("column_name").and_then(|v| v.as_str()) else {
                    continue;
                };
                columns.insert(
                    name.to_string(),
                    ColumnInfo {
                        data_type: row
                            .get("datatype")
                            .and_then(|v| v.as_str())
                            .map(str::to_string)
                            .unwrap_or_else(default_type),
                        description: row
                            .get("description")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        unit: row.get("unit").and_then(|v| v.as_str()).map(str::to_string),
                    },
                );
            }

            info!("Refreshed {} columns for table {}", columns.len(), table);
            fresh.insert(
                table.to_string(),
                SchemaTable {
                    name: table.to_string(),
                    description: current
                        .get(*table)
                        .map(|t| t.description.clone())
                        .unwrap_or_else(|| format!("Table {}", table)),
                    columns,
                },
            );
        }

        if let Some(path) = &self.source {
            if let Err(e) = write_table_set(path, &fresh) {
                warn!("Could not persist refreshed schema to {}: {}", path.display(), e);
            }
        }

        let fresh = Arc::new(fresh);
        match self.tables.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        Ok(())
    }
}

fn parse_table_set(raw: &str) -> Result<TableSet> {
    let mut tables: TableSet = serde_json::from_str(raw)?;
    for (name, table) in tables.iter_mut() {
        table.name = name.clone();
    }
    Ok(tables)
}

fn write_table_set(path: &Path, tables: &TableSet) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(tables)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Candidates are columns where one name contains the other, case-insensitively.
/// Closest names (Jaro-Winkler) come first.
fn suggest_similar<'a>(column: &str, known: impl Iterator<Item = &'a String>) -> Vec<String> {
    let needle = column.to_lowercase();
    let mut similar: Vec<(f64, &String)> = known
        .filter(|c| {
            let candidate = c.to_lowercase();
            candidate.contains(&needle) || needle.contains(&candidate)
        })
        .map(|c| (strsim::jaro_winkler(&needle, &c.to_lowercase()), c))
        .collect();

    similar.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    similar
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, c)| c.clone())
        .collect()
}
