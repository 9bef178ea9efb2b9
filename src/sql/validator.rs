//! Query Validator
//!
//! Applies every rule of the read-only policy to a candidate query and
//! collects all violations instead of stopping at the first one.

use crate::schema::SchemaRegistry;
use crate::sql::rewrite::strip_terminators;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Mutating / DDL keywords that may never appear as a whole word
pub const FORBIDDEN_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE"];

lazy_static! {
    static ref FORBIDDEN_PATTERNS: Vec<(&'static str, Regex)> = FORBIDDEN_KEYWORDS
        .iter()
        .map(|kw| (*kw, Regex::new(&format!(r"(?i)\b{}\b", kw)).unwrap()))
        .collect();
    static ref WILDCARD_SELECT: Regex =
        Regex::new(r"(?i)\bSELECT\s+(?:(?:ALL|DISTINCT)\s+)?(?:TOP\s+\d+\s+)?\*").unwrap();
    static ref LEADING_SELECT: Regex = Regex::new(r"(?i)^SELECT\b").unwrap();
    static ref LIMIT_DIRECTIVE: Regex = Regex::new(r"(?i)\bLIMIT\s+\d+").unwrap();
    static ref TOP_DIRECTIVE: Regex = Regex::new(r"(?i)\bTOP\s+\d+").unwrap();
    static ref SELECT_CLAUSE: Regex = Regex::new(r"(?is)\bSELECT\s+(.+?)\s+FROM\b").unwrap();
    static ref CLAUSE_PREFIX: Regex = Regex::new(r"(?is)^(?:DISTINCT\s+|ALL\s+|TOP\s+\d+\s+)+").unwrap();
    static ref COUNT_ALL: Regex = Regex::new(r"(?i)^(?:COUNT|SUM|AVG|MIN|MAX)\s*\(\s*\*\s*\)").unwrap();
    static ref TRAILING_ALIAS: Regex = Regex::new(r"(?is)^(.*?[\w\)])\s+(?:AS\s+)?\w+$").unwrap();
    static ref FUNCTION_CALL: Regex = Regex::new(r"(?s)^\w+\s*\((.*)\)$").unwrap();
    static ref COLUMN_REF: Regex = Regex::new(r"^(?:[A-Za-z_]\w*\.)*([A-Za-z_]\w*)$").unwrap();
    static ref FROM_TABLE: Regex = Regex::new(r"(?i)\bFROM\s+([A-Za-z_][\w.]*)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub normalized_query: String,
}

pub struct QueryValidator {
    schema: Arc<SchemaRegistry>,
}

impl QueryValidator {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self { schema }
    }

    pub fn validate(&self, query: &str, table_name: &str) -> ValidationResult {
        let query = query.trim();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !is_select(query) {
            errors.push("Query must start with SELECT".to_string());
        }

        if query.contains(';') {
            warnings.push("Semicolons should be removed for TAP ADQL".to_string());
        }

        if WILDCARD_SELECT.is_match(query) || has_wildcard_projection(query) {
            errors.push("SELECT * is not allowed. Specify columns explicitly.".to_string());
        }

        for keyword in forbidden_keywords_in(query) {
            errors.push(format!("Forbidden operation: {}", keyword));
        }

        let limit_directives = LIMIT_DIRECTIVE.find_iter(query).count() + TOP_DIRECTIVE.find_iter(query).count();
        if limit_directives == 0 {
            warnings.push("Consider adding LIMIT to prevent large result sets".to_string());
        } else if limit_directives > 1 {
            errors.push("Only one row-limit directive (LIMIT or TOP) is allowed".to_string());
        }

        let columns = extract_columns(query);
        if !columns.is_empty() {
            match self.schema.validate_columns(&columns, table_name) {
                Ok(check) => {
                    for column in &check.invalid {
                        match check.suggestions.get(column) {
                            Some(similar) => errors.push(format!(
                                "Invalid column '{}'. Did you mean: {}",
                                column,
                                similar.join(", ")
                            )),
                            None => errors.push(format!("Invalid column '{}'", column)),
                        }
                    }
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        debug!(
            "Validated query against {}: {} errors, {} warnings",
            table_name,
            errors.len(),
            warnings.len()
        );

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            normalized_query: strip_terminators(query),
        }
    }
}

/// True when the statement opens with the SELECT keyword as a whole word
pub fn is_select(query: &str) -> bool {
    LEADING_SELECT.is_match(query.trim_start())
}

/// Forbidden keywords present in `query` as whole words, in policy order
pub fn forbidden_keywords_in(query: &str) -> Vec<&'static str> {
    FORBIDDEN_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(query))
        .map(|(kw, _)| *kw)
        .collect()
}

/// First table named after FROM, lowercased
pub fn extract_table(query: &str) -> Option<String> {
    FROM_TABLE.captures(query).map(|caps| caps[1].to_lowercase())
}

/// Column names referenced by the projection list (between SELECT and FROM).
///
/// Aliases are never reported, `COUNT(*)`-style aggregates are skipped and
/// plain expressions are ignored.
pub fn extract_columns(query: &str) -> Vec<String> {
    let Some(caps) = SELECT_CLAUSE.captures(query) else {
        return Vec::new();
    };
    let clause = CLAUSE_PREFIX.replace(caps[1].trim(), "");

    let mut columns: Vec<String> = Vec::new();
    for fragment in split_top_level(&clause) {
        if let Some(column) = column_of(fragment.trim()) {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }
    columns
}

/// A bare `*` or a qualified `t.*` anywhere in the top-level projection list
fn has_wildcard_projection(query: &str) -> bool {
    let Some(caps) = SELECT_CLAUSE.captures(query) else {
        return false;
    };
    let clause = CLAUSE_PREFIX.replace(caps[1].trim(), "");
    split_top_level(&clause).into_iter().any(|fragment| {
        let fragment = fragment.trim();
        fragment == "*" || fragment.ends_with(".*")
    })
}

fn column_of(fragment: &str) -> Option<String> {
    if fragment.is_empty() || COUNT_ALL.is_match(fragment) {
        return None;
    }

    let fragment = match TRAILING_ALIAS.captures(fragment) {
        Some(caps) => caps.get(1).map_or(fragment, |m| m.as_str()).trim(),
        None => fragment,
    };

    if let Some(caps) = FUNCTION_CALL.captures(fragment) {
        let args = caps.get(1).map_or("", |m| m.as_str());
        let first = split_top_level(args).into_iter().next().unwrap_or_default();
        let first = CLAUSE_PREFIX.replace(first.trim(), "");
        if first.trim() == "*" {
            return None;
        }
        return column_of(first.trim());
    }

    // Qualified references (`pscomppars.pl_name`) are checked by column name.
    COLUMN_REF.captures(fragment).map(|caps| caps[1].to_string())
}

/// Split on commas that are not nested inside parentheses or string literals
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;

    for (i, ch) in text.char_indices() {
        match ch {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Mechanical fix for a diagnostic, when one exists
pub fn suggest_fix(error_message: &str, query: &str) -> Option<String> {
    if error_message.to_lowercase().contains("semicolon") {
        return Some(strip_terminators(query));
    }
    // Wildcards need a human (or the LLM) to pick columns.
    None
}
