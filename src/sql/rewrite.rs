//! Dialect normalization: SQL habits the LLM brings along, rewritten to ADQL.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TRAILING_LIMIT: Regex = Regex::new(r"(?i)\s*\bLIMIT\s+(\d+)\s*$").unwrap();
    static ref LEADING_SELECT: Regex =
        Regex::new(r"(?i)^(SELECT)\s+((?:ALL|DISTINCT)\s+)?(?:TOP\s+(\d+)\s+)?").unwrap();
}

/// Trim and drop trailing statement terminators
pub fn strip_terminators(query: &str) -> String {
    query.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace()).to_string()
}

/// Rewrite a trailing `LIMIT n` as ADQL's leading `TOP n`.
///
/// `SELECT a, b FROM t LIMIT 10` becomes `SELECT TOP 10 a, b FROM t`.
/// `TOP` goes after an `ALL` / `DISTINCT` quantifier. When the query already
/// carries a `TOP`, the smaller of the two limits is kept. Queries without a
/// trailing LIMIT come back unchanged.
pub fn convert_limit_to_top(query: &str) -> String {
    let Some(caps) = TRAILING_LIMIT.captures(query) else {
        return query.to_string();
    };
    let limit = caps[1].to_string();
    let without_limit = TRAILING_LIMIT.replace(query, "");

    LEADING_SELECT
        .replace(&without_limit, |head: &regex::Captures| {
            let top = match head.get(3) {
                Some(existing) => smaller_limit(existing.as_str(), &limit),
                None => limit.clone(),
            };
            format!(
                "{} {}TOP {} ",
                &head[1],
                head.get(2).map_or("", |m| m.as_str()),
                top
            )
        })
        .into_owned()
}

fn smaller_limit(a: &str, b: &str) -> String {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.min(y).to_string(),
        _ => b.to_string(),
    }
}

/// Everything the executor does to the text before it hits the wire
pub fn normalize_query(query: &str) -> String {
    convert_limit_to_top(&strip_terminators(query))
}

/// Assemble an ADQL query from parts; the row limit is clamped to `max_limit`.
pub fn build_query(
    columns: &[&str],
    table: &str,
    where_clause: Option<&str>,
    order_by: Option<&str>,
    limit: u32,
    max_limit: u32,
) -> String {
    let limit = limit.min(max_limit);
    let mut query = format!("SELECT TOP {} {}\nFROM {}", limit, columns.join(", "), table);

    if let Some(conditions) = where_clause.filter(|w| !w.trim().is_empty()) {
        query.push_str(&format!("\nWHERE {}", conditions));
    }
    if let Some(order) = order_by.filter(|o| !o.trim().is_empty()) {
        query.push_str(&format!("\nORDER BY {}", order));
    }
    query
}
