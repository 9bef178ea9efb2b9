//! Prompt text for the translation model
//!
//! The system instruction is assembled from the live schema and the concept
//! table so it never drifts from what the validator accepts.

use crate::concepts;
use crate::schema::SchemaRegistry;
use crate::sql::FORBIDDEN_KEYWORDS;
use std::fmt::Write;

const PREAMBLE: &str = "You are an expert astronomer assistant that helps users query the NASA Exoplanet Archive.

Your role:
1. Translate natural language questions into ADQL (Astronomical Data Query Language) queries
2. Pick a visualization that fits the result";

const CHART_TYPES: &str = "VISUALIZATION TYPES:
- scatter: Two continuous variables (radius vs mass)
- line_chart: Time series (discoveries per year)
- bar_chart: Categorical comparisons (count by method)
- stacked_bar: Categorical comparisons split by a second category
- histogram: Single variable distribution
- table: Raw data or lists
- kpi: Single numeric value";

const OUTPUT_CONTRACT: &str = r#"Respond with a single JSON object and nothing else:
{
  "sql": "the ADQL query",
  "visualization": {
    "type": "chart type",
    "title": "descriptive title",
    "description": "what the chart shows",
    "x_field": "column name or null",
    "y_field": "column name or null",
    "color_field": "column name or null",
    "size_field": "column name or null",
    "x_label": "axis label",
    "y_label": "axis label",
    "x_scale": "linear or log",
    "y_scale": "linear or log"
  }
}"#;

const FOLLOW_UPS: &str = "CONVERSATION CONTEXT:
If the user asks a follow-up question, modify the previous query instead of starting over:
- \"now only transiting\" -> add pl_tranflag = 1 to WHERE
- \"color by method\" -> set color_field and make sure the column is selected
- \"show as bar chart\" -> change the visualization type only";

/// System instruction: schema reference, concept conditions, query rules,
/// chart kinds and the JSON output contract.
pub fn system_prompt(schema: &SchemaRegistry, default_table: &str, default_limit: u32, max_limit: u32) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str("\n\nSCHEMA REFERENCE:\n");

    let tables = schema.snapshot();
    let _ = writeln!(
        prompt,
        "Tables: {}",
        tables
            .iter()
            .map(|(name, table)| format!("{} ({})", name, table.description))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let _ = writeln!(prompt, "Default table: {}", default_table);

    if let Some(table) = tables.get(default_table) {
        prompt.push_str("\nColumns:\n");
        for (name, info) in &table.columns {
            match &info.unit {
                Some(unit) => {
                    let _ = writeln!(prompt, "- {}: {} ({})", name, info.description, unit);
                }
                None => {
                    let _ = writeln!(prompt, "- {}: {}", name, info.description);
                }
            }
        }
    }

    prompt.push_str("\nCONCEPT MAPPINGS:\n");
    for concept in concepts::all() {
        let _ = writeln!(prompt, "- {}: {}", concept.name, concept.condition);
    }

    let _ = write!(
        prompt,
        "\nSQL RULES:
1. SELECT only - never {}
2. No semicolons
3. No SELECT * - always specify columns
4. Only use columns listed above
5. Always use ORDER BY for deterministic results
6. Always limit the rows (default {}, max {})

{}

{}

{}
",
        FORBIDDEN_KEYWORDS.join(", "),
        default_limit,
        max_limit,
        CHART_TYPES,
        OUTPUT_CONTRACT,
        FOLLOW_UPS
    );
    prompt
}

/// User message for one turn
pub fn user_message(question: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        "No previous context."
    } else {
        context
    };
    format!(
        "User question: {}\n\n{}\n\nGenerate the SQL query and visualization specification.",
        question.trim(),
        context
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::registry::tests::test_registry;

    #[test]
    fn test_system_prompt_lists_schema_and_concepts() {
        let prompt = system_prompt(&test_registry(), "pscomppars", 1000, 10_000);
        assert!(prompt.contains("- pl_rade: Planet Radius (earthRad)"));
        assert!(prompt.contains("- hostname: Host Name\n"));
        assert!(prompt.contains("keplernames (Kepler names)"));
        assert!(prompt.contains("- hot-jupiter: pl_rade >= 9.0 AND pl_orbper < 10"));
        assert!(prompt.contains("default 1000, max 10000"));
        assert!(prompt.contains("never INSERT, UPDATE, DELETE"));
        assert!(prompt.contains("\"sql\": \"the ADQL query\""));
    }

    #[test]
    fn test_unknown_default_table_skips_columns() {
        let prompt = system_prompt(&test_registry(), "nope", 10, 20);
        assert!(!prompt.contains("\nColumns:\n"));
        assert!(prompt.contains("CONCEPT MAPPINGS"));
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            user_message(" How many planets? ", ""),
            "User question: How many planets?\n\nNo previous context.\n\nGenerate the SQL query and visualization specification."
        );
        let message = user_message("now only transiting", "Previous query: SELECT pl_name FROM ps");
        assert!(message.contains("\n\nPrevious query: SELECT pl_name FROM ps\n\n"));
    }
}
