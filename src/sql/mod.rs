//! ADQL handling: safety validation and dialect normalization
//!
//! This is a lexical check, not a parser. It understands just enough of a
//! SELECT statement to enforce the read-only policy and to pull column names
//! out of the projection list. Subqueries are not analysed.

pub mod rewrite;
pub mod validator;

pub use rewrite::{build_query, convert_limit_to_top, normalize_query, strip_terminators};
pub use validator::{
    extract_columns, extract_table, forbidden_keywords_in, is_select, suggest_fix, QueryValidator, ValidationResult,
    FORBIDDEN_KEYWORDS,
};
