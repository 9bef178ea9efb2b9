//! Execution Module - running ADQL against the archive
//!
//! - `TapService` trait for the remote synchronous query endpoint
//! - `TapClient`, the reqwest implementation
//! - `QueryExecutor`, which normalizes, consults the result cache and shapes
//!   the response into an `ExecutionResult`

pub mod executor;
pub mod result;
pub mod tap;

pub use executor::QueryExecutor;
pub use result::{ExecutionResult, Row};
pub use tap::{ResponseFormat, TapClient, TapResponse, TapService};
