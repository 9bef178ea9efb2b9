pub mod agent;
pub mod cache;
pub mod concepts;
pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod schema;
pub mod sql;
pub mod viz;

pub use error::{AnalystError, RemoteError, Result};
