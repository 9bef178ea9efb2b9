pub mod contracts;
pub mod memory;
pub mod prompts;
pub mod service;

pub use contracts::AskResponse;
pub use memory::{ConversationState, Filter, HistoryEntry, SessionStore};
pub use service::ExoplanetAgent;
