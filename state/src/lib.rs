// Sage State
// Session history persisted as one JSON file per conversation

pub mod store;

pub use store::{SessionStore, SessionSummary, StateError, session_id_for, session_slug};
