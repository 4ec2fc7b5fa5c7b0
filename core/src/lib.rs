// Sage Core Library

pub mod knowledge;
pub mod mcp;
pub mod model;
pub mod sandbox;
pub mod sage;
pub mod session;
pub mod stream_parser;
pub mod tools;
pub mod turn;

pub use sage::Sage;
pub use session::SessionContext;
pub use turn::{TurnError, TurnResult};
