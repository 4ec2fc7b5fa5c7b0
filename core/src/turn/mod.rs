//! Turn execution module
//!
//! One user turn of a Sage session: planning, the streaming tool loop and
//! forced finalization

pub mod dispatch;
pub mod executor;
pub mod planning;
pub mod tool_calls;

pub use dispatch::{KnowledgeSearch, ToolDispatcher};
pub use executor::{TurnConfig, TurnError, TurnExecutor, TurnResult, finalize_instruction};
pub use planning::PlanningConfig;
pub use tool_calls::ToolCallAccumulator;
