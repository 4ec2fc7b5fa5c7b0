// Sage Protocol Layer
// Conversation, streaming and event definitions

pub mod events;
pub mod markers;
pub mod message;
pub mod stream;

pub use events::*;
pub use markers::*;
pub use message::{FunctionCall, Message, Role, ToolCall};
pub use stream::{ArgumentPayload, StreamDelta, ToolCallFragment};
