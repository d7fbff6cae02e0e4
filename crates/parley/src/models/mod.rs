pub mod conversation;
pub mod value;

pub use conversation::{ContentItem, Conversation, Message, ResultPayload, ToolRun, UNKNOWN_ROLE};
pub use value::{GenericValue, Number};

pub use crate::utils::time::Timestamp;
