pub mod conversation;
pub mod message;

pub use conversation::{unordered_key, Conversation, Slot};
pub use message::{Message, MessageKind};
