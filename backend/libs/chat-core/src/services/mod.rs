pub mod chat_service;
pub mod directory;

pub use chat_service::ChatService;
pub use directory::{StaticUserDirectory, UserDirectory, UserProfile};
