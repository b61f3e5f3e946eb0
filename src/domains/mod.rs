pub mod adoption;
pub mod application;
pub mod conversation;
pub mod core;
pub mod permission;
pub mod user;

pub use conversation::{ConversationService, ConversationServiceImpl};
