//! Domain entities for the database layer

pub mod conversation;
pub mod message;
pub mod notification;
pub mod user;

pub use conversation::{Conversation, ConversationOverview};
pub use message::{Message, MessageHistory, MessageOrder, MessageThread, NewMessage};
pub use notification::Notification;
pub use user::{NewUser, User, UserCleanup, UserProfileUpdate};
