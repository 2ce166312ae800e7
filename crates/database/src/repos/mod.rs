//! Database repository implementations

pub mod conversation_repository;
pub mod message_repository;
pub mod notification_repository;
pub mod user_repository;

pub use conversation_repository::ConversationRepository;
pub use message_repository::MessageRepository;
pub use notification_repository::NotificationRepository;
pub use user_repository::UserRepository;
