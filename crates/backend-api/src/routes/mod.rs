pub mod admin;
pub mod auth;
pub mod conversations;
pub mod health;
pub mod messages;
pub mod models;
pub mod notifications;
pub mod users;
