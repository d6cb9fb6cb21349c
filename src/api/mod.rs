pub mod aggregate;
pub mod chat;
pub mod health;
