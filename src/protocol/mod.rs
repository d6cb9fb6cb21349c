pub mod openai_chat;
pub mod prompt;
pub mod vendor;
