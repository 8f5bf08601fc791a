pub mod cache;
pub mod chat;
pub mod conversations;
pub mod init;
pub mod tools;
