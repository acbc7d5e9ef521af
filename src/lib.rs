pub mod auth;
pub mod client;
pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
