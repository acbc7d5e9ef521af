//! Typed storage engines. `memory` is the LRU-bounded in-memory engine,
//! `multi` shards keys across several engines, `durable` keeps items in a
//! sled tree on disk. All of them implement the same [`Storage`] contract,
//! so they are interchangeable behind the server.

pub mod durable;
pub mod item;
pub mod memory;
pub mod multi;

pub use durable::SledStorage;
pub use item::{Item, Kind, Value};
pub use memory::MemoryStorage;
pub use multi::MultiStorage;

use thiserror::Error as ThisError;

/// Operation failures. The `Display` strings are written to the wire
/// verbatim after `ERROR `.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    #[error("Key does not exist")]
    KeyNotExist,
    #[error("Key already exists")]
    KeyAlreadyExists,
    #[error("Key type is not {0}")]
    KeyTypeMismatch(Kind),
    #[error("Field does not exist")]
    FieldNotExist,
    #[error("List is empty")]
    ListEmpty,
    #[error("Operation is not supported")]
    Unsupported,
    #[error("Storage failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The storage-engine contract. TTLs are in seconds, zero meaning "never
/// expires". Implementations synchronise internally; all operations are
/// atomic with respect to each other on the same engine.
pub trait Storage: Send + Sync {
    /// Sorted list of all live keys.
    fn keys(&self) -> Vec<String>;

    /// Remaining lifetime of an existing key in seconds (0 = never expires).
    fn ttl(&self, key: &str) -> Result<u64>;

    /// Resets the expiry of an existing key.
    fn expire(&self, key: &str, ttl: u64) -> Result<()>;

    fn get(&self, key: &str) -> Result<String>;

    /// Creates a string item. Fails if the key already exists.
    fn set(&self, key: &str, value: String, ttl: u64) -> Result<()>;

    /// Replaces the value of an existing string item.
    fn update(&self, key: &str, value: String) -> Result<()>;

    /// Removes a key of any kind.
    fn delete(&self, key: &str) -> Result<()>;

    /// Creates an empty hash. Fails if the key already exists.
    fn hash_create(&self, key: &str, ttl: u64) -> Result<()>;

    fn hash_get(&self, key: &str, field: &str) -> Result<String>;

    /// All fields of a hash, sorted by field name.
    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>>;

    fn hash_set(&self, key: &str, field: &str, value: String) -> Result<()>;

    fn hash_delete(&self, key: &str, field: &str) -> Result<()>;

    fn hash_len(&self, key: &str) -> Result<usize>;

    /// Sorted list of a hash's field names.
    fn hash_keys(&self, key: &str) -> Result<Vec<String>>;

    /// Creates an empty list. Fails if the key already exists.
    fn list_create(&self, key: &str, ttl: u64) -> Result<()>;

    fn list_left_pop(&self, key: &str) -> Result<String>;

    fn list_right_pop(&self, key: &str) -> Result<String>;

    fn list_left_push(&self, key: &str, value: String) -> Result<()>;

    fn list_right_push(&self, key: &str, value: String) -> Result<()>;

    fn list_len(&self, key: &str) -> Result<usize>;

    /// Elements between `start` and `stop` inclusive. Bounds are clamped to
    /// the list; an effectively empty range yields an empty vec.
    fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
}
