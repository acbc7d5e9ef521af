use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, SystemTime};

use super::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    String,
    Hash,
    List,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::String => write!(f, "string"),
            Kind::Hash => write!(f, "hash"),
            Kind::List => write!(f, "list"),
        }
    }
}

/// The three value kinds an item can hold. The set is closed; the kind of an
/// item never changes after creation.
#[derive(Clone, Debug)]
pub enum Value {
    String(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::String(_) => Kind::String,
            Value::Hash(_) => Kind::Hash,
            Value::List(_) => Kind::List,
        }
    }
}

/// The unit of storage: a tagged value plus an absolute expiry instant.
/// `None` means the item never expires.
#[derive(Clone, Debug)]
pub struct Item {
    value: Value,
    expires_at: Option<SystemTime>,
}

impl Item {
    /// `ttl` is in seconds; zero means the item never expires.
    pub fn new(value: Value, ttl: u64) -> Item {
        Item {
            value,
            expires_at: expiry(ttl),
        }
    }

    pub(crate) fn with_expiry(value: Value, expires_at: Option<SystemTime>) -> Item {
        Item { value, expires_at }
    }

    pub fn is_alive(&self) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => at > SystemTime::now(),
        }
    }

    /// Remaining lifetime in whole seconds, rounded up; zero means the item
    /// never expires.
    pub fn remaining_ttl(&self) -> u64 {
        let Some(at) = self.expires_at else { return 0 };
        match at.duration_since(SystemTime::now()) {
            Ok(left) if left.subsec_nanos() > 0 => left.as_secs() + 1,
            Ok(left) => left.as_secs(),
            Err(_) => 0,
        }
    }

    pub fn set_ttl(&mut self, ttl: u64) {
        self.expires_at = expiry(ttl);
    }

    pub fn as_str(&self) -> Result<&str, Error> {
        match &self.value {
            Value::String(value) => Ok(value),
            _ => Err(Error::KeyTypeMismatch(Kind::String)),
        }
    }

    pub fn as_string_mut(&mut self) -> Result<&mut String, Error> {
        match &mut self.value {
            Value::String(value) => Ok(value),
            _ => Err(Error::KeyTypeMismatch(Kind::String)),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<String, String>, Error> {
        match &self.value {
            Value::Hash(hash) => Ok(hash),
            _ => Err(Error::KeyTypeMismatch(Kind::Hash)),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<String, String>, Error> {
        match &mut self.value {
            Value::Hash(hash) => Ok(hash),
            _ => Err(Error::KeyTypeMismatch(Kind::Hash)),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<String>, Error> {
        match &self.value {
            Value::List(list) => Ok(list),
            _ => Err(Error::KeyTypeMismatch(Kind::List)),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<String>, Error> {
        match &mut self.value {
            Value::List(list) => Ok(list),
            _ => Err(Error::KeyTypeMismatch(Kind::List)),
        }
    }
}

fn expiry(ttl: u64) -> Option<SystemTime> {
    if ttl == 0 {
        return None;
    }
    // An overflowing deadline is as good as no deadline.
    SystemTime::now().checked_add(Duration::from_secs(ttl))
}
