use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::item::Kind;
use super::{Error, Result, Storage};

/// Disk representation of one stored item. Expiry is an absolute unix
/// timestamp so liveness survives a restart. Lists are not representable;
/// list operations on this engine are refused.
#[derive(Debug, Serialize, Deserialize)]
struct StoredItem {
    value: StoredValue,
    expires_at: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
enum StoredValue {
    String(String),
    Hash(HashMap<String, String>),
}

impl StoredItem {
    fn new(value: StoredValue, ttl: u64) -> StoredItem {
        StoredItem {
            value,
            expires_at: expiry(ttl),
        }
    }

    fn is_alive(&self) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => at > unix_now(),
        }
    }

    fn remaining_ttl(&self) -> u64 {
        self.expires_at
            .map(|at| at.saturating_sub(unix_now()))
            .unwrap_or(0)
    }

    fn as_str(&self) -> Result<&str> {
        match &self.value {
            StoredValue::String(value) => Ok(value),
            _ => Err(Error::KeyTypeMismatch(Kind::String)),
        }
    }

    fn as_hash(&self) -> Result<&HashMap<String, String>> {
        match &self.value {
            StoredValue::Hash(hash) => Ok(hash),
            _ => Err(Error::KeyTypeMismatch(Kind::Hash)),
        }
    }

    fn as_hash_mut(&mut self) -> Result<&mut HashMap<String, String>> {
        match &mut self.value {
            StoredValue::Hash(hash) => Ok(hash),
            _ => Err(Error::KeyTypeMismatch(Kind::Hash)),
        }
    }
}

/// File-backed engine on a sled tree. It honours the same contract as the
/// memory engine except for lists. A single engine-wide mutex serialises
/// operations: read-modify-write sequences on one item must not interleave
/// between sessions.
pub struct SledStorage {
    inner: Arc<SledInner>,
}

struct SledInner {
    db: sled::Db,
    lock: Mutex<()>,
}

impl SledStorage {
    /// Opens (or creates) the database file and spawns the reaper. Must be
    /// called within a tokio runtime.
    pub fn open(path: impl AsRef<Path>, gc_interval: Duration) -> crate::Result<SledStorage> {
        let db = sled::open(path)?;
        let inner = Arc::new(SledInner {
            db,
            lock: Mutex::new(()),
        });
        spawn_reaper(Arc::downgrade(&inner), gc_interval);
        Ok(SledStorage { inner })
    }
}

impl SledInner {
    /// Loads a live item; an expired one is deleted and reported absent.
    fn load(&self, key: &str) -> Result<Option<StoredItem>> {
        let Some(bytes) = self.db.get(key).map_err(backend)? else {
            return Ok(None);
        };
        let item: StoredItem = serde_json::from_slice(&bytes).map_err(backend)?;
        if !item.is_alive() {
            self.db.remove(key).map_err(backend)?;
            return Ok(None);
        }
        Ok(Some(item))
    }

    fn resolve(&self, key: &str) -> Result<StoredItem> {
        self.load(key)?.ok_or(Error::KeyNotExist)
    }

    fn store(&self, key: &str, item: &StoredItem) -> Result<()> {
        let bytes = serde_json::to_vec(item).map_err(backend)?;
        self.db.insert(key, bytes).map_err(backend)?;
        Ok(())
    }

    fn create(&self, key: &str, item: StoredItem) -> Result<()> {
        if self.load(key)?.is_some() {
            return Err(Error::KeyAlreadyExists);
        }
        self.store(key, &item)
    }
}

impl Storage for SledStorage {
    fn keys(&self) -> Vec<String> {
        let _guard = self.inner.lock.lock().unwrap();
        let mut keys = Vec::new();
        for entry in self.inner.db.iter() {
            let Ok((key, bytes)) = entry else { continue };
            let Ok(item) = serde_json::from_slice::<StoredItem>(&bytes) else {
                warn!(key = %String::from_utf8_lossy(&key), "skipping undecodable item");
                continue;
            };
            if item.is_alive() {
                if let Ok(key) = String::from_utf8(key.to_vec()) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        keys
    }

    fn ttl(&self, key: &str) -> Result<u64> {
        let _guard = self.inner.lock.lock().unwrap();
        Ok(self.inner.resolve(key)?.remaining_ttl())
    }

    fn expire(&self, key: &str, ttl: u64) -> Result<()> {
        let _guard = self.inner.lock.lock().unwrap();
        let mut item = self.inner.resolve(key)?;
        item.expires_at = expiry(ttl);
        self.inner.store(key, &item)
    }

    fn get(&self, key: &str) -> Result<String> {
        let _guard = self.inner.lock.lock().unwrap();
        Ok(self.inner.resolve(key)?.as_str()?.to_string())
    }

    fn set(&self, key: &str, value: String, ttl: u64) -> Result<()> {
        let _guard = self.inner.lock.lock().unwrap();
        self.inner
            .create(key, StoredItem::new(StoredValue::String(value), ttl))
    }

    fn update(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.inner.lock.lock().unwrap();
        let mut item = self.inner.resolve(key)?;
        item.as_str()?;
        item.value = StoredValue::String(value);
        self.inner.store(key, &item)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.inner.lock.lock().unwrap();
        self.inner.resolve(key)?;
        self.inner.db.remove(key).map_err(backend)?;
        Ok(())
    }

    fn hash_create(&self, key: &str, ttl: u64) -> Result<()> {
        let _guard = self.inner.lock.lock().unwrap();
        self.inner
            .create(key, StoredItem::new(StoredValue::Hash(HashMap::new()), ttl))
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<String> {
        let _guard = self.inner.lock.lock().unwrap();
        let item = self.inner.resolve(key)?;
        item.as_hash()?
            .get(field)
            .cloned()
            .ok_or(Error::FieldNotExist)
    }

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let _guard = self.inner.lock.lock().unwrap();
        let item = self.inner.resolve(key)?;
        let mut fields: Vec<(String, String)> = item
            .as_hash()?
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        fields.sort();
        Ok(fields)
    }

    fn hash_set(&self, key: &str, field: &str, value: String) -> Result<()> {
        let _guard = self.inner.lock.lock().unwrap();
        let mut item = self.inner.resolve(key)?;
        item.as_hash_mut()?.insert(field.to_string(), value);
        self.inner.store(key, &item)
    }

    fn hash_delete(&self, key: &str, field: &str) -> Result<()> {
        let _guard = self.inner.lock.lock().unwrap();
        let mut item = self.inner.resolve(key)?;
        item.as_hash_mut()?
            .remove(field)
            .ok_or(Error::FieldNotExist)?;
        self.inner.store(key, &item)
    }

    fn hash_len(&self, key: &str) -> Result<usize> {
        let _guard = self.inner.lock.lock().unwrap();
        Ok(self.inner.resolve(key)?.as_hash()?.len())
    }

    fn hash_keys(&self, key: &str) -> Result<Vec<String>> {
        let _guard = self.inner.lock.lock().unwrap();
        let item = self.inner.resolve(key)?;
        let mut fields: Vec<String> = item.as_hash()?.keys().cloned().collect();
        fields.sort();
        Ok(fields)
    }

    fn list_create(&self, _key: &str, _ttl: u64) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn list_left_pop(&self, _key: &str) -> Result<String> {
        Err(Error::Unsupported)
    }

    fn list_right_pop(&self, _key: &str) -> Result<String> {
        Err(Error::Unsupported)
    }

    fn list_left_push(&self, _key: &str, _value: String) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn list_right_push(&self, _key: &str, _value: String) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn list_len(&self, _key: &str) -> Result<usize> {
        Err(Error::Unsupported)
    }

    fn list_range(&self, _key: &str, _start: i64, _stop: i64) -> Result<Vec<String>> {
        Err(Error::Unsupported)
    }
}

fn backend(err: impl std::fmt::Display) -> Error {
    Error::Backend(err.to_string())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs())
        .unwrap_or(0)
}

fn expiry(ttl: u64) -> Option<u64> {
    (ttl > 0).then(|| unix_now().saturating_add(ttl))
}

/// Periodically scans the tree and deletes dead or undecodable items.
fn spawn_reaper(inner: Weak<SledInner>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(strong) = inner.upgrade() else { break };

            let _guard = strong.lock.lock().unwrap();
            let mut reaped = 0usize;
            for entry in strong.db.iter() {
                let Ok((key, bytes)) = entry else { continue };
                let dead = serde_json::from_slice::<StoredItem>(&bytes)
                    .map(|item| !item.is_alive())
                    .unwrap_or(true);
                if dead && strong.db.remove(&key).is_ok() {
                    reaped += 1;
                }
            }
            if reaped > 0 {
                debug!(count = reaped, "reaped expired items");
            }
        }
    });
}
