use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use tracing::debug;

use super::item::{Item, Value};
use super::{Error, Result, Storage};

/// A single slot would make every insertion evict the key that was just
/// touched, so the recency policy requires at least two.
const MIN_CAPACITY: usize = 2;

/// In-memory engine: a key-bounded map of typed items with per-key expiry.
/// One reader/writer lock protects the map and the recency index; every
/// operation holds it for its entire duration. A background reaper purges
/// expired items and stops once the engine is dropped.
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    items: HashMap<String, Entry>,
    /// use-sequence -> key, ordered oldest first. Kept in lockstep with
    /// `items`: every entry's `last_used` appears here exactly once.
    recency: BTreeMap<u64, String>,
    next_use: u64,
    capacity: usize,
}

struct Entry {
    item: Item,
    last_used: u64,
}

impl MemoryStorage {
    /// Creates an engine bounded to `capacity` live keys and spawns its
    /// reaper ticking at `gc_interval`. Must be called within a tokio
    /// runtime.
    pub fn new(capacity: usize, gc_interval: Duration) -> crate::Result<MemoryStorage> {
        if capacity < MIN_CAPACITY {
            return Err(format!(
                "memory storage capacity must be at least {MIN_CAPACITY}, got {capacity}"
            )
            .into());
        }

        let inner = Arc::new(RwLock::new(Inner {
            items: HashMap::new(),
            recency: BTreeMap::new(),
            next_use: 0,
            capacity,
        }));
        spawn_reaper(Arc::downgrade(&inner), gc_interval);

        Ok(MemoryStorage { inner })
    }
}

impl Inner {
    /// Looks up a live item and bumps its recency. An expired entry is
    /// removed on the spot and reported as absent.
    fn resolve(&mut self, key: &str) -> Result<&mut Item> {
        let alive = match self.items.get(key) {
            Some(entry) => entry.item.is_alive(),
            None => return Err(Error::KeyNotExist),
        };
        if !alive {
            self.remove(key);
            return Err(Error::KeyNotExist);
        }

        let use_seq = self.next_use;
        self.next_use += 1;
        let entry = self.items.get_mut(key).expect("entry checked above");
        self.recency.remove(&entry.last_used);
        self.recency.insert(use_seq, key.to_string());
        entry.last_used = use_seq;
        Ok(&mut entry.item)
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.items.remove(key) {
            self.recency.remove(&entry.last_used);
        }
    }

    /// Inserts a fresh item and evicts the least recently used key when the
    /// engine is over capacity.
    fn insert(&mut self, key: &str, item: Item) {
        let use_seq = self.next_use;
        self.next_use += 1;
        self.items.insert(
            key.to_string(),
            Entry {
                item,
                last_used: use_seq,
            },
        );
        self.recency.insert(use_seq, key.to_string());

        if self.items.len() > self.capacity {
            if let Some((_, victim)) = self.recency.pop_first() {
                debug!(key = %victim, "evicting least recently used key");
                self.items.remove(&victim);
            }
        }
    }

    fn create(&mut self, key: &str, item: Item) -> Result<()> {
        if self.resolve(key).is_ok() {
            return Err(Error::KeyAlreadyExists);
        }
        self.insert(key, item);
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn keys(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut keys: Vec<String> = inner
            .items
            .iter()
            .filter(|(_, entry)| entry.item.is_alive())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn ttl(&self, key: &str) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.resolve(key)?.remaining_ttl())
    }

    fn expire(&self, key: &str, ttl: u64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.resolve(key)?.set_ttl(ttl);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.resolve(key)?.as_str()?.to_string())
    }

    fn set(&self, key: &str, value: String, ttl: u64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.create(key, Item::new(Value::String(value), ttl))
    }

    fn update(&self, key: &str, value: String) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        *inner.resolve(key)?.as_string_mut()? = value;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.resolve(key)?;
        inner.remove(key);
        Ok(())
    }

    fn hash_create(&self, key: &str, ttl: u64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.create(key, Item::new(Value::Hash(HashMap::new()), ttl))
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<String> {
        let mut inner = self.inner.write().unwrap();
        let hash = inner.resolve(key)?.as_hash()?;
        hash.get(field).cloned().ok_or(Error::FieldNotExist)
    }

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut inner = self.inner.write().unwrap();
        let hash = inner.resolve(key)?.as_hash()?;
        let mut fields: Vec<(String, String)> = hash
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        fields.sort();
        Ok(fields)
    }

    fn hash_set(&self, key: &str, field: &str, value: String) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let hash = inner.resolve(key)?.as_hash_mut()?;
        hash.insert(field.to_string(), value);
        Ok(())
    }

    fn hash_delete(&self, key: &str, field: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let hash = inner.resolve(key)?.as_hash_mut()?;
        hash.remove(field).map(|_| ()).ok_or(Error::FieldNotExist)
    }

    fn hash_len(&self, key: &str) -> Result<usize> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.resolve(key)?.as_hash()?.len())
    }

    fn hash_keys(&self, key: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.write().unwrap();
        let mut fields: Vec<String> = inner.resolve(key)?.as_hash()?.keys().cloned().collect();
        fields.sort();
        Ok(fields)
    }

    fn list_create(&self, key: &str, ttl: u64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.create(key, Item::new(Value::List(Default::default()), ttl))
    }

    fn list_left_pop(&self, key: &str) -> Result<String> {
        let mut inner = self.inner.write().unwrap();
        let list = inner.resolve(key)?.as_list_mut()?;
        list.pop_front().ok_or(Error::ListEmpty)
    }

    fn list_right_pop(&self, key: &str) -> Result<String> {
        let mut inner = self.inner.write().unwrap();
        let list = inner.resolve(key)?.as_list_mut()?;
        list.pop_back().ok_or(Error::ListEmpty)
    }

    fn list_left_push(&self, key: &str, value: String) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.resolve(key)?.as_list_mut()?.push_front(value);
        Ok(())
    }

    fn list_right_push(&self, key: &str, value: String) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.resolve(key)?.as_list_mut()?.push_back(value);
        Ok(())
    }

    fn list_len(&self, key: &str) -> Result<usize> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.resolve(key)?.as_list()?.len())
    }

    fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut inner = self.inner.write().unwrap();
        let list = inner.resolve(key)?.as_list()?;
        if list.is_empty() {
            return Ok(Vec::new());
        }

        let start = start.max(0) as usize;
        let stop = stop.min(list.len() as i64 - 1);
        if stop < start as i64 {
            return Ok(Vec::new());
        }

        Ok(list
            .iter()
            .skip(start)
            .take(stop as usize - start + 1)
            .cloned()
            .collect())
    }
}

/// Periodically removes expired items. The scan takes the read lock only;
/// removal re-checks liveness under the write lock because the key may have
/// been rewritten since the scan.
fn spawn_reaper(inner: Weak<RwLock<Inner>>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else { break };

            let dead: Vec<String> = {
                let guard = inner.read().unwrap();
                guard
                    .items
                    .iter()
                    .filter(|(_, entry)| !entry.item.is_alive())
                    .map(|(key, _)| key.clone())
                    .collect()
            };
            if dead.is_empty() {
                continue;
            }

            debug!(count = dead.len(), "reaping expired keys");
            let mut guard = inner.write().unwrap();
            for key in &dead {
                if guard
                    .items
                    .get(key)
                    .is_some_and(|entry| !entry.item.is_alive())
                {
                    guard.remove(key);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::storage::Kind;

    fn storage() -> MemoryStorage {
        MemoryStorage::new(100, Duration::from_secs(60)).unwrap()
    }

    /// Plants an already-expired entry, bypassing the public API.
    fn inject_expired(storage: &MemoryStorage, key: &str) {
        let past = SystemTime::now() - Duration::from_secs(1);
        let item = Item::with_expiry(Value::String("dead".to_string()), Some(past));
        storage.inner.write().unwrap().insert(key, item);
    }

    #[tokio::test]
    async fn rejects_degenerate_capacity() {
        assert!(MemoryStorage::new(1, Duration::from_secs(60)).is_err());
        assert!(MemoryStorage::new(2, Duration::from_secs(60)).is_ok());
    }

    #[tokio::test]
    async fn set_and_get() {
        let storage = storage();

        assert_eq!(storage.get("key"), Err(Error::KeyNotExist));
        storage.set("key", "value".to_string(), 0).unwrap();
        assert_eq!(storage.get("key").unwrap(), "value");

        // a second set on the same key must fail
        assert_eq!(
            storage.set("key", "other".to_string(), 0),
            Err(Error::KeyAlreadyExists)
        );
        assert_eq!(storage.get("key").unwrap(), "value");
    }

    #[tokio::test]
    async fn update_requires_existing_string() {
        let storage = storage();

        assert_eq!(
            storage.update("key", "value".to_string()),
            Err(Error::KeyNotExist)
        );

        storage.set("key", "value".to_string(), 0).unwrap();
        storage.update("key", "updated".to_string()).unwrap();
        assert_eq!(storage.get("key").unwrap(), "updated");

        storage.hash_create("hash", 0).unwrap();
        assert_eq!(
            storage.update("hash", "value".to_string()),
            Err(Error::KeyTypeMismatch(Kind::String))
        );
    }

    #[tokio::test]
    async fn delete_works_for_any_kind() {
        let storage = storage();

        assert_eq!(storage.delete("key"), Err(Error::KeyNotExist));

        storage.set("key", "value".to_string(), 0).unwrap();
        storage.hash_create("hash", 0).unwrap();
        storage.delete("key").unwrap();
        storage.delete("hash").unwrap();
        assert_eq!(storage.keys(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn keys_are_sorted_and_exclude_expired() {
        let storage = storage();

        storage.set("b", "2".to_string(), 0).unwrap();
        storage.set("a", "1".to_string(), 0).unwrap();
        inject_expired(&storage, "dead");

        assert_eq!(storage.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn expired_key_is_absent_for_reads() {
        let storage = storage();
        inject_expired(&storage, "key");

        assert_eq!(storage.get("key"), Err(Error::KeyNotExist));
        // the failed read removed the corpse
        assert!(!storage.inner.read().unwrap().items.contains_key("key"));
    }

    #[tokio::test]
    async fn set_may_reuse_an_expired_key() {
        let storage = storage();
        inject_expired(&storage, "key");

        storage.set("key", "fresh".to_string(), 0).unwrap();
        assert_eq!(storage.get("key").unwrap(), "fresh");
    }

    #[tokio::test]
    async fn ttl_and_expire() {
        let storage = storage();

        storage.set("key", "value".to_string(), 60).unwrap();
        let ttl = storage.ttl("key").unwrap();
        assert!(ttl > 0 && ttl <= 60);

        storage.set("forever", "value".to_string(), 0).unwrap();
        assert_eq!(storage.ttl("forever").unwrap(), 0);

        storage.expire("forever", 60).unwrap();
        assert!(storage.ttl("forever").unwrap() > 0);

        assert_eq!(storage.ttl("missing"), Err(Error::KeyNotExist));
        assert_eq!(storage.expire("missing", 60), Err(Error::KeyNotExist));
    }

    #[tokio::test]
    async fn hash_operations() {
        let storage = storage();

        assert_eq!(storage.hash_get("h", "f"), Err(Error::KeyNotExist));
        storage.hash_create("h", 0).unwrap();
        assert_eq!(storage.hash_create("h", 0), Err(Error::KeyAlreadyExists));

        assert_eq!(storage.hash_get("h", "f"), Err(Error::FieldNotExist));
        storage.hash_set("h", "f2", "v2".to_string()).unwrap();
        storage.hash_set("h", "f1", "v1".to_string()).unwrap();

        assert_eq!(storage.hash_get("h", "f1").unwrap(), "v1");
        assert_eq!(storage.hash_len("h").unwrap(), 2);
        assert_eq!(
            storage.hash_keys("h").unwrap(),
            vec!["f1".to_string(), "f2".to_string()]
        );
        assert_eq!(
            storage.hash_get_all("h").unwrap(),
            vec![
                ("f1".to_string(), "v1".to_string()),
                ("f2".to_string(), "v2".to_string()),
            ]
        );

        storage.hash_delete("h", "f1").unwrap();
        assert_eq!(storage.hash_delete("h", "f1"), Err(Error::FieldNotExist));
        assert_eq!(storage.hash_len("h").unwrap(), 1);

        storage.set("s", "value".to_string(), 0).unwrap();
        assert_eq!(
            storage.hash_get("s", "f"),
            Err(Error::KeyTypeMismatch(Kind::Hash))
        );
    }

    #[tokio::test]
    async fn list_push_and_pop() {
        let storage = storage();

        storage.list_create("l", 0).unwrap();
        storage.list_left_push("l", "1".to_string()).unwrap();
        storage.list_right_push("l", "2".to_string()).unwrap();
        storage.list_left_push("l", "3".to_string()).unwrap();

        // list is now 3, 1, 2
        assert_eq!(storage.list_len("l").unwrap(), 3);
        assert_eq!(storage.list_right_pop("l").unwrap(), "2");
        assert_eq!(storage.list_left_pop("l").unwrap(), "3");
        assert_eq!(storage.list_left_pop("l").unwrap(), "1");
        assert_eq!(storage.list_left_pop("l"), Err(Error::ListEmpty));
        assert_eq!(storage.list_right_pop("l"), Err(Error::ListEmpty));

        storage.set("s", "value".to_string(), 0).unwrap();
        assert_eq!(
            storage.list_left_push("s", "x".to_string()),
            Err(Error::KeyTypeMismatch(Kind::List))
        );
        assert_eq!(
            storage.list_left_push("missing", "x".to_string()),
            Err(Error::KeyNotExist)
        );
    }

    #[tokio::test]
    async fn list_range_clamps_bounds() {
        let storage = storage();

        storage.list_create("l", 0).unwrap();
        for value in ["0", "1", "2", "3", "4"] {
            storage.list_right_push("l", value.to_string()).unwrap();
        }

        assert_eq!(storage.list_range("l", 0, 0).unwrap(), vec!["0"]);
        assert_eq!(storage.list_range("l", 1, 2).unwrap(), vec!["1", "2"]);
        assert_eq!(storage.list_range("l", -1, 1).unwrap(), vec!["0", "1"]);
        assert_eq!(storage.list_range("l", 3, 100).unwrap(), vec!["3", "4"]);
        assert_eq!(storage.list_range("l", 4, 2).unwrap(), Vec::<String>::new());

        storage.list_create("empty", 0).unwrap();
        assert_eq!(
            storage.list_range("empty", 0, 9).unwrap(),
            Vec::<String>::new()
        );

        assert_eq!(storage.list_range("missing", 0, 9), Err(Error::KeyNotExist));
    }

    #[tokio::test]
    async fn lru_evicts_the_least_recently_used_key() {
        let storage = MemoryStorage::new(3, Duration::from_secs(60)).unwrap();

        storage.set("k1", "1".to_string(), 0).unwrap();
        storage.set("k2", "2".to_string(), 0).unwrap();
        storage.set("k3", "3".to_string(), 0).unwrap();
        storage.set("k4", "4".to_string(), 0).unwrap();

        assert_eq!(storage.get("k1"), Err(Error::KeyNotExist));
        assert_eq!(storage.get("k2").unwrap(), "2");
        assert_eq!(storage.get("k3").unwrap(), "3");
        assert_eq!(storage.get("k4").unwrap(), "4");
    }

    #[tokio::test]
    async fn reads_refresh_recency() {
        let storage = MemoryStorage::new(2, Duration::from_secs(60)).unwrap();

        storage.set("k1", "1".to_string(), 0).unwrap();
        storage.set("k2", "2".to_string(), 0).unwrap();
        // touch k1 so that k2 becomes the eviction victim
        storage.get("k1").unwrap();
        storage.set("k3", "3".to_string(), 0).unwrap();

        assert_eq!(storage.get("k1").unwrap(), "1");
        assert_eq!(storage.get("k2"), Err(Error::KeyNotExist));
        assert_eq!(storage.get("k3").unwrap(), "3");
    }

    #[tokio::test]
    async fn reaper_purges_expired_items_without_access() {
        let storage = MemoryStorage::new(100, Duration::from_millis(10)).unwrap();

        storage.set("live", "value".to_string(), 0).unwrap();
        inject_expired(&storage, "dead");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let inner = storage.inner.read().unwrap();
        assert!(inner.items.contains_key("live"));
        assert!(!inner.items.contains_key("dead"));
        assert_eq!(inner.recency.len(), inner.items.len());
    }
}
