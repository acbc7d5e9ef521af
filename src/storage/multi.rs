use super::{Result, Storage};

/// Shards keys across several engines to spread lock contention. Routing is
/// a plain hash mod N, so the shard count is fixed for the lifetime of the
/// router. The router satisfies the [`Storage`] contract itself.
pub struct MultiStorage {
    storages: Vec<Box<dyn Storage>>,
}

impl MultiStorage {
    pub fn new(storages: Vec<Box<dyn Storage>>) -> crate::Result<MultiStorage> {
        if storages.is_empty() {
            return Err("multi storage requires at least one backing storage".into());
        }
        Ok(MultiStorage { storages })
    }

    fn route(&self, key: &str) -> &dyn Storage {
        let index = fnv1a(key.as_bytes()) as usize % self.storages.len();
        self.storages[index].as_ref()
    }
}

/// 32-bit FNV-1a. Routing must stay identical across builds and platforms,
/// hence fixed constants instead of the standard library hasher.
fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 2166136261;
    const PRIME: u32 = 16777619;

    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(PRIME)
    })
}

impl Storage for MultiStorage {
    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .storages
            .iter()
            .flat_map(|storage| storage.keys())
            .collect();
        keys.sort();
        keys
    }

    fn ttl(&self, key: &str) -> Result<u64> {
        self.route(key).ttl(key)
    }

    fn expire(&self, key: &str, ttl: u64) -> Result<()> {
        self.route(key).expire(key, ttl)
    }

    fn get(&self, key: &str) -> Result<String> {
        self.route(key).get(key)
    }

    fn set(&self, key: &str, value: String, ttl: u64) -> Result<()> {
        self.route(key).set(key, value, ttl)
    }

    fn update(&self, key: &str, value: String) -> Result<()> {
        self.route(key).update(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.route(key).delete(key)
    }

    fn hash_create(&self, key: &str, ttl: u64) -> Result<()> {
        self.route(key).hash_create(key, ttl)
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<String> {
        self.route(key).hash_get(key, field)
    }

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        self.route(key).hash_get_all(key)
    }

    fn hash_set(&self, key: &str, field: &str, value: String) -> Result<()> {
        self.route(key).hash_set(key, field, value)
    }

    fn hash_delete(&self, key: &str, field: &str) -> Result<()> {
        self.route(key).hash_delete(key, field)
    }

    fn hash_len(&self, key: &str) -> Result<usize> {
        self.route(key).hash_len(key)
    }

    fn hash_keys(&self, key: &str) -> Result<Vec<String>> {
        self.route(key).hash_keys(key)
    }

    fn list_create(&self, key: &str, ttl: u64) -> Result<()> {
        self.route(key).list_create(key, ttl)
    }

    fn list_left_pop(&self, key: &str) -> Result<String> {
        self.route(key).list_left_pop(key)
    }

    fn list_right_pop(&self, key: &str) -> Result<String> {
        self.route(key).list_right_pop(key)
    }

    fn list_left_push(&self, key: &str, value: String) -> Result<()> {
        self.route(key).list_left_push(key, value)
    }

    fn list_right_push(&self, key: &str, value: String) -> Result<()> {
        self.route(key).list_right_push(key, value)
    }

    fn list_len(&self, key: &str) -> Result<usize> {
        self.route(key).list_len(key)
    }

    fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.route(key).list_range(key, start, stop)
    }
}
