//! Byte-level persistence port for the operational cache.

use std::collections::HashMap;

use crate::error::CacheError;

/// Load/save raw records by key.
pub trait CacheStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), CacheError>;

    fn remove(&mut self, key: &str) -> Result<(), CacheError>;
}

/// Process-memory store, for tests and throwaway engines.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert!(store.load("k").unwrap().is_none());
        store.save("k", b"v1").unwrap();
        store.save("k", b"v2").unwrap();
        assert_eq!(store.load("k").unwrap().as_deref(), Some(&b"v2"[..]));
        store.remove("k").unwrap();
        assert!(store.is_empty());
    }
}
