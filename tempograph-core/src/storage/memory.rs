//! In-memory key-value backend
//!
//! Serves as the ephemeral session-scoped store (contents do not survive a
//! restart) and as the storage double in unit tests.

use crate::error::Result;
use crate::storage::KvStore;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;

/// Ephemeral key-value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_and_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("session", &json!({"id": "s1", "speed_changes": 2})).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("session").unwrap(),
            Some(json!({"id": "s1", "speed_changes": 2}))
        );

        store.remove("session").unwrap();
        assert_eq!(store.get("session").unwrap(), None);
        assert!(store.is_empty());
    }
}
