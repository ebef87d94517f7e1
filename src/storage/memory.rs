//! In-memory settings and transient store.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use super::{SettingsRepository, TransientStore};
use crate::types::Result;

#[derive(Debug, Default)]
pub struct MemoryStore {
    options: DashMap<String, Value>,
    transients: DashMap<String, (Value, Instant)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn option_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.options.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl SettingsRepository for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.options.get(key).map(|v| v.value().clone()))
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        self.options.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.options.remove(key);
        Ok(())
    }
}

impl TransientStore for MemoryStore {
    fn set_transient(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        self.transients
            .insert(key.to_string(), (value.clone(), Instant::now() + ttl));
        Ok(())
    }

    fn get_transient(&self, key: &str) -> Result<Option<Value>> {
        let expired = match self.transients.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.transients.remove(key);
        }
        Ok(None)
    }

    fn delete_transient(&self, key: &str) -> Result<()> {
        self.transients.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load("k").unwrap().is_none());

        store.save("k", &json!({"status": "enabled"})).unwrap();
        assert_eq!(store.load("k").unwrap(), Some(json!({"status": "enabled"})));
        assert_eq!(store.option_keys(), vec!["k".to_string()]);

        store.delete("k").unwrap();
        assert!(store.load("k").unwrap().is_none());
    }

    #[test]
    fn test_transient_expiry() {
        let store = MemoryStore::new();
        store
            .set_transient("fresh", &json!(1), Duration::from_secs(60))
            .unwrap();
        store.set_transient("stale", &json!(2), Duration::ZERO).unwrap();

        assert_eq!(store.get_transient("fresh").unwrap(), Some(json!(1)));
        assert_eq!(store.get_transient("stale").unwrap(), None);
    }

    #[test]
    fn test_transient_overwrite() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set_transient("k", &json!("a"), ttl).unwrap();
        store.set_transient("k", &json!("b"), ttl).unwrap();
        assert_eq!(store.get_transient("k").unwrap(), Some(json!("b")));

        store.delete_transient("k").unwrap();
        assert_eq!(store.get_transient("k").unwrap(), None);
    }
}
