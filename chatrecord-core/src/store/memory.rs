//! In-process store, used by tests and embedders that persist elsewhere.

use super::KeyValueStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Key-value store held in memory.
///
/// [`MemoryStore::invalidate`] makes every call fail with
/// [`Error::ContextInvalidated`], mimicking a host page that has torn down
/// the context the store lived in.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    invalidated: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    pub fn revalidate(&self) {
        self.invalidated.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.invalidated.load(Ordering::SeqCst) {
            Err(Error::ContextInvalidated)
        } else {
            Ok(())
        }
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>> {
        self.values
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check()?;
        Ok(self.values()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check()?;
        self.values()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check()?;
        self.values()?.remove(key);
        Ok(())
    }
}
