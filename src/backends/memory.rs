// In-memory durable store backend

use std::sync::Arc;

use dashmap::DashMap;

use super::{BoxFuture, DurableStore};
use crate::components::PushResult;

/// Process-local key/value store. Clones share the same map, which lets tests
/// simulate a restart by handing the same store to a fresh pipeline.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
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

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl DurableStore for MemoryStore {
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PushResult<Option<String>>> {
        Box::pin(async move { Ok(self.entries.get(key).map(|entry| entry.value().clone())) })
    }

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, PushResult<()>> {
        Box::pin(async move {
            self.entries.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PushResult<()>> {
        Box::pin(async move {
            self.entries.remove(key);
            Ok(())
        })
    }
}
