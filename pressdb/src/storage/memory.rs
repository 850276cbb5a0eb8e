use super::StorageDriver;
use crate::error::{PressDbError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// In-memory mount. Backs repository snapshots and tests.
#[derive(Default)]
pub struct MemoryDriver {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        MemoryDriver::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(key.into(), bytes);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| PressDbError::UnknownKey(key.to_string()))
    }
}
