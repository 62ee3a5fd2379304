use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::traits::SlotStore;

/// In-process slot store; contents vanish with the value.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for MemoryStore {
    fn read_slot(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.slots.get(key).cloned())
    }

    fn write_slot(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.slots.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_slot(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.slots.remove(key).is_some())
    }

    fn slot_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.slots.keys().cloned().collect())
    }
}
