use crate::error::StorageError;

/// Named-slot persistence offered by the host: each slot holds one opaque blob.
/// Writers are serialized by the caller; implementations do no arbitration.
pub trait SlotStore {
    fn read_slot(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn write_slot(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Returns whether the slot existed.
    fn delete_slot(&mut self, key: &str) -> Result<bool, StorageError>;

    fn slot_keys(&self) -> Result<Vec<String>, StorageError>;
}
