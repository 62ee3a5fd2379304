use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::error::StorageError;
use crate::traits::SlotStore;

/// Slot store backed by a single sqlite table. Every blob is written with its
/// blake3 checksum and verified on read.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl SlotStore for SqliteStore {
    fn read_slot(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT value, checksum FROM slots WHERE key = ?1",
                rusqlite::params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((value, checksum)) => {
                if blake3::hash(&value).as_bytes().as_slice() != checksum.as_slice() {
                    return Err(StorageError::ChecksumMismatch {
                        key: key.to_string(),
                    });
                }
                Ok(Some(value))
            }
        }
    }

    fn write_slot(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let checksum = blake3::hash(value);
        self.conn.execute(
            "INSERT INTO slots (key, value, checksum) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                checksum = excluded.checksum,
                updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
            rusqlite::params![key, value, checksum.as_bytes().as_slice()],
        )?;
        Ok(())
    }

    fn delete_slot(&mut self, key: &str) -> Result<bool, StorageError> {
        let deleted = self
            .conn
            .execute("DELETE FROM slots WHERE key = ?1", rusqlite::params![key])?;
        Ok(deleted > 0)
    }

    fn slot_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT key FROM slots ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        assert_eq!(store.read_slot("resolution_history")?, None);

        store.write_slot("resolution_history", b"[]")?;
        assert_eq!(store.read_slot("resolution_history")?, Some(b"[]".to_vec()));

        store.write_slot("resolution_history", b"[1]")?;
        assert_eq!(store.read_slot("resolution_history")?, Some(b"[1]".to_vec()));
        assert_eq!(store.slot_keys()?, vec!["resolution_history".to_string()]);
        Ok(())
    }

    #[test]
    fn delete_reports_existence() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        store.write_slot("a", b"x")?;
        assert!(store.delete_slot("a")?);
        assert!(!store.delete_slot("a")?);
        assert_eq!(store.read_slot("a")?, None);
        Ok(())
    }

    #[test]
    fn tampered_value_is_rejected() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        store.write_slot("a", b"original")?;
        store
            .conn()
            .execute("UPDATE slots SET value = ?1 WHERE key = 'a'", rusqlite::params![b"forged".to_vec()])?;

        match store.read_slot("a") {
            Err(StorageError::ChecksumMismatch { key }) => assert_eq!(key, "a"),
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("slots.db");
        {
            let mut store = SqliteStore::open(&path)?;
            store.write_slot("k", b"persisted")?;
        }
        let store = SqliteStore::open(&path)?;
        assert_eq!(store.read_slot("k")?, Some(b"persisted".to_vec()));
        Ok(())
    }
}
