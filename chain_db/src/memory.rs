use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::DbError;

pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An ordered key-value store with atomic batch writes. One writer at a
/// time; readers observe a consistent snapshot.
pub trait ClientDB: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), DbError>;

    fn delete(&self, key: &[u8]) -> Result<(), DbError>;

    fn exists(&self, key: &[u8]) -> Result<bool, DbError> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply every operation or none of them.
    fn write_batch(&self, batch: Vec<BatchOp>) -> Result<(), DbError>;
}

#[derive(Default)]
pub struct MemoryDB {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDB {
    pub fn open() -> Self {
        Self::default()
    }
}

impl ClientDB for MemoryDB {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        let map = self.map.read().map_err(|_| DbError::poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), DbError> {
        let mut map = self.map.write().map_err(|_| DbError::poisoned())?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), DbError> {
        let mut map = self.map.write().map_err(|_| DbError::poisoned())?;
        map.remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: Vec<BatchOp>) -> Result<(), DbError> {
        // A single lock acquisition makes the batch atomic.
        let mut map = self.map.write().map_err(|_| DbError::poisoned())?;
        for op in batch {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_writes_apply_all_operations() {
        let db = MemoryDB::open();
        db.put(b"stale", b"value").expect("the store is writable");

        db.write_batch(vec![
            BatchOp::Put {
                key: b"one".to_vec(),
                value: b"1".to_vec(),
            },
            BatchOp::Put {
                key: b"two".to_vec(),
                value: b"2".to_vec(),
            },
            BatchOp::Delete {
                key: b"stale".to_vec(),
            },
        ])
        .expect("the store is writable");

        assert_eq!(db.get(b"one").expect("the store is readable"), Some(b"1".to_vec()));
        assert_eq!(db.get(b"two").expect("the store is readable"), Some(b"2".to_vec()));
        assert_eq!(db.get(b"stale").expect("the store is readable"), None);
        assert!(!db.exists(b"stale").expect("the store is readable"));
    }
}
