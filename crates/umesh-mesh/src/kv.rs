//! Key-value persistence hook.
//!
//! The mesh layer persists a handful of small values (the stable main
//! version) through [`KvStore`]. Persistence is opportunistic: a node without
//! a store, or with a failing one, keeps running on in-memory state.

use std::collections::HashMap;

use crate::error::KvError;

pub trait KvStore: Send {
    /// Read the value stored under `key`, `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError>;

    fn remove(&mut self, key: &str) -> Result<(), KvError>;
}

/// Volatile store, used by tests and by nodes with storage disabled.
#[derive(Debug, Default, Clone)]
pub struct MemoryKv {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryKv {
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

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }
}
