//! Memory Backend
//!
//! A process-wide associative store guarded for concurrent access. Read of a
//! missing key returns `None`.

use crate::address::{Address, Method};
use crate::crypto::{content_hash, HashEncoding};
use crate::error::Result;
use crate::storage::{
    content_file_name, ByteStore, ContentAddressedStore, EraseableStore, JsonArchive, Store,
    WriteRecord,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Default)]
pub struct MemoryStore {
    identifier: Option<String>,
    values: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        MemoryStore { identifier: Some(identifier.into()), values: DashMap::new() }
    }

    /// Number of stored values. Used by tests and size accounting.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl ContentAddressedStore for MemoryStore {
    async fn content_write(&self, dir: &str, bytes: &[u8]) -> Result<WriteRecord> {
        let hash = content_hash(bytes, HashEncoding::Hex);
        let path = format!("{}/{}", dir.trim_end_matches('/'), content_file_name(&hash));
        self.values.insert(path.clone(), bytes.to_vec());
        Ok(WriteRecord {
            hash,
            size: bytes.len(),
            address: Address::new(Method::Memory, path.as_str()),
            path,
        })
    }
}

#[async_trait]
impl JsonArchive for MemoryStore {
    async fn read_json(&self, address: &Address) -> Result<Option<serde_json::Value>> {
        match self.values.get(address.path()) {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ByteStore for MemoryStore {
    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.values.insert(path.trim_start_matches('/').to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.get(path.trim_start_matches('/')).map(|v| v.clone()))
    }
}

#[async_trait]
impl EraseableStore for MemoryStore {
    async fn delete(&self, address: &Address) -> Result<()> {
        self.values.remove(address.path());
        Ok(())
    }
}

impl Store for MemoryStore {
    fn method(&self) -> Method {
        Method::Memory
    }

    fn identifiers(&self) -> HashSet<String> {
        self.identifier.iter().cloned().collect()
    }

    fn content_addressed(&self) -> Option<&dyn ContentAddressedStore> {
        Some(self)
    }

    fn json_archive(&self) -> Option<&dyn JsonArchive> {
        Some(self)
    }

    fn byte_store(&self) -> Option<&dyn ByteStore> {
        Some(self)
    }

    fn eraseable(&self) -> Option<&dyn EraseableStore> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_and_missing_key() {
        let store = MemoryStore::new();
        store.write_bytes("a/b/head", b"fluree:memory://a/b/commits/ff.json").await.unwrap();
        let read = store.read_bytes("a/b/head").await.unwrap().unwrap();
        assert_eq!(read, b"fluree:memory://a/b/commits/ff.json");
        assert!(store.read_bytes("a/b/other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_content_write_idempotent() {
        let store = MemoryStore::new();
        let a = store.content_write("dir", b"v").await.unwrap();
        let b = store.content_write("dir", b"v").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }
}
