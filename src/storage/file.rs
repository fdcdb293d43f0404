//! File Backend
//!
//! Absolute paths derive from a configured root. Paths are lexically
//! normalized and rejected when they would escape the root. Parent
//! directories are created on first write with exactly one mkdir-then-retry;
//! a second failure is fatal. Writes go through a temp file and rename so a
//! concurrent reader sees either the full value or no value.
//!
//! When an encryption key is configured, every byte-level write is sealed
//! with AES-256-GCM and reversed on read. Hash and size always refer to the
//! plaintext.

use crate::address::{Address, Method};
use crate::config::FileStoreConfig;
use crate::crypto::{content_hash, Encryptor, HashEncoding};
use crate::error::{Error, Result};
use crate::storage::{
    content_file_name, ByteStore, ContentAddressedStore, EraseableStore, JsonArchive, ObjectStat,
    StatStore, Store, WriteRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};

pub struct FileStore {
    root: PathBuf,
    identifier: Option<String>,
    encryptor: Option<Encryptor>,
}

impl FileStore {
    /// Open (and create if needed) the store root. The root is canonicalized
    /// once so later traversal checks are purely lexical.
    pub fn open(config: &FileStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.root_path)?;
        let root = config.root_path.canonicalize()?;
        let encryptor = config
            .encryption_key
            .as_ref()
            .map(|key| Encryptor::from_secret(key.as_bytes()));
        Ok(FileStore { root, identifier: config.identifier.clone(), encryptor })
    }

    /// Resolve a store-relative path, rejecting absolute paths and any `..`
    /// sequence that would climb out of the root.
    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel);
        let mut depth: i32 = 0;
        for component in rel_path.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                Component::ParentDir => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(Error::invalid_address(format!(
                            "path '{rel}' escapes the store root"
                        )));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::invalid_address(format!(
                        "absolute path '{rel}' not allowed in a file store"
                    )));
                }
            }
        }
        Ok(self.root.join(rel_path))
    }

    /// Temp-file + rename write. Missing parent directories trigger exactly
    /// one create-then-retry.
    async fn write_file_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = target.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        let first = tokio::fs::write(&tmp, bytes).await;
        if let Err(err) = first {
            if err.kind() != io::ErrorKind::NotFound {
                return Err(err.into());
            }
            let parent = target
                .parent()
                .ok_or_else(|| Error::io(format!("no parent directory for {}", target.display())))?;
            tokio::fs::create_dir_all(parent).await?;
            tokio::fs::write(&tmp, bytes).await?;
        }
        tokio::fs::rename(&tmp, target).await?;
        Ok(())
    }

    fn seal(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        match &self.encryptor {
            Some(enc) => enc.seal(bytes),
            None => Ok(bytes.to_vec()),
        }
    }

    fn open_sealed(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        match &self.encryptor {
            Some(enc) => enc.open(&bytes),
            None => Ok(bytes),
        }
    }
}

#[async_trait]
impl ContentAddressedStore for FileStore {
    async fn content_write(&self, dir: &str, bytes: &[u8]) -> Result<WriteRecord> {
        let hash = content_hash(bytes, HashEncoding::Hex);
        let rel = format!("{}/{}", dir.trim_end_matches('/'), content_file_name(&hash));
        let target = self.resolve(&rel)?;
        let payload = self.seal(bytes)?;
        self.write_file_atomic(&target, &payload).await?;
        Ok(WriteRecord {
            hash,
            size: bytes.len(),
            address: Address::new(Method::File, rel.as_str()),
            path: rel,
        })
    }
}

#[async_trait]
impl JsonArchive for FileStore {
    async fn read_json(&self, address: &Address) -> Result<Option<serde_json::Value>> {
        match self.read_bytes(address.path()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ByteStore for FileStore {
    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        let payload = self.seal(bytes)?;
        self.write_file_atomic(&target, &payload).await
    }

    async fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(self.open_sealed(bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl EraseableStore for FileStore {
    async fn delete(&self, address: &Address) -> Result<()> {
        let target = self.resolve(address.path())?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl StatStore for FileStore {
    async fn stat(&self, address: &Address) -> Result<Option<ObjectStat>> {
        let target = self.resolve(address.path())?;
        match tokio::fs::metadata(&target).await {
            Ok(meta) => {
                let last_modified = meta
                    .modified()
                    .ok()
                    .map(DateTime::<Utc>::from);
                Ok(Some(ObjectStat { size: meta.len(), etag: None, last_modified }))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl Store for FileStore {
    fn method(&self) -> Method {
        Method::File
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

    fn stat_store(&self) -> Option<&dyn StatStore> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> FileStore {
        FileStore::open(&FileStoreConfig {
            identifier: Some("test".to_string()),
            root_path: temp.path().to_path_buf(),
            encryption_key: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_content_write_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let record = store.content_write("my-alias/main/commits", b"{\"a\":1}").await.unwrap();
        assert_eq!(record.size, 7);
        assert_eq!(record.hash.len(), 64);
        assert!(record.path.ends_with(&format!("{}.json", record.hash)));

        let bytes = store.read_bytes(record.address.path()).await.unwrap().unwrap();
        assert_eq!(bytes, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_content_write_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let a = store.content_write("dir", b"same bytes").await.unwrap();
        let b = store.content_write("dir", b"same bytes").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_missing_file_reads_none() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(store.read_bytes("nothing/here").await.unwrap().is_none());
        let addr = Address::new(Method::File, "nothing/here.json");
        assert!(store.read_json(&addr).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let err = store.read_bytes("../outside").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidAddress);
        // `..` inside the tree that never climbs out is fine
        assert!(store.read_bytes("a/../b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_encrypted_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(&FileStoreConfig {
            identifier: None,
            root_path: temp.path().to_path_buf(),
            encryption_key: Some("secret".to_string()),
        })
        .unwrap();

        let record = store.content_write("dir", b"plaintext").await.unwrap();
        // On-disk bytes differ from the plaintext
        let raw = std::fs::read(temp.path().join(&record.path)).unwrap();
        assert_ne!(raw, b"plaintext");
        // But the read path reverses the encryption
        let read = store.read_bytes(&record.path).await.unwrap().unwrap();
        assert_eq!(read, b"plaintext");
        // Hash and size refer to the plaintext
        assert_eq!(record.size, 9);
        assert_eq!(record.hash, content_hash(b"plaintext", HashEncoding::Hex));
    }

    #[tokio::test]
    async fn test_delete_and_stat() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let record = store.content_write("dir", b"bytes").await.unwrap();

        let stat = store.stat(&record.address).await.unwrap().unwrap();
        assert_eq!(stat.size, 5);

        store.delete(&record.address).await.unwrap();
        assert!(store.read_bytes(&record.path).await.unwrap().is_none());
        assert!(store.stat(&record.address).await.unwrap().is_none());
        // Erase is idempotent
        store.delete(&record.address).await.unwrap();
    }
}
