//! Storage Substrate
//!
//! Content-addressed put/get/list/delete over bytes and parsed JSON, with
//! pluggable backends behind a uniform address space:
//! - File (local filesystem, optional at-rest encryption)
//! - Memory (process-wide concurrent map)
//! - Object store (S3-style contract, Express-session and vended credentials)
//! - IPFS/IPNS (HTTP API)
//! - Remote (read-through tunnel with server failover)
//!
//! A backend implements a capability set drawn from the traits below and
//! declares the set through [`Store`]. The connection facade dispatches
//! dynamically and refuses absent capabilities with an `Unsupported` error.
//!
//! ## Write record
//!
//! Every content-addressed write yields `{hash, size, address, path}`. The
//! hash is a SHA-256 digest over the serialized bytes in the backend's
//! configured encoding; size is the byte length before any optional
//! encryption; the address is the canonical fluree address for the bytes.

pub mod file;
pub mod ipfs;
pub mod memory;
pub mod object;
pub mod remote;

pub use file::FileStore;
pub use ipfs::IpfsStore;
pub use memory::MemoryStore;
pub use object::{
    Credentials, MemoryObjectClient, ObjectClient, ObjectStore, VendedCredentialCache,
    SESSION_REFRESH_BUFFER_SECS,
};
pub use remote::RemoteStore;

use crate::address::{Address, Method};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Result of every content-addressed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRecord {
    /// Digest over the serialized bytes, in the backend's configured encoding
    pub hash: String,
    /// Byte length before any optional encryption
    pub size: usize,
    /// Canonical fluree address for the bytes
    pub address: Address,
    /// Backend-relative path the bytes were placed under
    pub path: String,
}

/// Metadata returned by [`StatStore::stat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStat {
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Content-addressed writes: hash the input deterministically and place it
/// under `dir/<hash>.json`. Writing the same bytes twice yields the same
/// address and the same stored value.
#[async_trait]
pub trait ContentAddressedStore: Send + Sync {
    async fn content_write(&self, dir: &str, bytes: &[u8]) -> Result<WriteRecord>;
}

/// Reads of stored JSON documents. A missing address is `Ok(None)`, never an
/// error.
#[async_trait]
pub trait JsonArchive: Send + Sync {
    async fn read_json(&self, address: &Address) -> Result<Option<serde_json::Value>>;
}

/// Raw byte reads and writes for non-content-addressed payloads (head
/// pointers, raw index bytes).
#[async_trait]
pub trait ByteStore: Send + Sync {
    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// `Ok(None)` when the path is absent.
    async fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

/// Explicit erase of an immutable value.
#[async_trait]
pub trait EraseableStore: Send + Sync {
    async fn delete(&self, address: &Address) -> Result<()>;
}

/// Partial reads, offered by object-store backends.
#[async_trait]
pub trait RangeReadableStore: Send + Sync {
    async fn read_range(&self, address: &Address, offset: u64, length: u64) -> Result<Vec<u8>>;
}

/// Object metadata lookup.
#[async_trait]
pub trait StatStore: Send + Sync {
    async fn stat(&self, address: &Address) -> Result<Option<ObjectStat>>;
}

/// Umbrella trait every backend implements: names its method and exposes the
/// capabilities it supports. A `None` accessor means the capability is
/// absent and the facade answers `Unsupported`.
pub trait Store: Send + Sync {
    fn method(&self) -> Method;

    /// Logical space identifiers when several spaces multiplex one backend.
    fn identifiers(&self) -> HashSet<String> {
        HashSet::new()
    }

    fn content_addressed(&self) -> Option<&dyn ContentAddressedStore> {
        None
    }

    fn json_archive(&self) -> Option<&dyn JsonArchive> {
        None
    }

    fn byte_store(&self) -> Option<&dyn ByteStore> {
        None
    }

    fn eraseable(&self) -> Option<&dyn EraseableStore> {
        None
    }

    fn range_readable(&self) -> Option<&dyn RangeReadableStore> {
        None
    }

    fn stat_store(&self) -> Option<&dyn StatStore> {
        None
    }
}

/// File name of a content-addressed value.
pub(crate) fn content_file_name(hash: &str) -> String {
    format!("{hash}.json")
}
