//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - flureedb.toml (default configuration)
//! - flureedb.local.toml (git-ignored local overrides)
//! - Environment variables (FLUREE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # flureedb.toml
//! [connection]
//! parallelism = 4
//! memory_budget_bytes = 2097152
//!
//! [file_store]
//! root_path = "/var/lib/flureedb/data"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! FLUREE_FILE_STORE__ROOT_PATH=/custom/path
//! FLUREE_CONNECTION__PARALLELISM=8
//! ```

use crate::crypto::HashEncoding;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub file_store: Option<FileStoreConfig>,
    #[serde(default)]
    pub object_store: Option<ObjectStoreConfig>,
    #[serde(default)]
    pub ipfs_store: Option<IpfsStoreConfig>,
    #[serde(default)]
    pub remote_store: Option<RemoteStoreConfig>,
}

/// Connection-level options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Worker parallelism hint exposed through the connection handle
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Byte budget converted into an entry budget for the resolver cache
    #[serde(default = "default_memory_budget")]
    pub memory_budget_bytes: u64,

    /// Default JSON-LD context attached to the connection (opaque here)
    #[serde(default)]
    pub default_context: Option<serde_json::Value>,

    /// Reindex thresholds handed to indexers created from this connection
    #[serde(default)]
    pub indexer: IndexerConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            parallelism: default_parallelism(),
            memory_budget_bytes: default_memory_budget(),
            default_context: None,
            indexer: IndexerConfig::default(),
        }
    }
}

/// Indexer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Bytes of novelty below which reindexing is not worth running
    #[serde(default = "default_reindex_min")]
    pub reindex_min_bytes: u64,
    /// Bytes of novelty above which reindexing is forced
    #[serde(default = "default_reindex_max")]
    pub reindex_max_bytes: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            reindex_min_bytes: default_reindex_min(),
            reindex_max_bytes: default_reindex_max(),
        }
    }
}

/// File backend options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Logical identifier when several spaces multiplex one backend
    #[serde(default)]
    pub identifier: Option<String>,

    /// Root directory; every path is resolved under it
    pub root_path: PathBuf,

    /// Optional AES encryption secret for at-rest byte writes
    #[serde(default)]
    pub encryption_key: Option<String>,
}

/// Object-store backend options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    #[serde(default)]
    pub identifier: Option<String>,

    pub bucket: String,

    /// Key prefix inside the bucket
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// Use path-style object URLs
    #[serde(default)]
    pub path_style: bool,

    /// Digest rendering; object stores default to base32
    #[serde(default = "default_object_hash_encoding")]
    pub hash_encoding: HashEncoding,
}

/// IPFS backend options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpfsStoreConfig {
    /// HTTP API endpoint, ending in '/'
    pub endpoint: String,

    /// Key name used for IPNS publishes when none is given per call
    #[serde(default)]
    pub ipns_default_key: Option<String>,
}

/// Remote backend options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    /// Server URLs tried in order; the first that answers becomes active
    pub servers: Vec<String>,
}

fn default_parallelism() -> usize {
    4
}
fn default_memory_budget() -> u64 {
    1024 * 1024
}
fn default_reindex_min() -> u64 {
    100_000
}
fn default_reindex_max() -> u64 {
    1_000_000
}
fn default_object_hash_encoding() -> HashEncoding {
    HashEncoding::Base32
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. flureedb.toml (base configuration)
    /// 2. flureedb.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (FLUREE_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("flureedb.toml"))
            .merge(Toml::file("flureedb.local.toml"))
            .merge(Env::prefixed("FLUREE_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FLUREE_").split("__"))
            .extract()
    }
}
