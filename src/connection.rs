//! Connection Facade
//!
//! Binds a storage substrate, resolver cache, and serializer into a single
//! handle exposing commit/context/index read+write and the namespace
//! operations (address <-> alias, head push, existence). Every write routes
//! through the substrate's content-addressed write; the caller never
//! computes a path.
//!
//! Head push is last-writer-wins; no consensus is claimed. Operations on a
//! closed connection raise `Closed`.

use crate::address::{self, Address, Method};
use crate::cache::ResolverCache;
use crate::config::{ConnectionConfig, IndexerConfig};
use crate::error::{Error, Result};
use crate::index::{ChildPointer, IndexResolver, IndexType, ResolvedNode, ResolverCacheKey};
use crate::ledger_records::{canonical_json, GarbageRecord, IndexRootRecord};
use crate::storage::{Store, WriteRecord};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A ledger name: alias plus branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ledger {
    pub alias: String,
    pub branch: String,
}

impl Ledger {
    pub fn new(alias: impl Into<String>, branch: impl Into<String>) -> Self {
        Ledger { alias: alias.into(), branch: branch.into() }
    }

    /// The `main` branch of an alias.
    pub fn main(alias: impl Into<String>) -> Self {
        Ledger::new(alias, "main")
    }
}

/// Serializes commit payloads into the bytes that get content-addressed.
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>>;
}

/// Canonical-JSON serializer: sorted keys, compact form, deterministic
/// bytes. Writing the same logical document twice yields the same address.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(canonical_json(value).into_bytes())
    }
}

/// Handle for background index maintenance created from a connection.
#[derive(Debug, Clone)]
pub struct Indexer {
    pub reindex_min_bytes: u64,
    pub reindex_max_bytes: u64,
}

impl Indexer {
    /// Whether accumulated novelty warrants a reindex.
    pub fn needs_reindex(&self, novelty_bytes: u64) -> bool {
        novelty_bytes >= self.reindex_min_bytes
    }

    /// Whether novelty has grown past the hard ceiling.
    pub fn reindex_overdue(&self, novelty_bytes: u64) -> bool {
        novelty_bytes >= self.reindex_max_bytes
    }
}

pub struct Connection {
    id: Uuid,
    storage: Arc<dyn Store>,
    cache: Arc<ResolverCache<ResolverCacheKey, Arc<ResolvedNode>>>,
    resolver: IndexResolver,
    serializer: Arc<dyn Serializer>,
    config: ConnectionConfig,
    closed: AtomicBool,
}

impl Connection {
    /// Bind a storage substrate with the default serializer and a cache
    /// sized from the connection config.
    pub fn new(storage: Arc<dyn Store>, config: ConnectionConfig) -> Result<Self> {
        Connection::with_serializer(storage, config, Arc::new(JsonSerializer))
    }

    pub fn with_serializer(
        storage: Arc<dyn Store>,
        config: ConnectionConfig,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Self> {
        let cache = Arc::new(ResolverCache::new(config.memory_budget_bytes)?);
        let resolver = IndexResolver::new(storage.clone(), cache.clone());
        Ok(Connection {
            id: Uuid::new_v4(),
            storage,
            cache,
            resolver,
            serializer,
            config,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::closed("connection is closed"))
        } else {
            Ok(())
        }
    }

    fn content_store(&self) -> Result<&dyn crate::storage::ContentAddressedStore> {
        self.storage
            .content_addressed()
            .ok_or_else(|| Error::unsupported("backend does not support content-addressed writes"))
    }

    fn byte_store(&self) -> Result<&dyn crate::storage::ByteStore> {
        self.storage
            .byte_store()
            .ok_or_else(|| Error::unsupported("backend does not support byte reads/writes"))
    }

    fn json_archive(&self) -> Result<&dyn crate::storage::JsonArchive> {
        self.storage
            .json_archive()
            .ok_or_else(|| Error::unsupported("backend does not support JSON reads"))
    }

    // ------------------------------------------------------------------
    // Commit and context I/O
    // ------------------------------------------------------------------

    /// Serialize and content-address a commit under the ledger's commit
    /// directory.
    pub async fn commit_write(&self, ledger: &Ledger, commit: &Value) -> Result<WriteRecord> {
        self.ensure_open()?;
        let bytes = self.serializer.serialize(commit)?;
        let dir = address::commit_dir(&ledger.alias, &ledger.branch);
        self.content_store()?.content_write(&dir, &bytes).await
    }

    /// Read a commit back; `None` when the address is absent.
    pub async fn commit_read(&self, address: &Address) -> Result<Option<Value>> {
        self.ensure_open()?;
        self.json_archive()?.read_json(address).await
    }

    pub async fn context_write(&self, ledger: &Ledger, context: &Value) -> Result<WriteRecord> {
        self.ensure_open()?;
        let bytes = self.serializer.serialize(context)?;
        let dir = address::context_dir(&ledger.alias, &ledger.branch);
        self.content_store()?.content_write(&dir, &bytes).await
    }

    pub async fn context_read(&self, address: &Address) -> Result<Option<Value>> {
        self.ensure_open()?;
        self.json_archive()?.read_json(address).await
    }

    // ------------------------------------------------------------------
    // Index-node I/O
    // ------------------------------------------------------------------

    pub async fn index_file_write(
        &self,
        ledger: &Ledger,
        idx: IndexType,
        data: &Value,
    ) -> Result<WriteRecord> {
        self.ensure_open()?;
        let bytes = self.serializer.serialize(data)?;
        let dir = address::index_dir(&ledger.alias, &ledger.branch, idx.as_str());
        self.content_store()?.content_write(&dir, &bytes).await
    }

    pub async fn index_file_read(&self, address: &Address) -> Result<Option<Value>> {
        self.ensure_open()?;
        self.json_archive()?.read_json(address).await
    }

    /// Record the index nodes a reindex made unreachable.
    pub async fn garbage_write(
        &self,
        ledger: &Ledger,
        record: &GarbageRecord,
    ) -> Result<WriteRecord> {
        self.ensure_open()?;
        let bytes = self.serializer.serialize(&serde_json::to_value(record)?)?;
        let dir = address::garbage_dir(&ledger.alias, &ledger.branch);
        self.content_store()?.content_write(&dir, &bytes).await
    }

    pub async fn garbage_read(&self, address: &Address) -> Result<Option<GarbageRecord>> {
        self.ensure_open()?;
        match self.json_archive()?.read_json(address).await? {
            Some(json) => Ok(Some(serde_json::from_value(json)?)),
            None => Ok(None),
        }
    }

    /// Persist the root record naming the top of every index at one `t`.
    pub async fn index_root_write(
        &self,
        ledger: &Ledger,
        record: &IndexRootRecord,
    ) -> Result<WriteRecord> {
        self.ensure_open()?;
        let bytes = self.serializer.serialize(&serde_json::to_value(record)?)?;
        let dir = address::index_root_dir(&ledger.alias, &ledger.branch);
        self.content_store()?.content_write(&dir, &bytes).await
    }

    pub async fn index_root_read(&self, address: &Address) -> Result<Option<IndexRootRecord>> {
        self.ensure_open()?;
        match self.json_archive()?.read_json(address).await? {
            Some(json) => Ok(Some(serde_json::from_value(json)?)),
            None => Ok(None),
        }
    }

    /// Materialize an index node through the resolver cache.
    pub async fn resolve_index_node(
        &self,
        index: IndexType,
        pointer: &ChildPointer,
        salt: &str,
    ) -> Result<Arc<ResolvedNode>> {
        self.ensure_open()?;
        self.resolver.resolve(index, pointer, salt).await
    }

    // ------------------------------------------------------------------
    // Namespace operations
    // ------------------------------------------------------------------

    /// Head address of a ledger branch.
    pub fn address(&self, alias: &str, branch: &str) -> Address {
        Address::new(self.storage.method(), address::head_path(alias, branch))
    }

    /// Alias extracted back out of a ledger address.
    pub fn alias(&self, addr: &Address) -> Result<String> {
        addr.alias()
            .map(str::to_string)
            .ok_or_else(|| Error::invalid_address(format!("address '{addr}' has no alias segment")))
    }

    /// Follow a head pointer to the commit address it names.
    pub async fn lookup(&self, head: &Address) -> Result<Address> {
        self.ensure_open()?;
        let bytes = self
            .byte_store()?
            .read_bytes(head.path())
            .await?
            .ok_or_else(|| Error::not_found(format!("no head pointer at '{head}'")))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| Error::integrity(format!("head pointer at '{head}' is not UTF-8")))?;
        Address::parse(text.trim())
    }

    /// Whether any bytes exist at an address.
    pub async fn exists(&self, addr: &Address) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.byte_store()?.read_bytes(addr.path()).await?.is_some())
    }

    /// Point a branch head at a commit. The commit must already exist in
    /// storage; concurrent pushes race with last-writer-wins.
    pub async fn push(&self, head_path: &str, commit: &Address) -> Result<Address> {
        self.ensure_open()?;
        if !self.exists(commit).await? {
            return Err(Error::not_found(format!(
                "cannot push head: commit '{commit}' not found in storage"
            )));
        }
        self.byte_store()?
            .write_bytes(head_path, commit.to_string().as_bytes())
            .await?;
        Ok(Address::new(self.storage.method(), head_path))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn method(&self) -> Method {
        self.storage.method()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parallelism(&self) -> usize {
        self.config.parallelism
    }

    pub fn default_context(&self) -> Option<&Value> {
        self.config.default_context.as_ref()
    }

    /// Entry budget of the resolver cache (derived from the byte budget).
    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Create an indexer handle, overriding configured thresholds where the
    /// options provide them.
    pub fn new_indexer(&self, opts: Option<IndexerConfig>) -> Indexer {
        let cfg = opts.unwrap_or_else(|| self.config.indexer.clone());
        Indexer { reindex_min_bytes: cfg.reindex_min_bytes, reindex_max_bytes: cfg.reindex_max_bytes }
    }
}
