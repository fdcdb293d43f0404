//! Object-Store Backend
//!
//! The S3 wire protocol is out of scope; the backend is written against the
//! [`ObjectClient`] contract (put/get/range/delete/stat plus session
//! acquisition) so the credential and session logic here is exercised the
//! same way over any client. `get` maps a missing key to `None`, never an
//! error.
//!
//! Bucket names matching the Express One Zone convention (suffix `--x-s3`)
//! route every call through a session credential, cached per
//! (bucket, base-credential) and refreshed strictly before expiry. Other
//! buckets use the base credentials unchanged.
//!
//! The vended-credentials variant fetches credentials from a caller-supplied
//! provider with a per-context cache whose eviction is driven by the
//! embedded expiration; a buffer forces early refresh. The provider is
//! opaque about its source (REST catalog, STS, static).

use crate::address::{Address, Method};
use crate::config::ObjectStoreConfig;
use crate::crypto::content_hash;
use crate::error::{Error, Result};
use crate::storage::{
    content_file_name, ByteStore, ContentAddressedStore, EraseableStore, JsonArchive, ObjectStat,
    RangeReadableStore, StatStore, Store, WriteRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Seconds before expiry at which a cached session or vended credential is
/// refreshed instead of reused.
pub const SESSION_REFRESH_BUFFER_SECS: i64 = 30;

const EXPRESS_BUCKET_SUFFIX: &str = "--x-s3";

/// Access credentials, base or session-scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn basic(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Credentials {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    /// Usable at `now` with the refresh buffer applied. Credentials without
    /// an expiry never go stale.
    pub fn fresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now + Duration::seconds(SESSION_REFRESH_BUFFER_SECS) < expires,
            None => true,
        }
    }
}

/// Transport contract the backend is written against. A production
/// deployment plugs an SDK-backed client in; tests use
/// [`MemoryObjectClient`].
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, bytes: &[u8], creds: &Credentials) -> Result<()>;

    /// Missing keys are `Ok(None)`.
    async fn get(&self, bucket: &str, key: &str, creds: &Credentials) -> Result<Option<Vec<u8>>>;

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
        creds: &Credentials,
    ) -> Result<Vec<u8>>;

    async fn delete(&self, bucket: &str, key: &str, creds: &Credentials) -> Result<()>;

    async fn stat(&self, bucket: &str, key: &str, creds: &Credentials)
        -> Result<Option<ObjectStat>>;

    /// Acquire a session credential for an Express One Zone bucket.
    async fn create_session(&self, bucket: &str, base: &Credentials) -> Result<Credentials>;
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Session cache for Express One Zone buckets, keyed by
/// (bucket, base access key).
struct SessionCache {
    sessions: Mutex<HashMap<(String, String), Credentials>>,
    clock: Clock,
}

impl SessionCache {
    fn new(clock: Clock) -> Self {
        SessionCache { sessions: Mutex::new(HashMap::new()), clock }
    }

    async fn session_for(
        &self,
        client: &dyn ObjectClient,
        bucket: &str,
        base: &Credentials,
    ) -> Result<Credentials> {
        let key = (bucket.to_string(), base.access_key_id.clone());
        let now = (self.clock)();
        if let Some(cached) = self.sessions.lock().get(&key) {
            if cached.fresh_at(now) {
                return Ok(cached.clone());
            }
        }
        let session = client.create_session(bucket, base).await?;
        self.sessions.lock().insert(key, session.clone());
        Ok(session)
    }
}

/// Async provider of vended credentials, keyed by an opaque context string.
pub type CredentialsProvider =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Credentials>> + Send + Sync>;

/// Per-context cache over a [`CredentialsProvider`]. Entries are evicted by
/// their embedded expiration; the refresh buffer forces early renewal.
pub struct VendedCredentialCache {
    provider: CredentialsProvider,
    cache: Mutex<HashMap<String, Credentials>>,
    clock: Clock,
}

impl VendedCredentialCache {
    pub fn new(provider: CredentialsProvider) -> Self {
        VendedCredentialCache { provider, cache: Mutex::new(HashMap::new()), clock: system_clock() }
    }

    /// Test constructor with an injected clock.
    pub fn with_clock(
        provider: CredentialsProvider,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        VendedCredentialCache { provider, cache: Mutex::new(HashMap::new()), clock: Arc::new(clock) }
    }

    pub async fn credentials_for(&self, context: &str) -> Result<Credentials> {
        let now = (self.clock)();
        if let Some(cached) = self.cache.lock().get(context) {
            if cached.fresh_at(now) {
                return Ok(cached.clone());
            }
        }
        let fetched = (self.provider)(context.to_string()).await?;
        self.cache.lock().insert(context.to_string(), fetched.clone());
        Ok(fetched)
    }
}

/// Object-store backend. Hashes render base32 by default (the object-store
/// convention); keys are the configured prefix joined with the ledger path.
pub struct ObjectStore {
    config: ObjectStoreConfig,
    client: Arc<dyn ObjectClient>,
    base_credentials: Credentials,
    sessions: SessionCache,
}

impl ObjectStore {
    pub fn new(
        config: ObjectStoreConfig,
        client: Arc<dyn ObjectClient>,
        base_credentials: Credentials,
    ) -> Self {
        ObjectStore { config, client, base_credentials, sessions: SessionCache::new(system_clock()) }
    }

    /// Test constructor with an injected clock for session freshness checks.
    pub fn with_clock(
        config: ObjectStoreConfig,
        client: Arc<dyn ObjectClient>,
        base_credentials: Credentials,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        ObjectStore {
            config,
            client,
            base_credentials,
            sessions: SessionCache::new(Arc::new(clock)),
        }
    }

    fn is_express_bucket(&self) -> bool {
        self.config.bucket.ends_with(EXPRESS_BUCKET_SUFFIX)
    }

    async fn credentials(&self) -> Result<Credentials> {
        if self.is_express_bucket() {
            self.sessions
                .session_for(self.client.as_ref(), &self.config.bucket, &self.base_credentials)
                .await
        } else {
            Ok(self.base_credentials.clone())
        }
    }

    fn key(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.config.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.config.prefix.trim_end_matches('/'), path)
        }
    }
}

#[async_trait]
impl ContentAddressedStore for ObjectStore {
    async fn content_write(&self, dir: &str, bytes: &[u8]) -> Result<WriteRecord> {
        let hash = content_hash(bytes, self.config.hash_encoding);
        let path = format!("{}/{}", dir.trim_end_matches('/'), content_file_name(&hash));
        let creds = self.credentials().await?;
        self.client.put(&self.config.bucket, &self.key(&path), bytes, &creds).await?;
        Ok(WriteRecord {
            hash,
            size: bytes.len(),
            address: Address::new(Method::S3, path.as_str()),
            path,
        })
    }
}

#[async_trait]
impl JsonArchive for ObjectStore {
    async fn read_json(&self, address: &Address) -> Result<Option<serde_json::Value>> {
        match self.read_bytes(address.path()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ByteStore for ObjectStore {
    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let creds = self.credentials().await?;
        self.client.put(&self.config.bucket, &self.key(path), bytes, &creds).await
    }

    async fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let creds = self.credentials().await?;
        self.client.get(&self.config.bucket, &self.key(path), &creds).await
    }
}

#[async_trait]
impl EraseableStore for ObjectStore {
    async fn delete(&self, address: &Address) -> Result<()> {
        let creds = self.credentials().await?;
        self.client.delete(&self.config.bucket, &self.key(address.path()), &creds).await
    }
}

#[async_trait]
impl RangeReadableStore for ObjectStore {
    async fn read_range(&self, address: &Address, offset: u64, length: u64) -> Result<Vec<u8>> {
        let creds = self.credentials().await?;
        self.client
            .get_range(&self.config.bucket, &self.key(address.path()), offset, length, &creds)
            .await
    }
}

#[async_trait]
impl StatStore for ObjectStore {
    async fn stat(&self, address: &Address) -> Result<Option<ObjectStat>> {
        let creds = self.credentials().await?;
        self.client.stat(&self.config.bucket, &self.key(address.path()), &creds).await
    }
}

impl Store for ObjectStore {
    fn method(&self) -> Method {
        Method::S3
    }

    fn identifiers(&self) -> HashSet<String> {
        self.config.identifier.iter().cloned().collect()
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

    fn range_readable(&self) -> Option<&dyn RangeReadableStore> {
        Some(self)
    }

    fn stat_store(&self) -> Option<&dyn StatStore> {
        Some(self)
    }
}

/// In-memory [`ObjectClient`] used by tests and local development. Counts
/// session acquisitions so freshness behavior is observable.
#[derive(Default)]
pub struct MemoryObjectClient {
    objects: DashMap<(String, String), Vec<u8>>,
    session_ttl_secs: i64,
    sessions_created: std::sync::atomic::AtomicUsize,
    session_base: Option<DateTime<Utc>>,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        MemoryObjectClient { session_ttl_secs: 300, ..Default::default() }
    }

    /// Sessions expire at `base + ttl` regardless of acquisition time, which
    /// lets tests pin an absolute expiry.
    pub fn with_session_expiry(expires_at: DateTime<Utc>) -> Self {
        MemoryObjectClient {
            session_ttl_secs: 0,
            session_base: Some(expires_at),
            ..Default::default()
        }
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn put(&self, bucket: &str, key: &str, bytes: &[u8], _creds: &Credentials) -> Result<()> {
        self.objects.insert((bucket.to_string(), key.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str, _creds: &Credentials) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.get(&(bucket.to_string(), key.to_string())).map(|v| v.clone()))
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
        creds: &Credentials,
    ) -> Result<Vec<u8>> {
        let bytes = self
            .get(bucket, key, creds)
            .await?
            .ok_or_else(|| Error::not_found(format!("no object at {bucket}/{key}")))?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
        let end = start.saturating_add(usize::try_from(length).unwrap_or(usize::MAX)).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    async fn delete(&self, bucket: &str, key: &str, _creds: &Credentials) -> Result<()> {
        self.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn stat(
        &self,
        bucket: &str,
        key: &str,
        _creds: &Credentials,
    ) -> Result<Option<ObjectStat>> {
        Ok(self.objects.get(&(bucket.to_string(), key.to_string())).map(|v| ObjectStat {
            size: v.len() as u64,
            etag: Some(content_hash(&v, crate::crypto::HashEncoding::Hex)),
            last_modified: None,
        }))
    }

    async fn create_session(&self, bucket: &str, base: &Credentials) -> Result<Credentials> {
        self.sessions_created.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let expires_at = match self.session_base {
            Some(pinned) => pinned,
            None => Utc::now() + Duration::seconds(self.session_ttl_secs),
        };
        Ok(Credentials {
            access_key_id: format!("session-{}", base.access_key_id),
            secret_access_key: base.secret_access_key.clone(),
            session_token: Some(format!("token-{bucket}")),
            expires_at: Some(expires_at),
        })
    }
}
