//! IPFS/IPNS Backend
//!
//! Write = `add`, read = `cat`, both against the node's HTTP API. The
//! address scheme records whether a hash resolves directly (`ipfs`) or
//! through a name-service lookup (`ipns`). Pushing a head rewrites an IPNS
//! record via `name/publish`.

use crate::address::{Address, Method};
use crate::config::IpfsStoreConfig;
use crate::error::{Error, Result};
use crate::storage::{ByteStore, ContentAddressedStore, JsonArchive, Store, WriteRecord};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug)]
pub struct IpfsStore {
    endpoint: String,
    client: reqwest::Client,
    ipns_default_key: Option<String>,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size")]
    size: Option<String>,
}

#[derive(Deserialize)]
struct ResolveResponse {
    #[serde(rename = "Path")]
    path: String,
}

#[derive(Deserialize)]
struct PublishResponse {
    #[serde(rename = "Name")]
    name: String,
}

impl IpfsStore {
    pub fn new(config: &IpfsStoreConfig) -> Result<Self> {
        if !config.endpoint.ends_with('/') {
            return Err(Error::invalid_configuration(format!(
                "IPFS endpoint must end in '/': {}",
                config.endpoint
            )));
        }
        Ok(IpfsStore {
            endpoint: config.endpoint.clone(),
            client: reqwest::Client::new(),
            ipns_default_key: config.ipns_default_key.clone(),
        })
    }

    async fn add(&self, bytes: &[u8]) -> Result<AddResponse> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name("block");
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(format!("{}api/v0/add?cid-version=1", self.endpoint))
            .multipart(form)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::io(format!("IPFS add failed: {}", resp.status())));
        }
        Ok(resp.json().await?)
    }

    async fn cat(&self, arg: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .post(format!("{}api/v0/cat?arg={arg}", self.endpoint))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::io(format!("IPFS cat failed for {arg}: {}", resp.status())));
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    /// Resolve an IPNS name to its current `/ipfs/<cid>` path.
    async fn resolve(&self, name: &str) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}api/v0/name/resolve?arg={name}", self.endpoint))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::not_found(format!("IPNS name '{name}' did not resolve")));
        }
        let body: ResolveResponse = resp.json().await?;
        Ok(body.path)
    }

    /// Publish a CID under an IPNS key, rewriting the name record.
    pub async fn publish(&self, cid: &str, key: Option<&str>) -> Result<String> {
        let key = key
            .or(self.ipns_default_key.as_deref())
            .ok_or_else(|| Error::invalid_configuration("no IPNS key configured for publish"))?;
        let resp = self
            .client
            .post(format!("{}api/v0/name/publish?arg=/ipfs/{cid}&key={key}", self.endpoint))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::io(format!("IPNS publish failed: {}", resp.status())));
        }
        let body: PublishResponse = resp.json().await?;
        Ok(body.name)
    }

    async fn read_address(&self, address: &Address) -> Result<Option<Vec<u8>>> {
        match address.method() {
            Method::Ipfs => self.cat(address.path()).await,
            Method::Ipns => {
                let path = self.resolve(address.path()).await?;
                self.cat(&path).await
            }
            other => Err(Error::invalid_address(format!(
                "IPFS store cannot read a '{other}' address"
            ))),
        }
    }
}

#[async_trait]
impl ContentAddressedStore for IpfsStore {
    async fn content_write(&self, _dir: &str, bytes: &[u8]) -> Result<WriteRecord> {
        let added = self.add(bytes).await?;
        let size = added
            .size
            .as_deref()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(bytes.len());
        Ok(WriteRecord {
            hash: added.hash.clone(),
            size,
            address: Address::new(Method::Ipfs, added.hash.as_str()),
            path: added.hash,
        })
    }
}

#[async_trait]
impl JsonArchive for IpfsStore {
    async fn read_json(&self, address: &Address) -> Result<Option<serde_json::Value>> {
        match self.read_address(address).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ByteStore for IpfsStore {
    /// Head writes under IPFS: add the bytes, then republish the IPNS record
    /// the path names (or the configured default key).
    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let added = self.add(bytes).await?;
        let key = if path.is_empty() { None } else { Some(path) };
        self.publish(&added.hash, key).await?;
        Ok(())
    }

    async fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        if path.starts_with("k51") || path.starts_with("/ipns/") {
            let name = path.trim_start_matches("/ipns/");
            let resolved = self.resolve(name).await?;
            self.cat(&resolved).await
        } else {
            self.cat(path).await
        }
    }
}

impl Store for IpfsStore {
    fn method(&self) -> Method {
        Method::Ipfs
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
}
