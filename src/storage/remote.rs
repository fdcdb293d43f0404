//! Remote Backend
//!
//! All operations tunnel to a configured set of servers. One server is
//! active at a time; a connection-level failure rotates to the next and the
//! call is retried until every server has been tried once.

use crate::address::{Address, Method};
use crate::config::RemoteStoreConfig;
use crate::error::{Error, Result};
use crate::storage::{ByteStore, ContentAddressedStore, JsonArchive, Store, WriteRecord};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug)]
pub struct RemoteStore {
    servers: Vec<String>,
    active: Mutex<usize>,
    client: reqwest::Client,
}

impl RemoteStore {
    pub fn new(config: &RemoteStoreConfig) -> Result<Self> {
        if config.servers.is_empty() {
            return Err(Error::invalid_configuration("remote store requires at least one server"));
        }
        Ok(RemoteStore {
            servers: config.servers.iter().map(|s| s.trim_end_matches('/').to_string()).collect(),
            active: Mutex::new(0),
            client: reqwest::Client::new(),
        })
    }

    fn active_server(&self) -> String {
        self.servers[*self.active.lock()].clone()
    }

    /// Rotate to the next server after a connection loss.
    fn fail_over(&self) -> String {
        let mut active = self.active.lock();
        *active = (*active + 1) % self.servers.len();
        self.servers[*active].clone()
    }

    /// Run an HTTP call against the active server, rotating on connection
    /// errors until every server has been tried.
    async fn with_failover<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: Fn(reqwest::Client, String) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, reqwest::Error>>,
    {
        let mut server = self.active_server();
        let mut attempts = 0;
        loop {
            match op(self.client.clone(), server.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_connect() && attempts + 1 < self.servers.len() => {
                    attempts += 1;
                    server = self.fail_over();
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[async_trait]
impl ContentAddressedStore for RemoteStore {
    async fn content_write(&self, dir: &str, bytes: &[u8]) -> Result<WriteRecord> {
        let dir = dir.to_string();
        let body = bytes.to_vec();
        let resp = self
            .with_failover(move |client, server| {
                let dir = dir.clone();
                let body = body.clone();
                async move {
                    client
                        .post(format!("{server}/fdb/storage/{dir}"))
                        .body(body)
                        .send()
                        .await?
                        .error_for_status()
                }
            })
            .await?;
        Ok(resp.json::<WriteRecord>().await?)
    }
}

#[async_trait]
impl JsonArchive for RemoteStore {
    async fn read_json(&self, address: &Address) -> Result<Option<serde_json::Value>> {
        match self.read_bytes(address.path()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ByteStore for RemoteStore {
    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let path = path.to_string();
        let body = bytes.to_vec();
        self.with_failover(move |client, server| {
            let path = path.clone();
            let body = body.clone();
            async move {
                client
                    .put(format!("{server}/fdb/storage/{path}"))
                    .body(body)
                    .send()
                    .await?
                    .error_for_status()
            }
        })
        .await?;
        Ok(())
    }

    async fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = path.to_string();
        let resp = self
            .with_failover(move |client, server| {
                let path = path.clone();
                async move { client.get(format!("{server}/fdb/storage/{path}")).send().await }
            })
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status().map_err(Error::from)?;
        Ok(Some(resp.bytes().await?.to_vec()))
    }
}

impl Store for RemoteStore {
    fn method(&self) -> Method {
        Method::Remote
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_a_server() {
        let err = RemoteStore::new(&RemoteStoreConfig { servers: vec![] }).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_fail_over_rotates_and_wraps() {
        let store = RemoteStore::new(&RemoteStoreConfig {
            servers: vec!["http://a/".to_string(), "http://b".to_string()],
        })
        .unwrap();
        assert_eq!(store.active_server(), "http://a");
        assert_eq!(store.fail_over(), "http://b");
        assert_eq!(store.fail_over(), "http://a");
    }
}
