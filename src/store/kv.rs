//! Durable string-keyed storage for the local inbox.
//!
//! Backed by `object_store` so the same code runs against:
//!   - `file:///path/to/dir` (default): survives restarts, one directory per origin.
//!   - `memory://`: process-lifetime only, used by tests and ephemeral runs.
//!
//! Keys are namespaced by the server origin, mirroring browser storage
//! scoping: two servers never see each other's inbox.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use object_store::{path::Path, ObjectStore};

use crate::errors::Result;

/// Abstraction over the key-value backend.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: String) -> Result<()>;
}

/// `KvBackend` over any `ObjectStore`.
pub struct ObjectKv {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectKv {
    /// Build from a `EF_STORE_URL`-style URL, scoped to `origin`.
    pub fn from_url(url: &str, origin: &str) -> anyhow::Result<Self> {
        let store = build_object_store(url)?;
        tracing::info!(url = %url, origin = %origin, "local store: using object store backend");
        Ok(Self {
            store: Arc::from(store),
            prefix: origin_prefix(origin),
        })
    }

    /// Process-local in-memory store.
    pub fn memory(origin: &str) -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            prefix: origin_prefix(origin),
        }
    }

    fn path(&self, key: &str) -> Path {
        Path::from(format!("{}/{}", self.prefix, key))
    }
}

#[async_trait]
impl KvBackend for ObjectKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let result = match self.store.get(&self.path(key)).await {
            Ok(r) => r,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.store
            .put(&self.path(key), value.into_bytes().into())
            .await?;
        tracing::trace!(key, "local store: value written");
        Ok(())
    }
}

/// Parse a store URL and return the matching `ObjectStore` implementation.
fn build_object_store(url: &str) -> anyhow::Result<Box<dyn ObjectStore>> {
    if url.starts_with("memory://") {
        return Ok(Box::new(object_store::memory::InMemory::new()));
    }

    if url.starts_with("file://") {
        let path = url.trim_start_matches("file://");
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create store directory {}", path))?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(path)
            .context("failed to create local file system object store")?;
        return Ok(Box::new(store));
    }

    anyhow::bail!("unsupported EF_STORE_URL scheme: {}", url)
}

/// Turn `host:port` into a path-safe segment.
fn origin_prefix(origin: &str) -> String {
    let cleaned: String = origin
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}
