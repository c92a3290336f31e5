//! Persistent key-value storage.
//!
//! All cross-request state (feed snapshots, fetch trackers, geocode
//! results) lives behind this trait: a coarse namespace per feed plus a
//! fine-grained row key. No component performs multi-key transactions;
//! every mutation is an upsert of a single row.

pub mod local;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::Result;

// Re-export for convenience
pub use local::LocalStore;

/// Trait for persistent key-value backends.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Point lookup. Missing keys are `Ok(None)`, never an error.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Upsert by key.
    async fn put(&self, namespace: &str, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Whether the key already has a value.
    async fn exists(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.get(namespace, key).await?.is_some())
    }
}

/// Read and deserialize a JSON row.
pub async fn read_json<T, S>(store: &S, namespace: &str, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match store.get(namespace, key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize and upsert a JSON row.
pub async fn write_json<T, S>(store: &S, namespace: &str, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let bytes = serde_json::to_vec_pretty(value)?;
    store.put(namespace, key, bytes).await
}
