//! Key-value store contract and the sled-backed durable implementation.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{CoreError, Result};

// == Store Contract ==
/// Asynchronous bucketed key-value storage.
///
/// Buckets namespace keys; each cache component owns one bucket and never
/// writes into another's. Values are opaque bytes — serialization belongs to
/// the caller. Iteration order is unspecified.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value, `None` when the key is absent.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a value, overwriting any previous one.
    async fn put(&self, bucket: &str, key: &str, value: Vec<u8>) -> Result<()>;

    /// Removes a key; absent keys are not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Removes every key in a bucket.
    async fn clear(&self, bucket: &str) -> Result<()>;

    /// Returns every `(key, value)` pair in a bucket, order unspecified.
    async fn iterate(&self, bucket: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

// == Sled Store ==
/// Durable store mapping buckets to sled trees.
///
/// Persists across process restarts. Conflicting writes to the same key are
/// serialized by sled itself, last write wins.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Opens (or creates) the database at the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        tracing::info!("Opened key-value store at {:?}", path.as_ref());
        Ok(Self { db })
    }

    fn tree(&self, bucket: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(bucket)?)
    }

    /// Flushes pending writes to disk.
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SledStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let tree = self.tree(bucket)?;
        Ok(tree.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    async fn put(&self, bucket: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let tree = self.tree(bucket)?;
        tree.insert(key.as_bytes(), value)?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let tree = self.tree(bucket)?;
        tree.remove(key.as_bytes())?;
        Ok(())
    }

    async fn clear(&self, bucket: &str) -> Result<()> {
        let tree = self.tree(bucket)?;
        tree.clear()?;
        Ok(())
    }

    async fn iterate(&self, bucket: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let tree = self.tree(bucket)?;
        let mut pairs = Vec::new();
        for item in tree.iter() {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| CoreError::Storage(format!("non-utf8 key: {}", e)))?;
            pairs.push((key, value.to_vec()));
        }
        Ok(pairs)
    }
}
