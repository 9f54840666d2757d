//! Durable snapshots of a [`Store`].
//!
//! Layout: the magic bytes `NORMCACH`, a little-endian `u32` version, then the
//! entity map as JSON.

use std::cell::RefCell;
use std::rc::Rc;

use futures::FutureExt as _;
use futures::future::LocalBoxFuture;

use crate::store::{Entities, Store};

const SNAPSHOT_MAGIC: &[u8] = b"NORMCACH";
const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + 4;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot is {0} bytes, too short for a header")]
    Truncated(usize),

    #[error("snapshot magic bytes did not match")]
    BadMagic,

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot body is not a valid entity map")]
    Body(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("failed to encode snapshot")]
    Encode(#[source] serde_json::Error),
}

/// Where snapshots go. Implementations are expected to replace the previous
/// snapshot wholesale on every write.
pub trait SnapshotStorage {
    /// `Ok(None)` means nothing has been written yet.
    fn read(&self) -> LocalBoxFuture<'_, Result<Option<Vec<u8>>, StorageError>>;

    fn write(&self, bytes: Vec<u8>) -> LocalBoxFuture<'_, Result<(), StorageError>>;
}

/// Keeps the snapshot in memory. Clones share the same slot.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    bytes: Rc<RefCell<Option<Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Rc::new(RefCell::new(Some(bytes))),
        }
    }

    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.bytes.borrow().clone()
    }
}

impl SnapshotStorage for MemoryStorage {
    fn read(&self) -> LocalBoxFuture<'_, Result<Option<Vec<u8>>, StorageError>> {
        let bytes = self.bytes.borrow().clone();
        futures::future::ready(Ok(bytes)).boxed_local()
    }

    fn write(&self, bytes: Vec<u8>) -> LocalBoxFuture<'_, Result<(), StorageError>> {
        *self.bytes.borrow_mut() = Some(bytes);
        futures::future::ready(Ok(())).boxed_local()
    }
}

pub fn encode(entities: &Entities) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(entities)?;
    let mut bytes = Vec::with_capacity(SNAPSHOT_HEADER_LEN + body.len());
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Entities, SnapshotError> {
    if bytes.len() < SNAPSHOT_HEADER_LEN {
        return Err(SnapshotError::Truncated(bytes.len()));
    }

    let (magic, rest) = bytes.split_at(SNAPSHOT_MAGIC.len());
    if magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }

    let (version, body) = rest.split_at(4);
    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(version);
    let version = u32::from_le_bytes(version_bytes);
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    serde_json::from_slice(body).map_err(SnapshotError::Body)
}

/// Moves snapshots between a [`Store`] and a [`SnapshotStorage`].
#[derive(Clone)]
pub struct Persistor {
    storage: Rc<dyn SnapshotStorage>,
}

impl std::fmt::Debug for Persistor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistor").finish_non_exhaustive()
    }
}

impl Persistor {
    pub fn new(storage: Rc<dyn SnapshotStorage>) -> Self {
        Self { storage }
    }

    /// Returns the number of bytes written.
    pub async fn persist(&self, store: &Store) -> Result<usize, StorageError> {
        // the snapshot is taken before the await, so no borrow outlives it
        let bytes = encode(&store.snapshot()).map_err(StorageError::Encode)?;
        let written = bytes.len();
        self.storage.write(bytes).await?;
        log::debug!("Persisted cache snapshot ({written} bytes)");
        Ok(written)
    }

    /// Load the persisted snapshot into `store`. Returns whether anything was
    /// restored. A snapshot that cannot be decoded is logged and ignored.
    pub async fn restore(&self, store: &Store) -> Result<bool, StorageError> {
        let Some(bytes) = self.storage.read().await? else {
            log::info!("No persisted cache snapshot found");
            return Ok(false);
        };

        match decode(&bytes) {
            Ok(entities) => {
                log::info!("Restored {} cached entities", entities.len());
                store.replace(entities);
                Ok(true)
            }
            Err(e) => {
                log::warn!("Ignoring unreadable cache snapshot: {e}");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn store_with_one_entity() -> Store {
        let store = Store::new();
        store.write_fragment(&json!({ "__typename": "Experience", "id": "1", "title": "Sleep" }));
        store
    }

    #[test]
    fn persisted_snapshots_restore_into_an_empty_store() {
        let storage = MemoryStorage::new();
        let persistor = Persistor::new(Rc::new(storage.clone()));

        let written = block_on(persistor.persist(&store_with_one_entity())).unwrap();
        assert_eq!(storage.bytes().map(|b| b.len()), Some(written));

        let restored = Store::new();
        assert!(block_on(persistor.restore(&restored)).unwrap());
        assert_eq!(restored.read_fragment("Experience:1").unwrap()["title"], "Sleep");
    }

    #[test]
    fn nothing_persisted_restores_nothing() {
        let persistor = Persistor::new(Rc::new(MemoryStorage::new()));
        let store = store_with_one_entity();
        assert!(!block_on(persistor.restore(&store)).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn corrupt_snapshots_are_treated_as_absent() {
        let persistor = Persistor::new(Rc::new(MemoryStorage::with_bytes(b"garbage".to_vec())));
        let store = store_with_one_entity();
        assert!(!block_on(persistor.restore(&store)).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn decode_rejects_bad_headers() {
        assert!(matches!(decode(b"NORM"), Err(SnapshotError::Truncated(4))));
        assert!(matches!(decode(b"SOMETHNG\x01\x00\x00\x00{}"), Err(SnapshotError::BadMagic)));
        assert!(matches!(
            decode(b"NORMCACH\x02\x00\x00\x00{}"),
            Err(SnapshotError::UnsupportedVersion(2))
        ));
        assert!(matches!(decode(b"NORMCACH\x01\x00\x00\x00[1"), Err(SnapshotError::Body(_))));
    }

    #[test]
    fn an_empty_body_is_an_empty_map() {
        assert!(decode(b"NORMCACH\x01\x00\x00\x00{}").unwrap().is_empty());
    }
}
