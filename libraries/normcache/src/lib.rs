//! A normalized object cache for local-first frontends.
//! It was written for Tally, so it only does what that app needs.
//!
//! Caching strategy:
//! 1. Every JSON object that carries both a `__typename` and a string `id` is an "entity". Entities are stored once, under the key `"{__typename}:{id}"`.
//! 2. Wherever an entity appears inside another value, it is replaced by a reference (`{"__ref": key}`). Writing the same entity twice merges its fields, so every reader sees one copy.
//! 3. Query results live as fields of the `ROOT_QUERY` entity. Fields that take arguments are keyed by name plus the JSON of their arguments, so a field written under one set of arguments cannot be read back under another.
//! 4. Writes happen against a [`Draft`], a cheap copy of the whole entity map (it's an `im::HashMap`). The draft is committed in one step, and listeners are notified once per commit with the keys that changed.
//! 5. The whole entity map can be serialized into a snapshot and handed to a [`SnapshotStorage`] backend. Unreadable snapshots are treated as "nothing persisted".

pub mod normalize;
pub mod snapshot;
pub mod store;

#[cfg(feature = "opfs")]
pub mod opfs;

pub use normalize::{Entity, entity_key, field_key};
pub use snapshot::{MemoryStorage, Persistor, SnapshotError, SnapshotStorage, StorageError};
pub use store::{Draft, Entities, ListenerKey, ROOT_QUERY, Store};
