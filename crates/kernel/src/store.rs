//! Entity store: the single owner of live entity attributes.
//!
//! [`EntityStore`] is the seam a networked key-value backend plugs into; every
//! operation may suspend on a round-trip. [`MemoryStore`] is the in-process
//! backend, laid out the way a hash-per-entity backend is: one [`FieldMap`]
//! per key, writes merged field by field.

use crate::record::{CodecError, EntityPatch, EntityRecord, FieldMap};
use realm_common::{EntityKey, InstanceId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from entity store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backing store unavailable")]
    Unavailable,
    #[error("cannot decode {key}: {source}")]
    Codec {
        key: EntityKey,
        #[source]
        source: CodecError,
    },
}

/// Keyed access to live entity attributes.
///
/// Absence is never an error: `get` returns `None`, `set` and `remove`
/// return `false`. Each single-key write is indivisible with respect to
/// concurrent callers. Batched reads cost one round-trip regardless of the
/// number of keys and return results in key order.
pub trait EntityStore: Send + Sync + 'static {
    fn exists(&self, key: EntityKey) -> impl Future<Output = StoreResult<bool>> + Send;

    fn get(&self, key: EntityKey) -> impl Future<Output = StoreResult<Option<EntityRecord>>> + Send;

    /// Full records for many keys in one round-trip.
    fn get_many(
        &self,
        keys: &[EntityKey],
    ) -> impl Future<Output = StoreResult<Vec<Option<EntityRecord>>>> + Send;

    /// Only the instance id for many keys in one round-trip.
    fn instance_ids(
        &self,
        keys: &[EntityKey],
    ) -> impl Future<Output = StoreResult<Vec<Option<InstanceId>>>> + Send;

    /// Create or replace the entity at `key`.
    fn insert(
        &self,
        key: EntityKey,
        record: EntityRecord,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Merge `patch` into an existing entity. Returns `false` without writing
    /// anything if the entity does not exist.
    fn set(&self, key: EntityKey, patch: EntityPatch) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Read-modify-write of one entity as a single indivisible step.
    ///
    /// `change` sees the current record and returns the patch to merge, or
    /// `None` to leave the entity untouched. No other write to `key` can land
    /// between the read and the commit. Returns the committed record, or
    /// `None` if the entity is absent or `change` declined.
    fn update<F>(&self, key: EntityKey, change: F) -> impl Future<Output = StoreResult<Option<EntityRecord>>> + Send
    where
        F: FnOnce(&EntityRecord) -> Option<EntityPatch> + Send;

    fn remove(&self, key: EntityKey) -> impl Future<Output = StoreResult<bool>> + Send;
}

/// In-process entity store.
///
/// The handle is owned explicitly by whoever constructs it and shared through
/// `Arc`. [`MemoryStore::close`] ends its lifecycle: every later operation
/// fails with [`StoreError::Unavailable`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<EntityKey, FieldMap>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the store. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("entity store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored fields for one key, bypassing decoding.
    pub fn raw_fields(&self, key: EntityKey) -> Option<FieldMap> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<EntityKey, FieldMap>>> {
        if self.is_closed() {
            return Err(StoreError::Unavailable);
        }
        Ok(self.rows.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<EntityKey, FieldMap>>> {
        if self.is_closed() {
            return Err(StoreError::Unavailable);
        }
        Ok(self.rows.write().unwrap_or_else(PoisonError::into_inner))
    }
}

fn decode(key: EntityKey, fields: &FieldMap) -> StoreResult<EntityRecord> {
    EntityRecord::from_fields(key.kind, fields).map_err(|source| StoreError::Codec { key, source })
}

impl EntityStore for MemoryStore {
    async fn exists(&self, key: EntityKey) -> StoreResult<bool> {
        Ok(self.read()?.contains_key(&key))
    }

    async fn get(&self, key: EntityKey) -> StoreResult<Option<EntityRecord>> {
        let rows = self.read()?;
        rows.get(&key).map(|fields| decode(key, fields)).transpose()
    }

    async fn get_many(&self, keys: &[EntityKey]) -> StoreResult<Vec<Option<EntityRecord>>> {
        let rows = self.read()?;
        keys.iter()
            .map(|key| rows.get(key).map(|fields| decode(*key, fields)).transpose())
            .collect()
    }

    async fn instance_ids(&self, keys: &[EntityKey]) -> StoreResult<Vec<Option<InstanceId>>> {
        let rows = self.read()?;
        Ok(keys
            .iter()
            .map(|key| {
                rows.get(key)
                    .and_then(|fields| fields.get("instance"))
                    .and_then(|raw| raw.parse().ok())
                    .map(InstanceId)
            })
            .collect())
    }

    async fn insert(&self, key: EntityKey, record: EntityRecord) -> StoreResult<()> {
        let fields = record.to_fields();
        // Kind mismatch between key and record would make the row undecodable.
        decode(key, &fields)?;
        self.write()?.insert(key, fields);
        tracing::debug!(%key, "entity inserted");
        Ok(())
    }

    async fn set(&self, key: EntityKey, patch: EntityPatch) -> StoreResult<bool> {
        let mut rows = self.write()?;
        let Some(current) = rows.get(&key) else {
            return Ok(false);
        };
        let mut merged = current.clone();
        merged.extend(patch.to_fields());
        decode(key, &merged)?;
        rows.insert(key, merged);
        Ok(true)
    }

    async fn update<F>(&self, key: EntityKey, change: F) -> StoreResult<Option<EntityRecord>>
    where
        F: FnOnce(&EntityRecord) -> Option<EntityPatch> + Send,
    {
        let mut rows = self.write()?;
        let Some(current) = rows.get(&key) else {
            return Ok(None);
        };
        let Some(patch) = change(&decode(key, current)?) else {
            return Ok(None);
        };
        let mut merged = current.clone();
        merged.extend(patch.to_fields());
        let record = decode(key, &merged)?;
        rows.insert(key, merged);
        Ok(Some(record))
    }

    async fn remove(&self, key: EntityKey) -> StoreResult<bool> {
        let removed = self.write()?.remove(&key).is_some();
        if removed {
            tracing::debug!(%key, "entity removed");
        }
        Ok(removed)
    }
}
