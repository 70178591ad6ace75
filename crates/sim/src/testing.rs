//! Shared fixtures for the resolver, scheduler and engine tests.

use realm_common::{EntityKey, InstanceId, Position};
use realm_kernel::{
    EntityPatch, EntityRecord, EntityStore, Instance, InstanceTable, LivingRecord, MemoryStore,
    ObjectRecord, StoreError, StoreResult, Vitals,
};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub fn living(name: &str, x: f64, y: f64, health: u32, max_health: u32) -> LivingRecord {
    LivingRecord::new(name, Position::new(x, y), Vitals { health, max_health }).in_instance(InstanceId(1))
}

pub fn chest() -> ObjectRecord {
    ObjectRecord::new("Chest", "container", Position::new(800.0, 800.0)).in_instance(InstanceId(1))
}

pub fn mainland() -> InstanceTable {
    let mut table = InstanceTable::new();
    let mut instance = Instance::new(InstanceId(1), "mainland", 1000, 1000).unwrap();
    instance.block(110, 210).unwrap();
    table.insert(instance).unwrap();
    table.insert(Instance::new(InstanceId(2), "crypt", 10, 10).unwrap()).unwrap();
    table
}

/// Memory store that can be told to fail reads of chosen keys, to stall
/// every existence check, or to yield to the scheduler before each read and
/// update the way a networked backend would.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    broken: Mutex<HashSet<EntityKey>>,
    stall: Mutex<Option<Duration>>,
    round_trip: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn break_key(&self, key: EntityKey) {
        self.broken.lock().unwrap().insert(key);
    }

    pub fn stall_for(&self, duration: Duration) {
        *self.stall.lock().unwrap() = Some(duration);
    }

    pub fn yield_on_access(&self) {
        self.round_trip.store(true, Ordering::SeqCst);
    }

    async fn round_trip(&self) {
        if self.round_trip.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    fn check(&self, key: EntityKey) -> StoreResult<()> {
        if self.broken.lock().unwrap().contains(&key) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl EntityStore for FlakyStore {
    async fn exists(&self, key: EntityKey) -> StoreResult<bool> {
        let stall = *self.stall.lock().unwrap();
        if let Some(duration) = stall {
            tokio::time::sleep(duration).await;
        }
        self.check(key)?;
        self.inner.exists(key).await
    }

    async fn get(&self, key: EntityKey) -> StoreResult<Option<EntityRecord>> {
        self.check(key)?;
        let record = self.inner.get(key).await;
        self.round_trip().await;
        record
    }

    async fn get_many(&self, keys: &[EntityKey]) -> StoreResult<Vec<Option<EntityRecord>>> {
        self.inner.get_many(keys).await
    }

    async fn instance_ids(&self, keys: &[EntityKey]) -> StoreResult<Vec<Option<InstanceId>>> {
        self.inner.instance_ids(keys).await
    }

    async fn insert(&self, key: EntityKey, record: EntityRecord) -> StoreResult<()> {
        self.inner.insert(key, record).await
    }

    async fn set(&self, key: EntityKey, patch: EntityPatch) -> StoreResult<bool> {
        self.check(key)?;
        self.inner.set(key, patch).await
    }

    async fn update<F>(&self, key: EntityKey, change: F) -> StoreResult<Option<EntityRecord>>
    where
        F: FnOnce(&EntityRecord) -> Option<EntityPatch> + Send,
    {
        self.check(key)?;
        self.round_trip().await;
        self.inner.update(key, change).await
    }

    async fn remove(&self, key: EntityKey) -> StoreResult<bool> {
        self.inner.remove(key).await
    }
}
