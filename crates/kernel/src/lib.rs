//! World Kernel: the authoritative entity store and the instance table.
//!
//! # Invariants
//! - The store is the single owner of live entity attributes.
//! - An entity missing from the store does not exist, for every query.
//! - Every write is a field-level merge that must still decode into a valid
//!   typed record; invalid merges are rejected without committing.
//! - Instances are immutable once the world is loaded.

pub mod instance;
pub mod manifest;
pub mod record;
pub mod store;

pub use instance::{Grid, Instance, InstanceError, InstanceTable};
pub use manifest::{ManifestError, WorldManifest};
pub use record::{CodecError, EntityPatch, EntityRecord, FieldMap, LivingRecord, ObjectRecord, Vitals};
pub use store::{EntityStore, MemoryStore, StoreError, StoreResult};
