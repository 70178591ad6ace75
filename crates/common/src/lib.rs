//! Shared types for the realm engine.
//!
//! # Invariants
//! - Ids are unique within their kind only. Character and NPC ids share one
//!   numeric space, so an [`EntityKey`] always carries its kind.
//! - The textual key form (`char:7`, `npc:1000`, `object:2001`) is stable and
//!   doubles as the backing-store key.

pub mod types;

pub use types::{
    CharacterId, EntityKey, EntityKind, InstanceId, LifecycleState, NpcId, ObjectId, ParseError,
    Position,
};
