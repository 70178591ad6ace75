//! Simulation layer: command intake, the fixed-period tick and the resolvers
//! it drives.
//!
//! # Invariants
//! - The tick is the only consumer of the attack and interaction queues, and
//!   the only writer of health and lifecycle state.
//! - Every store write is committed before the event announcing it is
//!   published; a publish never rolls a write back.
//! - A command that fails to resolve is logged and dropped; the rest of the
//!   queue still resolves.

pub mod combat;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod interaction;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use combat::{AttackOutcome, CombatResolver, CombatStats, resolve_target};
pub use command::{AttackCommand, InteractCommand, Pending, QueueDrain, QueueSender, command_queue};
pub use config::{ConfigError, SimConfig};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use interaction::{
    InteractOutcome, Interaction, InteractionHandler, InteractionResolver, InteractionStats,
    ToggleActivation,
};
pub use scheduler::{TickHandle, TickReport, TickSample, TickScheduler, TickTimer};
