//! Interaction resolution.
//!
//! What an interaction *does* depends on the object's type. Handlers are
//! registered per type on an [`InteractionResolver`]; an object whose type
//! has no handler is still interacted with, it just has no effect beyond the
//! published event.

use crate::command::{InteractCommand, QueueDrain};
use realm_bus::{EventBus, InteractionEvent};
use realm_common::{EntityKey, LifecycleState};
use realm_kernel::{EntityPatch, EntityStore, LivingRecord, ObjectRecord, StoreResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Result of a handler: an optional change to the object and an optional
/// effect name carried on the event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interaction {
    pub patch: Option<EntityPatch>,
    pub effect: Option<String>,
}

pub trait InteractionHandler: Send + Sync {
    fn interact(&self, actor: &LivingRecord, object: &ObjectRecord) -> Interaction;
}

/// Flips an object between `idle` and `active`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToggleActivation;

impl InteractionHandler for ToggleActivation {
    fn interact(&self, _actor: &LivingRecord, object: &ObjectRecord) -> Interaction {
        let (state, effect) = match object.state {
            LifecycleState::Active => (LifecycleState::Idle, "deactivated"),
            _ => (LifecycleState::Active, "activated"),
        };
        Interaction {
            patch: Some(EntityPatch::new().state(state)),
            effect: Some(effect.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractOutcome {
    Applied { effect: bool },
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionStats {
    pub resolved: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Applies queued interactions at tick time.
#[derive(Clone, Default)]
pub struct InteractionResolver {
    handlers: HashMap<String, Arc<dyn InteractionHandler>>,
}

impl std::fmt::Debug for InteractionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("InteractionResolver").field("handlers", &types).finish()
    }
}

impl InteractionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver with the built-in handlers: containers toggle open and shut.
    pub fn standard() -> Self {
        Self::new().with_handler("container", ToggleActivation)
    }

    pub fn with_handler(mut self, object_type: impl Into<String>, handler: impl InteractionHandler + 'static) -> Self {
        self.register(object_type, handler);
        self
    }

    /// Install `handler` for `object_type`, replacing any previous one.
    pub fn register(&mut self, object_type: impl Into<String>, handler: impl InteractionHandler + 'static) {
        self.handlers.insert(object_type.into(), Arc::new(handler));
    }

    pub fn handles(&self, object_type: &str) -> bool {
        self.handlers.contains_key(object_type)
    }

    pub async fn drain<S: EntityStore>(
        &self,
        store: &S,
        bus: &EventBus,
        queue: &mut QueueDrain<InteractCommand>,
    ) -> InteractionStats {
        let mut stats = InteractionStats::default();
        for command in queue.take_pending() {
            match self.resolve(store, bus, &command).await {
                Ok(InteractOutcome::Applied { .. }) => stats.resolved += 1,
                Ok(InteractOutcome::Skipped) => stats.skipped += 1,
                Err(err) => {
                    tracing::warn!(
                        actor = %command.actor,
                        object = %command.object,
                        error = %err,
                        "interaction dropped"
                    );
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    pub async fn resolve<S: EntityStore>(
        &self,
        store: &S,
        bus: &EventBus,
        command: &InteractCommand,
    ) -> StoreResult<InteractOutcome> {
        let actor_key = EntityKey::character(command.actor);
        let object_key = EntityKey::object(command.object);
        let mut records = store.get_many(&[actor_key, object_key]).await?.into_iter();
        let (Some(Some(actor)), Some(Some(object))) = (records.next(), records.next()) else {
            return Ok(InteractOutcome::Skipped);
        };
        let (Some(actor), Some(object)) = (actor.as_living(), object.as_object()) else {
            return Ok(InteractOutcome::Skipped);
        };

        let outcome = self
            .handlers
            .get(&object.object_type)
            .map(|handler| handler.interact(actor, object))
            .unwrap_or_default();

        if let Some(patch) = outcome.patch.filter(|p| !p.is_empty()) {
            if !store.set(object_key, patch).await? {
                return Ok(InteractOutcome::Skipped);
            }
        }

        tracing::debug!(
            actor = %command.actor,
            object = %command.object,
            object_type = %object.object_type,
            effect = outcome.effect.as_deref().unwrap_or("none"),
            "interaction resolved"
        );
        let effect = outcome.effect.is_some();
        bus.publish(InteractionEvent {
            charid: command.actor,
            object_id: command.object,
            effect: outcome.effect,
        });
        Ok(InteractOutcome::Applied { effect })
    }
}
