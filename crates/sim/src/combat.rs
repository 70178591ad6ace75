use crate::command::{AttackCommand, QueueDrain};
use realm_bus::{CombatEvent, DeathEvent, EventBus};
use realm_common::{EntityKey, EntityKind, LifecycleState};
use realm_kernel::{EntityPatch, EntityStore, StoreResult};

/// Decide which entity a bare attack target id names.
///
/// Characters and NPCs share one id space. A character with the id wins;
/// otherwise the NPC with the id, if any.
pub async fn resolve_target<S: EntityStore>(store: &S, id: u64) -> StoreResult<Option<EntityKey>> {
    let character = EntityKey::new(EntityKind::Character, id);
    if store.exists(character).await? {
        return Ok(Some(character));
    }
    let npc = EntityKey::new(EntityKind::Npc, id);
    Ok(store.exists(npc).await?.then_some(npc))
}

/// What happened to one attack command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackOutcome {
    /// Damage applied. `killed` is set on the hit that brought health to zero.
    Hit { target: EntityKey, new_health: u32, killed: bool },
    /// Attacker or target no longer exists.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombatStats {
    pub resolved: usize,
    pub skipped: usize,
    pub deaths: usize,
    pub failed: usize,
}

/// Applies queued attacks at tick time.
#[derive(Debug, Clone)]
pub struct CombatResolver {
    base_damage: u32,
}

impl CombatResolver {
    pub fn new(base_damage: u32) -> Self {
        Self { base_damage }
    }

    pub fn base_damage(&self) -> u32 {
        self.base_damage
    }

    /// Resolve the attacks queued when the drain starts, oldest first.
    /// Attacks queued meanwhile wait for the next tick. A failing command is
    /// logged and counted; the rest still resolve.
    pub async fn drain<S: EntityStore>(
        &self,
        store: &S,
        bus: &EventBus,
        queue: &mut QueueDrain<AttackCommand>,
    ) -> CombatStats {
        let mut stats = CombatStats::default();
        for command in queue.take_pending() {
            match self.resolve(store, bus, &command).await {
                Ok(AttackOutcome::Hit { killed, .. }) => {
                    stats.resolved += 1;
                    stats.deaths += usize::from(killed);
                }
                Ok(AttackOutcome::Skipped) => stats.skipped += 1,
                Err(err) => {
                    tracing::warn!(
                        attacker = %command.attacker,
                        target = command.target,
                        error = %err,
                        "attack dropped"
                    );
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    /// Resolve one attack: commit the new health, then announce it.
    pub async fn resolve<S: EntityStore>(
        &self,
        store: &S,
        bus: &EventBus,
        command: &AttackCommand,
    ) -> StoreResult<AttackOutcome> {
        if !store.exists(EntityKey::character(command.attacker)).await? {
            tracing::trace!(attacker = %command.attacker, "attacker gone");
            return Ok(AttackOutcome::Skipped);
        }
        let Some(target) = resolve_target(store, command.target).await? else {
            tracing::trace!(target = command.target, "target gone");
            return Ok(AttackOutcome::Skipped);
        };
        let damage = self.base_damage;
        let mut killed = false;
        let committed = store
            .update(target, |record| {
                let vitals = record.vitals()?;
                let new_health = vitals.health.saturating_sub(damage);
                let mut patch = EntityPatch::new().health(new_health);
                if new_health == 0 && !record.state().is_dead() {
                    killed = true;
                    patch = patch.state(LifecycleState::Dead);
                }
                Some(patch)
            })
            .await?;
        let Some(new_health) = committed.as_ref().and_then(|record| record.vitals()).map(|v| v.health) else {
            return Ok(AttackOutcome::Skipped);
        };

        bus.publish(CombatEvent {
            attacker: command.attacker,
            target: target.id,
            target_type: target.kind,
            damage: self.base_damage,
            new_health,
        });
        if killed {
            tracing::info!(%target, killer = %command.attacker, "target died");
            bus.publish(DeathEvent {
                target: target.id,
                target_type: target.kind,
                killer: command.attacker,
            });
        }
        Ok(AttackOutcome::Hit {
            target,
            new_health,
            killed,
        })
    }
}
