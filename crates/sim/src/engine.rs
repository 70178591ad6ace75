use crate::combat::{CombatResolver, resolve_target};
use crate::command::{AttackCommand, InteractCommand, QueueSender, command_queue};
use crate::config::SimConfig;
use crate::error::{EngineError, EngineResult};
use crate::interaction::InteractionResolver;
use crate::scheduler::TickScheduler;
use realm_bus::{ChannelSet, EventBus, MovementEvent, Subscription};
use realm_common::{CharacterId, EntityKey, InstanceId, LifecycleState, NpcId, ObjectId, Position};
use realm_kernel::{EntityPatch, EntityRecord, EntityStore, InstanceTable, LivingRecord, ObjectRecord};
use realm_visibility::VisibleResponse;
use std::sync::Arc;

/// Request-side facade over the world.
///
/// Movement is applied and announced immediately. Attacks and interactions
/// are validated, queued, and resolved by the paired [`TickScheduler`].
#[derive(Debug)]
pub struct Engine<S> {
    store: Arc<S>,
    instances: Arc<InstanceTable>,
    bus: EventBus,
    attacks: QueueSender<AttackCommand>,
    interactions: QueueSender<InteractCommand>,
    config: SimConfig,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            instances: Arc::clone(&self.instances),
            bus: self.bus.clone(),
            attacks: self.attacks.clone(),
            interactions: self.interactions.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: EntityStore> Engine<S> {
    /// Build an engine with the standard interaction handlers.
    pub fn new(store: Arc<S>, instances: InstanceTable, config: SimConfig) -> (Self, TickScheduler<S>) {
        Self::with_interactions(store, instances, config, InteractionResolver::standard())
    }

    pub fn with_interactions(
        store: Arc<S>,
        instances: InstanceTable,
        config: SimConfig,
        interactions: InteractionResolver,
    ) -> (Self, TickScheduler<S>) {
        let bus = EventBus::new(config.bus_capacity);
        let (attack_tx, attack_rx) = command_queue();
        let (interact_tx, interact_rx) = command_queue();
        let scheduler = TickScheduler::new(
            Arc::clone(&store),
            bus.clone(),
            attack_rx,
            interact_rx,
            CombatResolver::new(config.base_damage),
            interactions,
            config.tick_period,
            config.timer_history,
        );
        let engine = Self {
            store,
            instances: Arc::new(instances),
            bus,
            attacks: attack_tx,
            interactions: interact_tx,
            config,
        };
        (engine, scheduler)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn instances(&self) -> &InstanceTable {
        &self.instances
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn pending_attacks(&self) -> usize {
        self.attacks.len()
    }

    pub fn pending_interactions(&self) -> usize {
        self.interactions.len()
    }

    /// Step a character by `(dx, dy)`.
    ///
    /// Returns `false`, changing nothing, if the character does not exist or
    /// the destination collides. A character outside any instance moves
    /// freely. The position read, the collision check and the commit happen
    /// as one store update, so overlapping moves of one character compose.
    pub async fn move_actor(&self, actor: CharacterId, dx: f64, dy: f64) -> EngineResult<bool> {
        let step = Position::new(dx, dy);
        let instances = self.instances.as_ref();
        let committed = self
            .store
            .update(EntityKey::character(actor), |record| {
                let target = record.position() + step;
                if !target.is_finite() {
                    return None;
                }
                if let Some(instance) = record.instance() {
                    match instances.detect_collision(instance, target) {
                        Ok(false) => {}
                        Ok(true) => {
                            tracing::trace!(%actor, x = target.x, y = target.y, "move blocked");
                            return None;
                        }
                        Err(err) => {
                            tracing::warn!(%actor, error = %err, "actor is in an unloaded instance");
                            return None;
                        }
                    }
                }
                Some(EntityPatch::new().position(target))
            })
            .await?;

        let Some(record) = committed else {
            return Ok(false);
        };
        let position = record.position();
        self.bus.publish(MovementEvent {
            charid: actor,
            x: position.x,
            y: position.y,
        });
        Ok(true)
    }

    /// Queue an attack for the next tick. `false` if either party is absent.
    pub async fn attack(&self, attacker: CharacterId, target: u64) -> EngineResult<bool> {
        if !self.store.exists(EntityKey::character(attacker)).await? {
            return Ok(false);
        }
        if resolve_target(self.store.as_ref(), target).await?.is_none() {
            return Ok(false);
        }
        let depth = self.attacks.push(AttackCommand::new(attacker, target));
        tracing::debug!(%attacker, target, depth, "attack queued");
        Ok(true)
    }

    /// Queue an interaction for the next tick. `false` if either party is
    /// absent.
    pub async fn interact(&self, actor: CharacterId, object: ObjectId) -> EngineResult<bool> {
        if !self.store.exists(EntityKey::character(actor)).await?
            || !self.store.exists(EntityKey::object(object)).await?
        {
            return Ok(false);
        }
        let depth = self.interactions.push(InteractCommand::new(actor, object));
        tracing::debug!(%actor, %object, depth, "interaction queued");
        Ok(true)
    }

    pub async fn query_visible(
        &self,
        observer: CharacterId,
        characters: &[CharacterId],
        npcs: &[NpcId],
        objects: &[ObjectId],
    ) -> EngineResult<VisibleResponse> {
        Ok(realm_visibility::query_visible(self.store.as_ref(), observer, characters, npcs, objects).await?)
    }

    pub fn subscribe(&self, channels: impl Into<ChannelSet>) -> Subscription {
        self.bus.subscribe(channels)
    }

    /// Place a character into the world, `online`.
    pub async fn login(&self, id: CharacterId, mut record: LivingRecord) -> EngineResult<()> {
        self.check_instance(record.instance)?;
        record.state = LifecycleState::Online;
        self.store
            .insert(EntityKey::character(id), EntityRecord::Character(record))
            .await?;
        tracing::info!(character = %id, "character logged in");
        Ok(())
    }

    /// Remove a character. `false` if it was not logged in.
    pub async fn logout(&self, id: CharacterId) -> EngineResult<bool> {
        let removed = self.despawn(EntityKey::character(id)).await?;
        if removed {
            tracing::info!(character = %id, "character logged out");
        }
        Ok(removed)
    }

    /// Place an NPC into the world, `idle`.
    pub async fn instance_npc(&self, id: NpcId, mut record: LivingRecord) -> EngineResult<()> {
        self.check_instance(record.instance)?;
        record.state = LifecycleState::Idle;
        self.store.insert(EntityKey::npc(id), EntityRecord::Npc(record)).await?;
        tracing::debug!(npc = %id, "npc instanced");
        Ok(())
    }

    pub async fn instance_object(&self, id: ObjectId, record: ObjectRecord) -> EngineResult<()> {
        self.check_instance(record.instance)?;
        self.store
            .insert(EntityKey::object(id), EntityRecord::Object(record))
            .await?;
        tracing::debug!(object = %id, "object instanced");
        Ok(())
    }

    /// Insert prepared records as-is, e.g. from a world manifest. Returns how
    /// many were placed.
    pub async fn populate(
        &self,
        entities: impl IntoIterator<Item = (EntityKey, EntityRecord)>,
    ) -> EngineResult<usize> {
        let mut placed = 0;
        for (key, record) in entities {
            self.check_instance(record.instance())?;
            self.store.insert(key, record).await?;
            placed += 1;
        }
        tracing::info!(entities = placed, "world populated");
        Ok(placed)
    }

    pub async fn despawn(&self, key: EntityKey) -> EngineResult<bool> {
        Ok(self.store.remove(key).await?)
    }

    fn check_instance(&self, instance: Option<InstanceId>) -> EngineResult<()> {
        match instance {
            Some(id) if !self.instances.contains(id) => Err(EngineError::UnknownInstance(id)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FlakyStore, chest, living, mainland};
    use realm_bus::{Channel, CombatEvent, DeathEvent, WorldEvent};
    use realm_common::EntityKind;
    use realm_kernel::{MemoryStore, StoreError, WorldManifest};
    use std::time::Duration;

    async fn world() -> (Engine<MemoryStore>, TickScheduler<MemoryStore>) {
        let (engine, scheduler) = Engine::new(Arc::new(MemoryStore::new()), mainland(), SimConfig::default());
        engine
            .login(CharacterId(1), living("Arthas", 100.0, 200.0, 100, 100))
            .await
            .unwrap();
        engine
            .login(CharacterId(2), living("Jaina", 150.0, 250.0, 10, 80))
            .await
            .unwrap();
        engine
            .instance_npc(NpcId(1000), living("Goblin", 500.0, 500.0, 50, 50))
            .await
            .unwrap();
        engine.instance_object(ObjectId(2003), chest()).await.unwrap();
        (engine, scheduler)
    }

    async fn record(engine: &Engine<MemoryStore>, key: EntityKey) -> EntityRecord {
        engine.store().get(key).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn move_commits_and_announces_once() {
        let (engine, _) = world().await;
        let mut moves = engine.subscribe(Channel::Movement);

        assert!(engine.move_actor(CharacterId(1), 5.0, 5.0).await.unwrap());
        let arthas = record(&engine, EntityKey::character(CharacterId(1))).await;
        assert_eq!(arthas.position(), Position::new(105.0, 205.0));
        assert_eq!(
            moves.recv().await,
            Some(WorldEvent::Movement(MovementEvent {
                charid: CharacterId(1),
                x: 105.0,
                y: 205.0,
            }))
        );
        assert!(moves.recv_timeout(Duration::from_millis(10)).await.is_err());
    }

    #[tokio::test]
    async fn move_of_missing_actor_changes_nothing() {
        let (engine, _) = world().await;
        let mut moves = engine.subscribe(Channel::Movement);
        assert!(!engine.move_actor(CharacterId(77), 1.0, 1.0).await.unwrap());
        assert!(moves.recv_timeout(Duration::from_millis(10)).await.is_err());
    }

    #[tokio::test]
    async fn blocked_and_off_grid_moves_are_refused() {
        let (engine, _) = world().await;
        // (110, 210) is blocked in the test instance.
        assert!(!engine.move_actor(CharacterId(1), 10.0, 10.0).await.unwrap());
        assert!(!engine.move_actor(CharacterId(1), -500.0, 0.0).await.unwrap());
        assert!(!engine.move_actor(CharacterId(1), f64::NAN, 0.0).await.unwrap());
        let arthas = record(&engine, EntityKey::character(CharacterId(1))).await;
        assert_eq!(arthas.position(), Position::new(100.0, 200.0));
    }

    #[tokio::test]
    async fn actor_without_instance_moves_freely() {
        let (engine, _) = world().await;
        let wanderer = LivingRecord::new("Medivh", Position::new(-5.0, -5.0), realm_kernel::Vitals::full(70));
        engine.login(CharacterId(4), wanderer).await.unwrap();
        assert!(engine.move_actor(CharacterId(4), -1.0, 0.0).await.unwrap());
        let medivh = record(&engine, EntityKey::character(CharacterId(4))).await;
        assert_eq!(medivh.position(), Position::new(-6.0, -5.0));
    }

    async fn flaky_world() -> (Engine<FlakyStore>, TickScheduler<FlakyStore>) {
        let store = Arc::new(FlakyStore::new());
        store.yield_on_access();
        let (engine, scheduler) = Engine::new(store, mainland(), SimConfig::default());
        engine
            .login(CharacterId(1), living("Arthas", 100.0, 200.0, 100, 100))
            .await
            .unwrap();
        engine
            .login(CharacterId(2), living("Jaina", 150.0, 250.0, 80, 80))
            .await
            .unwrap();
        (engine, scheduler)
    }

    #[tokio::test]
    async fn overlapping_moves_of_one_actor_both_land() {
        let (engine, _) = flaky_world().await;
        let mut moves = engine.subscribe(Channel::Movement);

        let (a, b) = tokio::join!(
            engine.move_actor(CharacterId(1), 3.0, 3.0),
            engine.move_actor(CharacterId(1), 3.0, 3.0)
        );
        assert!(a.unwrap());
        assert!(b.unwrap());

        let arthas = engine
            .store()
            .get(EntityKey::character(CharacterId(1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(arthas.position(), Position::new(106.0, 206.0));

        let mut seen = Vec::new();
        for _ in 0..2 {
            match moves.recv().await {
                Some(WorldEvent::Movement(event)) => seen.push((event.x, event.y)),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(seen, vec![(103.0, 203.0), (106.0, 206.0)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_moves_from_many_tasks_compose() {
        let (engine, _) = flaky_world().await;
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.move_actor(CharacterId(2), 1.0, 0.0).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }
        let jaina = engine
            .store()
            .get(EntityKey::character(CharacterId(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(jaina.position(), Position::new(158.0, 250.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attack_intake_resolves_every_command() {
        let (engine, mut scheduler) = flaky_world().await;
        let mut combat = engine.subscribe(Channel::Combat);
        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.attack(CharacterId(1), 2).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }
        assert_eq!(engine.pending_attacks(), 12);

        let report = scheduler.tick().await;
        assert_eq!(report.combat.resolved, 12);
        assert_eq!(report.combat.deaths, 1);
        let mut hits = 0;
        while let Ok(Some(event)) = combat.recv_timeout(Duration::from_millis(50)).await {
            assert!(matches!(event, WorldEvent::Combat(_)));
            hits += 1;
        }
        assert_eq!(hits, 12);
        let jaina = engine
            .store()
            .get(EntityKey::character(CharacterId(2)))
            .await
            .unwrap()
            .unwrap();
        // 80 health, twelve hits of ten: floored at zero.
        assert_eq!(jaina.vitals().unwrap().health, 0);
        assert_eq!(jaina.state(), LifecycleState::Dead);
    }

    #[tokio::test]
    async fn attack_and_interact_check_both_parties() {
        let (engine, _) = world().await;
        assert!(engine.attack(CharacterId(1), 1000).await.unwrap());
        assert!(engine.attack(CharacterId(1), 2).await.unwrap());
        assert!(!engine.attack(CharacterId(1), 4242).await.unwrap());
        assert!(!engine.attack(CharacterId(9), 2).await.unwrap());
        assert_eq!(engine.pending_attacks(), 2);

        assert!(engine.interact(CharacterId(1), ObjectId(2003)).await.unwrap());
        assert!(!engine.interact(CharacterId(1), ObjectId(1)).await.unwrap());
        assert!(!engine.interact(CharacterId(9), ObjectId(2003)).await.unwrap());
        assert_eq!(engine.pending_interactions(), 1);
    }

    #[tokio::test]
    async fn three_attacks_before_a_tick_cost_thirty() {
        let (engine, mut scheduler) = world().await;
        let mut combat = engine.subscribe(Channel::Combat);
        for _ in 0..3 {
            assert!(engine.attack(CharacterId(2), 1).await.unwrap());
        }

        let report = scheduler.tick().await;
        assert_eq!(report.combat.resolved, 3);
        assert_eq!(engine.pending_attacks(), 0);
        let arthas = record(&engine, EntityKey::character(CharacterId(1))).await;
        assert_eq!(arthas.vitals().unwrap().health, 70);
        for _ in 0..3 {
            assert!(matches!(combat.recv().await, Some(WorldEvent::Combat(_))));
        }
    }

    #[tokio::test]
    async fn lethal_attack_kills_once() {
        let (engine, mut scheduler) = world().await;
        let mut sub = engine.subscribe([Channel::Combat, Channel::Death]);
        assert!(engine.attack(CharacterId(1), 2).await.unwrap());
        scheduler.tick().await;

        let jaina = record(&engine, EntityKey::character(CharacterId(2))).await;
        assert_eq!(jaina.vitals().unwrap().health, 0);
        assert_eq!(jaina.state(), LifecycleState::Dead);
        assert_eq!(
            sub.recv().await,
            Some(WorldEvent::Combat(CombatEvent {
                attacker: CharacterId(1),
                target: 2,
                target_type: EntityKind::Character,
                damage: 10,
                new_health: 0,
            }))
        );
        assert_eq!(
            sub.recv().await,
            Some(WorldEvent::Death(DeathEvent {
                target: 2,
                target_type: EntityKind::Character,
                killer: CharacterId(1),
            }))
        );

        // The dead stay in the world and can still be hit.
        assert!(engine.attack(CharacterId(1), 2).await.unwrap());
        let report = scheduler.tick().await;
        assert_eq!(report.combat.deaths, 0);
        assert!(matches!(
            sub.recv().await,
            Some(WorldEvent::Combat(CombatEvent { new_health: 0, .. }))
        ));
    }

    #[tokio::test]
    async fn target_removed_before_tick_is_skipped() {
        let (engine, mut scheduler) = world().await;
        assert!(engine.attack(CharacterId(1), 1000).await.unwrap());
        assert!(engine.despawn(EntityKey::npc(NpcId(1000))).await.unwrap());
        let report = scheduler.tick().await;
        assert_eq!(report.combat.skipped, 1);
        assert_eq!(report.combat.resolved, 0);
    }

    #[tokio::test]
    async fn interaction_toggles_chest_on_tick() {
        let (engine, mut scheduler) = world().await;
        let mut sub = engine.subscribe(Channel::Interaction);
        assert!(engine.interact(CharacterId(1), ObjectId(2003)).await.unwrap());
        scheduler.tick().await;

        let chest = record(&engine, EntityKey::object(ObjectId(2003))).await;
        assert_eq!(chest.state(), LifecycleState::Active);
        match sub.recv().await {
            Some(WorldEvent::Interaction(event)) => {
                assert_eq!(event.object_id, ObjectId(2003));
                assert_eq!(event.effect.as_deref(), Some("activated"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn visibility_is_scoped_to_the_observer_instance() {
        let (engine, _) = world().await;
        let mut elsewhere = living("Thrall", 1.0, 1.0, 120, 120);
        elsewhere.instance = Some(InstanceId(2));
        engine.login(CharacterId(3), elsewhere).await.unwrap();

        let response = engine
            .query_visible(
                CharacterId(1),
                &[CharacterId(2), CharacterId(3)],
                &[NpcId(1000)],
                &[ObjectId(2003)],
            )
            .await
            .unwrap();
        let elements = response.elements.unwrap();
        assert!(elements.characters.contains_key(&2));
        assert!(!elements.characters.contains_key(&3));
        assert_eq!(elements.npcs.len(), 1);
        assert_eq!(elements.items.len(), 1);
    }

    #[tokio::test]
    async fn roster_rejects_unknown_instances_and_sets_states() {
        let (engine, _) = world().await;
        let mut lost = living("Ghost", 0.0, 0.0, 1, 1);
        lost.instance = Some(InstanceId(99));
        assert!(matches!(
            engine.login(CharacterId(8), lost).await,
            Err(EngineError::UnknownInstance(InstanceId(99)))
        ));

        let arthas = record(&engine, EntityKey::character(CharacterId(1))).await;
        assert_eq!(arthas.state(), LifecycleState::Online);
        let goblin = record(&engine, EntityKey::npc(NpcId(1000))).await;
        assert_eq!(goblin.state(), LifecycleState::Idle);

        assert!(engine.logout(CharacterId(1)).await.unwrap());
        assert!(!engine.logout(CharacterId(1)).await.unwrap());
        assert!(!engine.move_actor(CharacterId(1), 1.0, 1.0).await.unwrap());
    }

    #[tokio::test]
    async fn sample_manifest_populates() {
        let manifest = WorldManifest::sample();
        let table = manifest.instance_table().unwrap();
        let entities = manifest.entities(&table).unwrap();
        let (engine, _) = Engine::new(Arc::new(MemoryStore::new()), table, SimConfig::default());
        assert_eq!(engine.populate(entities).await.unwrap(), 11);
        assert_eq!(engine.store().len(), 11);
    }

    #[tokio::test]
    async fn store_outage_surfaces_synchronously() {
        let (engine, _) = world().await;
        engine.store().close();
        assert!(matches!(
            engine.move_actor(CharacterId(1), 1.0, 1.0).await,
            Err(EngineError::Store(StoreError::Unavailable))
        ));
        assert!(engine.attack(CharacterId(1), 2).await.is_err());
        assert!(engine.query_visible(CharacterId(1), &[], &[], &[]).await.is_err());
    }

    #[tokio::test]
    async fn configured_damage_applies() {
        let (engine, mut scheduler) = Engine::new(
            Arc::new(MemoryStore::new()),
            mainland(),
            SimConfig::default().with_base_damage(30),
        );
        engine
            .instance_npc(NpcId(1000), living("Goblin", 0.0, 0.0, 50, 50))
            .await
            .unwrap();
        engine
            .login(CharacterId(1), living("Arthas", 1.0, 1.0, 100, 100))
            .await
            .unwrap();
        engine.attack(CharacterId(1), 1000).await.unwrap();
        engine.attack(CharacterId(1), 1000).await.unwrap();
        let report = scheduler.tick().await;
        assert_eq!(report.combat.deaths, 1);
        let goblin = record(&engine, EntityKey::npc(NpcId(1000))).await;
        assert_eq!(goblin.vitals().unwrap().health, 0);
    }
}
