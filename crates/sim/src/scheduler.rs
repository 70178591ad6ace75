use crate::combat::{CombatResolver, CombatStats};
use crate::command::{AttackCommand, InteractCommand, QueueDrain};
use crate::interaction::{InteractionResolver, InteractionStats};
use realm_bus::EventBus;
use realm_kernel::EntityStore;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::Instrument;

/// Measurements of one completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSample {
    pub elapsed: Duration,
    /// Commands taken off the queues, whatever their outcome.
    pub commands: usize,
}

/// Rolling window of recent ticks, measured against the target period.
#[derive(Debug)]
pub struct TickTimer {
    period: Duration,
    window: VecDeque<TickSample>,
    capacity: usize,
    recorded: u64,
    overruns: u64,
}

impl TickTimer {
    /// Keep the last `capacity` samples (at least one).
    pub fn new(period: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            period,
            window: VecDeque::with_capacity(capacity),
            capacity,
            recorded: 0,
            overruns: 0,
        }
    }

    /// Record a finished tick and return how long to wait before the next
    /// one. Zero means the tick used up its whole period.
    pub fn record(&mut self, sample: TickSample) -> Duration {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        self.recorded += 1;

        let pause = self.period.saturating_sub(sample.elapsed);
        if pause.is_zero() {
            self.overruns += 1;
        }
        pause
    }

    pub fn average(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        self.window.iter().map(|s| s.elapsed).sum::<Duration>() / self.window.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.window.iter().map(|s| s.elapsed).max().unwrap_or(Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.window.iter().map(|s| s.elapsed).min().unwrap_or(Duration::ZERO)
    }

    /// Mean commands handled per tick over the window.
    pub fn commands_per_tick(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().map(|s| s.commands).sum::<usize>() as f64 / self.window.len() as f64
    }

    pub fn last(&self) -> Option<TickSample> {
        self.window.back().copied()
    }

    /// Samples currently in the window.
    pub fn count(&self) -> usize {
        self.window.len()
    }

    /// Ticks recorded since creation, including those rolled out of the
    /// window.
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Ticks that took at least a full period.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub combat: CombatStats,
    pub interaction: InteractionStats,
    pub elapsed: Duration,
    /// Wait owed before the next tick; zero after an overrun.
    pub pause: Duration,
}

impl TickReport {
    pub fn commands(&self) -> usize {
        let combat = self.combat.resolved + self.combat.skipped + self.combat.failed;
        let interaction = self.interaction.resolved + self.interaction.skipped + self.interaction.failed;
        combat + interaction
    }
}

/// Owns the command queues' consuming ends and runs the resolvers once per
/// tick period.
///
/// Each tick runs to completion; shutdown is only observed between ticks.
/// A tick that overruns the period is followed immediately by the next, with
/// no attempt to catch up on lost time.
#[derive(Debug)]
pub struct TickScheduler<S> {
    store: Arc<S>,
    bus: EventBus,
    attacks: QueueDrain<AttackCommand>,
    interactions: QueueDrain<InteractCommand>,
    combat: CombatResolver,
    interaction: InteractionResolver,
    period: Duration,
    timer: TickTimer,
    ticks: u64,
}

impl<S: EntityStore> TickScheduler<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        bus: EventBus,
        attacks: QueueDrain<AttackCommand>,
        interactions: QueueDrain<InteractCommand>,
        combat: CombatResolver,
        interaction: InteractionResolver,
        period: Duration,
        timer_history: usize,
    ) -> Self {
        Self {
            store,
            bus,
            attacks,
            interactions,
            combat,
            interaction,
            period,
            timer: TickTimer::new(period, timer_history),
            ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }

    /// Run one resolution pass: combat, then interactions.
    pub async fn tick(&mut self) -> TickReport {
        let tick = self.ticks + 1;
        let span = tracing::info_span!("tick", tick);
        let start = Instant::now();

        let (combat, interaction) = async {
            let combat = self.combat.drain(self.store.as_ref(), &self.bus, &mut self.attacks).await;
            let interaction = self
                .interaction
                .drain(self.store.as_ref(), &self.bus, &mut self.interactions)
                .await;
            (combat, interaction)
        }
        .instrument(span)
        .await;

        let elapsed = start.elapsed();
        self.ticks = tick;
        let mut report = TickReport {
            tick,
            combat,
            interaction,
            elapsed,
            pause: Duration::ZERO,
        };
        report.pause = self.timer.record(TickSample {
            elapsed,
            commands: report.commands(),
        });

        tracing::debug!(
            tick,
            attacks = combat.resolved,
            deaths = combat.deaths,
            interactions = interaction.resolved,
            skipped = combat.skipped + interaction.skipped,
            failed = combat.failed + interaction.failed,
            elapsed_us = elapsed.as_micros() as u64,
            avg_us = self.timer.average().as_micros() as u64,
            "tick complete"
        );
        report
    }

    /// Tick until `shutdown` turns true or its sender is dropped. Returns the
    /// scheduler so callers can inspect it afterwards.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        tracing::info!(period_ms = self.period.as_millis() as u64, "tick loop started");
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let report = self.tick().await;
            if report.pause.is_zero() {
                tracing::warn!(
                    tick = report.tick,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    period_ms = self.period.as_millis() as u64,
                    overruns = self.timer.overruns(),
                    "tick overran its period"
                );
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(report.pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(ticks = self.ticks, "tick loop stopped");
        self
    }

    /// Run the loop on the current tokio runtime.
    pub fn spawn(self) -> TickHandle<S> {
        let (tx, rx) = watch::channel(false);
        TickHandle {
            shutdown: tx,
            task: tokio::spawn(self.run(rx)),
        }
    }
}

/// Handle to a spawned tick loop.
#[derive(Debug)]
pub struct TickHandle<S> {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<TickScheduler<S>>,
}

impl<S: EntityStore> TickHandle<S> {
    /// Ask the loop to stop after any in-flight tick and wait for it.
    pub async fn shutdown(self) -> Result<TickScheduler<S>, JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
