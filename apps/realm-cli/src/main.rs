mod script;

use anyhow::Context;
use clap::{Parser, Subcommand};
use realm_bus::ChannelSet;
use realm_common::{CharacterId, NpcId, ObjectId};
use realm_kernel::{MemoryStore, WorldManifest};
use realm_sim::{Engine, SimConfig};
use script::ScriptCommand;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "realm-cli", about = "Operator CLI for the realm world engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and effective configuration
    Info,
    /// Print the built-in sample world manifest as JSON
    Sample,
    /// Load a world, apply scripted commands, run ticks and stream events
    Run {
        /// World manifest (JSON). Defaults to the built-in sample world.
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Number of ticks to run
        #[arg(short, long, default_value = "3")]
        ticks: u64,
        /// Tick period in milliseconds
        #[arg(long)]
        tick_ms: Option<u64>,
        /// Damage per attack
        #[arg(long)]
        damage: Option<u32>,
        /// Channels to stream, comma separated
        #[arg(long, default_value = "movement,combat,death,interaction")]
        channels: String,
        /// Scripted command, repeatable: "move 1 5 5", "attack 1 1000", "interact 1 2003"
        #[arg(short, long = "command")]
        commands: Vec<ScriptCommand>,
    },
    /// Answer a visibility query against a loaded world
    Visible {
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Observing character id
        #[arg(long)]
        observer: u64,
        #[arg(long, value_delimiter = ',')]
        characters: Vec<u64>,
        #[arg(long, value_delimiter = ',')]
        npcs: Vec<u64>,
        #[arg(long, value_delimiter = ',')]
        objects: Vec<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let config = SimConfig::from_env().context("reading REALM_* overrides")?;

    match cli.command {
        Commands::Info => {
            println!("realm-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("tick period: {} ms", config.tick_period.as_millis());
            println!("base damage: {}", config.base_damage);
            println!("bus capacity: {}", config.bus_capacity);
            println!("channels: {}", ChannelSet::all());
        }
        Commands::Sample => {
            println!("{}", serde_json::to_string_pretty(&WorldManifest::sample())?);
        }
        Commands::Run {
            manifest,
            ticks,
            tick_ms,
            damage,
            channels,
            commands,
        } => {
            let mut config = config;
            if let Some(ms) = tick_ms {
                config = config.with_tick_period(Duration::from_millis(ms));
            }
            if let Some(damage) = damage {
                config = config.with_base_damage(damage);
            }
            config.validate()?;
            let channels = ChannelSet::parse_list(&channels)?;
            run(manifest, config, ticks, channels, &commands).await?;
        }
        Commands::Visible {
            manifest,
            observer,
            characters,
            npcs,
            objects,
        } => {
            let engine = load(manifest, config).await?;
            let characters: Vec<CharacterId> = characters.into_iter().map(CharacterId).collect();
            let npcs: Vec<NpcId> = npcs.into_iter().map(NpcId).collect();
            let objects: Vec<ObjectId> = objects.into_iter().map(ObjectId).collect();
            let response = engine
                .query_visible(CharacterId(observer), &characters, &npcs, &objects)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

async fn load(manifest: Option<PathBuf>, config: SimConfig) -> anyhow::Result<Engine<MemoryStore>> {
    let (engine, _) = build(manifest, config).await?;
    Ok(engine)
}

async fn build(
    manifest: Option<PathBuf>,
    config: SimConfig,
) -> anyhow::Result<(Engine<MemoryStore>, realm_sim::TickScheduler<MemoryStore>)> {
    let manifest = match manifest {
        Some(path) => WorldManifest::load(&path).with_context(|| format!("loading {}", path.display()))?,
        None => WorldManifest::sample(),
    };
    let table = manifest.instance_table()?;
    let entities = manifest.entities(&table)?;
    let (engine, scheduler) = Engine::new(Arc::new(MemoryStore::new()), table, config);
    engine.populate(entities).await?;
    Ok((engine, scheduler))
}

async fn run(
    manifest: Option<PathBuf>,
    config: SimConfig,
    ticks: u64,
    channels: ChannelSet,
    commands: &[ScriptCommand],
) -> anyhow::Result<()> {
    let period = config.tick_period;
    let (engine, scheduler) = build(manifest, config).await?;
    let mut events = engine.subscribe(channels);

    for command in commands {
        let accepted = command.apply(&engine).await?;
        tracing::info!(%command, accepted, "command applied");
    }

    if ticks > 0 {
        let window = run_window(period, ticks)?;
        let handle = scheduler.spawn();
        tokio::time::sleep(window).await;
        let scheduler = handle.shutdown().await?;
        tracing::info!(
            ticks = scheduler.ticks(),
            avg_us = scheduler.timer().average().as_micros() as u64,
            max_us = scheduler.timer().max().as_micros() as u64,
            overruns = scheduler.timer().overruns(),
            "run finished"
        );
    }

    while let Ok(Some(event)) = events.recv_timeout(Duration::from_millis(10)).await {
        print!("{}", event.to_sse()?);
    }
    if events.missed() > 0 {
        tracing::warn!(missed = events.missed(), "some events were dropped");
    }
    Ok(())
}

/// How long to let the loop run for `ticks` ticks. The loop ticks
/// immediately, then once per period; half a period of slack lets the last
/// tick finish.
fn run_window(period: Duration, ticks: u64) -> anyhow::Result<Duration> {
    let intervals = u32::try_from(ticks.saturating_sub(1)).context("too many ticks")?;
    period
        .checked_mul(intervals)
        .and_then(|window| window.checked_add(period / 2))
        .with_context(|| format!("{ticks} ticks of {} ms is too long to run", period.as_millis()))
}
