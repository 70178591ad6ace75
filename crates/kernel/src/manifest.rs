//! World manifest: the instance table plus the entities placed at world load.
//!
//! JSON layout:
//! ```text
//! {
//!   "instances":  [{ "id": 1, "name": "mainland", "x_size": 1000, "y_size": 1000,
//!                    "tags": ["outdoor"], "blocked": [[4, 4]], "heights": [] }],
//!   "characters": [{ "id": 1, "name": "Arthas", "x": 100.0, "y": 200.0,
//!                    "max_health": 100, "instance": 1 }],
//!   "npcs":       [...same shape as characters...],
//!   "objects":    [{ "id": 2003, "name": "Chest", "x": 800.0, "y": 800.0,
//!                    "type": "container", "instance": 1 }]
//! }
//! ```

use crate::instance::{Instance, InstanceError, InstanceTable};
use crate::record::{EntityRecord, LivingRecord, ObjectRecord, Vitals};
use realm_common::{EntityKey, EntityKind, InstanceId, LifecycleState, Position};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors loading a world manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("instance error: {0}")]
    Instance(#[from] InstanceError),
    #[error("{key}: health {health} exceeds max_health {max_health}")]
    HealthAboveMax {
        key: EntityKey,
        health: u32,
        max_health: u32,
    },
    #[error("{key} references unknown instance {instance}")]
    UnknownInstance { key: EntityKey, instance: InstanceId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub id: InstanceId,
    pub name: String,
    pub x_size: u32,
    pub y_size: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Impassable cells as `[x, y]`.
    #[serde(default)]
    pub blocked: Vec<[u32; 2]>,
    #[serde(default)]
    pub heights: Vec<HeightEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightEntry {
    pub x: u32,
    pub y: u32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivingEntry {
    pub id: u64,
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// Defaults to `max_health`.
    #[serde(default)]
    pub health: Option<u32>,
    pub max_health: u32,
    #[serde(default)]
    pub instance: Option<InstanceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub id: u64,
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub instance: Option<InstanceId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldManifest {
    #[serde(default)]
    pub instances: Vec<InstanceEntry>,
    #[serde(default)]
    pub characters: Vec<LivingEntry>,
    #[serde(default)]
    pub npcs: Vec<LivingEntry>,
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
}

impl WorldManifest {
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let manifest: Self = serde_json::from_reader(std::fs::File::open(path)?)?;
        tracing::info!(
            path = %path.display(),
            instances = manifest.instances.len(),
            characters = manifest.characters.len(),
            npcs = manifest.npcs.len(),
            objects = manifest.objects.len(),
            "world manifest loaded"
        );
        Ok(manifest)
    }

    /// Build the read-only instance table.
    pub fn instance_table(&self) -> Result<InstanceTable, ManifestError> {
        let mut table = InstanceTable::new();
        for entry in &self.instances {
            let mut instance = Instance::new(entry.id, entry.name.clone(), entry.x_size, entry.y_size)?;
            for tag in &entry.tags {
                instance = instance.with_tag(tag.clone());
            }
            for [x, y] in &entry.blocked {
                instance.block(*x, *y)?;
            }
            for h in &entry.heights {
                instance.set_height(h.x, h.y, h.height)?;
            }
            table.insert(instance)?;
        }
        Ok(table)
    }

    /// Typed records for every placed entity, with their initial lifecycle
    /// state: characters `online`, NPCs and objects `idle`.
    ///
    /// Instance references are checked against `table`.
    pub fn entities(
        &self,
        table: &InstanceTable,
    ) -> Result<Vec<(EntityKey, EntityRecord)>, ManifestError> {
        let mut out = Vec::with_capacity(self.characters.len() + self.npcs.len() + self.objects.len());
        for entry in &self.characters {
            let key = EntityKey::new(EntityKind::Character, entry.id);
            let living = living_record(key, entry, LifecycleState::Online)?;
            check_instance(table, key, living.instance)?;
            out.push((key, EntityRecord::Character(living)));
        }
        for entry in &self.npcs {
            let key = EntityKey::new(EntityKind::Npc, entry.id);
            let living = living_record(key, entry, LifecycleState::Idle)?;
            check_instance(table, key, living.instance)?;
            out.push((key, EntityRecord::Npc(living)));
        }
        for entry in &self.objects {
            let key = EntityKey::new(EntityKind::Object, entry.id);
            check_instance(table, key, entry.instance)?;
            out.push((
                key,
                EntityRecord::Object(ObjectRecord {
                    name: entry.name.clone(),
                    position: Position::new(entry.x, entry.y),
                    object_type: entry.object_type.clone(),
                    instance: entry.instance,
                    state: LifecycleState::Idle,
                }),
            ));
        }
        Ok(out)
    }

    /// A small ready-to-run world: one open instance with five characters,
    /// three NPCs and three objects.
    pub fn sample() -> Self {
        let home = Some(InstanceId(1));
        let living = |id, name: &str, x, y, max_health| LivingEntry {
            id,
            name: name.to_string(),
            x,
            y,
            health: None,
            max_health,
            instance: home,
        };
        let object = |id, name: &str, x, y, object_type: &str| ObjectEntry {
            id,
            name: name.to_string(),
            x,
            y,
            object_type: object_type.to_string(),
            instance: home,
        };
        Self {
            instances: vec![InstanceEntry {
                id: InstanceId(1),
                name: "mainland".into(),
                x_size: 1000,
                y_size: 1000,
                tags: vec!["outdoor".into()],
                blocked: Vec::new(),
                heights: Vec::new(),
            }],
            characters: vec![
                living(1, "Arthas", 100.0, 200.0, 100),
                living(2, "Jaina", 150.0, 250.0, 80),
                living(3, "Thrall", 200.0, 300.0, 120),
                living(4, "Medivh", 250.0, 350.0, 70),
                living(5, "Garrosh", 300.0, 400.0, 150),
            ],
            npcs: vec![
                living(1000, "Goblin", 500.0, 500.0, 50),
                living(1001, "Dragon", 600.0, 600.0, 500),
                living(1002, "Merchant", 700.0, 700.0, 100),
            ],
            objects: vec![
                object(2001, "Tree", 400.0, 400.0, "resource"),
                object(2002, "Rock", 450.0, 450.0, "resource"),
                object(2003, "Chest", 800.0, 800.0, "container"),
            ],
        }
    }
}

fn living_record(
    key: EntityKey,
    entry: &LivingEntry,
    state: LifecycleState,
) -> Result<LivingRecord, ManifestError> {
    let health = entry.health.unwrap_or(entry.max_health);
    if health > entry.max_health {
        return Err(ManifestError::HealthAboveMax {
            key,
            health,
            max_health: entry.max_health,
        });
    }
    Ok(LivingRecord {
        name: entry.name.clone(),
        position: Position::new(entry.x, entry.y),
        vitals: Vitals {
            health,
            max_health: entry.max_health,
        },
        instance: entry.instance,
        state,
    })
}

fn check_instance(
    table: &InstanceTable,
    key: EntityKey,
    instance: Option<InstanceId>,
) -> Result<(), ManifestError> {
    match instance {
        Some(id) if !table.contains(id) => Err(ManifestError::UnknownInstance { key, instance: id }),
        _ => Ok(()),
    }
}
