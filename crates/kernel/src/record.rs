use realm_common::{EntityKind, InstanceId, LifecycleState, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat string attribute map: the store's serialization boundary.
///
/// This is the shape a key-value backend (a hash per entity) holds, and the
/// shape visibility queries hand back to collaborators.
pub type FieldMap = BTreeMap<String, String>;

const NAME: &str = "name";
const X: &str = "x";
const Y: &str = "y";
const HEALTH: &str = "health";
const MAX_HEALTH: &str = "max_health";
const INSTANCE: &str = "instance";
const STATE: &str = "state";
const OBJECT_TYPE: &str = "type";

/// Errors decoding a [`FieldMap`] into a typed record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("missing field {0:?}")]
    MissingField(&'static str),
    #[error("invalid value {value:?} for field {field:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("health {health} exceeds max_health {max_health}")]
    HealthAboveMax { health: u32, max_health: u32 },
    #[error("field {0:?} is not valid for this entity kind")]
    UnexpectedField(&'static str),
}

/// Health pair for characters and NPCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    pub health: u32,
    pub max_health: u32,
}

impl Vitals {
    /// Full health at the given maximum.
    pub fn full(max_health: u32) -> Self {
        Self {
            health: max_health,
            max_health,
        }
    }

    pub fn is_depleted(&self) -> bool {
        self.health == 0
    }
}

/// Attributes of a character or NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivingRecord {
    pub name: String,
    pub position: Position,
    pub vitals: Vitals,
    pub instance: Option<InstanceId>,
    pub state: LifecycleState,
}

impl LivingRecord {
    pub fn new(name: impl Into<String>, position: Position, vitals: Vitals) -> Self {
        Self {
            name: name.into(),
            position,
            vitals,
            instance: None,
            state: LifecycleState::Idle,
        }
    }

    pub fn in_instance(mut self, instance: InstanceId) -> Self {
        self.instance = Some(instance);
        self
    }
}

/// Attributes of a world object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub name: String,
    pub position: Position,
    /// Selects the interaction handler ("resource", "container", ...).
    pub object_type: String,
    pub instance: Option<InstanceId>,
    pub state: LifecycleState,
}

impl ObjectRecord {
    pub fn new(name: impl Into<String>, object_type: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            position,
            object_type: object_type.into(),
            instance: None,
            state: LifecycleState::Idle,
        }
    }

    pub fn in_instance(mut self, instance: InstanceId) -> Self {
        self.instance = Some(instance);
        self
    }
}

/// Typed attribute set of one live entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityRecord {
    Character(LivingRecord),
    Npc(LivingRecord),
    Object(ObjectRecord),
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Character(_) => EntityKind::Character,
            Self::Npc(_) => EntityKind::Npc,
            Self::Object(_) => EntityKind::Object,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Character(r) | Self::Npc(r) => &r.name,
            Self::Object(o) => &o.name,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Self::Character(r) | Self::Npc(r) => r.position,
            Self::Object(o) => o.position,
        }
    }

    pub fn instance(&self) -> Option<InstanceId> {
        match self {
            Self::Character(r) | Self::Npc(r) => r.instance,
            Self::Object(o) => o.instance,
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self {
            Self::Character(r) | Self::Npc(r) => r.state,
            Self::Object(o) => o.state,
        }
    }

    /// Health pair, `None` for objects.
    pub fn vitals(&self) -> Option<Vitals> {
        self.as_living().map(|r| r.vitals)
    }

    pub fn as_living(&self) -> Option<&LivingRecord> {
        match self {
            Self::Character(r) | Self::Npc(r) => Some(r),
            Self::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRecord> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Set the lifecycle state in place.
    pub fn set_state(&mut self, state: LifecycleState) {
        match self {
            Self::Character(r) | Self::Npc(r) => r.state = state,
            Self::Object(o) => o.state = state,
        }
    }

    /// Encode into the flat store representation.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        let position = self.position();
        fields.insert(NAME.into(), self.name().to_string());
        fields.insert(X.into(), position.x.to_string());
        fields.insert(Y.into(), position.y.to_string());
        fields.insert(STATE.into(), self.state().to_string());
        if let Some(instance) = self.instance() {
            fields.insert(INSTANCE.into(), instance.to_string());
        }
        match self {
            Self::Character(r) | Self::Npc(r) => {
                fields.insert(HEALTH.into(), r.vitals.health.to_string());
                fields.insert(MAX_HEALTH.into(), r.vitals.max_health.to_string());
            }
            Self::Object(o) => {
                fields.insert(OBJECT_TYPE.into(), o.object_type.clone());
            }
        }
        fields
    }

    /// Decode the flat store representation for an entity of `kind`.
    pub fn from_fields(kind: EntityKind, fields: &FieldMap) -> Result<Self, CodecError> {
        let name = fields.get(NAME).cloned().unwrap_or_default();
        let position = Position::new(parse(fields, X)?, parse(fields, Y)?);
        let instance = parse_opt::<u64>(fields, INSTANCE)?.map(InstanceId);
        let state = parse(fields, STATE)?;

        match kind {
            EntityKind::Character | EntityKind::Npc => {
                let health: u32 = parse(fields, HEALTH)?;
                let max_health: u32 = parse(fields, MAX_HEALTH)?;
                if health > max_health {
                    return Err(CodecError::HealthAboveMax { health, max_health });
                }
                let living = LivingRecord {
                    name,
                    position,
                    vitals: Vitals { health, max_health },
                    instance,
                    state,
                };
                Ok(if kind == EntityKind::Character {
                    Self::Character(living)
                } else {
                    Self::Npc(living)
                })
            }
            EntityKind::Object => {
                if fields.contains_key(HEALTH) {
                    return Err(CodecError::UnexpectedField(HEALTH));
                }
                let object_type = fields
                    .get(OBJECT_TYPE)
                    .cloned()
                    .ok_or(CodecError::MissingField(OBJECT_TYPE))?;
                Ok(Self::Object(ObjectRecord {
                    name,
                    position,
                    object_type,
                    instance,
                    state,
                }))
            }
        }
    }
}

fn parse<T: std::str::FromStr>(fields: &FieldMap, field: &'static str) -> Result<T, CodecError> {
    parse_opt(fields, field)?.ok_or(CodecError::MissingField(field))
}

fn parse_opt<T: std::str::FromStr>(
    fields: &FieldMap,
    field: &'static str,
) -> Result<Option<T>, CodecError> {
    fields
        .get(field)
        .map(|raw| {
            raw.parse().map_err(|_| CodecError::InvalidField {
                field,
                value: raw.clone(),
            })
        })
        .transpose()
}

/// Partial attribute update. Only the named fields change.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityPatch {
    pub position: Option<Position>,
    pub health: Option<u32>,
    pub state: Option<LifecycleState>,
    pub instance: Option<InstanceId>,
}

impl EntityPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn health(mut self, health: u32) -> Self {
        self.health = Some(health);
        self
    }

    pub fn state(mut self, state: LifecycleState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn instance(mut self, instance: InstanceId) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The fields this patch writes, in store encoding.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        if let Some(p) = self.position {
            fields.insert(X.into(), p.x.to_string());
            fields.insert(Y.into(), p.y.to_string());
        }
        if let Some(h) = self.health {
            fields.insert(HEALTH.into(), h.to_string());
        }
        if let Some(s) = self.state {
            fields.insert(STATE.into(), s.to_string());
        }
        if let Some(i) = self.instance {
            fields.insert(INSTANCE.into(), i.to_string());
        }
        fields
    }
}
