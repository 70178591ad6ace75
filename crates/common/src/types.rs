use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// World-space position on an instance's ground plane.
pub type Position = glam::DVec2;

/// Errors from parsing keys and lifecycle states out of their text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown entity kind prefix: {0:?}")]
    UnknownKind(String),
    #[error("malformed entity key: {0:?}")]
    MalformedKey(String),
    #[error("unknown lifecycle state: {0:?}")]
    UnknownState(String),
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

typed_id!(
    /// Player character id.
    CharacterId
);
typed_id!(
    /// Non-player character id. Shares its numeric space with [`CharacterId`].
    NpcId
);
typed_id!(
    /// World object id (trees, chests, ...).
    ObjectId
);
typed_id!(
    /// World partition id.
    InstanceId
);

/// The three kinds of live entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "char")]
    Character,
    #[serde(rename = "npc")]
    Npc,
    #[serde(rename = "object")]
    Object,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Character, Self::Npc, Self::Object];

    /// Key prefix used in the textual key form.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Character => "char",
            Self::Npc => "npc",
            Self::Object => "object",
        }
    }

    /// Whether entities of this kind carry health.
    pub fn has_vitals(self) -> bool {
        !matches!(self, Self::Object)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for EntityKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "char" => Ok(Self::Character),
            "npc" => Ok(Self::Npc),
            "object" => Ok(Self::Object),
            other => Err(ParseError::UnknownKind(other.to_string())),
        }
    }
}

/// Composite store key: an id is only unique together with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: u64,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        Self { kind, id }
    }

    pub fn character(id: CharacterId) -> Self {
        Self::new(EntityKind::Character, id.0)
    }

    pub fn npc(id: NpcId) -> Self {
        Self::new(EntityKind::Npc, id.0)
    }

    pub fn object(id: ObjectId) -> Self {
        Self::new(EntityKind::Object, id.0)
    }
}

impl From<CharacterId> for EntityKey {
    fn from(id: CharacterId) -> Self {
        Self::character(id)
    }
}

impl From<NpcId> for EntityKey {
    fn from(id: NpcId) -> Self {
        Self::npc(id)
    }
}

impl From<ObjectId> for EntityKey {
    fn from(id: ObjectId) -> Self {
        Self::object(id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for EntityKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, raw) = s
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedKey(s.to_string()))?;
        let kind = prefix.parse()?;
        let id = raw
            .parse()
            .map_err(|_| ParseError::MalformedKey(s.to_string()))?;
        Ok(Self { kind, id })
    }
}

/// Lifecycle state of a live entity.
///
/// Characters log in `Online`, NPCs are instanced `Idle`, objects toggle
/// between `Idle` and `Active`. `Dead` is terminal for combat purposes only:
/// the entity stays in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Online,
    #[default]
    Idle,
    Active,
    Dead,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Dead => "dead",
        }
    }

    pub fn is_dead(self) -> bool {
        self == Self::Dead
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "idle" => Ok(Self::Idle),
            "active" => Ok(Self::Active),
            "dead" => Ok(Self::Dead),
            other => Err(ParseError::UnknownState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_text_form() {
        assert_eq!(EntityKey::character(CharacterId(7)).to_string(), "char:7");
        assert_eq!(EntityKey::npc(NpcId(1000)).to_string(), "npc:1000");
        assert_eq!(EntityKey::object(ObjectId(2001)).to_string(), "object:2001");
    }

    #[test]
    fn key_parses_back() {
        let key: EntityKey = "npc:1001".parse().unwrap();
        assert_eq!(key, EntityKey::new(EntityKind::Npc, 1001));
    }

    #[test]
    fn key_rejects_garbage() {
        assert!(matches!(
            "monster:1".parse::<EntityKey>(),
            Err(ParseError::UnknownKind(_))
        ));
        assert!(matches!(
            "char".parse::<EntityKey>(),
            Err(ParseError::MalformedKey(_))
        ));
        assert!(matches!(
            "char:x".parse::<EntityKey>(),
            Err(ParseError::MalformedKey(_))
        ));
    }

    #[test]
    fn same_id_different_kind_are_distinct_keys() {
        let c = EntityKey::character(CharacterId(5));
        let n = EntityKey::npc(NpcId(5));
        assert_ne!(c, n);
    }

    #[test]
    fn kind_serializes_with_store_prefix() {
        let json = serde_json::to_string(&EntityKind::Character).unwrap();
        assert_eq!(json, "\"char\"");
    }

    #[test]
    fn lifecycle_state_text() {
        assert_eq!(LifecycleState::Dead.to_string(), "dead");
        assert_eq!("online".parse::<LifecycleState>(), Ok(LifecycleState::Online));
        assert!("zombie".parse::<LifecycleState>().is_err());
    }

    #[test]
    fn only_living_kinds_have_vitals() {
        assert!(EntityKind::Character.has_vitals());
        assert!(EntityKind::Npc.has_vitals());
        assert!(!EntityKind::Object.has_vitals());
    }
}
