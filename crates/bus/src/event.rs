use crate::channel::Channel;
use realm_common::{CharacterId, EntityKind, ObjectId};
use serde::{Deserialize, Serialize};

/// A character moved to `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementEvent {
    pub charid: CharacterId,
    pub x: f64,
    pub y: f64,
}

/// One resolved attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEvent {
    pub attacker: CharacterId,
    pub target: u64,
    pub target_type: EntityKind,
    pub damage: u32,
    pub new_health: u32,
}

/// A target's health reached zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathEvent {
    pub target: u64,
    pub target_type: EntityKind,
    pub killer: CharacterId,
}

/// A character interacted with an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub charid: CharacterId,
    pub object_id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

/// Anything published on the bus, tagged with its channel.
///
/// Wire form is `{"channel": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "lowercase")]
pub enum WorldEvent {
    Movement(MovementEvent),
    Combat(CombatEvent),
    Death(DeathEvent),
    Interaction(InteractionEvent),
}

impl WorldEvent {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Movement(_) => Channel::Movement,
            Self::Combat(_) => Channel::Combat,
            Self::Death(_) => Channel::Death,
            Self::Interaction(_) => Channel::Interaction,
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Server-sent-events frame for a streaming gateway.
    pub fn to_sse(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", self.to_text()?))
    }
}

impl From<MovementEvent> for WorldEvent {
    fn from(event: MovementEvent) -> Self {
        Self::Movement(event)
    }
}

impl From<CombatEvent> for WorldEvent {
    fn from(event: CombatEvent) -> Self {
        Self::Combat(event)
    }
}

impl From<DeathEvent> for WorldEvent {
    fn from(event: DeathEvent) -> Self {
        Self::Death(event)
    }
}

impl From<InteractionEvent> for WorldEvent {
    fn from(event: InteractionEvent) -> Self {
        Self::Interaction(event)
    }
}
