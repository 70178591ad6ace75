use realm_common::{CharacterId, ObjectId};
use realm_kernel::EntityStore;
use realm_sim::{Engine, EngineResult};
use std::fmt;
use std::str::FromStr;

/// One scripted request, e.g. `move 1 5 5`, `attack 1 1000`,
/// `interact 1 2003`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptCommand {
    Move { actor: CharacterId, dx: f64, dy: f64 },
    Attack { attacker: CharacterId, target: u64 },
    Interact { actor: CharacterId, object: ObjectId },
}

impl ScriptCommand {
    pub async fn apply<S: EntityStore>(&self, engine: &Engine<S>) -> EngineResult<bool> {
        match *self {
            Self::Move { actor, dx, dy } => engine.move_actor(actor, dx, dy).await,
            Self::Attack { attacker, target } => engine.attack(attacker, target).await,
            Self::Interact { actor, object } => engine.interact(actor, object).await,
        }
    }
}

impl fmt::Display for ScriptCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { actor, dx, dy } => write!(f, "move {actor} {dx} {dy}"),
            Self::Attack { attacker, target } => write!(f, "attack {attacker} {target}"),
            Self::Interact { actor, object } => write!(f, "interact {actor} {object}"),
        }
    }
}

fn arg<T: FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    let word = word.ok_or_else(|| format!("missing {what}"))?;
    word.parse().map_err(|_| format!("invalid {what}: {word:?}"))
}

impl FromStr for ScriptCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let verb = words.next().ok_or("empty command")?;
        let command = match verb {
            "move" => Self::Move {
                actor: CharacterId(arg(words.next(), "actor id")?),
                dx: arg(words.next(), "dx")?,
                dy: arg(words.next(), "dy")?,
            },
            "attack" => Self::Attack {
                attacker: CharacterId(arg(words.next(), "attacker id")?),
                target: arg(words.next(), "target id")?,
            },
            "interact" => Self::Interact {
                actor: CharacterId(arg(words.next(), "actor id")?),
                object: ObjectId(arg(words.next(), "object id")?),
            },
            other => return Err(format!("unknown command {other:?}")),
        };
        match words.next() {
            Some(extra) => Err(format!("unexpected argument {extra:?}")),
            None => Ok(command),
        }
    }
}
