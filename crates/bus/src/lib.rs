//! Event bus: named channels carrying world events to any number of
//! subscribers.
//!
//! Delivery is at-most-once. Nothing is buffered for subscribers that join
//! late, and a subscriber that falls more than the bus capacity behind on a
//! channel loses that channel's oldest events (the loss is counted, never
//! replayed). Channels are buffered separately, so a flood on one never
//! evicts another's events. Within one subscription events arrive in
//! publish order.

mod bus;
mod channel;
mod event;

pub use bus::{EventBus, Subscription};
pub use channel::{Channel, ChannelSet, UnknownChannel};
pub use event::{CombatEvent, DeathEvent, InteractionEvent, MovementEvent, WorldEvent};
