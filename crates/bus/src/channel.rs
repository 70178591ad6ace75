use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel: {0:?}")]
pub struct UnknownChannel(pub String);

/// Named event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Movement,
    Combat,
    Death,
    Interaction,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Self::Movement, Self::Combat, Self::Death, Self::Interaction];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movement => "movement",
            Self::Combat => "combat",
            Self::Death => "death",
            Self::Interaction => "interaction",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// A set of channels a subscription listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSet(u8);

impl ChannelSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Channel::ALL.into_iter().collect()
    }

    pub fn with(mut self, channel: Channel) -> Self {
        self.insert(channel);
        self
    }

    pub fn insert(&mut self, channel: Channel) {
        self.0 |= channel.bit();
    }

    pub fn contains(self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    /// Parse a comma-separated list such as `"combat,death"`.
    pub fn parse_list(list: &str) -> Result<Self, UnknownChannel> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Channel::from_str)
            .collect()
    }
}

impl From<Channel> for ChannelSet {
    fn from(channel: Channel) -> Self {
        Self::empty().with(channel)
    }
}

impl<const N: usize> From<[Channel; N]> for ChannelSet {
    fn from(channels: [Channel; N]) -> Self {
        channels.into_iter().collect()
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        let mut set = Self::empty();
        for channel in iter {
            set.insert(channel);
        }
        set
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Channel::as_str).collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
        }
        assert_eq!("chat".parse::<Channel>(), Err(UnknownChannel("chat".into())));
    }

    #[test]
    fn set_membership() {
        let set = ChannelSet::from([Channel::Combat, Channel::Death]);
        assert!(set.contains(Channel::Death));
        assert!(!set.contains(Channel::Movement));
        assert_eq!(set.to_string(), "combat,death");
        assert!(ChannelSet::empty().is_empty());
        assert_eq!(ChannelSet::all().iter().count(), 4);
    }

    #[test]
    fn parse_list_skips_blanks() {
        let set = ChannelSet::parse_list(" movement, ,interaction").unwrap();
        assert_eq!(set, ChannelSet::from([Channel::Movement, Channel::Interaction]));
        assert!(ChannelSet::parse_list("movement,teleport").is_err());
    }
}
