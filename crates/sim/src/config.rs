use std::time::Duration;

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(600);
pub const DEFAULT_BASE_DAMAGE: u32 = 10;
pub const DEFAULT_BUS_CAPACITY: usize = 1024;
pub const DEFAULT_TIMER_HISTORY: usize = 100;

pub const ENV_TICK_MS: &str = "REALM_TICK_MS";
pub const ENV_BASE_DAMAGE: &str = "REALM_BASE_DAMAGE";
pub const ENV_BUS_CAPACITY: &str = "REALM_BUS_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid number")]
    Invalid { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Simulation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Target wall time between tick starts.
    pub tick_period: Duration,
    /// Health removed by every resolved attack.
    pub base_damage: u32,
    /// How many events a bus subscriber may fall behind before losing some.
    pub bus_capacity: usize,
    /// Number of recent tick durations kept for instrumentation.
    pub timer_history: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            base_damage: DEFAULT_BASE_DAMAGE,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            timer_history: DEFAULT_TIMER_HISTORY,
        }
    }
}

impl SimConfig {
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    pub fn with_base_damage(mut self, damage: u32) -> Self {
        self.base_damage = damage;
        self
    }

    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    pub fn with_timer_history(mut self, history: usize) -> Self {
        self.timer_history = history;
        self
    }

    /// Defaults overlaid with the `REALM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for the `REALM_*`
    /// variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = parse::<u64>(&lookup, ENV_TICK_MS)? {
            config.tick_period = Duration::from_millis(ms);
        }
        if let Some(damage) = parse::<u32>(&lookup, ENV_BASE_DAMAGE)? {
            config.base_damage = damage;
        }
        if let Some(capacity) = parse::<usize>(&lookup, ENV_BUS_CAPACITY)? {
            config.bus_capacity = capacity;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period.is_zero() {
            return Err(ConfigError::Zero("tick_period"));
        }
        if self.bus_capacity == 0 {
            return Err(ConfigError::Zero("bus_capacity"));
        }
        if self.timer_history == 0 {
            return Err(ConfigError::Zero("timer_history"));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
