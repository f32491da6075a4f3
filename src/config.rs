use std::time::Duration;

/// Server configuration, read once at startup.
///
/// Every knob has a sensible default so the binary runs with no
/// environment at all.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// How often the cleanup sweeper wakes up
    pub sweep_interval: Duration,
    /// Empty rooms are evicted after this much inactivity
    pub empty_room_threshold: Duration,
    /// Any room, even with players, is evicted after this much inactivity
    pub stale_room_threshold: Duration,
    /// How often the deadline watcher polls room timers
    pub deadline_tick: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7373,
            sweep_interval: Duration::from_secs(5 * 60),
            empty_room_threshold: Duration::from_secs(10 * 60),
            stale_room_threshold: Duration::from_secs(60 * 60),
            deadline_tick: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("LEXIO_PORT", defaults.port),
            sweep_interval: Duration::from_secs(env_parse(
                "LEXIO_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            empty_room_threshold: Duration::from_secs(env_parse(
                "LEXIO_EMPTY_ROOM_SECS",
                defaults.empty_room_threshold.as_secs(),
            )),
            stale_room_threshold: Duration::from_secs(env_parse(
                "LEXIO_STALE_ROOM_SECS",
                defaults.stale_room_threshold.as_secs(),
            )),
            deadline_tick: Duration::from_secs(env_parse(
                "LEXIO_DEADLINE_TICK_SECS",
                defaults.deadline_tick.as_secs(),
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 7373);
        assert_eq!(config.empty_room_threshold, Duration::from_secs(600));
        assert_eq!(config.stale_room_threshold, Duration::from_secs(3600));
    }
}
