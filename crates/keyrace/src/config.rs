//! Server configuration.
//!
//! Defaults suit local development. Deployments override them through
//! `KEYRACE_*` environment variables or the server builder.

use std::time::Duration;

use keyrace_room::RoomConfig;
use keyrace_session::SessionConfig;

/// Listen address used when nothing else is configured.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// A configuration value that could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// How long a dropped player's slot is held. Zero disables resume.
    pub reconnect_grace: Duration,
    /// Rooms with no player activity for this long are closed.
    pub room_ttl: Duration,
    /// How often the sweeper looks for idle rooms and stale sessions.
    pub sweep_interval: Duration,
    /// Connections silent for this long are dropped.
    pub idle_timeout: Duration,
    /// Seeds room codes and round selection for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            reconnect_grace: Duration::ZERO,
            room_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
            seed: None,
        }
    }
}

impl ServerConfig {
    /// Reads overrides from the process environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `KEYRACE_BIND` | `bind_addr` |
    /// | `KEYRACE_RECONNECT_GRACE_SECS` | `reconnect_grace` |
    /// | `KEYRACE_ROOM_TTL_SECS` | `room_ttl` |
    /// | `KEYRACE_SWEEP_INTERVAL_SECS` | `sweep_interval` |
    /// | `KEYRACE_IDLE_TIMEOUT_SECS` | `idle_timeout` |
    /// | `KEYRACE_SEED` | `seed` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("KEYRACE_BIND") {
            if bind.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    var: "KEYRACE_BIND",
                    value: bind,
                    reason: "must not be empty".into(),
                });
            }
            config.bind_addr = bind;
        }
        if let Some(secs) = secs_var(&lookup, "KEYRACE_RECONNECT_GRACE_SECS")? {
            config.reconnect_grace = secs;
        }
        if let Some(secs) = secs_var(&lookup, "KEYRACE_ROOM_TTL_SECS")? {
            config.room_ttl = secs;
        }
        if let Some(secs) = nonzero_secs_var(&lookup, "KEYRACE_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = secs;
        }
        if let Some(secs) = nonzero_secs_var(&lookup, "KEYRACE_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = secs;
        }
        if let Some(seed) = u64_var(&lookup, "KEYRACE_SEED")? {
            config.seed = Some(seed);
        }

        Ok(config)
    }

    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            reconnect_grace: self.reconnect_grace,
            room_ttl: self.room_ttl,
            seed: self.seed,
            ..RoomConfig::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reconnect_grace: self.reconnect_grace,
        }
    }
}

fn u64_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    let parsed = value.trim().parse::<u64>();
    parsed.map(Some).map_err(|e| ConfigError::Invalid {
        var,
        value,
        reason: e.to_string(),
    })
}

fn secs_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(u64_var(lookup, var)?.map(Duration::from_secs))
}

fn nonzero_secs_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match secs_var(lookup, var)? {
        Some(d) if d.is_zero() => Err(ConfigError::Invalid {
            var,
            value: "0".into(),
            reason: "must be at least one second".into(),
        }),
        other => Ok(other),
    }
}
