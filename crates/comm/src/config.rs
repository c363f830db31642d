use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CommError;

/// Bootstrap configuration for an instance's communication engine: where the
/// manager lives, how long bootstrap is allowed to take, and the default
/// transport to stand servers up on.
///
/// Parsed from TOML with environment-variable overrides (`COUPLER_*`),
/// mirroring the messaging layer this crate descends from. Everything else
/// an instance needs — conduits, ensemble shape, port declarations — comes
/// from the manager at `request_peers` time, not from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommConfig {
    pub manager: ManagerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Location string the manager client connects to, e.g. `tcp:host:9000`.
    #[serde(default = "default_manager_location")]
    pub location: String,

    /// Overall deadline for `request_peers` backoff, in seconds.
    #[serde(default = "default_bootstrap_deadline_secs")]
    pub bootstrap_deadline_secs: u64,
}

fn default_manager_location() -> String {
    "tcp:127.0.0.1:9000".to_string()
}

fn default_bootstrap_deadline_secs() -> u64 {
    5 * 60
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            location: default_manager_location(),
            bootstrap_deadline_secs: default_bootstrap_deadline_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Which transport an instance stands its servers up on by default:
    /// `"local"` or `"tcp"`.
    #[serde(default = "default_transport_kind")]
    pub kind: String,

    /// Bind address for the tcp transport's server. Port 0 picks an
    /// ephemeral port.
    #[serde(default = "default_tcp_bind")]
    pub tcp_bind: String,
}

fn default_transport_kind() -> String {
    "tcp".to_string()
}

fn default_tcp_bind() -> String {
    "0.0.0.0:0".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            tcp_bind: default_tcp_bind(),
        }
    }
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            manager: ManagerConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl CommConfig {
    pub fn from_toml(s: &str) -> Result<Self, CommError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CommError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Loads `.env` (if present) then builds a config from defaults with
    /// environment overrides applied.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_opt("COUPLER_MANAGER_LOCATION") {
            self.manager.location = v;
        }
        if let Some(v) = env_opt("COUPLER_MANAGER_BOOTSTRAP_DEADLINE_SECS") {
            if let Ok(secs) = v.parse() {
                self.manager.bootstrap_deadline_secs = secs;
            }
        }
        if let Some(v) = env_opt("COUPLER_TRANSPORT_KIND") {
            self.transport.kind = v;
        }
        if let Some(v) = env_opt("COUPLER_TRANSPORT_TCP_BIND") {
            self.transport.tcp_bind = v;
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CommConfig::default();
        assert_eq!(config.manager.bootstrap_deadline_secs, 300);
        assert_eq!(config.transport.kind, "tcp");
    }

    #[test]
    fn parses_partial_toml_with_defaults_filled_in() {
        let config = CommConfig::from_toml(
            r#"
            [manager]
            location = "tcp:manager.local:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.manager.location, "tcp:manager.local:9000");
        assert_eq!(config.manager.bootstrap_deadline_secs, 300);
    }

    #[test]
    fn env_override_wins_over_default() {
        std::env::set_var("COUPLER_TRANSPORT_KIND", "local");
        let config = CommConfig::from_env();
        assert_eq!(config.transport.kind, "local");
        std::env::remove_var("COUPLER_TRANSPORT_KIND");
    }
}
