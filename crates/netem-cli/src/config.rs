//! Configuration loading for the `netem` CLI (component J).
//!
//! Loads an [`EmulatorSettings`] value from an optional TOML file, with
//! CLI flags taking precedence over file values, which take precedence
//! over the defaults in spec.md §6. Range validation happens here, before
//! any instance is constructed — a malformed config is a caller mistake,
//! not a runtime condition, so it fails loudly rather than the packet
//! path's best-effort philosophy.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid socket address {value:?}: {source}")]
    Addr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("loss must be within [0, 1], got {0}")]
    LossOutOfRange(f64),
    #[error("duplication must be >= 0, got {0}")]
    DuplicationOutOfRange(f64),
    #[error("max_packet_size must be strictly positive, got {0}")]
    MaxPacketSizeZero(usize),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PolicyFileSettings {
    pub loss: Option<f64>,
    pub duplication: Option<f64>,
    pub delay_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EmulatorFileSettings {
    pub emulator_endpoint: Option<String>,
    pub peer_a: Option<String>,
    pub peer_b: Option<String>,
    pub max_packet_size: Option<usize>,
    pub policy: PolicyFileSettings,
}

/// Fully resolved, validated configuration ready to construct an instance.
#[derive(Debug, Clone)]
pub struct EmulatorSettings {
    pub emulator_endpoint: SocketAddr,
    pub peer_a: SocketAddr,
    pub peer_b: SocketAddr,
    pub max_packet_size: usize,
    pub policy: PolicySettings,
}

#[derive(Debug, Clone)]
pub struct PolicySettings {
    pub loss: f64,
    pub duplication: f64,
    pub delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        PolicySettings {
            loss: netem_policy::DEFAULT_LOSS,
            duplication: netem_policy::DEFAULT_DUPLICATION,
            delay_ms: netem_policy::DEFAULT_DELAY_MS,
            jitter_ms: netem_policy::DEFAULT_JITTER_MS,
        }
    }
}

fn parse_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|source| ConfigError::Addr {
        value: value.to_string(),
        source,
    })
}

/// Loads and validates settings from an optional TOML file, overridden by
/// whatever `Some` values are present in `overrides`.
pub fn load(
    path: Option<&Path>,
    overrides: EmulatorFileSettings,
) -> Result<EmulatorSettings, ConfigError> {
    let file_settings = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                path: p.display().to_string(),
                source,
            })?;
            toml::from_str::<EmulatorFileSettings>(&text).map_err(|source| ConfigError::Parse {
                path: p.display().to_string(),
                source,
            })?
        }
        None => EmulatorFileSettings::default(),
    };

    let merged = EmulatorFileSettings {
        emulator_endpoint: overrides.emulator_endpoint.or(file_settings.emulator_endpoint),
        peer_a: overrides.peer_a.or(file_settings.peer_a),
        peer_b: overrides.peer_b.or(file_settings.peer_b),
        max_packet_size: overrides.max_packet_size.or(file_settings.max_packet_size),
        policy: PolicyFileSettings {
            loss: overrides.policy.loss.or(file_settings.policy.loss),
            duplication: overrides.policy.duplication.or(file_settings.policy.duplication),
            delay_ms: overrides.policy.delay_ms.or(file_settings.policy.delay_ms),
            jitter_ms: overrides.policy.jitter_ms.or(file_settings.policy.jitter_ms),
        },
    };

    let defaults = PolicySettings::default();
    let policy = PolicySettings {
        loss: merged.policy.loss.unwrap_or(defaults.loss),
        duplication: merged.policy.duplication.unwrap_or(defaults.duplication),
        delay_ms: merged.policy.delay_ms.unwrap_or(defaults.delay_ms),
        jitter_ms: merged.policy.jitter_ms.unwrap_or(defaults.jitter_ms),
    };

    if !(0.0..=1.0).contains(&policy.loss) {
        return Err(ConfigError::LossOutOfRange(policy.loss));
    }
    if policy.duplication < 0.0 {
        return Err(ConfigError::DuplicationOutOfRange(policy.duplication));
    }

    let max_packet_size = merged
        .max_packet_size
        .unwrap_or(netem_core::DEFAULT_MAX_PACKET_SIZE);
    if max_packet_size == 0 {
        return Err(ConfigError::MaxPacketSizeZero(max_packet_size));
    }

    let peer_a = merged
        .peer_a
        .as_deref()
        .ok_or(ConfigError::MissingField("peer_a"))?;
    let peer_b = merged
        .peer_b
        .as_deref()
        .ok_or(ConfigError::MissingField("peer_b"))?;

    Ok(EmulatorSettings {
        emulator_endpoint: parse_addr(
            merged.emulator_endpoint.as_deref().unwrap_or("0.0.0.0:9700"),
        )?,
        peer_a: parse_addr(peer_a)?,
        peer_b: parse_addr(peer_b)?,
        max_packet_size,
        policy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_overrides_and_no_file_use_defaults() {
        let overrides = EmulatorFileSettings {
            peer_a: Some("127.0.0.1:1".into()),
            peer_b: Some("127.0.0.1:2".into()),
            ..Default::default()
        };
        let settings = load(None, overrides).unwrap();
        assert_eq!(settings.max_packet_size, netem_core::DEFAULT_MAX_PACKET_SIZE);
        assert_eq!(settings.policy.loss, netem_policy::DEFAULT_LOSS);
        assert_eq!(settings.policy.duplication, netem_policy::DEFAULT_DUPLICATION);
        assert_eq!(settings.policy.delay_ms, netem_policy::DEFAULT_DELAY_MS);
        assert_eq!(settings.policy.jitter_ms, netem_policy::DEFAULT_JITTER_MS);
    }

    #[test]
    fn rejects_loss_out_of_range() {
        let overrides = EmulatorFileSettings {
            peer_a: Some("127.0.0.1:1".into()),
            peer_b: Some("127.0.0.1:2".into()),
            policy: PolicyFileSettings {
                loss: Some(1.5),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = load(None, overrides).unwrap_err();
        assert!(matches!(err, ConfigError::LossOutOfRange(_)));
    }

    #[test]
    fn rejects_negative_duplication() {
        let overrides = EmulatorFileSettings {
            peer_a: Some("127.0.0.1:1".into()),
            peer_b: Some("127.0.0.1:2".into()),
            policy: PolicyFileSettings {
                duplication: Some(-0.1),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = load(None, overrides).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicationOutOfRange(_)));
    }

    #[test]
    fn cli_overrides_beat_file_values() {
        let overrides = EmulatorFileSettings {
            peer_a: Some("127.0.0.1:1".into()),
            peer_b: Some("127.0.0.1:2".into()),
            policy: PolicyFileSettings {
                loss: Some(0.5),
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = load(None, overrides).unwrap();
        assert_eq!(settings.policy.loss, 0.5);
    }
}
