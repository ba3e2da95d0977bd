use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::voice::RoomSeed;

pub const DEFAULT_MAX_CONNECTIONS: usize = 200;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1_000_000;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 25;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:8080",
    "http://localhost:5000",
    "http://localhost",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    /// Ceiling on concurrently admitted connections.
    pub max_connections: usize,
    /// Largest inbound WebSocket message accepted by the transport.
    pub max_payload_bytes: usize,
    pub allowed_origins: Vec<String>,
    /// `None` disables the periodic status report.
    pub status_interval: Option<Duration>,
    pub ping_interval: Duration,
    /// A connection that sends nothing, pongs included, for this long is closed.
    pub idle_timeout: Duration,
    pub voice_rooms: Vec<RoomSeed>,
    pub database_url: Option<String>,
    pub production: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| origin.to_string())
                .collect(),
            status_interval: Some(Duration::from_secs(DEFAULT_STATUS_INTERVAL_SECS)),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            voice_rooms: Vec::new(),
            database_url: None,
            production: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset or blank keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let max_connections =
            parse_or(read("MAX_CONNECTIONS"), "MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            return Err(ConfigError::Zero {
                key: "MAX_CONNECTIONS",
            });
        }

        let max_payload_bytes = parse_or(
            read("MAX_PAYLOAD_BYTES"),
            "MAX_PAYLOAD_BYTES",
            defaults.max_payload_bytes,
        )?;
        if max_payload_bytes == 0 {
            return Err(ConfigError::Zero {
                key: "MAX_PAYLOAD_BYTES",
            });
        }

        let status_secs = parse_or(
            read("STATUS_INTERVAL_SECS"),
            "STATUS_INTERVAL_SECS",
            DEFAULT_STATUS_INTERVAL_SECS,
        )?;

        let ping_secs = parse_positive(
            read("PING_INTERVAL_SECS"),
            "PING_INTERVAL_SECS",
            DEFAULT_PING_INTERVAL_SECS,
        )?;
        let idle_secs = parse_positive(
            read("IDLE_TIMEOUT_SECS"),
            "IDLE_TIMEOUT_SECS",
            DEFAULT_IDLE_TIMEOUT_SECS,
        )?;

        let voice_rooms = match read("VOICE_ROOMS") {
            Some(raw) => parse_room_seeds(&raw)?,
            None => Vec::new(),
        };

        let allowed_origins = match read("ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.allowed_origins,
        };

        Ok(Self {
            bind_addr: read("BIND_ADDR")
                .map(|value| value.trim().to_string())
                .unwrap_or(defaults.bind_addr),
            port: parse_or(read("PORT"), "PORT", defaults.port)?,
            max_connections,
            max_payload_bytes,
            allowed_origins,
            status_interval: (status_secs > 0).then(|| Duration::from_secs(status_secs)),
            ping_interval: Duration::from_secs(ping_secs),
            idle_timeout: Duration::from_secs(idle_secs),
            voice_rooms,
            database_url: read("DATABASE_URL"),
            production: read("APP_ENV")
                .map(|value| value.trim().eq_ignore_ascii_case("production"))
                .unwrap_or(false),
        })
    }

    /// Whether a browser origin may use the gateway. `*` admits every origin.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_addr, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            key: "BIND_ADDR",
            value: raw,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn parse_positive(raw: Option<String>, key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match parse_or(raw, key, default)? {
        0 => Err(ConfigError::Zero { key }),
        value => Ok(value),
    }
}

/// `VOICE_ROOMS=lobby,ops:secret` seeds a public `lobby` and a private `ops`.
fn parse_room_seeds(raw: &str) -> Result<Vec<RoomSeed>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, password) = match entry.split_once(':') {
                Some((name, password)) => (name.trim(), Some(password)),
                None => (entry, None),
            };
            if name.is_empty() || password.is_some_and(str::is_empty) {
                return Err(ConfigError::Invalid {
                    key: "VOICE_ROOMS",
                    value: entry.to_string(),
                });
            }
            Ok(RoomSeed {
                name: name.to_string(),
                password: password.map(str::to_string),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_reference_limits() {
        let config = config_from(&[]).expect("default config");
        assert_eq!(config.max_connections, 200);
        assert_eq!(config.max_payload_bytes, 1_000_000);
        assert_eq!(config.port, 3000);
        assert_eq!(config.status_interval, Some(Duration::from_secs(300)));
        assert!(config.database_url.is_none());
        assert!(!config.production);
    }

    #[test]
    fn reads_overrides_and_origin_list() {
        let config = config_from(&[
            ("MAX_CONNECTIONS", "2"),
            ("PORT", "4100"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("STATUS_INTERVAL_SECS", "0"),
            ("APP_ENV", "Production"),
        ])
        .expect("config");

        assert_eq!(config.max_connections, 2);
        assert_eq!(config.port, 4100);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(config.status_interval.is_none());
        assert!(config.production);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(matches!(
            config_from(&[("MAX_CONNECTIONS", "lots")]),
            Err(ConfigError::Invalid { key: "MAX_CONNECTIONS", .. })
        ));
        assert!(matches!(
            config_from(&[("MAX_CONNECTIONS", "0")]),
            Err(ConfigError::Zero { .. })
        ));
    }

    #[test]
    fn liveness_timers_default_and_reject_zero() {
        let config = config_from(&[]).expect("default config");
        assert_eq!(config.ping_interval, Duration::from_secs(25));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));

        let config = config_from(&[("PING_INTERVAL_SECS", "5"), ("IDLE_TIMEOUT_SECS", "12")])
            .expect("config");
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(12));

        assert!(matches!(
            config_from(&[("IDLE_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Zero { key: "IDLE_TIMEOUT_SECS" })
        ));
    }

    #[test]
    fn parses_voice_room_seeds() {
        let config = config_from(&[("VOICE_ROOMS", "lobby, ops:secret123 ,")]).expect("config");
        assert_eq!(
            config.voice_rooms,
            vec![
                RoomSeed {
                    name: "lobby".into(),
                    password: None
                },
                RoomSeed {
                    name: "ops".into(),
                    password: Some("secret123".into())
                },
            ]
        );

        assert!(matches!(
            config_from(&[("VOICE_ROOMS", "ops:")]),
            Err(ConfigError::Invalid { key: "VOICE_ROOMS", .. })
        ));
    }

    #[test]
    fn origin_check_uses_allowed_list() {
        let config = config_from(&[("ALLOWED_ORIGINS", "https://app.example")]).expect("config");
        assert!(config.origin_allowed("https://app.example"));
        assert!(!config.origin_allowed("http://evil.example"));

        let open = config_from(&[("ALLOWED_ORIGINS", "*")]).expect("config");
        assert!(open.origin_allowed("http://evil.example"));
    }

    #[test]
    fn builds_socket_addr() {
        let config = config_from(&[("BIND_ADDR", "127.0.0.1"), ("PORT", "9000")]).expect("config");
        assert_eq!(config.socket_addr().expect("addr").port(), 9000);
    }
}
