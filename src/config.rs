// Конфигурация комнаты
// Логирование по умолчанию включено только в режиме разработки

use crate::error::{Result, RoomError};
use crate::peer::state::GRACE_PERIOD;
use crate::peer::types::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: LOGGING_ENABLED,
            level: "info".into(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        if !self.enabled {
            return log::LevelFilter::Off;
        }
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RoomConfig {
    pub hub_url: String,
    pub room_id: String,
    pub display_name: Option<String>,
    pub ice_servers: Vec<ServerConfig>,
    pub whiteboard_debounce_ms: u64,
    pub grace_period_secs: u64,
    pub reconnect_delay_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            hub_url: "ws://127.0.0.1:8080/hub".into(),
            room_id: String::new(),
            display_name: None,
            ice_servers: default_ice_servers(),
            whiteboard_debounce_ms: 500,
            grace_period_secs: GRACE_PERIOD.as_secs(),
            reconnect_delay_ms: 1000,
            logging: LoggingConfig::default(),
        }
    }
}

impl RoomConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: RoomConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.ice_servers.iter().any(|s| s.r#type == "stun") {
            return Err(RoomError::Config(
                "at least one STUN server is required".into(),
            ));
        }
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(RoomError::Config(format!(
                    "ICE server {} has an empty URL",
                    server.id
                )));
            }
            if server.r#type == "turn"
                && (server.username.is_none() || server.credential.is_none())
            {
                return Err(RoomError::Config(format!(
                    "TURN server {} requires username and credential",
                    server.id
                )));
            }
        }
        if self.whiteboard_debounce_ms == 0 {
            return Err(RoomError::Config(
                "whiteboard_debounce_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn whiteboard_debounce(&self) -> Duration {
        Duration::from_millis(self.whiteboard_debounce_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Дефолтные STUN серверы
pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}
