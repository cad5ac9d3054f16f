// Конфигурация приложения
use crate::error::{CallError, Result};
use crate::media::MediaConstraints;
use crate::peer::types::{IceServerKind, ServerConfig};
use serde::Deserialize;
use std::path::Path;

/// App id сервиса сигналинга по умолчанию
pub const DEFAULT_APP_ID: &str = "a511bd6822c64666bf43b9ede355f263";

/// Страница, на которую уходим без параметра room
pub const DEFAULT_FALLBACK_PAGE: &str = "/lobby.html";

pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8080/ws";

pub const DEFAULT_STUN_URLS: [&str; 2] = [
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
];

// В режиме отладки логирование подробное
#[cfg(debug_assertions)]
pub const DEFAULT_LOG_FILTER: &str = "roomcall_lib=debug,roomcall=debug,webrtc=warn";

// В продакшене только важное
#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_FILTER: &str = "roomcall_lib=info,roomcall=info,webrtc=error";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub app_id: String,
    pub token: Option<String>,
    pub signaling_url: String,
    pub fallback_page: String,
    pub ice_servers: Vec<ServerConfig>,
    pub media: MediaConstraints,
    pub log_filter: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.into(),
            token: None,
            signaling_url: DEFAULT_SIGNALING_URL.into(),
            fallback_page: DEFAULT_FALLBACK_PAGE.into(),
            ice_servers: default_ice_servers(),
            media: MediaConstraints::default(),
            log_filter: DEFAULT_LOG_FILTER.into(),
        }
    }
}

pub fn default_ice_servers() -> Vec<ServerConfig> {
    DEFAULT_STUN_URLS
        .iter()
        .enumerate()
        .map(|(i, url)| ServerConfig::stun(&format!("default-stun-{}", i + 1), url))
        .collect()
}

impl CallConfig {
    /// Читает TOML; без пути возвращает значения по умолчанию
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_id.is_empty() {
            return Err(CallError::Config("app_id cannot be empty".into()));
        }
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(CallError::Config("ICE server URL cannot be empty".into()));
            }
            if server.kind == IceServerKind::Turn
                && (server.username.is_none() || server.credential.is_none())
            {
                return Err(CallError::Config(format!(
                    "TURN server {} requires username and credential",
                    server.url
                )));
            }
        }
        Ok(())
    }
}
