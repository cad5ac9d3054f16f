use serde::{Deserialize, Serialize};
use std::fmt;

/// Идентификатор участника канала (uid в сервисе сигналинга)
pub type PeerId = String;

/// Тип ICE сервера
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IceServerKind {
    #[default]
    Stun,
    Turn,
}

impl IceServerKind {
    pub fn scheme(self) -> &'static str {
        match self {
            IceServerKind::Stun => "stun:",
            IceServerKind::Turn => "turn:",
        }
    }
}

impl fmt::Display for IceServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IceServerKind::Stun => f.write_str("stun"),
            IceServerKind::Turn => f.write_str("turn"),
        }
    }
}

/// Конфигурация ICE сервера
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: IceServerKind,
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl ServerConfig {
    pub fn stun(id: &str, url: &str) -> Self {
        Self {
            id: id.into(),
            kind: IceServerKind::Stun,
            url: url.into(),
            username: None,
            credential: None,
        }
    }
}

/// Сводка по типам ICE кандидатов
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}
