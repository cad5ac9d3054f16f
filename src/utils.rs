use crate::peer::types::ServerConfig;
use rand::Rng;

/// Короткий идентификатор соединения для логов
pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Эфемерный uid пользователя, живёт столько же, сколько сессия
pub fn new_uid() -> String {
    uuid::Uuid::new_v4().to_string()
}

// Добавляет схему протокола к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if config.url.starts_with("turn:")
        || config.url.starts_with("turns:")
        || config.url.starts_with("stun:")
    {
        config.url.clone()
    } else {
        format!("{}{}", config.kind.scheme(), config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::IceServerKind;

    #[test]
    fn scheme_is_added_by_server_kind() {
        let mut cfg = ServerConfig::stun("a", "stun.example.org:3478");
        assert_eq!(add_ice_url_scheme(&cfg), "stun:stun.example.org:3478");

        cfg.kind = IceServerKind::Turn;
        assert_eq!(add_ice_url_scheme(&cfg), "turn:stun.example.org:3478");

        cfg.url = "stun:already.example.org".into();
        assert_eq!(add_ice_url_scheme(&cfg), "stun:already.example.org");
    }

    #[test]
    fn ids_are_fresh() {
        assert_eq!(random_id().len(), 16);
        assert_ne!(new_uid(), new_uid());
    }
}
