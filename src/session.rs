use crate::error::Result;
use crate::utils::new_uid;
use chrono::{DateTime, Utc};
use url::Url;

/// Локальная сессия страницы звонка
#[derive(Debug, Clone)]
pub struct Session {
    pub uid: String,
    pub room_id: String,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(room_id: impl Into<String>) -> Self {
        let session = Self {
            uid: new_uid(),
            room_id: room_id.into(),
            started_at: Utc::now(),
        };
        tracing::info!(uid = %session.uid, room = %session.room_id, "My uid");
        session
    }

    /// Сколько секунд прошло с начала сессии
    pub fn elapsed_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

/// Результат запуска страницы
#[derive(Debug, Clone)]
pub enum Bootstrap {
    Ready(Session),
    Redirect(String),
}

/// Значение параметра `room`; пустая строка считается отсутствием
pub fn room_from_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == "room")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Читает room из адреса страницы. Без комнаты дальше ничего не делаем, только redirect.
pub fn bootstrap(page_url: &str, fallback: &str) -> Result<Bootstrap> {
    let url = Url::parse(page_url)?;
    match room_from_url(&url) {
        Some(room) => Ok(Bootstrap::Ready(Session::new(room))),
        None => {
            tracing::info!(fallback, "No room in page URL, redirecting");
            Ok(Bootstrap::Redirect(fallback.to_string()))
        }
    }
}
