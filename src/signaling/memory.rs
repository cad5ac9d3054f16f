use super::{ChannelEvent, EventReceiver, SignalingClient};
use crate::error::{CallError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

struct Member {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    channel: Option<String>,
    since: DateTime<Utc>,
}

#[derive(Default)]
struct HubState {
    members: HashMap<String, Member>,
    channels: HashMap<String, HashSet<String>>,
}

impl HubState {
    /// Рассылает событие всем участникам канала, кроме `except`
    fn broadcast(&self, channel: &str, except: &str, event: ChannelEvent) {
        if let Some(uids) = self.channels.get(channel) {
            for uid in uids.iter().filter(|u| u.as_str() != except) {
                if let Some(m) = self.members.get(uid) {
                    let _ = m.tx.send(event.clone());
                }
            }
        }
    }

    fn remove_from_channel(&mut self, uid: &str) -> Option<String> {
        let channel = self.members.get_mut(uid)?.channel.take()?;
        if let Some(uids) = self.channels.get_mut(&channel) {
            uids.remove(uid);
            if uids.is_empty() {
                self.channels.remove(&channel);
            }
        }
        self.broadcast(&channel, uid, ChannelEvent::MemberLeft(uid.to_string()));
        Some(channel)
    }
}

/// Сервис каналов в памяти процесса: логин, каналы, присутствие, личные сообщения
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> MemoryClient {
        MemoryClient {
            hub: self.clone(),
            uid: Mutex::new(None),
        }
    }

    pub fn channel_members(&self, channel: &str) -> Vec<String> {
        let state = self.state.lock();
        let mut uids: Vec<String> = state
            .channels
            .get(channel)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        uids.sort();
        uids
    }

    pub fn online_count(&self) -> usize {
        self.state.lock().members.len()
    }

    fn login(&self, uid: &str) -> Result<EventReceiver> {
        let mut state = self.state.lock();
        if state.members.contains_key(uid) {
            return Err(CallError::AlreadyLoggedIn(uid.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.members.insert(
            uid.to_string(),
            Member {
                tx,
                channel: None,
                since: Utc::now(),
            },
        );
        Ok(rx)
    }

    fn join(&self, uid: &str, channel: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.members.contains_key(uid) {
            return Err(CallError::NotLoggedIn);
        }
        // один канал на клиента, повторный join переводит в новый
        state.remove_from_channel(uid);
        if let Some(m) = state.members.get_mut(uid) {
            m.channel = Some(channel.to_string());
        }
        state
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(uid.to_string());
        state.broadcast(channel, uid, ChannelEvent::MemberJoined(uid.to_string()));
        Ok(())
    }

    /// Личные сообщения ходят только внутри канала отправителя
    fn send(&self, from: &str, to: &str, text: String) -> Result<()> {
        let state = self.state.lock();
        let channel = state
            .members
            .get(from)
            .and_then(|m| m.channel.as_deref())
            .ok_or(CallError::NotJoined)?;
        let target = state
            .members
            .get(to)
            .filter(|m| m.channel.as_deref() == Some(channel))
            .ok_or_else(|| CallError::PeerUnreachable(to.to_string()))?;
        target
            .tx
            .send(ChannelEvent::MessageFromPeer {
                text,
                member_id: from.to_string(),
            })
            .map_err(|_| CallError::PeerUnreachable(to.to_string()))
    }

    fn leave(&self, uid: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.remove_from_channel(uid).ok_or(CallError::NotJoined)?;
        Ok(())
    }

    fn logout(&self, uid: &str) {
        let mut state = self.state.lock();
        state.remove_from_channel(uid);
        if let Some(m) = state.members.remove(uid) {
            tracing::debug!(
                uid,
                online_secs = (Utc::now() - m.since).num_seconds(),
                "Member logged out"
            );
        }
    }
}

/// Клиент одного пользователя внутри [`MemoryHub`]
pub struct MemoryClient {
    hub: MemoryHub,
    uid: Mutex<Option<String>>,
}

impl MemoryClient {
    fn uid(&self) -> Result<String> {
        self.uid.lock().clone().ok_or(CallError::NotLoggedIn)
    }
}

#[async_trait]
impl SignalingClient for MemoryClient {
    async fn login(&self, _app_id: &str, uid: &str, _token: Option<&str>) -> Result<EventReceiver> {
        let mut current = self.uid.lock();
        if let Some(current) = current.as_ref() {
            return Err(CallError::AlreadyLoggedIn(current.clone()));
        }
        let rx = self.hub.login(uid)?;
        *current = Some(uid.to_string());
        Ok(rx)
    }

    async fn join_channel(&self, room_id: &str) -> Result<()> {
        self.hub.join(&self.uid()?, room_id)
    }

    async fn send_to_peer(&self, text: String, peer_id: &str) -> Result<()> {
        self.hub.send(&self.uid()?, peer_id, text)
    }

    async fn leave(&self) -> Result<()> {
        self.hub.leave(&self.uid()?)
    }

    async fn logout(&self) -> Result<()> {
        let uid = self.uid.lock().take().ok_or(CallError::NotLoggedIn)?;
        self.hub.logout(&uid);
        Ok(())
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        if let Some(uid) = self.uid.get_mut().take() {
            self.hub.logout(&uid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_notifies_only_other_members() {
        let hub = MemoryHub::new();
        let a = hub.client();
        let b = hub.client();
        let mut a_rx = a.login("app", "a", None).await.unwrap();
        let mut b_rx = b.login("app", "b", None).await.unwrap();

        a.join_channel("X").await.unwrap();
        b.join_channel("X").await.unwrap();

        assert_eq!(a_rx.recv().await, Some(ChannelEvent::MemberJoined("b".into())));
        assert!(b_rx.try_recv().is_err());
        assert_eq!(hub.channel_members("X"), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn peer_message_carries_sender() {
        let hub = MemoryHub::new();
        let a = hub.client();
        let b = hub.client();
        let mut a_rx = a.login("app", "a", None).await.unwrap();
        let mut b_rx = b.login("app", "b", None).await.unwrap();
        a.join_channel("X").await.unwrap();
        b.join_channel("X").await.unwrap();
        let _ = a_rx.recv().await;

        a.send_to_peer("hello".into(), "b").await.unwrap();
        assert_eq!(
            b_rx.recv().await,
            Some(ChannelEvent::MessageFromPeer {
                text: "hello".into(),
                member_id: "a".into()
            })
        );
        assert!(matches!(
            a.send_to_peer("x".into(), "nobody").await,
            Err(CallError::PeerUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn leave_and_logout_clean_up() {
        let hub = MemoryHub::new();
        let a = hub.client();
        let b = hub.client();
        let mut a_rx = a.login("app", "a", None).await.unwrap();
        let _b_rx = b.login("app", "b", None).await.unwrap();
        a.join_channel("X").await.unwrap();
        b.join_channel("X").await.unwrap();
        let _ = a_rx.recv().await;

        b.leave().await.unwrap();
        assert_eq!(a_rx.recv().await, Some(ChannelEvent::MemberLeft("b".into())));
        assert!(matches!(b.leave().await, Err(CallError::NotJoined)));

        b.logout().await.unwrap();
        assert_eq!(hub.online_count(), 1);
        assert!(matches!(b.join_channel("X").await, Err(CallError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn duplicate_uid_is_rejected() {
        let hub = MemoryHub::new();
        let a = hub.client();
        let a2 = hub.client();
        let _rx = a.login("app", "a", None).await.unwrap();
        assert!(matches!(
            a2.login("app", "a", None).await,
            Err(CallError::AlreadyLoggedIn(_))
        ));
    }

    #[tokio::test]
    async fn second_login_on_same_client_is_rejected() {
        let hub = MemoryHub::new();
        let a = hub.client();
        let _rx = a.login("app", "a", None).await.unwrap();
        assert!(matches!(
            a.login("app", "other", None).await,
            Err(CallError::AlreadyLoggedIn(uid)) if uid == "a"
        ));
        assert_eq!(hub.online_count(), 1);

        a.logout().await.unwrap();
        assert_eq!(hub.online_count(), 0);
    }

    #[tokio::test]
    async fn messages_stay_inside_the_channel() {
        let hub = MemoryHub::new();
        let a = hub.client();
        let c = hub.client();
        let _a_rx = a.login("app", "a", None).await.unwrap();
        let mut c_rx = c.login("app", "c", None).await.unwrap();

        assert!(matches!(
            c.send_to_peer("x".into(), "a").await,
            Err(CallError::NotJoined)
        ));
        a.join_channel("X").await.unwrap();
        c.join_channel("Y").await.unwrap();
        assert!(matches!(
            c.send_to_peer("x".into(), "a").await,
            Err(CallError::PeerUnreachable(_))
        ));
        assert!(matches!(
            a.send_to_peer("x".into(), "c").await,
            Err(CallError::PeerUnreachable(_))
        ));
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_client_leaves_channel() {
        let hub = MemoryHub::new();
        let a = hub.client();
        let mut a_rx = a.login("app", "a", None).await.unwrap();
        a.join_channel("X").await.unwrap();
        {
            let b = hub.client();
            let _b_rx = b.login("app", "b", None).await.unwrap();
            b.join_channel("X").await.unwrap();
        }
        assert_eq!(a_rx.recv().await, Some(ChannelEvent::MemberJoined("b".into())));
        assert_eq!(a_rx.recv().await, Some(ChannelEvent::MemberLeft("b".into())));
    }
}
