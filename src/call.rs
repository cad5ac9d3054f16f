//! Звонок в комнате: одна очередь входов, один обработчик.
//!
//! События сервиса сигналинга, кандидаты и состояния соединений, команды
//! страницы попадают в очередь [`CallInput`]. [`CallSession::run`] разбирает
//! их по одному, прогоняет через автомат участника ([`PeerState`]) и
//! выполняет полученные [`Effect`].

use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::logger::dump_selected_pair;
use crate::media::{acquire_local_stream, LocalStream, MediaDevices, RemoteStream, TrackKind};
use crate::peer::connection::{media_api, new_peer, PeerContext};
use crate::peer::ice::{analyze_candidates, apply_candidates};
use crate::peer::state::{Effect, Input, NegotiationState, PeerState};
use crate::peer::types::PeerId;
use crate::session::Session;
use crate::signaling::{ChannelEvent, SignalingClient, SignalingMessage};
use crate::ui::{self, CallView};
use crate::utils::random_id;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::API;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// Всё, что может разбудить звонок
#[derive(Debug)]
pub enum CallInput {
    Channel(ChannelEvent),
    LocalCandidate {
        peer_id: PeerId,
        connection_id: String,
        candidate: RTCIceCandidateInit,
    },
    GatheringComplete {
        peer_id: PeerId,
        connection_id: String,
    },
    PeerConnectionState {
        peer_id: PeerId,
        connection_id: String,
        state: RTCPeerConnectionState,
    },
    ToggleCamera,
    ToggleMic,
    Leave,
    /// Поток событий сигналинга закончился: сервис закрыл соединение или мы разлогинились
    SignalingClosed,
}

/// Команды страницы в очередь звонка
#[derive(Clone)]
pub struct CallHandle {
    tx: mpsc::UnboundedSender<CallInput>,
}

impl CallHandle {
    fn send(&self, input: CallInput) -> Result<()> {
        self.tx.send(input).map_err(|_| CallError::ChannelClosed)
    }

    pub fn toggle_camera(&self) -> Result<()> {
        self.send(CallInput::ToggleCamera)
    }

    pub fn toggle_mic(&self) -> Result<()> {
        self.send(CallInput::ToggleMic)
    }

    /// Аналог beforeunload
    pub fn leave(&self) -> Result<()> {
        self.send(CallInput::Leave)
    }
}

/// Состояние связи с одним участником
struct PeerLink {
    state: PeerState,
    connection_id: String,
    pc: Option<Arc<RTCPeerConnection>>,
    remote: Arc<RemoteStream>,
    local_candidates: Vec<RTCIceCandidateInit>,
}

impl PeerLink {
    fn new() -> Self {
        Self {
            state: PeerState::new(),
            connection_id: String::new(),
            pc: None,
            remote: Arc::new(RemoteStream::new()),
            local_candidates: Vec::new(),
        }
    }
}

pub struct CallSession {
    session: Session,
    config: CallConfig,
    signaling: Arc<dyn SignalingClient>,
    devices: Arc<dyn MediaDevices>,
    view: Arc<dyn CallView>,
    api: API,
    local_stream: Option<Arc<LocalStream>>,
    peers: HashMap<PeerId, PeerLink>,
    inputs_tx: mpsc::UnboundedSender<CallInput>,
    inputs_rx: mpsc::UnboundedReceiver<CallInput>,
    left: bool,
}

impl CallSession {
    pub fn new(
        session: Session,
        config: CallConfig,
        signaling: Arc<dyn SignalingClient>,
        devices: Arc<dyn MediaDevices>,
        view: Arc<dyn CallView>,
    ) -> Result<Self> {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        Ok(Self {
            session,
            config,
            signaling,
            devices,
            view,
            api: media_api()?,
            local_stream: None,
            peers: HashMap::new(),
            inputs_tx,
            inputs_rx,
            left: false,
        })
    }

    pub fn handle(&self) -> CallHandle {
        CallHandle {
            tx: self.inputs_tx.clone(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn local_stream(&self) -> Option<Arc<LocalStream>> {
        self.local_stream.clone()
    }

    pub fn peer_state(&self, peer_id: &str) -> Option<NegotiationState> {
        self.peers.get(peer_id).map(|l| l.state.state())
    }

    /// Автомат участника уже принял offer или answer
    pub fn remote_description_applied(&self, peer_id: &str) -> bool {
        self.peers
            .get(peer_id)
            .is_some_and(|l| l.state.remote_description_set())
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    /// Установлен ли remote description на соединении с участником
    pub async fn has_remote_description(&self, peer_id: &str) -> bool {
        match self.peers.get(peer_id).and_then(|l| l.pc.clone()) {
            Some(pc) => pc.remote_description().await.is_some(),
            None => false,
        }
    }

    /// login → join → локальный поток. Ошибки здесь не перехватываются.
    pub async fn start(&mut self) -> Result<()> {
        let mut events = self
            .signaling
            .login(
                &self.config.app_id,
                &self.session.uid,
                self.config.token.as_deref(),
            )
            .await?;
        tracing::info!(uid = %self.session.uid, "Logged in");

        let tx = self.inputs_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx.send(CallInput::Channel(event)).is_err() {
                    return;
                }
            }
            tracing::debug!("Signaling event stream ended");
            let _ = tx.send(CallInput::SignalingClosed);
        });

        self.signaling.join_channel(&self.session.room_id).await?;
        tracing::info!(room = %self.session.room_id, "Joined channel");

        self.ensure_local_stream().await?;
        Ok(())
    }

    pub async fn next_input(&mut self) -> Option<CallInput> {
        self.inputs_rx.recv().await
    }

    /// Главный цикл; заканчивается после Leave или с потерей сигналинга
    pub async fn run(mut self) -> Result<()> {
        while let Some(input) = self.next_input().await {
            let leaving = matches!(input, CallInput::Leave | CallInput::SignalingClosed);
            if let Err(e) = self.dispatch(input).await {
                tracing::error!(error = %e, "Call input failed");
                if leaving {
                    return Err(e);
                }
            }
            if leaving {
                break;
            }
        }
        Ok(())
    }

    pub async fn dispatch(&mut self, input: CallInput) -> Result<()> {
        match input {
            CallInput::Channel(ChannelEvent::MemberJoined(peer_id)) => {
                tracing::info!(peer = %peer_id, "New member joined");
                self.step(&peer_id, Input::MemberJoined).await
            }
            CallInput::Channel(ChannelEvent::MemberLeft(peer_id)) => {
                tracing::info!(peer = %peer_id, "Member left");
                let result = self.step(&peer_id, Input::MemberLeft).await;
                self.peers.remove(&peer_id);
                result
            }
            CallInput::Channel(ChannelEvent::MessageFromPeer { text, member_id }) => {
                self.handle_peer_message(&text, &member_id).await
            }
            CallInput::LocalCandidate {
                peer_id,
                connection_id,
                candidate,
            } => {
                let Some(link) = self.current_link(&peer_id, &connection_id) else {
                    return Ok(());
                };
                link.local_candidates.push(candidate.clone());
                tracing::debug!(peer = %peer_id, "Sending Candidate");
                self.send(&peer_id, SignalingMessage::Candidate { candidate })
                    .await
            }
            CallInput::GatheringComplete {
                peer_id,
                connection_id,
            } => {
                if let Some(link) = self.current_link(&peer_id, &connection_id) {
                    tracing::debug!(peer = %peer_id, "ICE candidate gathering completed");
                    analyze_candidates(&link.local_candidates);
                }
                Ok(())
            }
            CallInput::PeerConnectionState {
                peer_id,
                connection_id,
                state,
            } => {
                if self.current_link(&peer_id, &connection_id).is_none() {
                    return Ok(());
                }
                if state == RTCPeerConnectionState::Connected {
                    if let Some(pc) = self.peers.get(&peer_id).and_then(|l| l.pc.clone()) {
                        tokio::spawn(async move { dump_selected_pair(&pc, "CONNECTED").await });
                    }
                }
                self.step(&peer_id, Input::ConnectionState(state)).await
            }
            CallInput::ToggleCamera => {
                let stream = self.require_stream(TrackKind::Video)?;
                ui::toggle_camera(&stream, self.view.as_ref()).map(|_| ())
            }
            CallInput::ToggleMic => {
                let stream = self.require_stream(TrackKind::Audio)?;
                ui::toggle_mic(&stream, self.view.as_ref()).map(|_| ())
            }
            CallInput::Leave => self.leave().await,
            CallInput::SignalingClosed => {
                if self.left {
                    return Ok(());
                }
                tracing::warn!(room = %self.session.room_id, "Signaling connection lost");
                self.left = true;
                self.close_peers().await;
                Err(CallError::ChannelClosed)
            }
        }
    }

    async fn handle_peer_message(&mut self, text: &str, member_id: &str) -> Result<()> {
        let message = SignalingMessage::from_text(text)?;
        tracing::debug!(from = member_id, kind = message.kind(), "Message from peer");
        let input = match message {
            SignalingMessage::Offer { offer } => Input::Offer(offer),
            SignalingMessage::Answer { answer } => Input::Answer(answer),
            SignalingMessage::Candidate { candidate } => Input::Candidate(candidate),
        };
        self.step(member_id, input).await
    }

    async fn step(&mut self, peer_id: &str, input: Input) -> Result<()> {
        let effects = self
            .peers
            .entry(peer_id.to_string())
            .or_insert_with(PeerLink::new)
            .state
            .step(input);
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            // ответ драйвера автомату идёт раньше оставшихся действий
            if let Some(follow_up) = self.execute(peer_id, effect).await? {
                let more = self.link(peer_id)?.state.step(follow_up);
                for effect in more.into_iter().rev() {
                    queue.push_front(effect);
                }
            }
        }
        Ok(())
    }

    /// Выполняет одно действие; `Some` — вход, который нужно вернуть автомату
    async fn execute(&mut self, peer_id: &str, effect: Effect) -> Result<Option<Input>> {
        match effect {
            Effect::CreateConnection => {
                let stream = self.ensure_local_stream().await?;
                let connection_id = random_id();
                let remote = Arc::new(RemoteStream::new());
                let ctx = PeerContext {
                    peer_id: peer_id.to_string(),
                    connection_id: connection_id.clone(),
                    inputs: self.inputs_tx.clone(),
                };
                let pc = new_peer(
                    &self.api,
                    &self.config.ice_servers,
                    ctx,
                    &stream,
                    remote.clone(),
                )
                .await?;

                let link = self.link(peer_id)?;
                let old = link.pc.replace(pc);
                link.connection_id = connection_id;
                link.remote = remote;
                link.local_candidates.clear();
                // прежнее соединение с этим участником больше не нужно
                if let Some(old) = old {
                    tracing::debug!(peer = peer_id, "Replacing previous peer connection");
                    let _ = old.close().await;
                }
                Ok(None)
            }
            Effect::ShowRemote => {
                let remote = self.link(peer_id)?.remote.clone();
                self.view.show_remote(peer_id, &remote);
                self.view.set_local_small(true);
                Ok(None)
            }
            Effect::SendOffer => {
                let pc = self.pc(peer_id)?;
                let offer = pc.create_offer(None).await?;
                pc.set_local_description(offer.clone()).await?;
                tracing::info!(peer = peer_id, "Sending Offer");
                self.send(peer_id, SignalingMessage::Offer { offer }).await?;
                Ok(None)
            }
            Effect::AcceptOffer(offer) => {
                self.pc(peer_id)?.set_remote_description(offer).await?;
                tracing::info!(peer = peer_id, "Remote offer set");
                Ok(Some(Input::RemoteDescriptionApplied))
            }
            Effect::SendAnswer => {
                let pc = self.pc(peer_id)?;
                let answer = pc.create_answer(None).await?;
                pc.set_local_description(answer.clone()).await?;
                tracing::info!(peer = peer_id, "Sending Answer");
                self.send(peer_id, SignalingMessage::Answer { answer }).await?;
                Ok(None)
            }
            Effect::ApplyAnswer(answer) => {
                let pc = self.pc(peer_id)?;
                // решает фактический remote description соединения
                if pc.current_remote_description().await.is_some() {
                    return Ok(Some(Input::RemoteDescriptionApplied));
                }
                pc.set_remote_description(answer).await?;
                tracing::info!(peer = peer_id, "Remote description set");
                Ok(Some(Input::RemoteDescriptionApplied))
            }
            Effect::AddCandidate(candidate) => {
                self.pc(peer_id)?.add_ice_candidate(candidate).await?;
                Ok(None)
            }
            Effect::FlushCandidates(candidates) => {
                let pc = self.pc(peer_id)?;
                apply_candidates(&pc, candidates).await;
                Ok(None)
            }
            Effect::HideRemote => {
                self.view.hide_remote(peer_id);
                let others_visible = self
                    .peers
                    .iter()
                    .any(|(id, l)| id != peer_id && l.state.has_connection());
                if !others_visible {
                    self.view.set_local_small(false);
                }
                Ok(None)
            }
            Effect::Close => {
                if let Some(pc) = self.link(peer_id)?.pc.take() {
                    pc.close().await?;
                }
                Ok(None)
            }
        }
    }

    /// Выход из комнаты: все соединения закрываются, затем leave и logout
    pub async fn leave(&mut self) -> Result<()> {
        if self.left {
            return Ok(());
        }
        self.left = true;
        self.close_peers().await;

        let left = self.signaling.leave().await;
        let logged_out = self.signaling.logout().await;
        tracing::info!(
            room = %self.session.room_id,
            duration_secs = self.session.elapsed_secs(),
            "Left the call"
        );
        left.and(logged_out)
    }

    async fn close_peers(&mut self) {
        for (peer_id, link) in self.peers.drain() {
            if let Some(pc) = link.pc {
                if let Err(e) = pc.close().await {
                    tracing::warn!(peer = %peer_id, error = %e, "Failed to close peer connection");
                }
            }
            self.view.hide_remote(&peer_id);
        }
        self.view.set_local_small(false);
    }

    async fn ensure_local_stream(&mut self) -> Result<Arc<LocalStream>> {
        if let Some(stream) = &self.local_stream {
            return Ok(stream.clone());
        }
        let stream =
            Arc::new(acquire_local_stream(self.devices.as_ref(), &self.config.media).await?);
        self.view.attach_local(&stream);
        self.local_stream = Some(stream.clone());
        Ok(stream)
    }

    fn require_stream(&self, kind: TrackKind) -> Result<Arc<LocalStream>> {
        self.local_stream
            .clone()
            .ok_or(CallError::DeviceNotFound(kind))
    }

    async fn send(&self, peer_id: &str, message: SignalingMessage) -> Result<()> {
        let text = message.to_text()?;
        self.signaling.send_to_peer(text, peer_id).await
    }

    fn link(&mut self, peer_id: &str) -> Result<&mut PeerLink> {
        self.peers
            .get_mut(peer_id)
            .ok_or_else(|| CallError::NoPeerConnection(peer_id.to_string()))
    }

    fn pc(&self, peer_id: &str) -> Result<Arc<RTCPeerConnection>> {
        self.peers
            .get(peer_id)
            .and_then(|l| l.pc.clone())
            .ok_or_else(|| CallError::NoPeerConnection(peer_id.to_string()))
    }

    /// Ссылка на участника, если событие пришло от его текущего соединения
    fn current_link(&mut self, peer_id: &str, connection_id: &str) -> Option<&mut PeerLink> {
        self.peers
            .get_mut(peer_id)
            .filter(|l| l.connection_id == connection_id && l.pc.is_some())
    }
}
