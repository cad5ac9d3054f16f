use std::collections::VecDeque;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Сколько удалённых кандидатов держим до установки remote description
pub const MAX_PENDING_CANDIDATES: usize = 64;

/// Состояние согласования с одним участником
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    ConnectionCreated,
    OfferSent,
    AnswerSent,
    Connected,
    Closed,
}

/// Входы автомата
#[derive(Debug, Clone)]
pub enum Input {
    MemberJoined,
    MemberLeft,
    Offer(RTCSessionDescription),
    Answer(RTCSessionDescription),
    Candidate(RTCIceCandidateInit),
    ConnectionState(RTCPeerConnectionState),
    /// Драйвер успешно выполнил `set_remote_description`
    RemoteDescriptionApplied,
}

/// Действия, которые должен выполнить драйвер звонка, строго по порядку
#[derive(Debug, Clone)]
pub enum Effect {
    /// Новое соединение; старое, если было, закрывается
    CreateConnection,
    ShowRemote,
    SendOffer,
    /// remote description = offer; при успехе драйвер сообщает `RemoteDescriptionApplied`
    AcceptOffer(RTCSessionDescription),
    SendAnswer,
    /// remote description = answer; при успехе драйвер сообщает `RemoteDescriptionApplied`
    ApplyAnswer(RTCSessionDescription),
    AddCandidate(RTCIceCandidateInit),
    FlushCandidates(Vec<RTCIceCandidateInit>),
    HideRemote,
    Close,
}

/// Автомат согласования без побочных эффектов
#[derive(Debug)]
pub struct PeerState {
    state: NegotiationState,
    has_connection: bool,
    remote_description_set: bool,
    pending: VecDeque<RTCIceCandidateInit>,
}

impl Default for PeerState {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerState {
    pub fn new() -> Self {
        Self {
            state: NegotiationState::Idle,
            has_connection: false,
            remote_description_set: false,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn has_connection(&self) -> bool {
        self.has_connection
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    fn new_connection(&mut self) {
        self.has_connection = true;
        self.remote_description_set = false;
        self.state = NegotiationState::ConnectionCreated;
    }

    pub fn step(&mut self, input: Input) -> Vec<Effect> {
        let mut effects = Vec::new();
        match input {
            Input::MemberJoined => {
                self.new_connection();
                effects.extend([Effect::CreateConnection, Effect::ShowRemote, Effect::SendOffer]);
                self.state = NegotiationState::OfferSent;
            }

            // Перезаписываем любое прежнее соединение с этим участником
            Input::Offer(offer) => {
                self.new_connection();
                effects.extend([
                    Effect::CreateConnection,
                    Effect::ShowRemote,
                    Effect::AcceptOffer(offer),
                ]);
            }

            // Пока remote description не установлен, answer применяется;
            // после этого повторные молча отбрасываем
            Input::Answer(answer) => {
                if self.has_connection && !self.remote_description_set {
                    effects.push(Effect::ApplyAnswer(answer));
                }
            }

            // Флаг и буфер кандидатов меняются только после успешного применения
            Input::RemoteDescriptionApplied => {
                if self.has_connection && !self.remote_description_set {
                    self.remote_description_set = true;
                    if !self.pending.is_empty() {
                        effects.push(Effect::FlushCandidates(self.pending.drain(..).collect()));
                    }
                    if self.state == NegotiationState::ConnectionCreated {
                        effects.push(Effect::SendAnswer);
                        self.state = NegotiationState::AnswerSent;
                    }
                }
            }

            Input::Candidate(candidate) => {
                if self.has_connection && self.remote_description_set {
                    effects.push(Effect::AddCandidate(candidate));
                } else {
                    if self.pending.len() == MAX_PENDING_CANDIDATES {
                        self.pending.pop_front();
                    }
                    self.pending.push_back(candidate);
                }
            }

            Input::ConnectionState(RTCPeerConnectionState::Connected) => {
                if self.has_connection {
                    self.state = NegotiationState::Connected;
                }
            }

            Input::ConnectionState(
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed,
            ) => {
                if self.has_connection {
                    self.state = NegotiationState::Closed;
                }
            }

            Input::ConnectionState(_) => {}

            Input::MemberLeft => {
                effects.push(Effect::HideRemote);
                if self.has_connection {
                    effects.push(Effect::Close);
                }
                self.has_connection = false;
                self.remote_description_set = false;
                self.pending.clear();
                self.state = NegotiationState::Closed;
            }
        }
        effects
    }
}
