use crate::call::CallInput;
use crate::error::Result;
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::media::{LocalStream, RemoteStream};
use crate::peer::ice::rtc_ice_servers;
use crate::peer::types::ServerConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::{
    configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
    RTCPeerConnection,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// API с кодеками по умолчанию и стандартными interceptor'ами (NACK, RTCP reports)
pub fn media_api() -> Result<API> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Создает конфигурацию для peer connection
pub fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: rtc_ice_servers(servers),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Куда соединение шлёт свои события: очередь звонка с пометкой участника
#[derive(Clone)]
pub struct PeerContext {
    pub peer_id: String,
    pub connection_id: String,
    pub inputs: mpsc::UnboundedSender<CallInput>,
}

/// Создаём соединение с участником: локальные треки, сбор удалённых, trickle ICE
pub async fn new_peer(
    api: &API,
    servers: &[ServerConfig],
    ctx: PeerContext,
    local: &LocalStream,
    remote: Arc<RemoteStream>,
) -> Result<Arc<RTCPeerConnection>> {
    let pc = Arc::new(api.new_peer_connection(rtc_config(servers)).await?);
    tracing::debug!(peer = %ctx.peer_id, connection = %ctx.connection_id, "Peer connection created");

    for track in local.tracks() {
        let sender = pc.add_track(track.rtc_track()).await?;
        // RTCP надо вычитывать, иначе interceptor'ы не работают
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });
    }

    let track_ctx = ctx.clone();
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _tr: Arc<RTCRtpTransceiver>| {
            tracing::info!(peer = %track_ctx.peer_id, kind = %track.kind(), "Remote track added");
            remote.add_track(track);
            Box::pin(async {})
        },
    ));

    let cand_ctx = ctx.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        let input = match cand {
            Some(c) => {
                dump_candidate("LOCAL", &cand_ctx.peer_id, &c);
                match c.to_json() {
                    Ok(candidate) => Some(CallInput::LocalCandidate {
                        peer_id: cand_ctx.peer_id.clone(),
                        connection_id: cand_ctx.connection_id.clone(),
                        candidate,
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to serialize local candidate");
                        None
                    }
                }
            }
            // None означает конец сбора
            None => Some(CallInput::GatheringComplete {
                peer_id: cand_ctx.peer_id.clone(),
                connection_id: cand_ctx.connection_id.clone(),
            }),
        };
        if let Some(input) = input {
            let _ = cand_ctx.inputs.send(input);
        }
        Box::pin(async {})
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        tracing::debug!("ICE gathering state changed to: {:?}", state);
        Box::pin(async {})
    }));

    let weak_pc = Arc::downgrade(&pc);
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        tracing::info!(peer = %ctx.peer_id, "Peer connection state changed to: {:?}", state);
        if matches!(
            state,
            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed
        ) {
            if let Some(pc) = weak_pc.upgrade() {
                tokio::spawn(async move {
                    dump_selected_pair(&pc, "BEFORE-FAIL").await;
                });
            }
        }
        let _ = ctx.inputs.send(CallInput::PeerConnectionState {
            peer_id: ctx.peer_id.clone(),
            connection_id: ctx.connection_id.clone(),
            state,
        });
        Box::pin(async {})
    }));

    Ok(pc)
}
