use crate::error::Result;
use crate::peer::types::{CandidateSummary, IceServerKind, ServerConfig};
use crate::utils::add_ice_url_scheme;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::{
    api::APIBuilder,
    ice_transport::{ice_gatherer_state::RTCIceGathererState, ice_server::RTCIceServer},
    peer_connection::{configuration::RTCConfiguration, RTCPeerConnection},
};

/// Сколько ждём подходящего кандидата при проверке сервера
pub const ICE_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// ICE серверы из конфигурации
pub fn rtc_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

/// Применяет отложенные кандидаты после установки remote description
pub async fn apply_candidates(pc: &RTCPeerConnection, candidates: Vec<RTCIceCandidateInit>) {
    for candidate in candidates {
        tracing::debug!(candidate = %candidate.candidate, "Applying pending candidate");
        if let Err(e) = pc.add_ice_candidate(candidate).await {
            tracing::warn!(error = %e, "Failed to apply pending candidate");
        }
    }
}

pub fn analyze_candidates(candidates: &[RTCIceCandidateInit]) -> CandidateSummary {
    let mut summary = CandidateSummary::default();
    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            summary.host += 1;
        } else if candidate.candidate.contains("typ srflx") {
            summary.srflx += 1;
        } else if candidate.candidate.contains("typ relay") {
            summary.relay += 1;
        }
    }

    tracing::info!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        summary.host,
        summary.srflx,
        summary.relay
    );
    if summary.relay == 0 {
        tracing::debug!("No TURN relay candidates found, connection through NAT may fail");
    }
    summary
}

/// Проверка STUN/TURN сервера: ждём srflx или relay кандидата от него
pub async fn check_ice_server_availability(config: &ServerConfig) -> Result<bool> {
    let rtc_config = RTCConfiguration {
        ice_servers: rtc_ice_servers(std::slice::from_ref(config)),
        ..Default::default()
    };
    tracing::info!(url = %add_ice_url_scheme(config), kind = %config.kind, "Checking ICE server");

    let api = APIBuilder::new().build();
    let pc = Arc::new(api.new_peer_connection(rtc_config).await?);
    let result = check_via_ice_gathering(&pc, config.kind).await;
    let _ = pc.close().await;
    result
}

async fn check_via_ice_gathering(pc: &Arc<RTCPeerConnection>, kind: IceServerKind) -> Result<bool> {
    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    pc.on_ice_gathering_state_change(Box::new(move |state| {
        let _ = state_tx.send(state);
        Box::pin(async {})
    }));

    let (found_tx, mut found_rx) = mpsc::unbounded_channel();
    let wanted = match kind {
        IceServerKind::Stun => "typ srflx",
        IceServerKind::Turn => "typ relay",
    };
    pc.on_ice_candidate(Box::new(move |candidate| {
        if let Some(init) = candidate.and_then(|c| c.to_json().ok()) {
            tracing::debug!(candidate = %init.candidate, "Probe candidate");
            if init.candidate.contains(wanted) {
                let _ = found_tx.send(());
            }
        }
        Box::pin(async {})
    }));

    // data channel нужен, чтобы offer запустил сбор кандидатов
    pc.create_data_channel("probe", None).await?;
    let offer = pc.create_offer(None).await?;
    pc.set_local_description(offer).await?;

    let gathering_done = async {
        while let Some(state) = state_rx.recv().await {
            if state == RTCIceGathererState::Complete {
                break;
            }
        }
    };

    let found = tokio::select! {
        res = timeout(ICE_CHECK_TIMEOUT, found_rx.recv()) => matches!(res, Ok(Some(()))),
        _ = gathering_done => false,
    };
    // кандидат мог прийти вместе с окончанием сбора
    let found = found || found_rx.try_recv().is_ok();
    tracing::info!(available = found, "ICE server check finished");
    Ok(found)
}
