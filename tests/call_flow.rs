use futures::{SinkExt, StreamExt};
use roomcall_lib::call::{CallInput, CallSession};
use roomcall_lib::config::CallConfig;
use roomcall_lib::error::CallError;
use roomcall_lib::media::SyntheticDevices;
use roomcall_lib::peer::NegotiationState;
use roomcall_lib::session::Session;
use roomcall_lib::signaling::protocol::ServerFrame;
use roomcall_lib::signaling::{ChannelEvent, MemoryHub, SignalingClient, WsSignalingClient};
use roomcall_lib::ui::{HeadlessView, CAMERA_BUTTON, COLOR_TRACK_OFF, COLOR_TRACK_ON};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const HOST_CANDIDATE: &str = r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 2122260223 10.0.0.7 50000 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;

fn offline_config() -> CallConfig {
    CallConfig {
        ice_servers: vec![],
        ..Default::default()
    }
}

async fn join(hub: &MemoryHub, room: &str) -> (CallSession, Arc<HeadlessView>) {
    let view = Arc::new(HeadlessView::new());
    let mut call = CallSession::new(
        Session::new(room),
        offline_config(),
        Arc::new(hub.client()),
        Arc::new(SyntheticDevices::default()),
        view.clone(),
    )
    .unwrap();
    call.start().await.unwrap();
    (call, view)
}

/// Разбирает очередь звонка, пока условие не выполнится
async fn pump_until<F>(call: &mut CallSession, cond: F)
where
    F: Fn(&CallSession) -> bool,
{
    timeout(Duration::from_secs(15), async {
        while !cond(&*call) {
            let input = call.next_input().await.expect("input queue closed");
            if let Err(e) = call.dispatch(input).await {
                eprintln!("dispatch error: {e}");
            }
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Разбирает обе очереди вперемешку, как два браузера в одной комнате
async fn pump_both<F>(a: &mut CallSession, b: &mut CallSession, cond: F)
where
    F: Fn(&CallSession, &CallSession) -> bool,
{
    timeout(Duration::from_secs(15), async {
        while !cond(&*a, &*b) {
            tokio::select! {
                Some(input) = a.next_input() => {
                    if let Err(e) = a.dispatch(input).await {
                        eprintln!("dispatch error (a): {e}");
                    }
                }
                Some(input) = b.next_input() => {
                    if let Err(e) = b.dispatch(input).await {
                        eprintln!("dispatch error (b): {e}");
                    }
                }
            }
        }
    })
    .await
    .expect("condition not reached in time");
}

fn peer_message(from: &str, text: &str) -> CallInput {
    CallInput::Channel(ChannelEvent::MessageFromPeer {
        text: text.into(),
        member_id: from.into(),
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_members_negotiate_and_one_leaves() {
    let hub = MemoryHub::new();
    let (mut a, a_view) = join(&hub, "X").await;
    let (mut b, b_view) = join(&hub, "X").await;
    let a_uid = a.session().uid.clone();
    let b_uid = b.session().uid.clone();

    // B вошёл вторым: A создаёт соединение и шлёт offer
    pump_until(&mut a, |c| c.peer_state(&b_uid) == Some(NegotiationState::OfferSent)).await;
    assert!(a_view.snapshot().remote_visible());
    assert!(a_view.snapshot().local_small);

    // B отвечает
    pump_until(&mut b, |c| c.remote_description_applied(&a_uid)).await;
    assert_eq!(b.peer_state(&a_uid), Some(NegotiationState::AnswerSent));
    assert!(b.has_remote_description(&a_uid).await);
    assert!(b_view.snapshot().remote_visible());

    // A применяет answer
    pump_until(&mut a, |c| c.remote_description_applied(&b_uid)).await;
    assert!(a.has_remote_description(&b_uid).await);

    // обмен кандидатами до Connected на обеих сторонах
    pump_both(&mut a, &mut b, |a, b| {
        a.peer_state(&b_uid) == Some(NegotiationState::Connected)
            && b.peer_state(&a_uid) == Some(NegotiationState::Connected)
    })
    .await;

    // повторный answer, даже битый, ничего не делает
    let dup = r#"{"type":"answer","answer":{"type":"answer","sdp":"not an sdp"}}"#;
    a.dispatch(peer_message(&b_uid, dup)).await.unwrap();
    assert!(a.has_remote_description(&b_uid).await);

    // B уходит: у A прячется удалённое видео и локальное возвращается в полный кадр
    b.leave().await.unwrap();
    pump_until(&mut a, |c| c.peer_state(&b_uid).is_none()).await;
    let snap = a_view.snapshot();
    assert!(!snap.remote_visible());
    assert!(!snap.local_small);
    assert_eq!(hub.channel_members("X"), vec![a_uid]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn garbled_answer_does_not_block_the_real_one() {
    let hub = MemoryHub::new();
    let (mut a, _a_view) = join(&hub, "G").await;
    let (mut b, _b_view) = join(&hub, "G").await;
    let a_uid = a.session().uid.clone();
    let b_uid = b.session().uid.clone();

    pump_until(&mut a, |c| c.peer_state(&b_uid) == Some(NegotiationState::OfferSent)).await;
    let garbled = r#"{"type":"answer","answer":{"type":"answer","sdp":"garbage"}}"#;
    assert!(a.dispatch(peer_message(&b_uid, garbled)).await.is_err());
    assert!(!a.remote_description_applied(&b_uid));
    assert!(!a.has_remote_description(&b_uid).await);

    pump_until(&mut b, |c| c.remote_description_applied(&a_uid)).await;
    pump_until(&mut a, |c| c.remote_description_applied(&b_uid)).await;
    assert!(a.has_remote_description(&b_uid).await);
}

#[tokio::test]
async fn candidate_before_connection_is_not_an_error() {
    let hub = MemoryHub::new();
    let (mut c, _view) = join(&hub, "Y").await;

    c.dispatch(peer_message("early", HOST_CANDIDATE)).await.unwrap();
    assert_eq!(c.peer_state("early"), Some(NegotiationState::Idle));
    assert!(!c.has_remote_description("early").await);

    // участник ушёл, не прислав offer: буфер пропадает вместе с ним
    c.dispatch(CallInput::Channel(ChannelEvent::MemberLeft("early".into())))
        .await
        .unwrap();
    assert!(c.peer_ids().is_empty());
}

#[tokio::test]
async fn members_of_other_rooms_cannot_reach_the_call() {
    let hub = MemoryHub::new();
    let (c, _view) = join(&hub, "Y").await;
    let stranger = hub.client();
    let _rx = stranger.login("app", "stranger", None).await.unwrap();
    stranger.join_channel("elsewhere").await.unwrap();

    assert!(matches!(
        stranger
            .send_to_peer(HOST_CANDIDATE.into(), &c.session().uid)
            .await,
        Err(CallError::PeerUnreachable(_))
    ));
    assert!(c.peer_ids().is_empty());
}

#[tokio::test]
async fn call_ends_when_signaling_goes_away() {
    // relay подтверждает login и join, затем закрывает сокет
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let ok = serde_json::to_string(&ServerFrame::Ok).unwrap();
        for _ in 0..2 {
            ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(ok.clone())).await.unwrap();
        }
        ws.close(None).await.unwrap();
    });

    let signaling = Arc::new(WsSignalingClient::connect(&url).await.unwrap());
    let mut call = CallSession::new(
        Session::new("X"),
        offline_config(),
        signaling,
        Arc::new(SyntheticDevices::default()),
        Arc::new(HeadlessView::new()),
    )
    .unwrap();
    call.start().await.unwrap();

    let result = timeout(Duration::from_secs(5), call.run())
        .await
        .expect("call loop kept running after signaling closed");
    assert!(matches!(result, Err(CallError::ChannelClosed)));
}

#[tokio::test]
async fn malformed_payload_is_reported() {
    let hub = MemoryHub::new();
    let (mut c, _view) = join(&hub, "Z").await;
    assert!(c.dispatch(peer_message("p", "{oops")).await.is_err());
}

#[tokio::test]
async fn camera_toggle_through_handle() {
    let hub = MemoryHub::new();
    let (mut c, view) = join(&hub, "T").await;
    let handle = c.handle();

    handle.toggle_camera().unwrap();
    let v = view.clone();
    pump_until(&mut c, move |_| {
        v.snapshot().button_color(CAMERA_BUTTON) == Some(COLOR_TRACK_OFF)
    })
    .await;

    handle.toggle_camera().unwrap();
    let v = view.clone();
    pump_until(&mut c, move |_| {
        v.snapshot().button_color(CAMERA_BUTTON) == Some(COLOR_TRACK_ON)
    })
    .await;

    let stream = c.local_stream().unwrap();
    assert!(stream.tracks().iter().all(|t| t.enabled()));
}
