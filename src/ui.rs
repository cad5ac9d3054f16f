//! Сторона страницы: видео-элементы и кнопки управления.

use crate::error::{CallError, Result};
use crate::media::{LocalStream, RemoteStream, TrackKind};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub const LOCAL_VIDEO: &str = "#user-1";
pub const REMOTE_VIDEO: &str = "#user-2";
pub const CAMERA_BUTTON: &str = "#camera-btn";
pub const MIC_BUTTON: &str = "#mic-btn";
pub const SMALL_FRAME_CLASS: &str = "smallFrame";

pub const COLOR_TRACK_OFF: &str = "rgb(255, 80, 80)";
pub const COLOR_TRACK_ON: &str = "rgba(179, 102, 249, .9)";

/// То, что страница умеет показать
pub trait CallView: Send + Sync {
    fn attach_local(&self, stream: &LocalStream);
    fn show_remote(&self, peer_id: &str, stream: &Arc<RemoteStream>);
    fn hide_remote(&self, peer_id: &str);
    /// Класс `smallFrame` на локальном видео
    fn set_local_small(&self, small: bool);
    fn set_button_color(&self, button: &str, color: &str);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub local_stream: Option<String>,
    pub visible_remotes: BTreeSet<String>,
    pub local_small: bool,
    pub button_colors: HashMap<String, String>,
}

impl ViewState {
    pub fn remote_visible(&self) -> bool {
        !self.visible_remotes.is_empty()
    }

    pub fn button_color(&self, button: &str) -> Option<&str> {
        self.button_colors.get(button).map(String::as_str)
    }
}

/// Вид без окна: хранит состояние элементов и пишет его в лог
#[derive(Default)]
pub struct HeadlessView {
    state: Mutex<ViewState>,
}

impl HeadlessView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ViewState {
        self.state.lock().clone()
    }
}

impl CallView for HeadlessView {
    fn attach_local(&self, stream: &LocalStream) {
        tracing::debug!(element = LOCAL_VIDEO, stream = stream.id(), "srcObject set");
        self.state.lock().local_stream = Some(stream.id().to_string());
    }

    fn show_remote(&self, peer_id: &str, stream: &Arc<RemoteStream>) {
        tracing::debug!(
            element = REMOTE_VIDEO,
            peer = peer_id,
            tracks = stream.track_count(),
            "display: block"
        );
        self.state.lock().visible_remotes.insert(peer_id.to_string());
    }

    fn hide_remote(&self, peer_id: &str) {
        tracing::debug!(element = REMOTE_VIDEO, peer = peer_id, "display: none");
        self.state.lock().visible_remotes.remove(peer_id);
    }

    fn set_local_small(&self, small: bool) {
        tracing::debug!(element = LOCAL_VIDEO, class = SMALL_FRAME_CLASS, small, "classList");
        self.state.lock().local_small = small;
    }

    fn set_button_color(&self, button: &str, color: &str) {
        tracing::debug!(element = button, color, "backgroundColor");
        self.state
            .lock()
            .button_colors
            .insert(button.to_string(), color.to_string());
    }
}

/// Инвертирует enabled у трека и красит кнопку. Возвращает новое значение.
fn toggle_track(
    stream: &LocalStream,
    view: &dyn CallView,
    kind: TrackKind,
    button: &str,
) -> Result<bool> {
    let track = stream.track(kind).ok_or(CallError::DeviceNotFound(kind))?;
    let enabled = !track.enabled();
    track.set_enabled(enabled);
    view.set_button_color(
        button,
        if enabled {
            COLOR_TRACK_ON
        } else {
            COLOR_TRACK_OFF
        },
    );
    tracing::info!(%kind, enabled, "Local track toggled");
    Ok(enabled)
}

pub fn toggle_camera(stream: &LocalStream, view: &dyn CallView) -> Result<bool> {
    toggle_track(stream, view, TrackKind::Video, CAMERA_BUTTON)
}

pub fn toggle_mic(stream: &LocalStream, view: &dyn CallView) -> Result<bool> {
    toggle_track(stream, view, TrackKind::Audio, MIC_BUTTON)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> LocalStream {
        LocalStream::new("local", &[TrackKind::Audio, TrackKind::Video], None)
    }

    #[test]
    fn camera_toggle_is_involutive() {
        let stream = stream();
        let view = HeadlessView::new();

        assert!(!toggle_camera(&stream, &view).unwrap());
        assert_eq!(view.snapshot().button_color(CAMERA_BUTTON), Some(COLOR_TRACK_OFF));
        assert!(!stream.track(TrackKind::Video).unwrap().enabled());

        assert!(toggle_camera(&stream, &view).unwrap());
        assert_eq!(view.snapshot().button_color(CAMERA_BUTTON), Some(COLOR_TRACK_ON));
        assert!(stream.track(TrackKind::Video).unwrap().enabled());
        // микрофон не трогали
        assert!(stream.track(TrackKind::Audio).unwrap().enabled());
    }

    #[test]
    fn mic_toggle_uses_mic_button() {
        let stream = stream();
        let view = HeadlessView::new();
        toggle_mic(&stream, &view).unwrap();
        let snap = view.snapshot();
        assert_eq!(snap.button_color(MIC_BUTTON), Some(COLOR_TRACK_OFF));
        assert_eq!(snap.button_color(CAMERA_BUTTON), None);
    }

    #[test]
    fn missing_track_is_an_error() {
        let audio_only = LocalStream::new("a", &[TrackKind::Audio], None);
        let view = HeadlessView::new();
        assert!(matches!(
            toggle_camera(&audio_only, &view),
            Err(CallError::DeviceNotFound(TrackKind::Video))
        ));
    }

    #[test]
    fn remote_visibility_tracks_peers() {
        let view = HeadlessView::new();
        let remote = Arc::new(RemoteStream::new());
        view.show_remote("b", &remote);
        view.set_local_small(true);
        assert!(view.snapshot().remote_visible());
        view.hide_remote("b");
        assert!(!view.snapshot().remote_visible());
    }
}
