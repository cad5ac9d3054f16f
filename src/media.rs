//! Захват локальных медиа и потоки для звонка.
//!
//! Устройства спрятаны за [`MediaDevices`]; встроенная реализация
//! [`SyntheticDevices`] проверяет ограничения и отдаёт треки, в которые
//! приложение само пишет сэмплы.

use crate::error::{CallError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Диапазон значения ограничения (min / ideal / max)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub min: u32,
    pub ideal: u32,
    pub max: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: Range,
    pub height: Range,
    /// Предпочтение, а не требование
    pub facing_mode: FacingMode,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: VideoConstraints,
    pub audio: AudioConstraints,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: VideoConstraints {
                width: Range {
                    min: 640,
                    ideal: 1920,
                    max: 1920,
                },
                height: Range {
                    min: 480,
                    ideal: 1080,
                    max: 1080,
                },
                facing_mode: FacingMode::User,
            },
            audio: AudioConstraints {
                echo_cancellation: true,
                noise_suppression: true,
            },
        }
    }
}

/// Итоговые параметры видео после применения ограничений
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
}

/// Локальный трек с флагом enabled, как у MediaStreamTrack
pub struct LocalTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    track: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, stream_id: &str) -> Self {
        let codec = match kind {
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
        };
        let track = Arc::new(TrackLocalStaticSample::new(
            codec,
            kind.to_string(),
            stream_id.to_owned(),
        ));
        Self {
            kind,
            enabled: AtomicBool::new(true),
            track,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Трек для `RTCPeerConnection::add_track`
    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.track.clone()
    }

    /// Пишет сэмпл во все привязанные соединения. Выключенный трек сэмплы отбрасывает.
    pub async fn write_sample(&self, sample: &Sample) -> Result<bool> {
        if !self.enabled() {
            return Ok(false);
        }
        self.track.write_sample(sample).await?;
        Ok(true)
    }

    pub async fn write_frame(&self, data: Bytes, duration: Duration) -> Result<bool> {
        self.write_sample(&Sample {
            data,
            duration,
            ..Default::default()
        })
        .await
    }
}

pub struct LocalStream {
    id: String,
    tracks: Vec<Arc<LocalTrack>>,
    settings: Option<VideoSettings>,
}

impl LocalStream {
    pub fn new(id: impl Into<String>, kinds: &[TrackKind], settings: Option<VideoSettings>) -> Self {
        let id = id.into();
        let tracks = kinds
            .iter()
            .map(|k| Arc::new(LocalTrack::new(*k, &id)))
            .collect();
        Self {
            id,
            tracks,
            settings,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.tracks
    }

    pub fn track(&self, kind: TrackKind) -> Option<Arc<LocalTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind).cloned()
    }

    pub fn settings(&self) -> Option<VideoSettings> {
        self.settings
    }
}

/// Удалённый поток: копит треки, пришедшие через `on_track`
#[derive(Default)]
pub struct RemoteStream {
    tracks: Mutex<Vec<Arc<TrackRemote>>>,
}

impl RemoteStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_track(&self, track: Arc<TrackRemote>) {
        self.tracks.lock().push(track);
    }

    pub fn track_count(&self) -> usize {
        self.tracks.lock().len()
    }
}

/// Аналог `navigator.mediaDevices`
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<LocalStream>;
}

/// Что умеет камера
#[derive(Debug, Clone, Copy)]
pub struct CameraCapabilities {
    pub max_width: u32,
    pub max_height: u32,
    pub facing_mode: FacingMode,
}

/// Устройства без реального захвата: треки создаются, сэмплы пишет вызывающий код
#[derive(Debug, Clone)]
pub struct SyntheticDevices {
    pub camera: Option<CameraCapabilities>,
    pub microphone: bool,
    pub permission_granted: bool,
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self {
            camera: Some(CameraCapabilities {
                max_width: 1920,
                max_height: 1080,
                facing_mode: FacingMode::User,
            }),
            microphone: true,
            permission_granted: true,
        }
    }
}

fn fit(range: &Range, capability: u32, name: &str) -> Result<u32> {
    if capability < range.min {
        return Err(CallError::Overconstrained(name.into()));
    }
    Ok(range.ideal.min(range.max).min(capability))
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<LocalStream> {
        if !self.permission_granted {
            return Err(CallError::PermissionDenied);
        }
        let camera = self.camera.ok_or(CallError::DeviceNotFound(TrackKind::Video))?;
        if !self.microphone {
            return Err(CallError::DeviceNotFound(TrackKind::Audio));
        }

        let settings = VideoSettings {
            width: fit(&constraints.video.width, camera.max_width, "width")?,
            height: fit(&constraints.video.height, camera.max_height, "height")?,
            facing_mode: camera.facing_mode,
        };
        if settings.facing_mode != constraints.video.facing_mode {
            tracing::debug!(
                wanted = ?constraints.video.facing_mode,
                got = ?settings.facing_mode,
                "Facing mode preference not met"
            );
        }

        Ok(LocalStream::new(
            crate::utils::random_id(),
            &[TrackKind::Audio, TrackKind::Video],
            Some(settings),
        ))
    }
}

/// Запрос локального потока, без запасного набора ограничений
pub async fn acquire_local_stream(
    devices: &dyn MediaDevices,
    constraints: &MediaConstraints,
) -> Result<LocalStream> {
    match devices.get_user_media(constraints).await {
        Ok(stream) => {
            tracing::info!(
                stream = stream.id(),
                settings = ?stream.settings(),
                "Local stream acquired"
            );
            Ok(stream)
        }
        Err(e) => {
            tracing::error!(error = %e, "getUserMedia failed");
            Err(e)
        }
    }
}
