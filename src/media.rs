use crate::error::{CaptureError, Result};
use crate::peer::types::{LocalTrack, TrackKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Платформенное устройство захвата
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn acquire(&self, kind: TrackKind) -> Result<LocalTrack, CaptureError>;
    fn release(&self, track: &LocalTrack);
}

/// Устройство без реального захвата: выдаёт пустые треки
#[derive(Debug, Default)]
pub struct SyntheticCapture;

#[async_trait]
impl CaptureDevice for SyntheticCapture {
    async fn acquire(&self, kind: TrackKind) -> Result<LocalTrack, CaptureError> {
        Ok(LocalTrack::silent(kind, "local"))
    }

    fn release(&self, track: &LocalTrack) {
        log::debug!("synthetic {} track {} released", track.kind, track.id);
    }
}

/// Локальные медиа сессии. Трек есть тогда и только тогда, когда вид включён
#[derive(Debug, Default)]
pub struct MediaState {
    camera: Option<LocalTrack>,
    mic: Option<LocalTrack>,
    remote_audio_muted: bool,
}

impl MediaState {
    pub fn camera_enabled(&self) -> bool {
        self.camera.is_some()
    }

    pub fn mic_enabled(&self) -> bool {
        self.mic.is_some()
    }

    pub fn any_enabled(&self) -> bool {
        self.camera_enabled() || self.mic_enabled()
    }

    pub fn remote_audio_muted(&self) -> bool {
        self.remote_audio_muted
    }

    pub fn track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        match kind {
            TrackKind::Audio => self.mic.as_ref(),
            TrackKind::Video => self.camera.as_ref(),
        }
    }

    /// Все живые треки: сначала аудио, потом видео
    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.mic.iter().chain(self.camera.iter()).cloned().collect()
    }

    fn slot(&mut self, kind: TrackKind) -> &mut Option<LocalTrack> {
        match kind {
            TrackKind::Audio => &mut self.mic,
            TrackKind::Video => &mut self.camera,
        }
    }
}

/// Изменение набора локальных треков, которое нужно отразить в соединении
#[derive(Debug, Clone)]
pub enum TrackChange {
    Added(LocalTrack),
    Removed(LocalTrack),
}

pub struct MediaController {
    device: Arc<dyn CaptureDevice>,
    state: MediaState,
}

impl MediaController {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            state: MediaState::default(),
        }
    }

    pub fn state(&self) -> &MediaState {
        &self.state
    }

    /// Включает вид. Повторное включение ничего не меняет.
    ///
    /// При ошибке устройства состояние остаётся прежним.
    pub async fn enable(&mut self, kind: TrackKind) -> Result<Option<TrackChange>> {
        if self.state.track(kind).is_some() {
            log::debug!("{kind} already enabled");
            return Ok(None);
        }
        let track = match self.device.acquire(kind).await {
            Ok(track) => track,
            Err(e) => {
                log::warn!("{kind} capture failed: {e}");
                return Err(e.into());
            }
        };
        log::info!("{kind} enabled, track {}", track.id);
        *self.state.slot(kind) = Some(track.clone());
        Ok(Some(TrackChange::Added(track)))
    }

    pub fn disable(&mut self, kind: TrackKind) -> Option<TrackChange> {
        let track = self.state.slot(kind).take()?;
        self.device.release(&track);
        log::info!("{kind} disabled, track {} released", track.id);
        Some(TrackChange::Removed(track))
    }

    pub async fn enable_camera(&mut self) -> Result<Option<TrackChange>> {
        self.enable(TrackKind::Video).await
    }

    pub fn disable_camera(&mut self) -> Option<TrackChange> {
        self.disable(TrackKind::Video)
    }

    pub async fn enable_mic(&mut self) -> Result<Option<TrackChange>> {
        self.enable(TrackKind::Audio).await
    }

    pub fn disable_mic(&mut self) -> Option<TrackChange> {
        self.disable(TrackKind::Audio)
    }

    /// Только локальное выключение звука удалённого потока, на провод не влияет
    pub fn toggle_remote_audio_playback(&mut self) -> bool {
        self.state.remote_audio_muted = !self.state.remote_audio_muted;
        self.state.remote_audio_muted
    }

    /// Освобождает все треки
    pub fn stop_all(&mut self) {
        self.disable(TrackKind::Audio);
        self.disable(TrackKind::Video);
    }
}
