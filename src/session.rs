//! Сессия одного посещения комнаты.
//!
//! Все события (транспорт, колбэки соединения, команды UI) проходят через
//! один канал и обрабатываются строго по очереди, поэтому состояние не
//! требует блокировок. Сессия владеет единственным [`Negotiator`], медиа и
//! каналами синхронизации.

use crate::config::RoomConfig;
use crate::error::{Result, RoomError};
use crate::hub::{HubEvent, HubSender};
use crate::media::{CaptureDevice, MediaController, MediaState, TrackChange};
use crate::membership::Membership;
use crate::peer::connection::{ConnectionEvent, ConnectionFactory, PeerConnectionState};
use crate::peer::negotiator::Negotiator;
use crate::peer::state::{LinkId, NegotiationState};
use crate::peer::types::{IceCandidate, RemoteTrack, TrackKind};
use crate::relay::RoomRelay;
use crate::signaling::{ClientMessage, HubMessage};
use crate::timer::ScopedTimer;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum SessionEvent {
    Hub(HubEvent),
    Connection { link: LinkId, event: ConnectionEvent },
    /// Истёк период ожидания восстановления соединения
    GraceExpired { link: LinkId },
    Command(SessionCommand),
}

#[derive(Debug)]
pub enum SessionCommand {
    SetMedia {
        kind: TrackKind,
        enabled: bool,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    ToggleRemoteAudio,
    EditCode(String),
    SwitchLanguage(String),
    EditWhiteboard(String),
    Leave,
}

/// События для UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    PeersChanged(Vec<String>),
    RemoteTrack(RemoteTrack),
    RemoteAudioMuted(bool),
    CodeChanged(String),
    LanguageChanged { language: String, code: String },
    WhiteboardChanged(String),
    Connected,
    ConnectionProblem,
    ConnectionRecovering,
    ConnectionRecovered,
    ConnectionFailed,
    Disconnected,
    Left,
}

pub struct SessionChannels {
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub notices: mpsc::UnboundedReceiver<SessionNotice>,
}

pub struct Session {
    room_id: String,
    hub: HubSender,
    events: mpsc::UnboundedSender<SessionEvent>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    membership: Membership,
    negotiator: Negotiator,
    media: MediaController,
    relay: RoomRelay,
    grace: ScopedTimer,
    left: bool,
}

impl Session {
    pub fn new(
        config: &RoomConfig,
        hub: HubSender,
        factory: Arc<dyn ConnectionFactory>,
        device: Arc<dyn CaptureDevice>,
    ) -> (Self, SessionChannels) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let session = Self {
            room_id: config.room_id.clone(),
            negotiator: Negotiator::new(factory, hub.clone(), events_tx.clone()),
            relay: RoomRelay::new(
                config.room_id.clone(),
                hub.clone(),
                config.whiteboard_debounce(),
            ),
            hub,
            events: events_tx,
            notices: notices_tx,
            membership: Membership::new(),
            media: MediaController::new(device),
            grace: ScopedTimer::new(config.grace_period()),
            left: false,
        };
        let channels = SessionChannels {
            events: events_rx,
            notices: notices_rx,
        };
        (session, channels)
    }

    pub fn event_sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events.clone()
    }

    pub fn session_handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.events.clone(),
        }
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        self.negotiator.state()
    }

    pub fn media(&self) -> &MediaState {
        self.media.state()
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn relay(&self) -> &RoomRelay {
        &self.relay
    }

    pub fn has_left(&self) -> bool {
        self.left
    }

    /// Цикл обработки до выхода из комнаты
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
            if self.left {
                break;
            }
        }
        if !self.left {
            self.leave().await;
        }
        log::info!("session loop for room {} finished", self.room_id);
    }

    pub async fn handle(&mut self, event: SessionEvent) {
        if self.left {
            log::debug!("session already left, event ignored: {event:?}");
            return;
        }
        match event {
            SessionEvent::Hub(ev) => self.on_hub(ev).await,
            SessionEvent::Connection { link, event } => self.on_connection(link, event).await,
            SessionEvent::GraceExpired { link } => self.on_grace_expired(link).await,
            SessionEvent::Command(cmd) => self.on_command(cmd).await,
        }
    }

    fn notify(&self, notice: SessionNotice) {
        if self.notices.send(notice).is_err() {
            log::debug!("notice receiver dropped");
        }
    }

    fn notify_peers(&self) {
        self.notify(SessionNotice::PeersChanged(self.membership.peers().to_vec()));
    }

    async fn on_hub(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected { identity } => self.on_identity(identity).await,
            HubEvent::Disconnected => {
                log::warn!("hub disconnected, peer set unknown");
                self.membership.mark_unknown();
                self.notify_peers();
            }
            HubEvent::Message(msg) => self.on_message(msg).await,
        }
    }

    async fn on_identity(&mut self, identity: String) {
        if let Some(previous) = self.membership.set_self_id(identity.clone()) {
            log::info!("reconnected as {identity} (was {previous}), rejoining room");
            if self.negotiator.has_link() {
                self.teardown_link().await;
            }
            let dropped = self.negotiator.discard_pending_candidates();
            if dropped > 0 {
                log::debug!("dropped {dropped} candidates queued before reconnect");
            }
            self.membership.mark_unknown();
            self.notify_peers();
        } else {
            log::info!("connected as {identity}, joining room {}", self.room_id);
        }
        self.hub.send(ClientMessage::JoinRoom {
            room_id: self.room_id.clone(),
        });
    }

    async fn on_message(&mut self, msg: HubMessage) {
        match msg {
            HubMessage::Welcome { connection_id } => self.on_identity(connection_id).await,
            HubMessage::ExistingPeers { peers } => {
                self.membership.apply_snapshot(peers);
                log::info!("room snapshot: {:?}", self.membership.peers());
                self.notify_peers();
            }
            HubMessage::UserJoined { connection_id } => {
                if !self.membership.join(&connection_id) {
                    return;
                }
                log::info!("{connection_id} joined");
                self.notify_peers();
                if !self.negotiator.has_link() && self.media.state().any_enabled() {
                    self.call(&connection_id).await;
                }
            }
            HubMessage::UserLeft { connection_id } => {
                if self.membership.leave(&connection_id) {
                    log::info!("{connection_id} left");
                    self.notify_peers();
                }
                if self.negotiator.remote_id() == Some(connection_id.as_str()) {
                    self.teardown_link().await;
                }
            }
            HubMessage::ReceiveOffer { from_id, sdp } => {
                let tracks = self.media.state().tracks();
                if let Err(e) = self.negotiator.receive_offer(&from_id, sdp, &tracks).await {
                    log::warn!("offer from {from_id} not processed: {e}");
                }
            }
            HubMessage::ReceiveAnswer { from_id, sdp } => {
                if let Err(e) = self.negotiator.receive_answer(&from_id, sdp).await {
                    log::warn!("answer from {from_id} not processed: {e}");
                }
            }
            HubMessage::ReceiveIceCandidate { from_id, candidate } => {
                let candidate = match IceCandidate::from_json(&candidate) {
                    Ok(c) => c,
                    Err(e) => {
                        log::warn!("malformed candidate from {from_id}: {e}");
                        return;
                    }
                };
                if let Err(e) = self
                    .negotiator
                    .receive_ice_candidate(&from_id, candidate)
                    .await
                {
                    log::warn!("Failed to add ICE candidate from {from_id}: {e}");
                }
            }
            HubMessage::ReceiveCode { code } => {
                if self.relay.receive_code(code.clone()) {
                    self.notify(SessionNotice::CodeChanged(code));
                }
            }
            HubMessage::ReceiveLanguage {
                language,
                starter_code,
            } => {
                if self
                    .relay
                    .receive_language(language.clone(), starter_code.clone())
                {
                    self.notify(SessionNotice::LanguageChanged {
                        language,
                        code: starter_code,
                    });
                }
            }
            HubMessage::ReceiveWhiteboardText { text } => {
                if self.relay.receive_whiteboard(text.clone()) {
                    self.notify(SessionNotice::WhiteboardChanged(text));
                }
            }
        }
    }

    async fn call(&mut self, peer_id: &str) {
        let tracks = self.media.state().tracks();
        log::info!("calling {peer_id} with {} local tracks", tracks.len());
        if let Err(e) = self.negotiator.create_offer(peer_id, &tracks).await {
            log::warn!("call to {peer_id} failed: {e}");
        }
    }

    async fn on_connection(&mut self, link: LinkId, event: ConnectionEvent) {
        if !self.negotiator.is_current(link) {
            log::debug!("stale event from link {link} ignored");
            return;
        }
        match event {
            ConnectionEvent::LocalCandidate(candidate) => {
                if let Err(e) = self.negotiator.forward_local_candidate(link, &candidate) {
                    log::warn!("failed to forward local candidate: {e}");
                }
            }
            ConnectionEvent::RemoteTrack(track) => {
                log::info!("remote {} track {} available", track.kind, track.track_id);
                self.notify(SessionNotice::RemoteTrack(track));
            }
            ConnectionEvent::StateChanged(state) => self.on_connection_state(link, state).await,
        }
    }

    async fn on_connection_state(&mut self, link: LinkId, state: PeerConnectionState) {
        match state {
            PeerConnectionState::Connected => {
                log::info!("link {link} connected");
                self.negotiator.set_connected(link, true);
                if self.grace.cancel() {
                    self.notify(SessionNotice::ConnectionRecovered);
                }
                self.notify(SessionNotice::Connected);
            }
            PeerConnectionState::Disconnected | PeerConnectionState::Failed => {
                self.negotiator.set_connected(link, false);
                // уже ожидаем? – ничего не делаем
                if self.grace.is_armed() {
                    log::debug!("grace period already running for link {link}");
                    return;
                }
                log::warn!(
                    "link {link} {state:?}, waiting {} s for recovery",
                    self.grace.delay().as_secs()
                );
                self.notify(SessionNotice::ConnectionProblem);
                self.notify(SessionNotice::ConnectionRecovering);
                let events = self.events.clone();
                self.grace.arm(async move {
                    let _ = events.send(SessionEvent::GraceExpired { link });
                });
            }
            PeerConnectionState::Closed => {
                log::info!("link {link} closed by the connection");
                self.teardown_link().await;
            }
            PeerConnectionState::New | PeerConnectionState::Connecting => {
                log::debug!("link {link} state {state:?}");
            }
        }
    }

    async fn on_grace_expired(&mut self, link: LinkId) {
        if !self.negotiator.is_current(link) {
            return;
        }
        let recovered = self.negotiator.link().is_some_and(|l| l.connected);
        if recovered {
            log::info!("link {link} recovered during grace period");
            return;
        }
        log::warn!("link {link} did not recover, tearing down");
        self.notify(SessionNotice::ConnectionFailed);
        self.teardown_link().await;
    }

    async fn teardown_link(&mut self) {
        self.grace.cancel();
        if self.negotiator.close_link().await.is_some() {
            self.notify(SessionNotice::Disconnected);
        }
    }

    async fn on_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SetMedia {
                kind,
                enabled,
                reply,
            } => {
                let result = self.set_media(kind, enabled).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                } else if let Err(e) = result {
                    log::warn!("set {kind} to {enabled} failed: {e}");
                }
            }
            SessionCommand::ToggleRemoteAudio => {
                let muted = self.media.toggle_remote_audio_playback();
                self.notify(SessionNotice::RemoteAudioMuted(muted));
            }
            SessionCommand::EditCode(code) => {
                self.relay.edit_code(code);
            }
            SessionCommand::SwitchLanguage(language) => {
                self.relay.switch_language(language);
            }
            SessionCommand::EditWhiteboard(text) => {
                self.relay.edit_whiteboard(text);
            }
            SessionCommand::Leave => self.leave().await,
        }
    }

    /// Включение или выключение локального трека.
    ///
    /// Ошибки захвата возвращаются вызывающему, ошибки согласования только логируются.
    pub async fn set_media(&mut self, kind: TrackKind, enabled: bool) -> Result<()> {
        if self.left {
            return Err(RoomError::Closed);
        }
        let change = if enabled {
            self.media.enable(kind).await?
        } else {
            self.media.disable(kind)
        };

        match change {
            None => {}
            Some(TrackChange::Added(track)) => {
                if self.negotiator.has_link() {
                    match self.negotiator.attach_track(&track).await {
                        Ok(true) => self.renegotiate().await,
                        Ok(false) => {}
                        Err(e) => {
                            log::warn!("failed to attach {kind} track, rolling back: {e}");
                            self.media.disable(kind);
                            return Err(e);
                        }
                    }
                } else if let Some(peer) = self.membership.first_peer().map(str::to_string) {
                    self.call(&peer).await;
                }
            }
            Some(TrackChange::Removed(track)) => {
                match self.negotiator.detach_track(track.kind).await {
                    Ok(true) => self.renegotiate().await,
                    Ok(false) => {}
                    Err(e) => log::warn!("failed to detach {kind} track: {e}"),
                }
            }
        }
        Ok(())
    }

    async fn renegotiate(&mut self) {
        if let Err(e) = self.negotiator.renegotiate().await {
            log::warn!("renegotiation skipped: {e}");
        }
    }

    pub async fn enable_camera(&mut self) -> Result<()> {
        self.set_media(TrackKind::Video, true).await
    }

    pub async fn disable_camera(&mut self) -> Result<()> {
        self.set_media(TrackKind::Video, false).await
    }

    pub async fn enable_mic(&mut self) -> Result<()> {
        self.set_media(TrackKind::Audio, true).await
    }

    pub async fn disable_mic(&mut self) -> Result<()> {
        self.set_media(TrackKind::Audio, false).await
    }

    /// Выход из комнаты: соединение закрыто, треки остановлены, дальнейшие события игнорируются
    pub async fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;
        log::info!("leaving room {}", self.room_id);
        self.media.stop_all();
        self.relay.shutdown();
        self.grace.cancel();
        self.hub.send(ClientMessage::LeaveRoom {
            room_id: self.room_id.clone(),
        });
        self.negotiator.close().await;
        self.notify(SessionNotice::Left);
    }
}

/// Клонируемый handle для отправки команд в цикл сессии
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    fn command(&self, cmd: SessionCommand) -> Result<()> {
        self.tx
            .send(SessionEvent::Command(cmd))
            .map_err(|_| RoomError::Closed)
    }

    pub async fn set_media(&self, kind: TrackKind, enabled: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::SetMedia {
            kind,
            enabled,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| RoomError::Closed)?
    }

    pub async fn enable_camera(&self) -> Result<()> {
        self.set_media(TrackKind::Video, true).await
    }

    pub async fn disable_camera(&self) -> Result<()> {
        self.set_media(TrackKind::Video, false).await
    }

    pub async fn enable_mic(&self) -> Result<()> {
        self.set_media(TrackKind::Audio, true).await
    }

    pub async fn disable_mic(&self) -> Result<()> {
        self.set_media(TrackKind::Audio, false).await
    }

    pub fn toggle_remote_audio_playback(&self) -> Result<()> {
        self.command(SessionCommand::ToggleRemoteAudio)
    }

    pub fn edit_code(&self, code: impl Into<String>) -> Result<()> {
        self.command(SessionCommand::EditCode(code.into()))
    }

    pub fn switch_language(&self, language: impl Into<String>) -> Result<()> {
        self.command(SessionCommand::SwitchLanguage(language.into()))
    }

    pub fn edit_whiteboard(&self, text: impl Into<String>) -> Result<()> {
        self.command(SessionCommand::EditWhiteboard(text.into()))
    }

    pub fn leave(&self) -> Result<()> {
        self.command(SessionCommand::Leave)
    }
}
