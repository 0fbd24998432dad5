#![allow(dead_code)]

use async_trait::async_trait;
use interview_room::config::RoomConfig;
use interview_room::error::{CaptureError, Result, RoomError};
use interview_room::hub::{HubEvent, HubSender};
use interview_room::media::CaptureDevice;
use interview_room::peer::{
    ConnectionEvent, ConnectionEvents, ConnectionFactory, IceCandidate, LocalTrack, PeerConnection,
    PeerConnectionState, SdpKind, SessionDescription, SignalingState, TrackKind,
};
use interview_room::session::{Session, SessionEvent, SessionNotice};
use interview_room::signaling::{ClientMessage, HubMessage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const ROOM: &str = "room-1";

/// Что происходило с одним фейковым соединением
#[derive(Debug)]
pub struct FakeRecord {
    pub calls: Vec<String>,
    pub candidates: Vec<String>,
    pub tracks: Vec<String>,
    pub has_remote: bool,
    pub signaling: SignalingState,
    pub closed: bool,
}

impl Default for FakeRecord {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            candidates: Vec::new(),
            tracks: Vec::new(),
            has_remote: false,
            signaling: SignalingState::Stable,
            closed: false,
        }
    }
}

pub struct FakePeer {
    index: usize,
    record: Arc<Mutex<FakeRecord>>,
    fail_add_track: Arc<AtomicBool>,
    fail_create_offer: Arc<AtomicBool>,
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        if self.fail_create_offer.load(Ordering::SeqCst) {
            return Err(RoomError::Transport("create_offer refused".into()));
        }
        let mut rec = self.record.lock().unwrap();
        rec.calls.push("create_offer".into());
        let n = rec.calls.len();
        Ok(SessionDescription::offer(format!("offer-{}-{n}", self.index)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let mut rec = self.record.lock().unwrap();
        rec.calls.push("create_answer".into());
        let n = rec.calls.len();
        Ok(SessionDescription::answer(format!("answer-{}-{n}", self.index)))
    }

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<()> {
        let mut rec = self.record.lock().unwrap();
        rec.calls.push(format!("set_local:{:?}", desc.kind));
        rec.signaling = match desc.kind {
            SdpKind::Offer => SignalingState::HaveLocalOffer,
            SdpKind::Answer => SignalingState::Stable,
        };
        Ok(())
    }

    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()> {
        if desc.sdp.is_empty() {
            return Err(RoomError::MalformedDescription("empty sdp".into()));
        }
        let mut rec = self.record.lock().unwrap();
        rec.calls.push(format!("set_remote:{}", desc.sdp));
        rec.has_remote = true;
        rec.signaling = match desc.kind {
            SdpKind::Offer => SignalingState::HaveRemoteOffer,
            SdpKind::Answer => SignalingState::Stable,
        };
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.record.lock().unwrap().has_remote
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let mut rec = self.record.lock().unwrap();
        if !rec.has_remote {
            return Err(RoomError::Transport(
                "candidate before remote description".into(),
            ));
        }
        if candidate.candidate.contains("bad") {
            rec.calls.push(format!("rejected:{}", candidate.candidate));
            return Err(RoomError::Transport("candidate rejected".into()));
        }
        rec.calls.push(format!("candidate:{}", candidate.candidate));
        rec.candidates.push(candidate.candidate.clone());
        Ok(())
    }

    async fn add_track(&mut self, track: &LocalTrack) -> Result<()> {
        if self.fail_add_track.load(Ordering::SeqCst) {
            return Err(RoomError::Transport("add_track refused".into()));
        }
        let mut rec = self.record.lock().unwrap();
        rec.calls.push(format!("add_track:{}", track.kind));
        rec.tracks.push(track.id.clone());
        Ok(())
    }

    async fn remove_track(&mut self, track_id: &str) -> Result<()> {
        let mut rec = self.record.lock().unwrap();
        rec.calls.push("remove_track".into());
        rec.tracks.retain(|id| id != track_id);
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.record.lock().unwrap().signaling
    }

    async fn close(&self) -> Result<()> {
        let mut rec = self.record.lock().unwrap();
        rec.closed = true;
        rec.signaling = SignalingState::Closed;
        Ok(())
    }
}

/// Фабрика, запоминающая каждое созданное соединение
#[derive(Default)]
pub struct FakeFactory {
    links: Mutex<Vec<(ConnectionEvents, Arc<Mutex<FakeRecord>>)>>,
    pub fail_add_track: Arc<AtomicBool>,
    pub fail_create_offer: Arc<AtomicBool>,
}

impl FakeFactory {
    pub fn count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn record(&self, index: usize) -> Arc<Mutex<FakeRecord>> {
        self.links.lock().unwrap()[index].1.clone()
    }

    pub fn events(&self, index: usize) -> ConnectionEvents {
        self.links.lock().unwrap()[index].0.clone()
    }

    pub fn emit(&self, index: usize, event: ConnectionEvent) {
        assert!(self.events(index).emit(event));
    }

    pub fn emit_state(&self, index: usize, state: PeerConnectionState) {
        self.emit(index, ConnectionEvent::StateChanged(state));
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(&self, events: ConnectionEvents) -> Result<Box<dyn PeerConnection>> {
        let record = Arc::new(Mutex::new(FakeRecord::default()));
        let mut links = self.links.lock().unwrap();
        let index = links.len();
        links.push((events, record.clone()));
        Ok(Box::new(FakePeer {
            index,
            record,
            fail_add_track: self.fail_add_track.clone(),
            fail_create_offer: self.fail_create_offer.clone(),
        }))
    }
}

#[derive(Default)]
pub struct FakeCapture {
    pub deny: AtomicBool,
    pub acquired: AtomicUsize,
    pub released: Mutex<Vec<String>>,
}

#[async_trait]
impl CaptureDevice for FakeCapture {
    async fn acquire(&self, kind: TrackKind) -> std::result::Result<LocalTrack, CaptureError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied);
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(LocalTrack::silent(kind, "fake"))
    }

    fn release(&self, track: &LocalTrack) {
        self.released.lock().unwrap().push(track.id.clone());
    }
}

/// Сессия без фонового цикла: события подаются тестом по одному
pub struct Harness {
    pub session: Session,
    pub outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub notices: mpsc::UnboundedReceiver<SessionNotice>,
    pub factory: Arc<FakeFactory>,
    pub capture: Arc<FakeCapture>,
}

impl Harness {
    pub fn new() -> Self {
        let config = RoomConfig {
            room_id: ROOM.into(),
            ..Default::default()
        };
        let (hub, outgoing) = HubSender::channel();
        let factory = Arc::new(FakeFactory::default());
        let capture = Arc::new(FakeCapture::default());
        let (session, channels) = Session::new(&config, hub, factory.clone(), capture.clone());
        Self {
            session,
            outgoing,
            events: channels.events,
            notices: channels.notices,
            factory,
            capture,
        }
    }

    /// Подключение к хабу под идентификатором и снимок комнаты
    pub async fn join(&mut self, identity: &str, peers: &[&str]) {
        self.connected(identity).await;
        self.hub(HubMessage::ExistingPeers {
            peers: peers.iter().map(|p| p.to_string()).collect(),
        })
        .await;
    }

    pub async fn connected(&mut self, identity: &str) {
        self.session
            .handle(SessionEvent::Hub(HubEvent::Connected {
                identity: identity.into(),
            }))
            .await;
    }

    pub async fn hub(&mut self, msg: HubMessage) {
        self.session.handle(SessionEvent::Hub(HubEvent::Message(msg))).await;
    }

    pub async fn offer_from(&mut self, from: &str, sdp: &str) {
        self.hub(HubMessage::ReceiveOffer {
            from_id: from.into(),
            sdp: sdp.into(),
        })
        .await;
    }

    pub async fn answer_from(&mut self, from: &str, sdp: &str) {
        self.hub(HubMessage::ReceiveAnswer {
            from_id: from.into(),
            sdp: sdp.into(),
        })
        .await;
    }

    pub async fn candidate_from(&mut self, from: &str, candidate: &str) {
        self.hub(HubMessage::ReceiveIceCandidate {
            from_id: from.into(),
            candidate: IceCandidate::new(candidate).to_json().unwrap(),
        })
        .await;
    }

    /// Обрабатывает всё, что соединения и таймеры успели прислать
    pub async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.session.handle(event).await;
        }
    }

    pub fn sent(&mut self) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.outgoing.try_recv() {
            out.push(msg);
        }
        out
    }

    pub fn notices(&mut self) -> Vec<SessionNotice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }

    /// Входящий звонок от участника, после которого соединение стабильно
    pub async fn accept_call(&mut self, from: &str) {
        self.offer_from(from, "remote-offer").await;
        self.sent();
        self.notices();
    }
}

pub fn offers_to(messages: &[ClientMessage], target: &str) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ClientMessage::SendOffer { target_id, .. } if target_id == target))
        .count()
}

pub fn answers_to(messages: &[ClientMessage], target: &str) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ClientMessage::SendAnswer { target_id, .. } if target_id == target))
        .count()
}
