use crate::error::Result;
use crate::logger::dump_candidate;
use crate::peer::state::LinkId;
use crate::peer::types::{
    IceCandidate, LocalTrack, RemoteTrack, ServerConfig, SessionDescription, SignalingState,
    TrackKind,
};
use crate::session::SessionEvent;
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// Состояние транспорта соединения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for PeerConnectionState {
    fn from(st: RTCPeerConnectionState) -> Self {
        match st {
            RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
            RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
            RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
            _ => PeerConnectionState::New,
        }
    }
}

/// Колбэки соединения
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    StateChanged(PeerConnectionState),
}

/// Канал колбэков одного соединения, помеченный его поколением
#[derive(Debug, Clone)]
pub struct ConnectionEvents {
    link: LinkId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ConnectionEvents {
    pub fn new(link: LinkId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { link, tx }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn emit(&self, event: ConnectionEvent) -> bool {
        self.tx
            .send(SessionEvent::Connection {
                link: self.link,
                event,
            })
            .is_ok()
    }
}

/// Дескриптор соединения, которым управляет согласователь
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: &SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()>;
    async fn has_remote_description(&self) -> bool;
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;
    async fn add_track(&mut self, track: &LocalTrack) -> Result<()>;
    async fn remove_track(&mut self, track_id: &str) -> Result<()>;
    fn signaling_state(&self) -> SignalingState;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self, events: ConnectionEvents) -> Result<Box<dyn PeerConnection>>;
}

/// Фабрика соединений webrtc-rs
pub struct RtcConnectionFactory {
    api: API,
    config: RTCConfiguration,
}

impl RtcConnectionFactory {
    pub fn new(servers: &[ServerConfig]) -> Result<Self> {
        Ok(Self {
            api: build_api()?,
            config: rtc_config(servers),
        })
    }
}

fn build_api() -> Result<API> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;
    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut m)?;
    Ok(APIBuilder::new()
        .with_media_engine(m)
        .with_interceptor_registry(registry)
        .build())
}

/// Создает конфигурацию для peer connection
fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: get_user_ice_servers(servers),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Перевод конфигурации серверов в формат webrtc-rs
pub fn get_user_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| {
            let url = add_ice_url_scheme(config);

            RTCIceServer {
                urls: vec![url],
                username: config.username.clone().unwrap_or_default(),
                credential: config.credential.clone().unwrap_or_default(),
            }
        })
        .collect()
}

#[async_trait]
impl ConnectionFactory for RtcConnectionFactory {
    async fn create(&self, events: ConnectionEvents) -> Result<Box<dyn PeerConnection>> {
        let pc = Arc::new(self.api.new_peer_connection(self.config.clone()).await?);
        let link = events.link();

        // Обработчик для пересылки локальных кандидатов
        let ev = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            match cand {
                Some(c) => match c.to_json() {
                    Ok(init) => {
                        let candidate = IceCandidate::from_rtc(init);
                        dump_candidate("LOCAL", &candidate);
                        ev.emit(ConnectionEvent::LocalCandidate(candidate));
                    }
                    Err(e) => log::warn!("failed to serialize local candidate: {e}"),
                },
                // cand == None означает конец сбора
                None => log::debug!("link {link}: ICE candidate gathering completed"),
            }
            Box::pin(async {})
        }));

        let ev = events.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                match TrackKind::from_codec_type(track.kind()) {
                    Some(kind) => {
                        ev.emit(ConnectionEvent::RemoteTrack(RemoteTrack {
                            kind,
                            track_id: track.id().to_string(),
                            stream_id: track.stream_id().to_string(),
                        }));
                    }
                    None => log::warn!("link {link}: remote track of unknown kind ignored"),
                }
                Box::pin(async {})
            },
        ));

        let ev = events;
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            log::info!("link {link}: peer connection state changed to {st}");
            ev.emit(ConnectionEvent::StateChanged(st.into()));
            Box::pin(async {})
        }));

        Ok(Box::new(RtcPeer {
            pc,
            senders: HashMap::new(),
        }))
    }
}

struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
    senders: HashMap<String, Arc<RTCRtpSender>>,
}

#[async_trait]
impl PeerConnection for RtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        SessionDescription::from_rtc(&offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        SessionDescription::from_rtc(&answer)
    }

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<()> {
        self.pc.set_local_description(desc.to_rtc()?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()> {
        self.pc.set_remote_description(desc.to_rtc()?).await?;
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.pc.add_ice_candidate(candidate.to_rtc()).await?;
        Ok(())
    }

    async fn add_track(&mut self, track: &LocalTrack) -> Result<()> {
        let sender = self.pc.add_track(track.source.clone()).await?;

        // RTCP нужно вычитывать, иначе интерсепторы не работают
        let rtcp = sender.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtcp.read(&mut buf).await.is_ok() {}
        });

        self.senders.insert(track.id.clone(), sender);
        Ok(())
    }

    async fn remove_track(&mut self, track_id: &str) -> Result<()> {
        if let Some(sender) = self.senders.remove(track_id) {
            self.pc.remove_track(&sender).await?;
        }
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.pc.signaling_state().into()
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}
