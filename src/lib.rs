pub mod config;
pub mod error;
pub mod hub;
pub mod logger;
pub mod media;
pub mod membership;
pub mod peer;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod timer;
pub mod utils;

pub use config::RoomConfig;
pub use error::{CaptureError, Result, RoomError};
pub use hub::{HubClient, HubEvent, HubSender};
pub use media::{CaptureDevice, MediaState, SyntheticCapture};
pub use session::{Session, SessionEvent, SessionHandle, SessionNotice};

use peer::RtcConnectionFactory;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Подключённый к хабу участник комнаты
pub struct RoomClient {
    pub handle: SessionHandle,
    pub notices: mpsc::UnboundedReceiver<SessionNotice>,
    session: JoinHandle<()>,
    hub: JoinHandle<()>,
}

/// Собирает сессию поверх webrtc-rs и WebSocket-хаба и запускает её цикл
pub fn join_room(config: &RoomConfig, device: Arc<dyn CaptureDevice>) -> Result<RoomClient> {
    config.validate()?;
    if config.room_id.is_empty() {
        return Err(RoomError::Config("room_id is required".into()));
    }

    let factory = Arc::new(RtcConnectionFactory::new(&config.ice_servers)?);
    let (hub_sender, outgoing) = HubSender::channel();
    let (session, channels) = Session::new(config, hub_sender, factory, device);
    let handle = session.session_handle();

    let hub = HubClient::spawn(
        config.hub_url.clone(),
        config.reconnect_delay(),
        outgoing,
        session.event_sender(),
    );
    let session = tokio::spawn(session.run(channels.events));

    Ok(RoomClient {
        handle,
        notices: channels.notices,
        session,
        hub,
    })
}

impl RoomClient {
    /// Выходит из комнаты и ждёт завершения фоновых задач
    pub async fn shutdown(self, timeout: Duration) {
        if self.handle.leave().is_err() {
            log::debug!("session loop already finished");
        }
        if tokio::time::timeout(timeout, self.session).await.is_err() {
            log::warn!("session loop did not finish in {timeout:?}");
        }
        // LeaveRoom должен успеть уйти до закрытия сокета
        let mut hub = self.hub;
        if tokio::time::timeout(timeout, &mut hub).await.is_err() {
            log::warn!("hub connection did not close in {timeout:?}, aborting");
            hub.abort();
        }
    }
}
