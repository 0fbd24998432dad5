use crate::peer::connection::PeerConnection;
use crate::peer::types::TrackKind;
use std::collections::HashMap;
use std::time::Duration;

/// Период ожидания перед объявлением соединения потерянным
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Номер поколения соединения. События со старым номером игнорируются
pub type LinkId = u64;

/// Состояние согласования сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Соединения нет
    Idle,
    /// Мы отправили offer и ждём answer
    OfferSent,
    /// Получен offer, answer ещё не отправлен
    OfferReceived,
    Stable,
    /// Сессия покинула комнату, сигнализация больше не обрабатывается
    Closed,
}

/// Единственное согласованное медиа-соединение с одним удалённым участником
pub struct PeerLink {
    pub id: LinkId,
    pub remote_id: String,
    pub state: NegotiationState,
    pub connection: Box<dyn PeerConnection>,
    /// Треки, уже добавленные в соединение: id трека по виду
    pub attached: HashMap<TrackKind, String>,
    /// Отложенное намерение переподписать соединение
    pub renegotiate_pending: bool,
    pub connected: bool,
}

impl PeerLink {
    pub fn new(id: LinkId, remote_id: String, connection: Box<dyn PeerConnection>) -> Self {
        Self {
            id,
            remote_id,
            state: NegotiationState::Idle,
            connection,
            attached: HashMap::new(),
            renegotiate_pending: false,
            connected: false,
        }
    }

    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.attached.contains_key(&kind)
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("id", &self.id)
            .field("remote_id", &self.remote_id)
            .field("state", &self.state)
            .field("attached", &self.attached)
            .field("renegotiate_pending", &self.renegotiate_pending)
            .finish()
    }
}
