//! Согласование единственного peer connection сессии.
//!
//! ```text
//! Idle ──create_offer──► OfferSent ──receive_answer──► Stable
//!   └───receive_offer──► OfferReceived ──(answer sent)──► Stable
//! Stable ──renegotiate──► OfferSent
//! * ──close──► Closed
//! ```
//!
//! Сессия владеет не более чем одним [`PeerLink`]: второй offer от другого
//! участника, как и offer во время незавершённого согласования, отклоняется.
//! Удалённые кандидаты копятся в [`CandidateQueue`], пока у соединения нет
//! remote description, и применяются строго после его установки.

use crate::error::{Result, RoomError};
use crate::hub::HubSender;
use crate::peer::connection::{ConnectionEvents, ConnectionFactory};
use crate::peer::ice::{apply_pending_candidates, CandidateQueue};
use crate::peer::state::{LinkId, NegotiationState, PeerLink};
use crate::peer::types::{IceCandidate, LocalTrack, SessionDescription, SignalingState, TrackKind};
use crate::session::SessionEvent;
use crate::signaling::ClientMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Negotiator {
    factory: Arc<dyn ConnectionFactory>,
    hub: HubSender,
    events: mpsc::UnboundedSender<SessionEvent>,
    link: Option<PeerLink>,
    pending: CandidateQueue,
    next_link: LinkId,
    closed: bool,
}

impl Negotiator {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        hub: HubSender,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            factory,
            hub,
            events,
            link: None,
            pending: CandidateQueue::new(),
            next_link: 1,
            closed: false,
        }
    }

    pub fn state(&self) -> NegotiationState {
        if self.closed {
            return NegotiationState::Closed;
        }
        self.link
            .as_ref()
            .map_or(NegotiationState::Idle, |link| link.state)
    }

    pub fn link(&self) -> Option<&PeerLink> {
        self.link.as_ref()
    }

    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.remote_id.as_str())
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    /// Сбрасывает очередь кандидатов, не трогая соединение. Возвращает число отброшенных
    pub fn discard_pending_candidates(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Событие относится к текущему соединению
    pub fn is_current(&self, link_id: LinkId) -> bool {
        !self.closed && self.link.as_ref().is_some_and(|link| link.id == link_id)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(RoomError::Closed)
        } else {
            Ok(())
        }
    }

    async fn open_link(&mut self, remote_id: &str) -> Result<PeerLink> {
        let id = self.next_link;
        self.next_link += 1;
        let events = ConnectionEvents::new(id, self.events.clone());
        let connection = self.factory.create(events).await?;
        log::info!("link {id}: created peer connection for {remote_id}");
        Ok(PeerLink::new(id, remote_id.to_string(), connection))
    }

    /// Idle → OfferSent: звоним известному участнику
    pub async fn create_offer(&mut self, target_id: &str, tracks: &[LocalTrack]) -> Result<()> {
        self.ensure_open()?;
        if let Some(link) = &self.link {
            return Err(RoomError::DuplicatePeerLink {
                existing: link.remote_id.clone(),
                requested: target_id.to_string(),
            });
        }

        let mut link = self.open_link(target_id).await?;
        match Self::send_offer(&self.hub, &mut link, tracks).await {
            Ok(()) => {
                self.link = Some(link);
                Ok(())
            }
            Err(e) => {
                log::warn!("link {}: offer to {target_id} failed: {e}", link.id);
                let _ = link.connection.close().await;
                Err(e)
            }
        }
    }

    async fn send_offer(hub: &HubSender, link: &mut PeerLink, tracks: &[LocalTrack]) -> Result<()> {
        Self::attach_missing(link, tracks).await?;
        log::info!("link {}: creating offer for {}", link.id, link.remote_id);
        let offer = link.connection.create_offer().await?;
        link.connection.set_local_description(&offer).await?;
        hub.send(ClientMessage::SendOffer {
            target_id: link.remote_id.clone(),
            sdp: offer.sdp,
        });
        link.state = NegotiationState::OfferSent;
        link.renegotiate_pending = false;
        Ok(())
    }

    /// Idle → OfferReceived → Stable, либо переподписание на стабильном соединении
    pub async fn receive_offer(
        &mut self,
        from_id: &str,
        sdp: String,
        tracks: &[LocalTrack],
    ) -> Result<()> {
        self.ensure_open()?;
        let offer = SessionDescription::offer(sdp);

        if let Some(link) = self.link.as_mut() {
            if link.remote_id != from_id || link.state != NegotiationState::Stable {
                return Err(RoomError::DuplicatePeerLink {
                    existing: link.remote_id.clone(),
                    requested: from_id.to_string(),
                });
            }
            log::info!("link {}: renegotiation offer from {from_id}", link.id);
            let result =
                Self::answer_offer(&self.hub, link, &mut self.pending, &offer, tracks).await;
            if let Err(e) = &result {
                log::warn!("link {}: renegotiation answer failed: {e}", link.id);
                link.state = NegotiationState::Stable;
            }
            result?;
            self.after_stable().await;
            return Ok(());
        }

        let mut link = self.open_link(from_id).await?;
        match Self::answer_offer(&self.hub, &mut link, &mut self.pending, &offer, tracks).await {
            Ok(()) => {
                self.link = Some(link);
                self.after_stable().await;
                Ok(())
            }
            Err(e) => {
                log::warn!("link {}: answering {from_id} failed: {e}", link.id);
                let _ = link.connection.close().await;
                Err(e)
            }
        }
    }

    async fn answer_offer(
        hub: &HubSender,
        link: &mut PeerLink,
        pending: &mut CandidateQueue,
        offer: &SessionDescription,
        tracks: &[LocalTrack],
    ) -> Result<()> {
        link.state = NegotiationState::OfferReceived;
        link.connection.set_remote_description(offer).await?;
        Self::attach_missing(link, tracks).await?;
        apply_pending_candidates(&*link.connection, &link.remote_id, pending).await;

        let answer = link.connection.create_answer().await?;
        link.connection.set_local_description(&answer).await?;
        hub.send(ClientMessage::SendAnswer {
            target_id: link.remote_id.clone(),
            sdp: answer.sdp,
        });
        link.state = NegotiationState::Stable;
        log::info!("link {}: answer sent to {}", link.id, link.remote_id);
        Ok(())
    }

    /// OfferSent → Stable
    pub async fn receive_answer(&mut self, from_id: &str, sdp: String) -> Result<()> {
        self.ensure_open()?;
        let link = self.link.as_mut().ok_or(RoomError::NoPeerLink)?;
        if link.remote_id != from_id || link.state != NegotiationState::OfferSent {
            return Err(RoomError::UnexpectedMessage {
                message: "answer",
                from_id: from_id.to_string(),
            });
        }

        let answer = SessionDescription::answer(sdp);
        link.connection.set_remote_description(&answer).await?;
        apply_pending_candidates(&*link.connection, &link.remote_id, &mut self.pending)
            .await;
        link.state = NegotiationState::Stable;
        log::info!("link {}: answer from {from_id} applied, stable", link.id);
        self.after_stable().await;
        Ok(())
    }

    /// Кандидат применяется сразу, если remote description уже есть, иначе ставится в очередь
    pub async fn receive_ice_candidate(
        &mut self,
        from_id: &str,
        candidate: IceCandidate,
    ) -> Result<()> {
        self.ensure_open()?;
        if let Some(link) = self.link.as_ref() {
            if link.remote_id != from_id {
                return Err(RoomError::UnexpectedMessage {
                    message: "ice candidate",
                    from_id: from_id.to_string(),
                });
            }
            if link.connection.has_remote_description().await {
                link.connection.add_ice_candidate(&candidate).await?;
                log::debug!("link {}: applied candidate from {from_id}", link.id);
                return Ok(());
            }
        }
        log::debug!("Remote description not set yet, queuing candidate from {from_id}");
        self.pending.push(from_id, candidate);
        Ok(())
    }

    /// Пересылка локального кандидата текущему удалённому участнику
    pub fn forward_local_candidate(&self, link_id: LinkId, candidate: &IceCandidate) -> Result<()> {
        if !self.is_current(link_id) {
            log::debug!("stale local candidate from link {link_id} dropped");
            return Ok(());
        }
        if let Some(link) = &self.link {
            self.hub.send(ClientMessage::SendIceCandidate {
                target_id: link.remote_id.clone(),
                candidate: candidate.to_json()?,
            });
        }
        Ok(())
    }

    async fn attach_missing(link: &mut PeerLink, tracks: &[LocalTrack]) -> Result<()> {
        for track in tracks {
            if !link.has_track(track.kind) {
                link.connection.add_track(track).await?;
                link.attached.insert(track.kind, track.id.clone());
                log::info!("link {}: attached local {} track {}", link.id, track.kind, track.id);
            }
        }
        Ok(())
    }

    /// Добавляет трек в соединение. true, если соединение изменилось
    pub async fn attach_track(&mut self, track: &LocalTrack) -> Result<bool> {
        let Some(link) = self.link.as_mut() else {
            return Ok(false);
        };
        if link.has_track(track.kind) {
            return Ok(false);
        }
        link.connection.add_track(track).await?;
        link.attached.insert(track.kind, track.id.clone());
        log::info!("link {}: attached local {} track {}", link.id, track.kind, track.id);
        Ok(true)
    }

    /// Убирает трек данного вида из соединения. true, если соединение изменилось
    pub async fn detach_track(&mut self, kind: TrackKind) -> Result<bool> {
        let Some(link) = self.link.as_mut() else {
            return Ok(false);
        };
        let Some(track_id) = link.attached.remove(&kind) else {
            return Ok(false);
        };
        link.connection.remove_track(&track_id).await?;
        log::info!("link {}: detached local {kind} track {track_id}", link.id);
        Ok(true)
    }

    /// Stable → OfferSent. Если соединение не готово к новому offer, намерение откладывается
    pub async fn renegotiate(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let Some(link) = self.link.as_mut() else {
            return Ok(false);
        };
        let signaling = link.connection.signaling_state();
        if link.state != NegotiationState::Stable || signaling != SignalingState::Stable {
            log::warn!(
                "link {}: renegotiation deferred, state {:?} signaling {:?}",
                link.id,
                link.state,
                signaling
            );
            link.renegotiate_pending = true;
            return Ok(false);
        }

        if let Err(e) = Self::send_offer(&self.hub, link, &[]).await {
            log::warn!("link {}: renegotiation offer failed: {e}", link.id);
            link.state = NegotiationState::Stable;
            return Err(e);
        }
        Ok(true)
    }

    /// Отложенное переподписание. Его ошибка не относится к только что применённому описанию
    async fn after_stable(&mut self) {
        let pending = self
            .link
            .as_ref()
            .is_some_and(|link| link.renegotiate_pending);
        if !pending {
            return;
        }
        log::info!("running deferred renegotiation");
        if let Err(e) = self.renegotiate().await {
            log::warn!("deferred renegotiation failed: {e}");
        }
    }

    pub fn set_connected(&mut self, link_id: LinkId, connected: bool) {
        if let Some(link) = self.link.as_mut().filter(|link| link.id == link_id) {
            link.connected = connected;
        }
    }

    /// Разрывает текущее соединение, сессия остаётся в комнате.
    /// Возвращает идентификатор удалённого участника
    pub async fn close_link(&mut self) -> Option<String> {
        self.pending.clear();
        let link = self.link.take()?;
        log::info!("link {}: closing connection with {}", link.id, link.remote_id);
        if let Err(e) = link.connection.close().await {
            log::warn!("link {}: close failed: {e}", link.id);
        }
        Some(link.remote_id)
    }

    /// Переход в Closed: дальнейшая сигнализация игнорируется
    pub async fn close(&mut self) {
        self.closed = true;
        self.close_link().await;
    }
}
