//! WebSocket-клиент хаба.
//!
//! Одно соединение на сессию, автоматическое переподключение с паузой
//! `reconnect_delay`. После каждого (пере)подключения хаб присылает
//! `Welcome` с новым идентификатором, который уходит в сессию как
//! [`HubEvent::Connected`].

use crate::session::SessionEvent;
use crate::signaling::{ClientMessage, HubMessage};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// События транспорта для сессии
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Connected { identity: String },
    Disconnected,
    Message(HubMessage),
}

/// Исходящая сторона транспорта. Дешево клонируется
#[derive(Debug, Clone)]
pub struct HubSender {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl HubSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, msg: ClientMessage) -> bool {
        let name = msg.name();
        match self.tx.send(msg) {
            Ok(()) => {
                log::debug!("hub <- {name}");
                true
            }
            Err(_) => {
                log::warn!("hub writer gone, dropping {name}");
                false
            }
        }
    }
}

pub struct HubClient;

impl HubClient {
    /// Запускает фоновую задачу соединения с хабом.
    ///
    /// Задача завершается, когда закрыт канал исходящих сообщений или канал
    /// событий сессии.
    pub fn spawn(
        url: String,
        reconnect_delay: Duration,
        mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut attempt: u64 = 0;
            loop {
                if attempt > 0 {
                    // всё, что накопилось без соединения, адресовано старому идентификатору
                    let mut dropped = 0;
                    while outgoing.try_recv().is_ok() {
                        dropped += 1;
                    }
                    if dropped > 0 {
                        log::debug!("dropped {dropped} messages queued while disconnected");
                    }
                }
                attempt += 1;

                match connect_async(url.as_str()).await {
                    Ok((ws, _)) => {
                        log::info!("connected to hub {url}");
                        let (mut writer, mut reader) = ws.split();

                        loop {
                            tokio::select! {
                                out = outgoing.recv() => match out {
                                    Some(msg) => {
                                        let raw = match msg.encode() {
                                            Ok(raw) => raw,
                                            Err(e) => {
                                                log::error!("failed to encode {}: {e}", msg.name());
                                                continue;
                                            }
                                        };
                                        if writer.send(Message::Text(raw.into())).await.is_err() {
                                            log::warn!("hub write failed");
                                            break;
                                        }
                                    }
                                    None => {
                                        log::info!("session dropped hub sender, closing");
                                        let _ = writer.close().await;
                                        return;
                                    }
                                },
                                frame = reader.next() => match frame {
                                    Some(Ok(Message::Text(text))) => {
                                        let event = match HubMessage::decode(text.as_str()) {
                                            Ok(HubMessage::Welcome { connection_id }) => {
                                                HubEvent::Connected { identity: connection_id }
                                            }
                                            Ok(msg) => HubEvent::Message(msg),
                                            Err(e) => {
                                                log::warn!("undecodable hub frame dropped: {e}");
                                                continue;
                                            }
                                        };
                                        if events.send(SessionEvent::Hub(event)).is_err() {
                                            log::info!("session gone, closing hub connection");
                                            let _ = writer.close().await;
                                            return;
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) | None => {
                                        log::warn!("hub closed the connection");
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        log::warn!("hub read error: {e}");
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                }
                            }
                        }

                        if events
                            .send(SessionEvent::Hub(HubEvent::Disconnected))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(e) => {
                        log::warn!("hub connect to {url} failed (attempt {attempt}): {e}");
                    }
                }

                if events.is_closed() {
                    return;
                }
                sleep(reconnect_delay).await;
            }
        })
    }
}
