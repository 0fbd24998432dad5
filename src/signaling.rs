//! Сообщения между клиентом и хабом.
//!
//! JSON-фреймы с тегом `type`. Хаб пересылает полезную нагрузку сигнализации
//! как есть, подставляя `fromId` отправителя.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Клиент → хаб
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    SendOffer { target_id: String, sdp: String },
    SendAnswer { target_id: String, sdp: String },
    SendIceCandidate { target_id: String, candidate: String },
    SendCode { room_id: String, code: String },
    SendLanguage {
        room_id: String,
        language: String,
        starter_code: String,
    },
    SendWhiteboardText { room_id: String, text: String },
}

/// Хаб → клиент
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum HubMessage {
    /// Идентификатор, назначенный хабом этому подключению
    Welcome { connection_id: String },
    ExistingPeers { peers: Vec<String> },
    UserJoined { connection_id: String },
    UserLeft { connection_id: String },
    ReceiveOffer { from_id: String, sdp: String },
    ReceiveAnswer { from_id: String, sdp: String },
    ReceiveIceCandidate { from_id: String, candidate: String },
    ReceiveCode { code: String },
    ReceiveLanguage { language: String, starter_code: String },
    ReceiveWhiteboardText { text: String },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Имя сообщения для логов, без полезной нагрузки
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom { .. } => "JoinRoom",
            ClientMessage::LeaveRoom { .. } => "LeaveRoom",
            ClientMessage::SendOffer { .. } => "SendOffer",
            ClientMessage::SendAnswer { .. } => "SendAnswer",
            ClientMessage::SendIceCandidate { .. } => "SendIceCandidate",
            ClientMessage::SendCode { .. } => "SendCode",
            ClientMessage::SendLanguage { .. } => "SendLanguage",
            ClientMessage::SendWhiteboardText { .. } => "SendWhiteboardText",
        }
    }
}

impl HubMessage {
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
