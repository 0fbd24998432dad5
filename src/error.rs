use thiserror::Error;

/// Ошибки захвата локального устройства (камера, микрофон)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture permission denied")]
    PermissionDenied,
    #[error("capture device busy")]
    DeviceBusy,
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
}

/// Общая ошибка комнаты. Ни одна из них не завершает сессию
#[derive(Debug, Error)]
pub enum RoomError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("webrtc: {0}")]
    Rtc(#[from] webrtc::Error),

    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport: {0}")]
    Transport(String),

    #[error("session closed")]
    Closed,

    #[error("no peer link")]
    NoPeerLink,

    #[error("peer link with {existing} already exists, link with {requested} rejected")]
    DuplicatePeerLink { existing: String, requested: String },

    #[error("unexpected {message} from {from_id}")]
    UnexpectedMessage {
        message: &'static str,
        from_id: String,
    },

    #[error("malformed session description: {0}")]
    MalformedDescription(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T, E = RoomError> = std::result::Result<T, E>;
