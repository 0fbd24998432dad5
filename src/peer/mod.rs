pub mod connection;
pub mod ice;
pub mod negotiator;
pub mod state;
pub mod types;

pub use connection::{
    ConnectionEvent, ConnectionEvents, ConnectionFactory, PeerConnection, PeerConnectionState,
    RtcConnectionFactory,
};
pub use ice::{CandidateQueue, FlushReport};
pub use negotiator::Negotiator;
pub use state::{LinkId, NegotiationState, PeerLink, GRACE_PERIOD};
pub use types::{
    IceCandidate, LocalTrack, RemoteTrack, SdpKind, ServerConfig, SessionDescription,
    SignalingState, TrackKind,
};
