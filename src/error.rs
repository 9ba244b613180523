//! Error types for the signaling server

use crate::message::PeerId;
use thiserror::Error;

/// Errors that can occur during signaling
#[derive(Error, Debug)]
pub enum SignalingError {
    /// Envelope type the handler does not implement; the connection task
    /// decides whether this is fatal to the connection
    #[error("Unsupported message type")]
    UnsupportedType,

    /// A live client is already registered under this identity
    #[error("Id `{0}` is already taken")]
    IdTaken(PeerId),
}

/// The peer's outbound channel is unusable; the cause is opaque
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Peer channel unusable")]
pub struct SendError;

/// Errors from client requests
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// Connection was closed
    #[error("Connection closed")]
    Close,

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
