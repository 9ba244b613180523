//! WebSocket signaling relay for WebRTC peer-to-peer connection setup
//!
//! Peers connect over a persistent WebSocket, register an identity, and
//! exchange negotiation envelopes (offer/answer/ICE candidate) addressed by
//! peer identity. The server routes envelopes and tracks which identities are
//! reachable; it never touches the negotiated media or data path.
//!
//! # Protocol
//!
//! Connect to `ws://host:port/?id={identity}` (a UUIDv4 is assigned when `id`
//! is omitted). Each envelope is one JSON text frame:
//!
//! ```json
//! {"type": "OFFER", "src": "alice", "dst": "bob", "payload": {"sdp": "..."}}
//! ```
//!
//! Envelope types (client → server unless noted):
//! - `OPEN` - register; the server replies with a bare `{"type":"OPEN"}` ack
//! - `HEARTBEAT` - liveness ping, no reply
//! - `OFFER` / `ANSWER` / `CANDIDATE` - relayed to `dst`
//! - `EXPIRE` - renegotiation signal, relayed to `dst`
//! - `LEAVE` - without `dst`: disconnect self; with `dst`: teardown notice,
//!   relayed (also synthesized by the server when relaying to a dead peer)
//!
//! The server always rewrites `src` to the sender's registered identity, so a
//! peer cannot speak in another peer's name. Envelopes for an identity that
//! has not registered yet are queued and delivered, in order, the moment it
//! registers.
//!
//! # Example
//!
//! ```bash
//! # Start the server
//! PEERHUB_ADDR=127.0.0.1:9000 peerhub
//!
//! # Register and send an offer (e.g. with websocat)
//! websocat "ws://127.0.0.1:9000/?id=alice"
//! {"type":"OPEN"}
//! {"type":"OFFER","dst":"bob","payload":{"sdp":"..."}}
//! ```

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod handler;
pub mod message;
pub mod realm;
pub mod server;

pub use client::{Client, Outbound, Socket};
pub use error::{ClientRequestError, SendError, SignalingError};
pub use handler::MessageHandler;
pub use message::{Message, MessageType, PeerId};
pub use realm::Realm;
pub use server::{ServerConfig, SignalingServer};
