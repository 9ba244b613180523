//! Per-connection client handle
//!
//! A [`Client`] is the registry's view of one connected peer: its identity,
//! its outbound send capability, its (nullable) raw transport handle, and the
//! liveness timestamp the reaper reads.
//!
//! The send capability and the transport handle are trait objects so the
//! handler never touches a socket type directly; production wires them to a
//! WebSocket writer task, tests wire them to recording doubles.

use crate::error::SendError;
use crate::message::{Message, PeerId};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Outbound send capability of a connected peer.
///
/// Failure means the channel is unusable; the cause is opaque.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), SendError>;
}

/// Raw transport handle, used only for the best-effort close in the relay
/// failure recovery path.
#[async_trait]
pub trait Socket: Send + Sync {
    async fn close(&self, reason: &str);
}

/// A registered peer connection
pub struct Client {
    id: PeerId,
    outbound: Arc<dyn Outbound>,
    /// Cleared by the writer task when the underlying sink dies, so a peer
    /// that half-closed without a close frame presents `None` here.
    socket: RwLock<Option<Arc<dyn Socket>>>,
    /// Written only by the owning connection's task, read by the reaper.
    last_heartbeat: RwLock<Instant>,
}

impl Client {
    pub fn new(id: PeerId, outbound: Arc<dyn Outbound>, socket: Option<Arc<dyn Socket>>) -> Self {
        Self {
            id,
            outbound,
            socket: RwLock::new(socket),
            last_heartbeat: RwLock::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Send an envelope to this peer. May suspend; fails if the channel is
    /// already unusable.
    pub async fn send(&self, message: Message) -> Result<(), SendError> {
        self.outbound.send(message).await
    }

    /// Snapshot of the raw transport handle, if the transport is still around.
    pub fn socket(&self) -> Option<Arc<dyn Socket>> {
        self.socket.read().unwrap().clone()
    }

    /// Drop the raw transport handle once the underlying sink is gone.
    pub fn clear_socket(&self) {
        self.socket.write().unwrap().take();
    }

    /// Record a liveness ping. `Instant::now` is monotonic, so the stored
    /// timestamp never goes backwards.
    pub fn touch(&self) {
        *self.last_heartbeat.write().unwrap() = Instant::now();
    }

    pub fn last_heartbeat(&self) -> Instant {
        *self.last_heartbeat.read().unwrap()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("has_socket", &self.socket.read().unwrap().is_some())
            .finish()
    }
}
