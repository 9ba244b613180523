//! The realm: connected clients and their pending message queues
//!
//! Single source of truth for "is peer X currently connected". Connection
//! tasks, the message handler, and the liveness reaper all operate on one
//! shared [`Realm`]; the maps are sharded so no caller ever holds a lock
//! across an await.

use crate::client::Client;
use crate::error::SignalingError;
use crate::message::{Message, PeerId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Registry of live clients plus the per-destination queue store
#[derive(Default)]
pub struct Realm {
    clients: DashMap<PeerId, Arc<Client>>,
    /// Envelopes for peers that have not registered yet, in arrival order
    queues: DashMap<PeerId, VecDeque<Message>>,
}

impl Realm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an identity to its client handle. Returns a snapshot; the
    /// caller holds no lock afterwards, so a send against the handle may race
    /// a removal and simply fail.
    pub fn get_client(&self, id: &PeerId) -> Option<Arc<Client>> {
        self.clients.get(id).map(|entry| entry.value().clone())
    }

    /// Register a client under its identity.
    ///
    /// A second registration for an already-bound identity is rejected and
    /// the existing binding survives; under concurrent registration of the
    /// same identity exactly one caller wins.
    pub fn register(&self, client: Arc<Client>) -> Result<(), SignalingError> {
        match self.clients.entry(client.id().clone()) {
            Entry::Occupied(entry) => Err(SignalingError::IdTaken(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(client);
                Ok(())
            }
        }
    }

    /// Remove a client by identity. Idempotent; removing an absent identity
    /// is a no-op.
    pub fn remove_client(&self, id: &PeerId) {
        self.clients.remove(id);
    }

    /// Remove an identity only while it is still bound to this exact client.
    ///
    /// Used by the connection teardown path so a late disconnect never evicts
    /// a newer connection that re-registered the same identity.
    pub fn remove_client_if(&self, id: &PeerId, client: &Arc<Client>) {
        self.clients
            .remove_if(id, |_, current| Arc::ptr_eq(current, client));
    }

    /// Append an envelope to an identity's pending queue, creating the queue
    /// if absent.
    pub fn add_to_queue(&self, id: PeerId, message: Message) {
        self.queues.entry(id).or_default().push_back(message);
    }

    /// Remove and return an identity's pending queue, in arrival order.
    /// Called at the moment the identity registers.
    pub fn drain_queue(&self, id: &PeerId) -> Vec<Message> {
        self.queues
            .remove(id)
            .map(|(_, queue)| queue.into())
            .unwrap_or_default()
    }

    /// Clients whose last liveness ping is older than `timeout`
    pub fn stale_clients(&self, timeout: Duration) -> Vec<Arc<Client>> {
        self.clients
            .iter()
            .filter(|entry| entry.value().last_heartbeat().elapsed() > timeout)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
