//! Message routing
//!
//! The handler is the only component with protocol-state logic. It owns no
//! state of its own: each call is a pure function of (sending client,
//! envelope, realm) that produces side effects on the realm and on client
//! send capabilities.
//!
//! Relay failures never escape: a destination whose channel died is closed or
//! removed, and the sender gets a synthesized `LEAVE` so it stops
//! retransmitting to a dead peer. The only reported fault is an envelope type
//! the handler does not implement.

use crate::client::Client;
use crate::error::SignalingError;
use crate::message::{Message, MessageType, PeerId};
use crate::realm::Realm;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Routes inbound envelopes to their destination peers
pub struct MessageHandler {
    realm: Arc<Realm>,
}

impl MessageHandler {
    pub fn new(realm: Arc<Realm>) -> Self {
        Self { realm }
    }

    /// Handle one inbound envelope from `client`.
    ///
    /// Returns an error only for an envelope type the server does not
    /// implement; every other failure mode is absorbed here.
    pub async fn handle(
        &self,
        client: &Arc<Client>,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<(), SignalingError> {
        match message.kind {
            MessageType::Open => {
                self.accept(client, cancel).await;
                Ok(())
            }
            MessageType::Heartbeat => {
                client.touch();
                Ok(())
            }
            MessageType::Offer
            | MessageType::Answer
            | MessageType::Candidate
            | MessageType::Expire => {
                self.transfer(client, message, cancel).await;
                Ok(())
            }
            MessageType::Leave => {
                self.leave(client, message, cancel).await;
                Ok(())
            }
            MessageType::Unknown => Err(SignalingError::UnsupportedType),
        }
    }

    /// Reply to a registration with the registration-accepted ack.
    ///
    /// A failed ack means the sender's own channel is already gone; its
    /// connection task will notice and tear down, so the failure is only
    /// logged here.
    async fn accept(&self, client: &Arc<Client>, cancel: &CancellationToken) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            result = client.send(Message::open_ack()) => {
                if result.is_err() {
                    debug!(id = %client.id(), "open ack failed, channel already gone");
                }
            }
        }
    }

    /// Relay an envelope to its destination, queueing it if the destination
    /// has not registered yet.
    async fn transfer(&self, client: &Arc<Client>, mut message: Message, cancel: &CancellationToken) {
        let Some(dst) = message.dst.clone().filter(|d| !d.0.is_empty()) else {
            warn!(id = %client.id(), kind = ?message.kind, "relay envelope without destination, dropping");
            return;
        };

        // Never trust the wire's stated source: rebind it to the sending
        // connection's identity before delivery or queueing.
        message.src = Some(client.id().clone());

        let Some(destination) = self.realm.get_client(&dst) else {
            if message.kind.is_queueable() {
                debug!(%dst, kind = ?message.kind, "destination not connected, queueing");
                self.realm.add_to_queue(dst, message);
            }
            return;
        };

        // The send runs against a snapshot handle with no realm lock held; a
        // concurrent removal of the destination just fails the send.
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = destination.send(message) => result,
        };

        if result.is_err() {
            self.recover(client, &destination, cancel).await;
        }
    }

    /// Recovery for a destination whose channel broke mid-relay: the peer
    /// disconnected without closing its connection.
    async fn recover(
        &self,
        client: &Arc<Client>,
        destination: &Arc<Client>,
        cancel: &CancellationToken,
    ) {
        let dst = destination.id().clone();
        warn!(%dst, "relay send failed, tearing down destination");

        if let Some(socket) = destination.socket() {
            // The transport is still around; closing it lets the connection
            // task run its own removal path.
            socket.close("relay send failed").await;
        } else {
            self.realm.remove_client(&dst);
        }

        // Tell the other side to stop trying. The notice re-enters the
        // teardown path so it relays to the still-live sender, or is queued
        // if the sender has vanished too.
        let notice = Message::leave_notice(dst, client.id().clone());
        self.leave(destination, notice, cancel).await;
    }

    /// Teardown: self-initiated when the envelope has no destination,
    /// otherwise relayed to the destination as a notice.
    fn leave<'a>(
        &'a self,
        client: &'a Arc<Client>,
        message: Message,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if message.dst.as_ref().is_none_or(|d| d.0.is_empty()) {
                // Self-initiated disconnect; remove the sender's bound identity,
                // never whatever the wire claimed as source.
                debug!(id = %client.id(), "self leave, removing from realm");
                self.realm.remove_client(client.id());
                return;
            }

            self.transfer(client, message, cancel).await;
        })
    }
}

// Exercised further by tests/router.rs against mock transports.
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        use crate::client::Outbound;
        use crate::error::SendError;

        struct NullOutbound;

        #[async_trait::async_trait]
        impl Outbound for NullOutbound {
            async fn send(&self, _message: Message) -> Result<(), SendError> {
                Ok(())
            }
        }

        let realm = Arc::new(Realm::new());
        let handler = MessageHandler::new(realm);
        let client = Arc::new(Client::new(
            PeerId::from("a"),
            Arc::new(NullOutbound),
            None,
        ));
        let message = Message {
            kind: MessageType::Unknown,
            src: None,
            dst: None,
            payload: None,
        };

        let result = handler
            .handle(&client, message, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SignalingError::UnsupportedType)));
    }
}
