//! Cluster messaging service.
//!
//! Subject-based request/response between cluster members. A component
//! subscribes to a subject and drains inbound requests from the
//! returned [`Subscription`]; each request carries a one-shot
//! [`Responder`] for the reply. Senders address a peer by `MemberId`
//! and await the reply bytes.
//!
//! Failure kinds a sender can observe, in decreasing order of
//! retryability: `NoRemoteHandler` (the peer is up but has not yet
//! subscribed to the subject), `Timeout` (no reply within the
//! configured window), and `Network` (anything else). The first two
//! are transient during cluster startup and are retried by callers.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use atomix_proto::error::AtomixResult;
use atomix_proto::member::MemberId;

/// One-shot reply handle for an inbound request. Each request gets
/// exactly one reply; dropping the responder without replying is
/// reported to the sender as a transport error.
pub struct Responder {
    tx: oneshot::Sender<Vec<u8>>,
}

impl Responder {
    /// Create a responder and the receiver its reply arrives on.
    pub fn channel() -> (Self, oneshot::Receiver<Vec<u8>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Send the reply. Consumes self.
    pub fn respond(self, payload: Vec<u8>) {
        let _ = self.tx.send(payload);
    }
}

/// An inbound request delivered to a subject subscription.
pub struct InboundRequest {
    /// Identity the sender claims in the envelope.
    pub sender: MemberId,
    /// Raw request payload.
    pub payload: Vec<u8>,
    /// Reply handle.
    pub responder: Responder,
}

/// Handle to a subject subscription. Drained with [`Subscription::accept`];
/// yields `None` once the subject is unsubscribed.
pub struct Subscription {
    rx: mpsc::Receiver<InboundRequest>,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::Receiver<InboundRequest>) -> Self {
        Self { rx }
    }

    /// Receive the next inbound request. Blocks (async) until one is
    /// available, or returns `None` after unsubscription.
    pub async fn accept(&mut self) -> Option<InboundRequest> {
        self.rx.recv().await
    }
}

/// Trait that all cluster messaging backends must implement.
#[async_trait]
pub trait ClusterMessaging: Send + Sync + 'static {
    /// Send `payload` to `target` on `subject` and await the reply.
    async fn send(
        &self,
        subject: &str,
        target: &MemberId,
        payload: Vec<u8>,
    ) -> AtomixResult<Vec<u8>>;

    /// Subscribe to a subject. Replaces any previous subscription for
    /// the same subject on this endpoint.
    async fn subscribe(&self, subject: &str) -> AtomixResult<Subscription>;

    /// Drop the subscription for a subject. Peers sending to it
    /// afterwards observe `NoRemoteHandler`.
    async fn unsubscribe(&self, subject: &str);
}

pub mod local;
pub mod tcp;

pub use local::{LocalMessaging, LocalNetwork};
pub use tcp::TcpMessaging;
