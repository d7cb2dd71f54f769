//! In-process cluster messaging.
//!
//! A [`LocalNetwork`] is a hub connecting one [`LocalMessaging`]
//! endpoint per member through tokio channels. No real networking is
//! performed; requests are routed straight into the target endpoint's
//! subject queue. Designed for tests and single-process deployments.
//!
//! Failure signaling mirrors the real transport: a missing endpoint
//! behaves like an unreachable peer (`Timeout`), a missing subject on a
//! live endpoint yields `NoRemoteHandler`, and a handler that never
//! replies runs into the configured timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::debug;

use atomix_proto::defaults::{DEFAULT_INBOUND_CHANNEL_SIZE, DEFAULT_MESSAGING_TIMEOUT_SECS};
use atomix_proto::error::{AtomixError, AtomixResult};
use atomix_proto::member::MemberId;

use super::{ClusterMessaging, InboundRequest, Responder, Subscription};

type SubjectMap = HashMap<String, mpsc::Sender<InboundRequest>>;

/// In-process messaging hub. Clone handles share the same network.
#[derive(Clone)]
pub struct LocalNetwork {
    endpoints: Arc<RwLock<HashMap<MemberId, SubjectMap>>>,
    timeout: Duration,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_MESSAGING_TIMEOUT_SECS))
    }

    /// A network whose sends give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            endpoints: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    /// Attach an endpoint for `member`. A previously attached endpoint
    /// for the same member is replaced.
    pub async fn endpoint(&self, member: MemberId) -> LocalMessaging {
        let mut endpoints = self.endpoints.write().await;
        endpoints.insert(member.clone(), SubjectMap::new());
        LocalMessaging {
            network: self.clone(),
            local: member,
        }
    }

    /// Detach an endpoint. Subsequent sends to that member behave as if
    /// the peer were unreachable.
    pub async fn detach(&self, member: &MemberId) {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.remove(member).is_some() {
            debug!("detached endpoint {}", member);
        }
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One member's view of a [`LocalNetwork`].
pub struct LocalMessaging {
    network: LocalNetwork,
    local: MemberId,
}

#[async_trait]
impl ClusterMessaging for LocalMessaging {
    async fn send(
        &self,
        subject: &str,
        target: &MemberId,
        payload: Vec<u8>,
    ) -> AtomixResult<Vec<u8>> {
        let queue = {
            let endpoints = self.network.endpoints.read().await;
            match endpoints.get(target) {
                // Unreachable peer: indistinguishable from a lost request.
                None => return Err(AtomixError::Timeout),
                Some(subjects) => match subjects.get(subject) {
                    None => return Err(AtomixError::NoRemoteHandler),
                    Some(queue) => queue.clone(),
                },
            }
        };

        let (responder, reply_rx) = Responder::channel();
        let request = InboundRequest {
            sender: self.local.clone(),
            payload,
            responder,
        };
        if queue.send(request).await.is_err() {
            // Subscription dropped without unsubscribing.
            return Err(AtomixError::NoRemoteHandler);
        }

        match timeout(self.network.timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AtomixError::Network),
            Err(_) => Err(AtomixError::Timeout),
        }
    }

    async fn subscribe(&self, subject: &str) -> AtomixResult<Subscription> {
        let (tx, rx) = mpsc::channel(DEFAULT_INBOUND_CHANNEL_SIZE);
        let mut endpoints = self.network.endpoints.write().await;
        let subjects = endpoints
            .get_mut(&self.local)
            .ok_or(AtomixError::Network)?;
        subjects.insert(subject.to_string(), tx);
        Ok(Subscription::new(rx))
    }

    async fn unsubscribe(&self, subject: &str) {
        let mut endpoints = self.network.endpoints.write().await;
        if let Some(subjects) = endpoints.get_mut(&self.local) {
            subjects.remove(subject);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let network = LocalNetwork::new();
        let a = network.endpoint(MemberId::new("a")).await;
        let b = network.endpoint(MemberId::new("b")).await;

        let mut subscription = b.subscribe("echo").await.unwrap();
        tokio::spawn(async move {
            while let Some(request) = subscription.accept().await {
                assert_eq!(request.sender, MemberId::new("a"));
                let mut reply = request.payload;
                reply.reverse();
                request.responder.respond(reply);
            }
        });

        let reply = a
            .send("echo", &MemberId::new("b"), vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(reply, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_send_to_unsubscribed_subject() {
        let network = LocalNetwork::new();
        let a = network.endpoint(MemberId::new("a")).await;
        let _b = network.endpoint(MemberId::new("b")).await;

        let result = a.send("nothing", &MemberId::new("b"), vec![]).await;
        assert_eq!(result.unwrap_err(), AtomixError::NoRemoteHandler);
    }

    #[tokio::test]
    async fn test_send_to_detached_endpoint_times_out() {
        let network = LocalNetwork::with_timeout(Duration::from_millis(50));
        let a = network.endpoint(MemberId::new("a")).await;
        let _b = network.endpoint(MemberId::new("b")).await;
        network.detach(&MemberId::new("b")).await;

        let result = a.send("echo", &MemberId::new("b"), vec![]).await;
        assert_eq!(result.unwrap_err(), AtomixError::Timeout);
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let network = LocalNetwork::with_timeout(Duration::from_millis(50));
        let a = network.endpoint(MemberId::new("a")).await;
        let b = network.endpoint(MemberId::new("b")).await;

        let mut subscription = b.subscribe("slow").await.unwrap();
        tokio::spawn(async move {
            // Accept but never respond; keep the responder alive so the
            // sender sees a timeout rather than a closed channel.
            let request = subscription.accept().await;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            drop(request);
        });

        let result = a.send("slow", &MemberId::new("b"), vec![]).await;
        assert_eq!(result.unwrap_err(), AtomixError::Timeout);
    }

    #[tokio::test]
    async fn test_unsubscribe_restores_no_handler() {
        let network = LocalNetwork::new();
        let a = network.endpoint(MemberId::new("a")).await;
        let b = network.endpoint(MemberId::new("b")).await;

        let _subscription = b.subscribe("echo").await.unwrap();
        b.unsubscribe("echo").await;

        let result = a.send("echo", &MemberId::new("b"), vec![]).await;
        assert_eq!(result.unwrap_err(), AtomixError::NoRemoteHandler);
    }
}
