//! TCP cluster messaging transport.
//!
//! One listener per node. Requests are addressed by `MemberId` and
//! resolved to a socket address through an address book populated from
//! member descriptors.
//!
//! ## Wire Protocol
//!
//! All frames are length-prefixed: a 4-byte big-endian u32 giving the
//! size of the bincode-encoded body, followed by the encoded bytes.
//! A request body is an [`Envelope`] (subject, sender, payload); a
//! reply body is a [`ReplyFrame`]. Inbound frames for subjects without
//! a subscription answer `NoHandler`, which the sending side surfaces
//! as [`AtomixError::NoRemoteHandler`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, info, warn};

use atomix_proto::codec;
use atomix_proto::defaults::{
    DEFAULT_INBOUND_CHANNEL_SIZE, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MESSAGING_TIMEOUT_SECS,
};
use atomix_proto::error::{AtomixError, AtomixResult};
use atomix_proto::member::{Address, Member, MemberId};

use super::{ClusterMessaging, InboundRequest, Responder, Subscription};

/// Maximum size of a single wire frame.
const MAX_FRAME_SIZE: u32 = DEFAULT_MAX_MESSAGE_SIZE;

/// Request frame carried over TCP.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    subject: String,
    sender: MemberId,
    payload: Vec<u8>,
}

/// Reply frame carried over TCP.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum ReplyFrame {
    /// Successful reply with the handler's payload.
    Payload(Vec<u8>),
    /// No subscription for the requested subject.
    NoHandler,
    /// The handler gave up without replying.
    Error(String),
}

type SubjectMap = HashMap<String, mpsc::Sender<InboundRequest>>;

/// TCP-based cluster messaging.
pub struct TcpMessaging {
    local: Member,
    local_addr: SocketAddr,
    subjects: Arc<RwLock<SubjectMap>>,
    addresses: Arc<RwLock<HashMap<MemberId, Address>>>,
    timeout: Duration,
    shutdown: Arc<Notify>,
}

impl TcpMessaging {
    /// Bind the listener on the local member's address and start
    /// accepting inbound requests.
    pub async fn bind(local: Member) -> AtomixResult<Self> {
        Self::bind_with_timeout(local, Duration::from_secs(DEFAULT_MESSAGING_TIMEOUT_SECS)).await
    }

    /// Bind with an explicit request timeout.
    pub async fn bind_with_timeout(local: Member, timeout: Duration) -> AtomixResult<Self> {
        let listener =
            TcpListener::bind((local.address.host.as_str(), local.address.port)).await?;
        let local_addr = listener.local_addr()?;
        info!("messaging: listening on {}", local_addr);

        let subjects: Arc<RwLock<SubjectMap>> = Arc::new(RwLock::new(HashMap::new()));
        let shutdown = Arc::new(Notify::new());

        Self::spawn_listener(subjects.clone(), shutdown.clone(), listener);

        Ok(Self {
            local,
            local_addr,
            subjects,
            addresses: Arc::new(RwLock::new(HashMap::new())),
            timeout,
            shutdown,
        })
    }

    /// The address the listener is actually bound to. Differs from the
    /// configured address when binding to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Record a peer's address so it can be used as a send target.
    pub async fn register(&self, member: &Member) {
        self.register_address(member.id.clone(), member.address.clone())
            .await;
    }

    /// Record an address for a member id.
    pub async fn register_address(&self, id: MemberId, address: Address) {
        let mut addresses = self.addresses.write().await;
        addresses.insert(id, address);
    }

    fn spawn_listener(
        subjects: Arc<RwLock<SubjectMap>>,
        shutdown: Arc<Notify>,
        listener: TcpListener,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        debug!("messaging: listener shutting down");
                        break;
                    }
                    accept = listener.accept() => {
                        match accept {
                            Ok((stream, peer_addr)) => {
                                let subjects_c = subjects.clone();
                                let shutdown_c = shutdown.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = Self::handle_connection(
                                        subjects_c, shutdown_c, stream,
                                    )
                                    .await
                                    {
                                        debug!("messaging: connection from {} ended: {}", peer_addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                warn!("messaging: accept error: {}", e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Serve one inbound connection. Frames are processed one at a
    /// time so replies go out in request order.
    async fn handle_connection(
        subjects: Arc<RwLock<SubjectMap>>,
        shutdown: Arc<Notify>,
        mut stream: TcpStream,
    ) -> AtomixResult<()> {
        loop {
            let frame = tokio::select! {
                _ = shutdown.notified() => break,
                frame = Self::read_frame(&mut stream) => match frame {
                    Ok(f) => f,
                    Err(_) => break,
                },
            };

            let envelope: Envelope = match codec::decode(&frame) {
                Ok(envelope) => envelope,
                Err(_) => {
                    warn!("messaging: malformed request frame, closing connection");
                    break;
                }
            };

            let queue = {
                let subjects = subjects.read().await;
                subjects.get(&envelope.subject).cloned()
            };

            let reply = match queue {
                None => ReplyFrame::NoHandler,
                Some(queue) => {
                    let (responder, reply_rx) = Responder::channel();
                    let request = InboundRequest {
                        sender: envelope.sender,
                        payload: envelope.payload,
                        responder,
                    };
                    if queue.send(request).await.is_err() {
                        ReplyFrame::NoHandler
                    } else {
                        match reply_rx.await {
                            Ok(payload) => ReplyFrame::Payload(payload),
                            Err(_) => ReplyFrame::Error("handler dropped the request".to_string()),
                        }
                    }
                }
            };

            Self::write_frame(&mut stream, &codec::encode(&reply)?).await?;
        }
        Ok(())
    }

    async fn read_frame(stream: &mut TcpStream) -> AtomixResult<Vec<u8>> {
        let len = stream.read_u32().await?;
        if len > MAX_FRAME_SIZE {
            return Err(AtomixError::Decode);
        }
        let mut buf = vec![0u8; len as usize];
        stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn write_frame(stream: &mut TcpStream, data: &[u8]) -> AtomixResult<()> {
        if data.len() > MAX_FRAME_SIZE as usize {
            return Err(AtomixError::Encode);
        }
        stream.write_u32(data.len() as u32).await?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterMessaging for TcpMessaging {
    async fn send(
        &self,
        subject: &str,
        target: &MemberId,
        payload: Vec<u8>,
    ) -> AtomixResult<Vec<u8>> {
        let address = {
            let addresses = self.addresses.read().await;
            addresses
                .get(target)
                .cloned()
                .ok_or_else(|| AtomixError::UnknownMember(target.to_string()))?
        };

        let envelope = Envelope {
            subject: subject.to_string(),
            sender: self.local.id.clone(),
            payload,
        };
        let frame = codec::encode(&envelope)?;

        let exchange = async {
            let mut stream =
                TcpStream::connect((address.host.as_str(), address.port)).await?;
            Self::write_frame(&mut stream, &frame).await?;
            let reply = Self::read_frame(&mut stream).await?;
            codec::decode::<ReplyFrame>(&reply)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(ReplyFrame::Payload(payload))) => Ok(payload),
            Ok(Ok(ReplyFrame::NoHandler)) => Err(AtomixError::NoRemoteHandler),
            Ok(Ok(ReplyFrame::Error(reason))) => {
                debug!("messaging: peer {} failed to handle request: {}", target, reason);
                Err(AtomixError::Network)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AtomixError::Timeout),
        }
    }

    async fn subscribe(&self, subject: &str) -> AtomixResult<Subscription> {
        let (tx, rx) = mpsc::channel(DEFAULT_INBOUND_CHANNEL_SIZE);
        let mut subjects = self.subjects.write().await;
        subjects.insert(subject.to_string(), tx);
        Ok(Subscription::new(rx))
    }

    async fn unsubscribe(&self, subject: &str) {
        let mut subjects = self.subjects.write().await;
        subjects.remove(subject);
    }
}

impl Drop for TcpMessaging {
    fn drop(&mut self) {
        // Signal the listener and connection tasks to stop.
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_endpoint(id: &str) -> TcpMessaging {
        let member = Member::new(id, Address::new("127.0.0.1", 0));
        TcpMessaging::bind_with_timeout(member, Duration::from_millis(500))
            .await
            .unwrap()
    }

    async fn link(a: &TcpMessaging, b: &TcpMessaging, b_id: &str) {
        let addr = b.local_addr();
        a.register_address(
            MemberId::new(b_id),
            Address::new(addr.ip().to_string(), addr.port()),
        )
        .await;
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let a = make_endpoint("a").await;
        let b = make_endpoint("b").await;
        link(&a, &b, "b").await;

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
    async fn test_no_handler_for_unsubscribed_subject() {
        let a = make_endpoint("a").await;
        let b = make_endpoint("b").await;
        link(&a, &b, "b").await;

        let result = a.send("nothing", &MemberId::new("b"), vec![]).await;
        assert_eq!(result.unwrap_err(), AtomixError::NoRemoteHandler);
    }

    #[tokio::test]
    async fn test_unknown_member() {
        let a = make_endpoint("a").await;

        let result = a.send("echo", &MemberId::new("ghost"), vec![]).await;
        assert_eq!(
            result.unwrap_err(),
            AtomixError::UnknownMember("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let a = make_endpoint("a").await;
        let b = make_endpoint("b").await;
        link(&a, &b, "b").await;

        let mut subscription = b.subscribe("slow").await.unwrap();
        tokio::spawn(async move {
            let request = subscription.accept().await;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            drop(request);
        });

        let result = a.send("slow", &MemberId::new("b"), vec![]).await;
        assert_eq!(result.unwrap_err(), AtomixError::Timeout);
    }

    #[tokio::test]
    async fn test_unsubscribe_restores_no_handler() {
        let a = make_endpoint("a").await;
        let b = make_endpoint("b").await;
        link(&a, &b, "b").await;

        let _subscription = b.subscribe("echo").await.unwrap();
        b.unsubscribe("echo").await;

        let result = a.send("echo", &MemberId::new("b"), vec![]).await;
        assert_eq!(result.unwrap_err(), AtomixError::NoRemoteHandler);
    }
}
