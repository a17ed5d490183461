//! The session layer: correlation routing and the handshake state machine.
//!
//! A [`NetworkSession`] owns one connection at a time. Requests register a
//! oneshot slot keyed by correlation id before the packet leaves, so a
//! response that arrives out of order still finds its caller. Inbound
//! packets with no registered slot are server pushes and flow to the owner
//! in arrival order, except `KICKOUT`, which the session consumes itself:
//! it tears the connection down, rejects every outstanding request, and
//! reports the decoded reason.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use loco_core::protocol::payloads::{decode_body, encode_body, KickoutPush, LoginListReq, LoginListRes};
use loco_core::{KickReason, Method, Packet, PacketIdCounter, UserId};

use crate::error::ClientError;
use crate::network::connection::{Connection, ConnectionEvent};

const SIGNAL_QUEUE_DEPTH: usize = 128;

/// Server status code for a successful handshake.
const LOGIN_STATUS_OK: i32 = 0;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    LoggedOn,
}

/// What the session delivers to its owner.
#[derive(Debug)]
pub enum SessionSignal {
    /// A server push, in arrival order.
    Push(Packet),
    /// The server force-disconnected this session.
    Kickout(KickReason),
    /// The transport dropped without a kickout.
    ConnectionClosed,
}

/// Correlation-routing session over one [`Connection`].
pub struct NetworkSession {
    state: Mutex<SessionState>,
    connection: Mutex<Option<Arc<Connection>>>,
    pending: Mutex<HashMap<u32, oneshot::Sender<Packet>>>,
    packet_ids: PacketIdCounter,
    handshake_timeout: Duration,
}

impl NetworkSession {
    pub fn new(handshake_timeout: Duration) -> NetworkSession {
        NetworkSession {
            state: Mutex::new(SessionState::Disconnected),
            connection: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            packet_ids: PacketIdCounter::new(),
            handshake_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub fn is_logged_on(&self) -> bool {
        self.state() == SessionState::LoggedOn
    }

    /// Opens a connection and starts the routing task. Any previous
    /// connection is torn down first.
    pub async fn connect(
        self: Arc<Self>,
        addr: &str,
    ) -> Result<mpsc::Receiver<SessionSignal>, ClientError> {
        self.teardown();
        *self.state.lock().unwrap() = SessionState::Connecting;

        let (connection, events) = match Connection::open(addr).await {
            Ok(pair) => pair,
            Err(e) => {
                *self.state.lock().unwrap() = SessionState::Disconnected;
                return Err(e.into());
            }
        };
        *self.connection.lock().unwrap() = Some(Arc::clone(&connection));

        let (signals_tx, signals_rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);
        tokio::spawn(Arc::clone(&self).route(connection, events, signals_tx));
        Ok(signals_rx)
    }

    /// Performs the `LOGINLIST` handshake within the configured timeout.
    ///
    /// `user_id` is a placeholder on the first login; the response carries
    /// the authoritative id. On timeout or rejection the connection is torn
    /// down and the session returns to `Disconnected`.
    pub async fn handshake(
        &self,
        device_uuid: &str,
        user_id: UserId,
        access_token: &str,
    ) -> Result<LoginListRes, ClientError> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                SessionState::LoggedOn => return Err(ClientError::AlreadyLoggedOn),
                SessionState::Disconnected => return Err(ClientError::NotConnected),
                _ => *state = SessionState::Handshaking,
            }
        }

        let body = encode_body(&LoginListReq {
            device_uuid: device_uuid.to_string(),
            user_id,
            access_token: access_token.to_string(),
        })?;

        let response = match timeout(
            self.handshake_timeout,
            self.send_request(Method::LOGIN_LIST, body),
        )
        .await
        {
            Err(_) => {
                warn!("handshake timed out");
                self.teardown();
                return Err(ClientError::HandshakeTimeout);
            }
            Ok(Err(e)) => {
                self.teardown();
                return Err(e);
            }
            Ok(Ok(packet)) => packet,
        };

        let login: LoginListRes = match decode_body(response.method, &response.body) {
            Ok(login) => login,
            Err(e) => {
                self.teardown();
                return Err(e.into());
            }
        };
        if login.status != LOGIN_STATUS_OK {
            warn!(status = login.status, "handshake rejected");
            self.teardown();
            return Err(ClientError::LoginRejected {
                status: login.status,
            });
        }

        *self.state.lock().unwrap() = SessionState::LoggedOn;
        info!(
            user_id = login.user_id,
            channels = login.channel_list.len(),
            "handshake complete"
        );
        Ok(login)
    }

    /// Sends a request and awaits the response carrying the same
    /// correlation id. The pending slot is registered before the packet is
    /// written, so a response cannot race past its slot.
    pub async fn send_request(&self, method: Method, body: Vec<u8>) -> Result<Packet, ClientError> {
        let connection = self.current_connection()?;
        let packet_id = self.packet_ids.next();
        let (slot_tx, slot_rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(packet_id, slot_tx);

        let packet = Packet::new(packet_id, method, body);
        if let Err(e) = connection.send(&packet).await {
            self.pending.lock().unwrap().remove(&packet_id);
            warn!(method = %method, error = %e, "request write failed");
            self.teardown_if_current(&connection);
            return Err(ClientError::ConnectionLost);
        }

        slot_rx.await.map_err(|_| ClientError::ConnectionLost)
    }

    /// Sends a request without registering for a response.
    pub async fn send_one_way(&self, method: Method, body: Vec<u8>) -> Result<(), ClientError> {
        let connection = self.current_connection()?;
        let packet = Packet::new(self.packet_ids.next(), method, body);
        if let Err(e) = connection.send(&packet).await {
            warn!(method = %method, error = %e, "one-way write failed");
            self.teardown_if_current(&connection);
            return Err(ClientError::ConnectionLost);
        }
        Ok(())
    }

    /// Tears down the current connection, if any, and rejects every
    /// outstanding request.
    pub fn disconnect(&self) {
        self.teardown();
    }

    fn current_connection(&self) -> Result<Arc<Connection>, ClientError> {
        self.connection
            .lock()
            .unwrap()
            .clone()
            .ok_or(ClientError::NotConnected)
    }

    fn teardown(&self) {
        *self.state.lock().unwrap() = SessionState::Disconnected;
        if let Some(connection) = self.connection.lock().unwrap().take() {
            // Synchronous close, so teardown (and `TalkClient::logout`) is
            // safe to call from outside the runtime.
            connection.close();
        }
        let rejected: Vec<_> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().collect()
        };
        if !rejected.is_empty() {
            debug!(count = rejected.len(), "rejecting outstanding requests");
        }
        // Dropping the senders resolves every waiting caller with
        // `ConnectionLost`.
        drop(rejected);
    }

    /// Tears down only if `connection` is still the session's current one,
    /// so a stale routing task cannot kill a fresh connection.
    fn teardown_if_current(&self, connection: &Arc<Connection>) -> bool {
        let current = self
            .connection
            .lock()
            .unwrap()
            .as_ref()
            .map(|c| Arc::ptr_eq(c, connection))
            .unwrap_or(false);
        if current {
            self.teardown();
        }
        current
    }

    async fn route(
        self: Arc<Self>,
        connection: Arc<Connection>,
        mut events: mpsc::Receiver<ConnectionEvent>,
        signals: mpsc::Sender<SessionSignal>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Packet(packet) => {
                    let slot = self.pending.lock().unwrap().remove(&packet.packet_id);
                    if let Some(slot) = slot {
                        // Receiver may have given up (e.g. handshake
                        // timeout); that is not an error here.
                        let _ = slot.send(packet);
                    } else if packet.method == Method::KICKOUT {
                        let reason = decode_body::<KickoutPush>(Method::KICKOUT, &packet.body)
                            .map(|push| KickReason::from(push.reason))
                            .unwrap_or(KickReason::Unknown(-1));
                        warn!(?reason, "kicked out by server");
                        self.teardown_if_current(&connection);
                        let _ = signals.send(SessionSignal::Kickout(reason)).await;
                        return;
                    } else if signals.send(SessionSignal::Push(packet)).await.is_err() {
                        return;
                    }
                }
                ConnectionEvent::Closed(reason) => {
                    debug!(?reason, "connection reported closed");
                    if self.teardown_if_current(&connection) {
                        let _ = signals.send(SessionSignal::ConnectionClosed).await;
                    }
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loco_core::protocol::payloads::MsgPush;
    use loco_core::{encode_packet, ChatType, FrameDecoder};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const TIMEOUT: Duration = Duration::from_millis(500);

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    /// Reads framed packets off a raw server-side stream.
    async fn read_packet(stream: &mut TcpStream, decoder: &mut FrameDecoder) -> Packet {
        loop {
            if let Some(packet) = decoder.try_next().unwrap() {
                return packet;
            }
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "peer closed while awaiting a packet");
            decoder.extend(&buf[..n]);
        }
    }

    fn msg_push_packet(packet_id: u32, channel_id: i64, log_id: i64) -> Packet {
        let push = MsgPush {
            channel_id,
            chat: loco_core::protocol::payloads::ChatData {
                log_id,
                channel_id,
                author_id: 5,
                chat_type: ChatType::Text,
                text: "push".to_string(),
                sent_at: 1_700_000_000,
            },
        };
        Packet::new(packet_id, Method::MSG, encode_body(&push).unwrap())
    }

    #[tokio::test]
    async fn test_handshake_requires_a_connection() {
        let session = NetworkSession::new(TIMEOUT);
        let err = session.handshake("uuid", -1, "token").await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn test_responses_route_by_correlation_id_out_of_order() {
        let (listener, addr) = listener().await;
        let session = Arc::new(NetworkSession::new(TIMEOUT));
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut decoder = FrameDecoder::new();
            let first = read_packet(&mut stream, &mut decoder).await;
            let second = read_packet(&mut stream, &mut decoder).await;
            // Answer in reverse order.
            for req in [&second, &first] {
                let reply = Packet::new(req.packet_id, req.method, req.body.clone());
                stream.write_all(&encode_packet(&reply)).await.unwrap();
            }
            stream
        });

        let _signals = Arc::clone(&session).connect(&addr).await.unwrap();
        let (a, b) = tokio::join!(
            session.send_request(Method::PING, vec![1]),
            session.send_request(Method::PING, vec![2]),
        );
        assert_eq!(a.unwrap().body, vec![1]);
        assert_eq!(b.unwrap().body, vec![2]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unsolicited_packets_surface_as_pushes_in_order() {
        let (listener, addr) = listener().await;
        let session = Arc::new(NetworkSession::new(TIMEOUT));
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for log_id in 1..=3 {
                let packet = msg_push_packet(0, 7, log_id);
                stream.write_all(&encode_packet(&packet)).await.unwrap();
            }
            // Hold the socket open until the client is done.
            let mut buf = [0u8; 1];
            let _ = stream.read(&mut buf).await;
        });

        let mut signals = Arc::clone(&session).connect(&addr).await.unwrap();
        for expected_log_id in 1..=3 {
            match signals.recv().await {
                Some(SessionSignal::Push(packet)) => {
                    let push: MsgPush = decode_body(packet.method, &packet.body).unwrap();
                    assert_eq!(push.chat.log_id, expected_log_id);
                }
                other => panic!("expected push, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_kickout_rejects_outstanding_requests_and_signals() {
        let (listener, addr) = listener().await;
        let session = Arc::new(NetworkSession::new(TIMEOUT));
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut decoder = FrameDecoder::new();
            // Two requests arrive, neither gets an answer.
            let _ = read_packet(&mut stream, &mut decoder).await;
            let _ = read_packet(&mut stream, &mut decoder).await;
            let kick = Packet::new(
                0,
                Method::KICKOUT,
                encode_body(&KickoutPush { reason: 2 }).unwrap(),
            );
            stream.write_all(&encode_packet(&kick)).await.unwrap();
            let mut buf = [0u8; 1];
            let _ = stream.read(&mut buf).await;
        });

        let mut signals = Arc::clone(&session).connect(&addr).await.unwrap();
        let (a, b) = tokio::join!(
            session.send_request(Method::PING, vec![1]),
            session.send_request(Method::PING, vec![2]),
        );
        assert!(matches!(a, Err(ClientError::ConnectionLost)));
        assert!(matches!(b, Err(ClientError::ConnectionLost)));
        assert!(matches!(
            signals.recv().await,
            Some(SessionSignal::Kickout(KickReason::ChangeServer))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_explicit_disconnect_rejects_outstanding_requests() {
        let (listener, addr) = listener().await;
        let session = Arc::new(NetworkSession::new(TIMEOUT));
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Accept and stay silent.
            let mut buf = [0u8; 1024];
            while stream.read(&mut buf).await.map(|n| n > 0).unwrap_or(false) {}
        });

        let _signals = Arc::clone(&session).connect(&addr).await.unwrap();
        let disconnecting = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                session.disconnect();
            })
        };
        let (a, b) = tokio::join!(
            session.send_request(Method::PING, vec![1]),
            session.send_request(Method::PING, vec![2]),
        );
        assert!(matches!(a, Err(ClientError::ConnectionLost)));
        assert!(matches!(b, Err(ClientError::ConnectionLost)));
        disconnecting.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_timeout_tears_down() {
        let (listener, addr) = listener().await;
        let session = Arc::new(NetworkSession::new(Duration::from_millis(50)));
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Never answer the handshake.
            let mut buf = [0u8; 1024];
            while stream.read(&mut buf).await.map(|n| n > 0).unwrap_or(false) {}
        });

        let _signals = Arc::clone(&session).connect(&addr).await.unwrap();
        let err = session.handshake("uuid", -1, "token").await.unwrap_err();
        assert!(matches!(err, ClientError::HandshakeTimeout));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_handshake_rejection_status_surfaces() {
        let (listener, addr) = listener().await;
        let session = Arc::new(NetworkSession::new(TIMEOUT));
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut decoder = FrameDecoder::new();
            let req = read_packet(&mut stream, &mut decoder).await;
            let body = encode_body(&LoginListRes {
                status: -997,
                user_id: 0,
                open_chat_token: 0,
                channel_list: Vec::new(),
            })
            .unwrap();
            let reply = Packet::new(req.packet_id, Method::LOGIN_LIST, body);
            stream.write_all(&encode_packet(&reply)).await.unwrap();
            let mut buf = [0u8; 1];
            let _ = stream.read(&mut buf).await;
        });

        let _signals = Arc::clone(&session).connect(&addr).await.unwrap();
        let err = session.handshake("uuid", -1, "token").await.unwrap_err();
        assert!(matches!(err, ClientError::LoginRejected { status: -997 }));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_second_handshake_fails_fast_when_logged_on() {
        let (listener, addr) = listener().await;
        let session = Arc::new(NetworkSession::new(TIMEOUT));
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut decoder = FrameDecoder::new();
            let req = read_packet(&mut stream, &mut decoder).await;
            let body = encode_body(&LoginListRes {
                status: 0,
                user_id: 1000,
                open_chat_token: 0,
                channel_list: Vec::new(),
            })
            .unwrap();
            let reply = Packet::new(req.packet_id, Method::LOGIN_LIST, body);
            stream.write_all(&encode_packet(&reply)).await.unwrap();
            let mut buf = [0u8; 1];
            let _ = stream.read(&mut buf).await;
        });

        let _signals = Arc::clone(&session).connect(&addr).await.unwrap();
        session.handshake("uuid", -1, "token").await.unwrap();
        assert_eq!(session.state(), SessionState::LoggedOn);

        // The rejection happens before any packet is written, so the
        // session stays logged on.
        let err = session.handshake("uuid", 1000, "token").await.unwrap_err();
        assert!(matches!(err, ClientError::AlreadyLoggedOn));
        assert_eq!(session.state(), SessionState::LoggedOn);
    }

    #[test]
    fn test_disconnect_works_outside_the_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let session = Arc::new(NetworkSession::new(TIMEOUT));
        let signals = runtime.block_on(async {
            let (listener, addr) = listener().await;
            tokio::spawn(async move {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1];
                let _ = stream.read(&mut buf).await;
            });
            Arc::clone(&session).connect(&addr).await.unwrap()
        });

        // No runtime context here. A teardown that spawned would panic.
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
        drop(signals);
    }
}
