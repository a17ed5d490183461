//! The duplex socket connection.
//!
//! Owns a split TCP stream: writes go through a mutex-guarded write half so
//! concurrent senders interleave at frame granularity, and a spawned read
//! loop feeds raw bytes through a [`FrameDecoder`] and emits decoded
//! packets on an mpsc channel. A transport failure or peer close is
//! reported exactly once as [`ConnectionEvent::Closed`], after which the
//! connection is dead; recovery means opening a new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use loco_core::{encode_packet, FrameDecoder, Packet};

const READ_BUFFER_SIZE: usize = 8 * 1024;
const EVENT_QUEUE_DEPTH: usize = 128;

/// Transport-level connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connection is closed")]
    Closed,
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the read side of a connection stopped.
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// The peer closed the stream cleanly.
    PeerClosed,
    /// A socket read failed.
    Io(String),
    /// The inbound byte stream failed framing and cannot be resynchronized.
    Corrupt(String),
}

/// What the read loop hands to the session.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A complete inbound packet.
    Packet(Packet),
    /// The connection died. Emitted at most once, and never after an
    /// explicit local [`Connection::close`].
    Closed(CloseReason),
}

/// A live socket connection. Shared behind `Arc` between the session and
/// its routing task.
pub struct Connection {
    peer: String,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: AtomicBool,
    read_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Connects to `addr` and starts the read loop.
    pub async fn open(
        addr: &str,
    ) -> Result<(Arc<Connection>, mpsc::Receiver<ConnectionEvent>), ConnectionError> {
        let stream =
            TcpStream::connect(addr)
                .await
                .map_err(|source| ConnectionError::ConnectFailed {
                    addr: addr.to_string(),
                    source,
                })?;
        debug!(addr, "connected");
        Ok(Self::from_stream(stream, addr.to_string()))
    }

    /// Wraps an already-established stream. Used directly by tests.
    pub fn from_stream(
        stream: TcpStream,
        peer: String,
    ) -> (Arc<Connection>, mpsc::Receiver<ConnectionEvent>) {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        let connection = Arc::new(Connection {
            peer,
            writer: Mutex::new(Some(write_half)),
            closed: AtomicBool::new(false),
            read_task: StdMutex::new(None),
        });
        let handle = tokio::spawn(Arc::clone(&connection).read_loop(read_half, events_tx));
        *connection.read_task.lock().unwrap() = Some(handle);

        (connection, events_rx)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Writes one packet to the socket. Concurrent callers serialize on the
    /// writer lock, so frames never interleave mid-packet.
    pub async fn send(&self, packet: &Packet) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let bytes = encode_packet(packet);
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::Closed)?;
        writer.write_all(&bytes).await?;
        trace!(
            method = %packet.method,
            packet_id = packet.packet_id,
            body_len = packet.body.len(),
            "sent packet"
        );
        Ok(())
    }

    /// Closes the connection locally: stops the read loop and drops the
    /// write half. No [`ConnectionEvent::Closed`] fires for a local close.
    ///
    /// Synchronous so session teardown works from non-async contexts. If a
    /// send is mid-write the writer lock is contended; the closed flag still
    /// rejects every later send, and the write half drops with the
    /// connection.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.read_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            *writer = None;
        }
        debug!(peer = %self.peer, "connection closed locally");
    }

    async fn read_loop(
        self: Arc<Self>,
        mut reader: OwnedReadHalf,
        events: mpsc::Sender<ConnectionEvent>,
    ) {
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    self.emit_closed(&events, CloseReason::PeerClosed).await;
                    return;
                }
                Ok(n) => n,
                Err(e) => {
                    self.emit_closed(&events, CloseReason::Io(e.to_string()))
                        .await;
                    return;
                }
            };
            decoder.extend(&buf[..n]);
            loop {
                match decoder.try_next() {
                    Ok(Some(packet)) => {
                        trace!(
                            method = %packet.method,
                            packet_id = packet.packet_id,
                            "received packet"
                        );
                        if events.send(ConnectionEvent::Packet(packet)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(peer = %self.peer, error = %e, "inbound stream corrupt");
                        self.emit_closed(&events, CloseReason::Corrupt(e.to_string()))
                            .await;
                        return;
                    }
                }
            }
        }
    }

    async fn emit_closed(&self, events: &mpsc::Sender<ConnectionEvent>, reason: CloseReason) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.writer.lock().await = None;
        debug!(peer = %self.peer, ?reason, "connection closed");
        let _ = events.send(ConnectionEvent::Closed(reason)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loco_core::Method;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (Arc<Connection>, mpsc::Receiver<ConnectionEvent>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) =
            tokio::join!(TcpStream::connect(addr), listener.accept());
        let (connection, events) =
            Connection::from_stream(client.unwrap(), addr.to_string());
        (connection, events, server.unwrap().0)
    }

    #[tokio::test]
    async fn test_send_frames_a_packet_onto_the_socket() {
        let (connection, _events, mut server) = connected_pair().await;
        let packet = Packet::new(3, Method::PING, Vec::new());
        connection.send(&packet).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.extend(&buf[..n]);
        let received = decoder.try_next().unwrap().unwrap();
        assert_eq!(received, packet);
    }

    #[tokio::test]
    async fn test_inbound_bytes_become_packet_events() {
        let (_connection, mut events, mut server) = connected_pair().await;
        let packet = Packet::new(9, Method::MSG, vec![1, 2, 3]);
        server.write_all(&encode_packet(&packet)).await.unwrap();

        match events.recv().await {
            Some(ConnectionEvent::Packet(p)) => assert_eq!(p, packet),
            other => panic!("expected packet event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_peer_close_emits_closed_exactly_once() {
        let (connection, mut events, server) = connected_pair().await;
        drop(server);

        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Closed(CloseReason::PeerClosed))
        ));
        assert!(events.recv().await.is_none());
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_corrupt_stream_emits_closed_with_corrupt_reason() {
        let (_connection, mut events, mut server) = connected_pair().await;
        // A header whose body length exceeds the decoder's cap.
        let mut bad = vec![0u8; 22];
        bad[6..9].copy_from_slice(b"MSG");
        bad[18..22].copy_from_slice(&u32::MAX.to_le_bytes());
        server.write_all(&bad).await.unwrap();

        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Closed(CloseReason::Corrupt(_)))
        ));
    }

    #[tokio::test]
    async fn test_local_close_suppresses_closed_event_and_rejects_sends() {
        let (connection, mut events, _server) = connected_pair().await;
        connection.close();

        assert!(events.recv().await.is_none());
        let err = connection
            .send(&Packet::new(1, Method::PING, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Closed));
    }
}
