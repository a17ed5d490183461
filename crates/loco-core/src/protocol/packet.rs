//! The LOCO packet model.
//!
//! Wire format (all multi-byte integers little-endian):
//! ```text
//! [packet_id:4][status:2][method:11][body_type:1][body_len:4][body:N]
//! ```
//! Total header size: 22 bytes. The method is an ASCII name NUL-padded to
//! 11 bytes. `packet_id` is the correlation id pairing a request with its
//! response; server pushes carry an id the client never allocated.

use std::fmt;

use thiserror::Error;

/// Total size of the packet header in bytes.
pub const HEADER_SIZE: usize = 22;

/// Fixed width of the method field in the header.
pub const METHOD_SIZE: usize = 11;

/// Upper bound on a declared body length. A frame declaring more than this
/// is treated as corrupt rather than allocated.
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Body type tag for an unencrypted bincode body.
pub const BODY_TYPE_PLAIN: u8 = 0;

/// Errors from constructing a [`Method`] out of arbitrary input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MethodError {
    #[error("method name too long: {0} bytes (max {METHOD_SIZE})")]
    TooLong(usize),
    #[error("method name must be non-empty printable ASCII")]
    InvalidBytes,
}

/// An 11-byte NUL-padded ASCII method name.
///
/// Methods identify the operation a packet carries, e.g. `LOGINLIST` for the
/// handshake or `MSG` for an inbound chat push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method([u8; METHOD_SIZE]);

impl Method {
    /// Handshake request; response carries the channel list and tokens.
    pub const LOGIN_LIST: Method = Method::from_static(b"LOGINLIST");
    /// Outbound one-way chat message write.
    pub const WRITE: Method = Method::from_static(b"WRITE");
    /// Inbound chat message push.
    pub const MSG: Method = Method::from_static(b"MSG");
    /// Read-watermark (read receipt) push.
    pub const DECUNREAD: Method = Method::from_static(b"DECUNREAD");
    /// Message deletion push.
    pub const DELETE_MSG: Method = Method::from_static(b"DELETEMSG");
    /// Remote member joined a channel.
    pub const NEW_MEM: Method = Method::from_static(b"NEWMEM");
    /// Remote member left a channel.
    pub const DEL_MEM: Method = Method::from_static(b"DELMEM");
    /// This client left (or was removed from) a channel.
    pub const LEFT: Method = Method::from_static(b"LEFT");
    /// This client was added to a new channel.
    pub const SYNC_JOIN: Method = Method::from_static(b"SYNCJOIN");
    /// Full channel info request/response (membership reconciliation).
    pub const CHAT_INFO: Method = Method::from_static(b"CHATINFO");
    /// Server-initiated forced disconnect.
    pub const KICKOUT: Method = Method::from_static(b"KICKOUT");
    /// Liveness probe.
    pub const PING: Method = Method::from_static(b"PING");

    const fn from_static(name: &[u8]) -> Method {
        let mut buf = [0u8; METHOD_SIZE];
        let mut i = 0;
        while i < name.len() {
            buf[i] = name[i];
            i += 1;
        }
        Method(buf)
    }

    /// Builds a method from a runtime string, validating length and charset.
    pub fn new(name: &str) -> Result<Method, MethodError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(MethodError::InvalidBytes);
        }
        if bytes.len() > METHOD_SIZE {
            return Err(MethodError::TooLong(bytes.len()));
        }
        Ok(Method::from_static_runtime(bytes))
    }

    fn from_static_runtime(name: &[u8]) -> Method {
        let mut buf = [0u8; METHOD_SIZE];
        buf[..name.len()].copy_from_slice(name);
        Method(buf)
    }

    /// Reads a method out of the fixed header field. Padding NULs are
    /// allowed only as a suffix; anything else is rejected.
    pub fn from_wire(raw: &[u8; METHOD_SIZE]) -> Result<Method, MethodError> {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(METHOD_SIZE);
        let name = &raw[..end];
        if name.is_empty() || !name.iter().all(|b| b.is_ascii_graphic()) {
            return Err(MethodError::InvalidBytes);
        }
        if raw[end..].iter().any(|&b| b != 0) {
            return Err(MethodError::InvalidBytes);
        }
        Ok(Method::from_static_runtime(name))
    }

    /// The raw NUL-padded header bytes.
    pub fn as_bytes(&self) -> &[u8; METHOD_SIZE] {
        &self.0
    }

    /// The method name without padding.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(METHOD_SIZE);
        // Constructors only admit ASCII, which is always valid UTF-8.
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One framed message on the wire.
///
/// Transient: owned by the codec and session only for the duration of a
/// single exchange. `packet_id` pairs a request with its response; pushes
/// from the server reuse ids the client never registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Correlation id. Allocated by [`super::PacketIdCounter`] for requests.
    pub packet_id: u32,
    /// Status code; 0 for requests, server-defined for responses.
    pub status_code: u16,
    /// Operation tag.
    pub method: Method,
    /// Body encoding tag; [`BODY_TYPE_PLAIN`] for bincode bodies.
    pub body_type: u8,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl Packet {
    /// Builds a plain-body request packet.
    pub fn new(packet_id: u32, method: Method, body: Vec<u8>) -> Packet {
        Packet {
            packet_id,
            status_code: 0,
            method,
            body_type: BODY_TYPE_PLAIN,
            body,
        }
    }
}
