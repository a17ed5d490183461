//! Binary framing codec for LOCO packets.
//!
//! Encoding is a pure function of one [`Packet`]. Decoding is not: the
//! transport delivers frames split across arbitrary I/O chunks, so
//! [`FrameDecoder`] is a stateful accumulator that is fed raw bytes and
//! yields complete packets as they become available.
//!
//! A malformed header (oversized body length, garbage method bytes) is a
//! protocol-level corruption: the byte stream can no longer be trusted, the
//! decoder poisons itself, and the connection must be torn down.

use thiserror::Error;

use crate::protocol::packet::{Method, Packet, HEADER_SIZE, MAX_BODY_SIZE, METHOD_SIZE};

/// Errors from the framing codec and body serialization.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// The frame header is unusable; fatal to the connection.
    #[error("corrupt frame: {reason}")]
    FrameCorrupt { reason: String },

    /// A complete frame arrived but its body failed to deserialize.
    #[error("malformed {method} body: {detail}")]
    MalformedBody { method: String, detail: String },
}

/// Encodes a [`Packet`] into header + body bytes.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + packet.body.len());
    buf.extend_from_slice(&packet.packet_id.to_le_bytes());
    buf.extend_from_slice(&packet.status_code.to_le_bytes());
    buf.extend_from_slice(packet.method.as_bytes());
    buf.push(packet.body_type);
    buf.extend_from_slice(&(packet.body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&packet.body);
    buf
}

/// Stateful deframer over an incoming byte stream.
///
/// Feed transport chunks with [`extend`](FrameDecoder::extend), then drain
/// complete packets with [`try_next`](FrameDecoder::try_next). Once a frame
/// is found corrupt the decoder stays poisoned: every later call returns the
/// same error, because nothing after a bad header can be framed reliably.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    poisoned: Option<String>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> FrameDecoder {
        FrameDecoder::default()
    }

    /// Appends raw transport bytes to the accumulator.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of buffered, not-yet-consumed bytes.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to decode the next complete packet.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// [`CodecError::FrameCorrupt`] when the header declares an impossible
    /// body length or the method field holds non-ASCII bytes.
    pub fn try_next(&mut self) -> Result<Option<Packet>, CodecError> {
        if let Some(reason) = &self.poisoned {
            return Err(CodecError::FrameCorrupt {
                reason: reason.clone(),
            });
        }

        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let packet_id = u32::from_le_bytes(self.buf[0..4].try_into().unwrap());
        let status_code = u16::from_le_bytes(self.buf[4..6].try_into().unwrap());

        let mut method_raw = [0u8; METHOD_SIZE];
        method_raw.copy_from_slice(&self.buf[6..6 + METHOD_SIZE]);
        let method = match Method::from_wire(&method_raw) {
            Ok(m) => m,
            Err(e) => return Err(self.poison(format!("bad method field: {e}"))),
        };

        let body_type = self.buf[17];
        let body_len = u32::from_le_bytes(self.buf[18..22].try_into().unwrap()) as usize;
        if body_len > MAX_BODY_SIZE {
            return Err(self.poison(format!(
                "declared body length {body_len} exceeds cap {MAX_BODY_SIZE}"
            )));
        }

        let total = HEADER_SIZE + body_len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let body = self.buf[HEADER_SIZE..total].to_vec();
        self.buf.drain(..total);

        Ok(Some(Packet {
            packet_id,
            status_code,
            method,
            body_type,
            body,
        }))
    }

    fn poison(&mut self, reason: String) -> CodecError {
        self.poisoned = Some(reason.clone());
        CodecError::FrameCorrupt { reason }
    }
}
