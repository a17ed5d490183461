//! Protocol module containing the packet model, framing codec, correlation
//! counter, and typed payloads.

pub mod codec;
pub mod correlation;
pub mod packet;
pub mod payloads;

pub use codec::{encode_packet, CodecError, FrameDecoder};
pub use correlation::PacketIdCounter;
pub use packet::{Method, Packet, HEADER_SIZE, MAX_BODY_SIZE, METHOD_SIZE};
pub use payloads::*;
