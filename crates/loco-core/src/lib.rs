//! # loco-core
//!
//! Shared library for the LOCO chat client containing the binary packet
//! codec, typed request/response/push payloads, and the id/enum vocabulary
//! used by the session and entity layers.
//!
//! This crate has zero dependencies on sockets, OS APIs, or the async
//! runtime: it turns bytes into [`protocol::Packet`]s and back, nothing more.
//! The connection and session machinery lives in `loco-client`.

pub mod protocol;
pub mod types;

pub use protocol::codec::{encode_packet, CodecError, FrameDecoder};
pub use protocol::correlation::PacketIdCounter;
pub use protocol::packet::{Method, Packet};
pub use types::{ChannelId, ChatType, KickReason, LogId, UserId};
