//! Typed packet bodies.
//!
//! Bodies are serde structs encoded with bincode. Each struct corresponds to
//! one method from [`crate::protocol::packet::Method`]; the session decodes
//! a body only after matching on the method, so a mismatched pairing shows
//! up as [`CodecError::MalformedBody`] rather than silently misparsing.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::protocol::codec::CodecError;
use crate::protocol::packet::Method;
use crate::types::{ChannelId, ChannelType, ChatType, LogId, UserId};

/// Encodes a typed body into bincode bytes.
pub fn encode_body<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::MalformedBody {
        method: String::from("<encode>"),
        detail: e.to_string(),
    })
}

/// Decodes a typed body, attributing failures to the packet's method.
pub fn decode_body<T: DeserializeOwned>(method: Method, bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::MalformedBody {
        method: method.as_str().to_string(),
        detail: e.to_string(),
    })
}

// ── Shared wire structs ───────────────────────────────────────────────────────

/// A member entry inside channel data or a membership push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberData {
    pub user_id: UserId,
    pub nickname: String,
    pub profile_image_url: Option<String>,
}

/// One chat log entry on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatData {
    pub log_id: LogId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub chat_type: ChatType,
    pub text: String,
    /// Seconds since Unix epoch, server clock.
    pub sent_at: i64,
}

/// A channel metadata entry (notice, profile, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub meta_type: i32,
    pub revision: i64,
    pub content: String,
}

/// Channel summary delivered in the handshake channel list and join pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    pub channel_id: ChannelId,
    pub channel_type: ChannelType,
    pub members: Vec<MemberData>,
    pub last_chat: Option<ChatData>,
}

/// Authoritative full channel info used for membership reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfoData {
    pub channel_id: ChannelId,
    pub channel_type: ChannelType,
    pub is_direct: bool,
    pub meta_list: Vec<ChannelMeta>,
    pub members: Vec<MemberData>,
}

// ── Requests and responses ────────────────────────────────────────────────────

/// `LOGINLIST` request: the handshake packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginListReq {
    pub device_uuid: String,
    /// Placeholder until the real client user id is known; the server
    /// answers with the authoritative id.
    pub user_id: UserId,
    pub access_token: String,
}

/// `LOGINLIST` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginListRes {
    /// 0 on success; otherwise a server-defined rejection code.
    pub status: i32,
    pub user_id: UserId,
    pub open_chat_token: i32,
    pub channel_list: Vec<ChannelData>,
}

/// `WRITE` one-way request: send a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteReq {
    pub channel_id: ChannelId,
    /// Optimistic local id; the server is the final authority and the
    /// inbound `MSG` echo reconciles it.
    pub msg_id: LogId,
    pub chat_type: ChatType,
    pub text: String,
}

/// `CHATINFO` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatInfoReq {
    pub channel_id: ChannelId,
}

/// `CHATINFO` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatInfoRes {
    pub status: i32,
    pub info: ChannelInfoData,
}

// ── Server pushes ─────────────────────────────────────────────────────────────

/// `MSG` push: an inbound chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgPush {
    pub channel_id: ChannelId,
    pub chat: ChatData,
}

/// `DECUNREAD` push: a member's read watermark advanced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecunreadPush {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub watermark: LogId,
}

/// `DELETEMSG` push: a message was deleted or hidden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMsgPush {
    pub channel_id: ChannelId,
    pub log_id: LogId,
    pub hidden: bool,
}

/// `NEWMEM` push: a remote member joined, with join feed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemberPush {
    pub channel_id: ChannelId,
    pub member: MemberData,
    pub feed: String,
}

/// `DELMEM` push: a remote member left, with leave feed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelMemberPush {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub feed: String,
}

/// `LEFT` push: this client is no longer a member of the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeftPush {
    pub channel_id: ChannelId,
}

/// `SYNCJOIN` push: this client was added to a new channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJoinPush {
    pub channel: ChannelData,
}

/// `KICKOUT` push: server-initiated forced disconnect. The raw code is kept
/// so unknown reasons survive the trip into [`crate::types::KickReason`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KickoutPush {
    pub reason: i32,
}
