//! Id aliases and protocol-level enumerations shared by every layer.
//!
//! All entity ids are native 64-bit integers and are used directly as map
//! keys; they are never stringified on the client side.

use serde::{Deserialize, Serialize};

/// Identifies a chat channel (room).
pub type ChannelId = i64;

/// Identifies a user account.
pub type UserId = i64;

/// Identifies a single chat message within a channel. Monotonically
/// increasing per channel.
pub type LogId = i64;

/// Message content type carried in a chat log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatType {
    Feed,
    Text,
    Photo,
    Video,
    Contact,
    Audio,
    File,
    /// A type code this client version does not know about. The raw code is
    /// preserved so it can be forwarded or logged.
    Unknown(i32),
}

impl ChatType {
    /// Returns the numeric code used by the server.
    pub fn code(self) -> i32 {
        match self {
            ChatType::Feed => 0,
            ChatType::Text => 1,
            ChatType::Photo => 2,
            ChatType::Video => 3,
            ChatType::Contact => 4,
            ChatType::Audio => 5,
            ChatType::File => 18,
            ChatType::Unknown(code) => code,
        }
    }
}

impl From<i32> for ChatType {
    fn from(code: i32) -> Self {
        match code {
            0 => ChatType::Feed,
            1 => ChatType::Text,
            2 => ChatType::Photo,
            3 => ChatType::Video,
            4 => ChatType::Contact,
            5 => ChatType::Audio,
            18 => ChatType::File,
            other => ChatType::Unknown(other),
        }
    }
}

/// Room type reported by the server for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    DirectChat,
    Group,
    OpenDirect,
    OpenGroup,
}

/// Reason code attached to a server-initiated forced disconnect.
///
/// Consumers branch on this to decide whether to relogin (e.g. after a
/// server change) or give up (account deleted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KickReason {
    /// The account logged in from another device.
    LoginAnother,
    /// The account no longer exists.
    AccountDeleted,
    /// The server asked the client to reconnect elsewhere.
    ChangeServer,
    /// A reason code this client version does not know about.
    Unknown(i32),
}

impl KickReason {
    /// Returns the numeric code used by the server.
    pub fn code(self) -> i32 {
        match self {
            KickReason::LoginAnother => 0,
            KickReason::AccountDeleted => 1,
            KickReason::ChangeServer => 2,
            KickReason::Unknown(code) => code,
        }
    }
}

impl From<i32> for KickReason {
    fn from(code: i32) -> Self {
        match code {
            0 => KickReason::LoginAnother,
            1 => KickReason::AccountDeleted,
            2 => KickReason::ChangeServer,
            other => KickReason::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_type_round_trips_through_code() {
        for ty in [
            ChatType::Feed,
            ChatType::Text,
            ChatType::Photo,
            ChatType::Video,
            ChatType::Contact,
            ChatType::Audio,
            ChatType::File,
        ] {
            assert_eq!(ChatType::from(ty.code()), ty);
        }
    }

    #[test]
    fn test_chat_type_preserves_unknown_code() {
        let ty = ChatType::from(9999);
        assert_eq!(ty, ChatType::Unknown(9999));
        assert_eq!(ty.code(), 9999);
    }

    #[test]
    fn test_kick_reason_round_trips_through_code() {
        for reason in [
            KickReason::LoginAnother,
            KickReason::AccountDeleted,
            KickReason::ChangeServer,
        ] {
            assert_eq!(KickReason::from(reason.code()), reason);
        }
    }

    #[test]
    fn test_kick_reason_preserves_unknown_code() {
        assert_eq!(KickReason::from(-7), KickReason::Unknown(-7));
    }
}
