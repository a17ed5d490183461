//! Chat message entity.

use loco_core::protocol::payloads::ChatData;
use loco_core::{ChannelId, ChatType, LogId, UserId};

/// One chat message, as held by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub log_id: LogId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub chat_type: ChatType,
    pub text: String,
    /// Seconds since Unix epoch, server clock.
    pub sent_at: i64,
}

impl Chat {
    pub fn from_data(data: ChatData) -> Chat {
        Chat {
            log_id: data.log_id,
            channel_id: data.channel_id,
            author_id: data.author_id,
            chat_type: data.chat_type,
            text: data.text,
            sent_at: data.sent_at,
        }
    }
}
