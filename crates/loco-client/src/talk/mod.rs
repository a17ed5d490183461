//! Entity layer: channels, users, chats, and the store that owns them.
//!
//! All mutation flows through [`TalkStore`] on the facade's dispatch task,
//! so entity state has a single writer and readers see whole, consistent
//! snapshots behind the facade's lock.

pub mod channel;
pub mod chat;
pub mod user;

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, warn};

use loco_core::protocol::payloads::{ChannelData, ChannelInfoData, MemberData};
use loco_core::{ChannelId, UserId};

use crate::error::ClientError;
use crate::events::EventBus;
use crate::talk::channel::ChatChannel;
use crate::talk::chat::Chat;
use crate::talk::user::ChatUser;

/// Placeholder before the handshake reveals the authoritative client user
/// id. No real account uses a negative id.
const UNKNOWN_CLIENT_USER: UserId = -1;

/// Owner of every channel entity for one session.
pub struct TalkStore {
    client_user_id: UserId,
    channels: HashMap<ChannelId, ChatChannel>,
}

impl TalkStore {
    pub fn new() -> TalkStore {
        TalkStore {
            client_user_id: UNKNOWN_CLIENT_USER,
            channels: HashMap::new(),
        }
    }

    pub fn client_user_id(&self) -> UserId {
        self.client_user_id
    }

    pub fn set_client_user_id(&mut self, id: UserId) {
        self.client_user_id = id;
    }

    /// Replaces all channel state with the handshake's channel list. Called
    /// once per login, after the client user id is known.
    pub fn seed(&mut self, channel_list: Vec<ChannelData>) {
        self.channels = channel_list
            .into_iter()
            .map(|data| {
                (
                    data.channel_id,
                    ChatChannel::from_data(data, self.client_user_id),
                )
            })
            .collect();
        debug!(channels = self.channels.len(), "seeded channel list");
    }

    pub fn channel(&self, channel_id: ChannelId) -> Option<&ChatChannel> {
        self.channels.get(&channel_id)
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.keys().copied()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Registers a channel this client was just added to. A sync join for a
    /// channel already present replaces it with the fresher snapshot.
    pub fn register_channel(&mut self, data: ChannelData) -> ChannelId {
        let id = data.channel_id;
        if self.channels.contains_key(&id) {
            warn!(channel_id = id, "sync join for a known channel, replacing");
        }
        self.channels
            .insert(id, ChatChannel::from_data(data, self.client_user_id));
        id
    }

    /// Destroys a channel entity after this client left the channel.
    pub fn remove_channel(&mut self, channel_id: ChannelId) -> Option<ChatChannel> {
        self.channels.remove(&channel_id)
    }

    /// Routes an inbound chat to the channel the push envelope names.
    /// Routing deliberately ignores `chat.channel_id`: the channel itself
    /// checks it against its own id, so an envelope/chat disagreement
    /// surfaces as an invariant breach instead of being filed under the
    /// chat's claimed channel.
    pub fn chat_received(
        &mut self,
        channel_id: ChannelId,
        chat: Chat,
        bus: &EventBus,
    ) -> Result<(), ClientError> {
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(ClientError::UnknownChannel(channel_id))?;
        channel.chat_received(chat, bus)
    }

    /// Routes a remote member join push to its channel.
    pub fn member_joined(
        &mut self,
        channel_id: ChannelId,
        member: &MemberData,
        feed: &str,
        bus: &EventBus,
    ) -> Result<ChatUser, ClientError> {
        let client_user_id = self.client_user_id;
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(ClientError::UnknownChannel(channel_id))?;
        channel.member_joined(member, feed, client_user_id, bus)
    }

    /// Routes a remote member leave push to its channel.
    pub fn member_left(
        &mut self,
        channel_id: ChannelId,
        user_id: UserId,
        feed: &str,
        bus: &EventBus,
    ) -> Result<ChatUser, ClientError> {
        let client_user_id = self.client_user_id;
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(ClientError::UnknownChannel(channel_id))?;
        channel.member_left(user_id, feed, client_user_id, bus)
    }

    /// Reconciles a channel against an authoritative info snapshot. The
    /// channel must already be registered.
    pub fn reconcile(
        &mut self,
        channel_id: ChannelId,
        info: ChannelInfoData,
        now: Instant,
        bus: &EventBus,
    ) -> Result<(), ClientError> {
        let client_user_id = self.client_user_id;
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(ClientError::UnknownChannel(channel_id))?;
        channel.reconcile(info, client_user_id, now, bus)
    }
}

impl Default for TalkStore {
    fn default() -> Self {
        Self::new()
    }
}
