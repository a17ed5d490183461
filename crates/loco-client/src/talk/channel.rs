//! Channel entities: per-channel membership, metadata, and last-message
//! tracking.
//!
//! The member table never contains the client's own user. Incremental
//! membership pushes mutate it one user at a time; periodic reconciliation
//! against an authoritative snapshot converges it while emitting the same
//! join/left events an incremental push would have.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use loco_core::protocol::payloads::{ChannelData, ChannelInfoData, ChannelMeta, MemberData};
use loco_core::types::ChannelType;
use loco_core::{ChannelId, LogId, UserId};

use crate::error::ClientError;
use crate::events::{ChannelEvent, EventBus};
use crate::talk::chat::Chat;
use crate::talk::user::ChatUser;

/// How long a reconciled snapshot stays fresh before the owner should
/// request a new one.
pub const INFO_UPDATE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Detailed channel state filled in by reconciliation.
#[derive(Debug)]
pub struct ChannelInfo {
    channel_type: ChannelType,
    is_direct: bool,
    meta_list: Vec<ChannelMeta>,
    members: HashMap<UserId, ChatUser>,
    info_loaded: bool,
    last_info_update: Option<Instant>,
}

impl ChannelInfo {
    fn new(channel_type: ChannelType) -> ChannelInfo {
        ChannelInfo {
            channel_type,
            is_direct: channel_type == ChannelType::DirectChat,
            meta_list: Vec::new(),
            members: HashMap::new(),
            info_loaded: false,
            last_info_update: None,
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn is_direct(&self) -> bool {
        self.is_direct
    }

    pub fn meta_list(&self) -> &[ChannelMeta] {
        &self.meta_list
    }

    pub fn member(&self, user_id: UserId) -> Option<&ChatUser> {
        self.members.get(&user_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &ChatUser> {
        self.members.values()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether a reconciled snapshot is missing or older than
    /// [`INFO_UPDATE_INTERVAL`].
    pub fn needs_refresh(&self, now: Instant) -> bool {
        match self.last_info_update {
            Some(at) if self.info_loaded => now.duration_since(at) >= INFO_UPDATE_INTERVAL,
            _ => true,
        }
    }
}

/// One chat channel held by the entity store. Lives from login (or a sync
/// join) until the client leaves the channel.
#[derive(Debug)]
pub struct ChatChannel {
    id: ChannelId,
    last_chat: Option<Chat>,
    info: ChannelInfo,
}

impl ChatChannel {
    pub fn new(id: ChannelId, channel_type: ChannelType) -> ChatChannel {
        ChatChannel {
            id,
            last_chat: None,
            info: ChannelInfo::new(channel_type),
        }
    }

    /// Builds a channel from handshake or sync-join data. Members are
    /// seeded silently; the initial roster is state, not activity, so no
    /// join events fire. The client's own user is excluded.
    pub fn from_data(data: ChannelData, client_user_id: UserId) -> ChatChannel {
        let mut channel = ChatChannel::new(data.channel_id, data.channel_type);
        for member in &data.members {
            if member.user_id == client_user_id {
                continue;
            }
            channel
                .info
                .members
                .insert(member.user_id, ChatUser::from_member(member));
        }
        channel.last_chat = data.last_chat.map(Chat::from_data);
        channel
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn last_chat(&self) -> Option<&Chat> {
        self.last_chat.as_ref()
    }

    pub fn info(&self) -> &ChannelInfo {
        &self.info
    }

    /// The optimistic log id for the next outbound message: one past the
    /// newest seen message, or 0 for a channel with no history.
    pub fn next_message_id(&self) -> LogId {
        match &self.last_chat {
            Some(chat) => chat.log_id + 1,
            None => 0,
        }
    }

    /// Whether `user_id` is in this channel from this client's perspective.
    /// The client's own user is always a member of its own channels even
    /// though the member table never stores it.
    pub fn has_member(&self, user_id: UserId, client_user_id: UserId) -> bool {
        user_id == client_user_id || self.info.members.contains_key(&user_id)
    }

    /// Applies an inbound chat and advances the last-message tracker.
    ///
    /// A chat carrying a foreign channel id means the routing layer and the
    /// server disagree about state; the tracker is left untouched so the
    /// channel stays internally consistent.
    pub fn chat_received(&mut self, chat: Chat, bus: &EventBus) -> Result<(), ClientError> {
        if chat.channel_id != self.id {
            return Err(ClientError::ProtocolInvariantViolation(format!(
                "chat for channel {} delivered to channel {}",
                chat.channel_id, self.id
            )));
        }
        self.last_chat = Some(chat.clone());
        bus.publish_channel(self.id, ChannelEvent::Message(chat));
        Ok(())
    }

    /// Applies a remote member join push.
    pub fn member_joined(
        &mut self,
        member: &MemberData,
        feed: &str,
        client_user_id: UserId,
        bus: &EventBus,
    ) -> Result<ChatUser, ClientError> {
        if member.user_id == client_user_id {
            return Err(ClientError::ForbiddenOperation);
        }
        if self.info.members.contains_key(&member.user_id) {
            return Err(ClientError::DuplicateJoin(member.user_id));
        }
        let user = ChatUser::from_member(member);
        self.info.members.insert(user.id, user.clone());
        bus.publish_channel(
            self.id,
            ChannelEvent::Join {
                user: user.clone(),
                feed: feed.to_string(),
            },
        );
        Ok(user)
    }

    /// Applies a remote member leave push.
    pub fn member_left(
        &mut self,
        user_id: UserId,
        feed: &str,
        client_user_id: UserId,
        bus: &EventBus,
    ) -> Result<ChatUser, ClientError> {
        if user_id == client_user_id {
            return Err(ClientError::ForbiddenOperation);
        }
        let user = self
            .info
            .members
            .remove(&user_id)
            .ok_or(ClientError::UnknownUser(user_id))?;
        bus.publish_channel(
            self.id,
            ChannelEvent::Left {
                user: user.clone(),
                feed: feed.to_string(),
            },
        );
        Ok(user)
    }

    /// Converges the member table onto an authoritative snapshot.
    ///
    /// Additions and in-place profile updates are applied first, removals
    /// after, so a concurrent observer of the event stream never sees the
    /// table pass through an understated membership. Reconciliation events
    /// carry an empty feed since the server rendered no notice for them.
    pub fn reconcile(
        &mut self,
        info: ChannelInfoData,
        client_user_id: UserId,
        now: Instant,
        bus: &EventBus,
    ) -> Result<(), ClientError> {
        if info.channel_id != self.id {
            return Err(ClientError::ProtocolInvariantViolation(format!(
                "channel info for {} delivered to channel {}",
                info.channel_id, self.id
            )));
        }

        let mut incoming: HashMap<UserId, &MemberData> = HashMap::new();
        for member in &info.members {
            if member.user_id == client_user_id {
                continue;
            }
            incoming.insert(member.user_id, member);
        }

        let mut joined = 0usize;
        for (user_id, member) in &incoming {
            match self.info.members.entry(*user_id) {
                Entry::Occupied(mut slot) => slot.get_mut().profile.update_from(member),
                Entry::Vacant(slot) => {
                    let user = ChatUser::from_member(member);
                    slot.insert(user.clone());
                    bus.publish_channel(
                        self.id,
                        ChannelEvent::Join {
                            user,
                            feed: String::new(),
                        },
                    );
                    joined += 1;
                }
            }
        }

        let departed: Vec<UserId> = self
            .info
            .members
            .keys()
            .filter(|id| !incoming.contains_key(id))
            .copied()
            .collect();
        for user_id in &departed {
            if let Some(user) = self.info.members.remove(user_id) {
                bus.publish_channel(
                    self.id,
                    ChannelEvent::Left {
                        user,
                        feed: String::new(),
                    },
                );
            }
        }

        self.info.channel_type = info.channel_type;
        self.info.is_direct = info.is_direct;
        self.info.meta_list = info.meta_list;
        self.info.info_loaded = true;
        self.info.last_info_update = Some(now);

        debug!(
            channel_id = self.id,
            joined,
            left = departed.len(),
            members = self.info.members.len(),
            "reconciled channel info"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ClientEvent;
    use loco_core::ChatType;

    const CLIENT_USER: UserId = 1000;

    fn member(id: UserId, nickname: &str) -> MemberData {
        MemberData {
            user_id: id,
            nickname: nickname.to_string(),
            profile_image_url: None,
        }
    }

    fn info_data(channel_id: ChannelId, members: Vec<MemberData>) -> ChannelInfoData {
        ChannelInfoData {
            channel_id,
            channel_type: ChannelType::Group,
            is_direct: false,
            meta_list: Vec::new(),
            members,
        }
    }

    fn chat(channel_id: ChannelId, log_id: LogId) -> Chat {
        Chat {
            log_id,
            channel_id,
            author_id: 5,
            chat_type: ChatType::Text,
            text: "hi".to_string(),
            sent_at: 1_700_000_000,
        }
    }

    fn drain_membership(rx: &mut tokio::sync::broadcast::Receiver<ClientEvent>) -> (usize, usize) {
        let mut joins = 0;
        let mut lefts = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                ClientEvent::UserJoined { .. } => joins += 1,
                ClientEvent::UserLeft { .. } => lefts += 1,
                _ => {}
            }
        }
        (joins, lefts)
    }

    #[test]
    fn test_next_message_id_empty_channel_is_zero() {
        let channel = ChatChannel::new(7, ChannelType::Group);
        assert_eq!(channel.next_message_id(), 0);
    }

    #[test]
    fn test_next_message_id_is_one_past_last_chat() {
        let bus = EventBus::new();
        let mut channel = ChatChannel::new(7, ChannelType::Group);
        channel.chat_received(chat(7, 5), &bus).unwrap();
        assert_eq!(channel.next_message_id(), 6);
    }

    #[test]
    fn test_chat_for_wrong_channel_is_rejected_and_leaves_state() {
        let bus = EventBus::new();
        let mut channel = ChatChannel::new(7, ChannelType::Group);
        channel.chat_received(chat(7, 5), &bus).unwrap();

        let err = channel.chat_received(chat(8, 9), &bus).unwrap_err();
        assert!(matches!(err, ClientError::ProtocolInvariantViolation(_)));
        assert_eq!(channel.last_chat().unwrap().log_id, 5);
        assert_eq!(channel.next_message_id(), 6);
    }

    #[test]
    fn test_member_join_then_duplicate_join_fails() {
        let bus = EventBus::new();
        let mut channel = ChatChannel::new(7, ChannelType::Group);

        channel
            .member_joined(&member(5, "ada"), "ada joined", CLIENT_USER, &bus)
            .unwrap();
        let err = channel
            .member_joined(&member(5, "ada"), "ada joined", CLIENT_USER, &bus)
            .unwrap_err();
        assert!(matches!(err, ClientError::DuplicateJoin(5)));
    }

    #[test]
    fn test_member_left_unknown_user_fails() {
        let bus = EventBus::new();
        let mut channel = ChatChannel::new(7, ChannelType::Group);
        let err = channel
            .member_left(99, "gone", CLIENT_USER, &bus)
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownUser(99)));
    }

    #[test]
    fn test_membership_pushes_never_apply_to_client_user() {
        let bus = EventBus::new();
        let mut channel = ChatChannel::new(7, ChannelType::Group);

        let join = channel.member_joined(&member(CLIENT_USER, "me"), "", CLIENT_USER, &bus);
        assert!(matches!(join, Err(ClientError::ForbiddenOperation)));
        let left = channel.member_left(CLIENT_USER, "", CLIENT_USER, &bus);
        assert!(matches!(left, Err(ClientError::ForbiddenOperation)));
    }

    #[test]
    fn test_has_member_special_cases_client_user() {
        let channel = ChatChannel::new(7, ChannelType::Group);
        assert!(channel.has_member(CLIENT_USER, CLIENT_USER));
        assert!(!channel.has_member(5, CLIENT_USER));
    }

    #[test]
    fn test_reconcile_converges_and_counts_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut channel = ChatChannel::new(7, ChannelType::Group);
        let now = Instant::now();

        // [] -> [A, B]: two joins.
        channel
            .reconcile(
                info_data(7, vec![member(1, "a"), member(2, "b")]),
                CLIENT_USER,
                now,
                &bus,
            )
            .unwrap();
        assert_eq!(drain_membership(&mut rx), (2, 0));

        // [A, B] -> [B]: one left.
        channel
            .reconcile(info_data(7, vec![member(2, "b")]), CLIENT_USER, now, &bus)
            .unwrap();
        assert_eq!(drain_membership(&mut rx), (0, 1));
        assert!(channel.info().member(2).is_some());
        assert!(channel.info().member(1).is_none());
        assert_eq!(channel.info().member_count(), 1);
    }

    #[test]
    fn test_reconcile_updates_profile_without_rejoin() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut channel = ChatChannel::new(7, ChannelType::Group);
        let now = Instant::now();

        channel
            .reconcile(info_data(7, vec![member(1, "a")]), CLIENT_USER, now, &bus)
            .unwrap();
        drain_membership(&mut rx);

        channel
            .reconcile(
                info_data(7, vec![member(1, "a-renamed")]),
                CLIENT_USER,
                now,
                &bus,
            )
            .unwrap();
        assert_eq!(drain_membership(&mut rx), (0, 0));
        assert_eq!(channel.info().member(1).unwrap().profile.nickname, "a-renamed");
    }

    #[test]
    fn test_reconcile_excludes_client_user() {
        let bus = EventBus::new();
        let mut channel = ChatChannel::new(7, ChannelType::Group);

        channel
            .reconcile(
                info_data(7, vec![member(CLIENT_USER, "me"), member(1, "a")]),
                CLIENT_USER,
                Instant::now(),
                &bus,
            )
            .unwrap();
        assert!(channel.info().member(CLIENT_USER).is_none());
        assert_eq!(channel.info().member_count(), 1);
    }

    #[test]
    fn test_reconcile_wrong_channel_id_is_rejected() {
        let bus = EventBus::new();
        let mut channel = ChatChannel::new(7, ChannelType::Group);
        let err = channel
            .reconcile(info_data(8, vec![]), CLIENT_USER, Instant::now(), &bus)
            .unwrap_err();
        assert!(matches!(err, ClientError::ProtocolInvariantViolation(_)));
        assert!(channel.info().needs_refresh(Instant::now()));
    }

    #[test]
    fn test_needs_refresh_after_interval() {
        let bus = EventBus::new();
        let mut channel = ChatChannel::new(7, ChannelType::Group);
        let loaded_at = Instant::now();
        channel
            .reconcile(info_data(7, vec![]), CLIENT_USER, loaded_at, &bus)
            .unwrap();

        assert!(!channel.info().needs_refresh(loaded_at));
        assert!(channel
            .info()
            .needs_refresh(loaded_at + INFO_UPDATE_INTERVAL));
    }

    #[test]
    fn test_from_data_seeds_members_and_last_chat_silently() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let data = ChannelData {
            channel_id: 7,
            channel_type: ChannelType::Group,
            members: vec![member(CLIENT_USER, "me"), member(1, "a")],
            last_chat: Some(loco_core::protocol::payloads::ChatData {
                log_id: 41,
                channel_id: 7,
                author_id: 1,
                chat_type: ChatType::Text,
                text: "seeded".to_string(),
                sent_at: 1_700_000_000,
            }),
        };

        let channel = ChatChannel::from_data(data, CLIENT_USER);

        assert_eq!(channel.info().member_count(), 1);
        assert_eq!(channel.next_message_id(), 42);
        assert_eq!(drain_membership(&mut rx), (0, 0));
    }
}
