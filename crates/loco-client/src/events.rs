//! Typed event surface.
//!
//! Events flow on tokio broadcast channels: one global stream of
//! [`ClientEvent`] plus a lazily-created per-channel stream of
//! [`ChannelEvent`]. Channel-scoped publishes are forwarded to the global
//! stream so a consumer can watch one channel or everything, never needing
//! string event names. Publishing with no subscribers is a no-op.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::trace;

use loco_core::{ChannelId, KickReason, LogId, UserId};

use crate::talk::chat::Chat;
use crate::talk::user::{ChatUser, ClientUser};

/// Default buffer depth for each broadcast stream. A consumer that lags
/// past this many events observes a `Lagged` error, not a client stall.
pub const EVENT_BUFFER: usize = 256;

/// Events scoped to a single channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A chat message arrived in the channel.
    Message(Chat),
    /// A remote member joined. `feed` is the server-rendered join notice.
    Join { user: ChatUser, feed: String },
    /// A remote member left. `feed` is the server-rendered leave notice.
    Left { user: ChatUser, feed: String },
}

/// Client-wide events, including forwarded copies of every channel event.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The login sequence completed and the session is live.
    LoggedIn(ClientUser),
    /// The session ended. Carries the server's kick reason, or
    /// [`KickReason::Unknown`] when the transport dropped without one.
    Disconnected(KickReason),
    /// A chat message arrived in some channel.
    Message(Chat),
    /// A member's read watermark advanced.
    MessageRead {
        channel_id: ChannelId,
        reader_id: UserId,
        watermark: LogId,
    },
    /// A message was deleted, or hidden by moderation.
    MessageDeleted {
        channel_id: ChannelId,
        log_id: LogId,
        hidden: bool,
    },
    /// A remote member joined a channel.
    UserJoined {
        channel_id: ChannelId,
        user: ChatUser,
        feed: String,
    },
    /// A remote member left a channel.
    UserLeft {
        channel_id: ChannelId,
        user: ChatUser,
        feed: String,
    },
    /// This client was added to a new channel.
    ChannelJoined(ChannelId),
    /// This client left, or was removed from, a channel.
    ChannelLeft(ChannelId),
}

/// Owner of the broadcast senders.
///
/// Cheap to share behind an `Arc`; subscription and publishing never block
/// on consumers.
pub struct EventBus {
    global: broadcast::Sender<ClientEvent>,
    channels: Mutex<HashMap<ChannelId, broadcast::Sender<ChannelEvent>>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        let (global, _) = broadcast::channel(EVENT_BUFFER);
        EventBus {
            global,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to the global event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.global.subscribe()
    }

    /// Subscribes to one channel's event stream, creating it on first use.
    pub fn subscribe_channel(&self, channel_id: ChannelId) -> broadcast::Receiver<ChannelEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel_id)
            .or_insert_with(|| broadcast::channel(EVENT_BUFFER).0)
            .subscribe()
    }

    /// Publishes a client-wide event.
    pub fn publish(&self, event: ClientEvent) {
        trace!(?event, "publish");
        let _ = self.global.send(event);
    }

    /// Publishes a channel-scoped event, then forwards it to the global
    /// stream with the channel id attached.
    pub fn publish_channel(&self, channel_id: ChannelId, event: ChannelEvent) {
        {
            let channels = self.channels.lock().unwrap();
            if let Some(sender) = channels.get(&channel_id) {
                let _ = sender.send(event.clone());
            }
        }
        self.publish(Self::forward(channel_id, event));
    }

    /// Drops a channel's stream after the client leaves the channel.
    pub fn drop_channel(&self, channel_id: ChannelId) {
        self.channels.lock().unwrap().remove(&channel_id);
    }

    fn forward(channel_id: ChannelId, event: ChannelEvent) -> ClientEvent {
        match event {
            ChannelEvent::Message(chat) => ClientEvent::Message(chat),
            ChannelEvent::Join { user, feed } => ClientEvent::UserJoined {
                channel_id,
                user,
                feed,
            },
            ChannelEvent::Left { user, feed } => ClientEvent::UserLeft {
                channel_id,
                user,
                feed,
            },
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
