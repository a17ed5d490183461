//! # loco-client
//!
//! Client for the LOCO chat protocol: authentication, a persistent duplex
//! connection with correlation-id request routing, a channel/user entity
//! store kept consistent with server pushes, and a typed event surface.
//!
//! The consumer-facing entry point is [`TalkClient`]; everything inbound
//! arrives on the broadcast streams it hands out:
//!
//! ```no_run
//! use std::sync::Arc;
//! use loco_client::{ClientConfig, ClientEvent, TalkClient};
//!
//! # async fn run(auth: Arc<dyn loco_client::AuthApi>) -> anyhow::Result<()> {
//! let client = TalkClient::new(ClientConfig::default(), auth);
//! let mut events = client.events();
//! client.login("user@example.com", "secret", false).await?;
//! while let Ok(event) = events.recv().await {
//!     if let ClientEvent::Message(chat) = event {
//!         println!("[{}] {}", chat.channel_id, chat.text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod talk;

pub use auth::{AccessCredential, ApiResponse, AuthApi, ClientSettings, LoginForm};
pub use client::TalkClient;
pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use events::{ChannelEvent, ClientEvent, EventBus};
pub use network::session::{NetworkSession, SessionSignal, SessionState};
pub use talk::channel::{ChatChannel, INFO_UPDATE_INTERVAL};
pub use talk::chat::Chat;
pub use talk::user::{ChatUser, ClientUser, UserProfile};
pub use talk::TalkStore;

use tracing_subscriber::EnvFilter;

/// Installs a process-wide tracing subscriber. `RUST_LOG` wins when set;
/// otherwise `default_filter` applies. Safe to call more than once.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
