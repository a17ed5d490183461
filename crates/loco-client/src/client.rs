//! The client facade.
//!
//! [`TalkClient`] ties the layers together: it runs the login sequence,
//! owns the entity store and event bus, and hosts the dispatch task that
//! applies server pushes to entities. Consumers interact with this type
//! and the event streams only.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{error, info, warn};

use loco_core::protocol::payloads::{
    decode_body, encode_body, ChatInfoReq, ChatInfoRes, DecunreadPush, DelMemberPush,
    DeleteMsgPush, LeftPush, MsgPush, NewMemberPush, SyncJoinPush, WriteReq,
};
use loco_core::{ChannelId, ChatType, KickReason, Method, Packet};

use crate::auth::{AuthApi, LoginForm};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{ChannelEvent, ClientEvent, EventBus};
use crate::network::session::{NetworkSession, SessionSignal};
use crate::talk::chat::Chat;
use crate::talk::user::ClientUser;
use crate::talk::TalkStore;

/// Server status code for a successful request.
const REQUEST_STATUS_OK: i32 = 0;

/// A LOCO chat client.
///
/// Cheap to share: every field the dispatch task needs is behind an `Arc`,
/// so the facade itself can also be wrapped in one by consumers.
pub struct TalkClient {
    config: ClientConfig,
    auth: Arc<dyn AuthApi>,
    session: Arc<NetworkSession>,
    store: Arc<RwLock<TalkStore>>,
    bus: Arc<EventBus>,
    client_user: Arc<RwLock<Option<ClientUser>>>,
    current_login: StdMutex<Option<LoginForm>>,
}

impl TalkClient {
    pub fn new(config: ClientConfig, auth: Arc<dyn AuthApi>) -> TalkClient {
        let session = Arc::new(NetworkSession::new(config.handshake_timeout()));
        TalkClient {
            config,
            auth,
            session,
            store: Arc::new(RwLock::new(TalkStore::new())),
            bus: Arc::new(EventBus::new()),
            client_user: Arc::new(RwLock::new(None)),
            current_login: StdMutex::new(None),
        }
    }

    /// Subscribes to the global event stream.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.bus.subscribe()
    }

    /// Subscribes to one channel's event stream.
    pub fn channel_events(&self, channel_id: ChannelId) -> broadcast::Receiver<ChannelEvent> {
        self.bus.subscribe_channel(channel_id)
    }

    pub fn is_logged_on(&self) -> bool {
        self.session.is_logged_on()
    }

    /// The logged-in account, once a login has completed.
    pub async fn client_user(&self) -> Option<ClientUser> {
        self.client_user.read().await.clone()
    }

    /// Read access to the entity store.
    pub fn store(&self) -> &Arc<RwLock<TalkStore>> {
        &self.store
    }

    /// Runs the full login sequence: credential exchange, settings fetch,
    /// connection, handshake, entity seeding, and finally the `LoggedIn`
    /// event. Fails fast with [`ClientError::AlreadyLoggedOn`] if a session
    /// is already live.
    pub async fn login(&self, email: &str, password: &str, forced: bool) -> Result<(), ClientError> {
        if self.session.is_logged_on() {
            return Err(ClientError::AlreadyLoggedOn);
        }
        let form = LoginForm {
            email: email.to_string(),
            password: password.to_string(),
            device_uuid: self.config.device_uuid.clone(),
            client_name: self.config.client_name.clone(),
            forced,
        };
        self.login_with(form).await
    }

    /// Replays the last successful login form. The form is retained across
    /// `logout`, so logout followed by `relogin` works without re-entering
    /// credentials.
    pub async fn relogin(&self) -> Result<(), ClientError> {
        if self.session.is_logged_on() {
            return Err(ClientError::AlreadyLoggedOn);
        }
        let form = self
            .current_login
            .lock()
            .unwrap()
            .clone()
            .ok_or(ClientError::NoPriorLogin)?;
        self.login_with(form).await
    }

    async fn login_with(&self, form: LoginForm) -> Result<(), ClientError> {
        // Credential exchange. A service-level rejection aborts before any
        // socket is opened.
        let login_res = self.auth.request_login(form.clone()).await?;
        if !login_res.is_ok() {
            return Err(ClientError::LoginFailed {
                status: login_res.status,
            });
        }
        let credential = login_res.payload.ok_or_else(|| {
            ClientError::ProtocolInvariantViolation(
                "login succeeded without a credential payload".to_string(),
            )
        })?;

        // Account settings for the client user's own profile.
        let settings_res = self.auth.request_more_settings(0).await?;
        if !settings_res.is_ok() {
            return Err(ClientError::SettingsFetchFailed {
                status: settings_res.status,
            });
        }
        let settings = settings_res.payload.ok_or_else(|| {
            ClientError::ProtocolInvariantViolation(
                "settings fetch succeeded without a payload".to_string(),
            )
        })?;

        // Connection and handshake.
        let signals = Arc::clone(&self.session)
            .connect(&self.config.server_addr())
            .await?;
        let known_user_id = self
            .client_user
            .read()
            .await
            .as_ref()
            .map(|user| user.id)
            .unwrap_or(-1);
        let login = self
            .session
            .handshake(&form.device_uuid, known_user_id, &credential.access_token)
            .await?;

        // Seed entities under the authoritative user id.
        let client_user = ClientUser::from_settings(login.user_id, &settings, login.open_chat_token);
        {
            let mut store = self.store.write().await;
            store.set_client_user_id(client_user.id);
            store.seed(login.channel_list);
        }
        *self.client_user.write().await = Some(client_user.clone());
        *self.current_login.lock().unwrap() = Some(form);

        self.spawn_dispatch(signals);
        info!(user_id = client_user.id, "logged in");
        self.bus.publish(ClientEvent::LoggedIn(client_user));
        Ok(())
    }

    /// Closes the session. The last login form is kept so [`relogin`]
    /// works afterwards; call [`invalidate_credentials`] to drop it.
    ///
    /// [`relogin`]: TalkClient::relogin
    /// [`invalidate_credentials`]: TalkClient::invalidate_credentials
    pub fn logout(&self) {
        info!("logging out");
        self.session.disconnect();
    }

    /// Forgets the retained login form. After this, [`TalkClient::relogin`]
    /// fails with [`ClientError::NoPriorLogin`] until a fresh login.
    pub fn invalidate_credentials(&self) {
        *self.current_login.lock().unwrap() = None;
    }

    /// Sends a text message to a channel, fire-and-forget with an
    /// optimistic local log id. Sending an empty string is a no-op.
    pub async fn send_text(&self, channel_id: ChannelId, text: &str) -> Result<(), ClientError> {
        if text.is_empty() {
            return Ok(());
        }
        let msg_id = {
            let store = self.store.read().await;
            store
                .channel(channel_id)
                .ok_or(ClientError::UnknownChannel(channel_id))?
                .next_message_id()
        };
        let body = encode_body(&WriteReq {
            channel_id,
            msg_id,
            chat_type: ChatType::Text,
            text: text.to_string(),
        })?;
        self.session.send_one_way(Method::WRITE, body).await
    }

    /// Requests an authoritative channel info snapshot and reconciles the
    /// channel's membership against it.
    pub async fn update_channel_info(&self, channel_id: ChannelId) -> Result<(), ClientError> {
        let body = encode_body(&ChatInfoReq { channel_id })?;
        let response = self.session.send_request(Method::CHAT_INFO, body).await?;
        let info_res: ChatInfoRes = decode_body(response.method, &response.body)?;
        if info_res.status != REQUEST_STATUS_OK {
            return Err(ClientError::RequestFailed {
                method: Method::CHAT_INFO.as_str().to_string(),
                status: info_res.status,
            });
        }
        self.store
            .write()
            .await
            .reconcile(channel_id, info_res.info, Instant::now(), &self.bus)
    }

    fn spawn_dispatch(&self, mut signals: mpsc::Receiver<SessionSignal>) {
        let store = Arc::clone(&self.store);
        let bus = Arc::clone(&self.bus);
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                match signal {
                    SessionSignal::Push(packet) => {
                        match apply_push(&store, &bus, packet).await {
                            Ok(()) => {}
                            Err(
                                e @ (ClientError::ProtocolInvariantViolation(_)
                                | ClientError::DuplicateJoin(_)
                                | ClientError::UnknownUser(_)),
                            ) => {
                                // Entity state no longer matches the server;
                                // the session cannot be trusted past this
                                // point. Relogin is the consumer's call.
                                error!(error = %e, "fatal push, tearing session down");
                                session.disconnect();
                                bus.publish(ClientEvent::Disconnected(KickReason::Unknown(-1)));
                                return;
                            }
                            Err(e) => {
                                warn!(error = %e, "dropped server push");
                            }
                        }
                    }
                    SessionSignal::Kickout(reason) => {
                        bus.publish(ClientEvent::Disconnected(reason));
                        return;
                    }
                    SessionSignal::ConnectionClosed => {
                        bus.publish(ClientEvent::Disconnected(KickReason::Unknown(-1)));
                        return;
                    }
                }
            }
        });
    }
}

/// Applies one server push to the entity store and event bus.
async fn apply_push(
    store: &Arc<RwLock<TalkStore>>,
    bus: &Arc<EventBus>,
    packet: Packet,
) -> Result<(), ClientError> {
    match packet.method.as_str() {
        "MSG" => {
            let push: MsgPush = decode_body(packet.method, &packet.body)?;
            let chat = Chat::from_data(push.chat);
            store.write().await.chat_received(push.channel_id, chat, bus)
        }
        "DECUNREAD" => {
            let push: DecunreadPush = decode_body(packet.method, &packet.body)?;
            bus.publish(ClientEvent::MessageRead {
                channel_id: push.channel_id,
                reader_id: push.user_id,
                watermark: push.watermark,
            });
            Ok(())
        }
        "DELETEMSG" => {
            let push: DeleteMsgPush = decode_body(packet.method, &packet.body)?;
            bus.publish(ClientEvent::MessageDeleted {
                channel_id: push.channel_id,
                log_id: push.log_id,
                hidden: push.hidden,
            });
            Ok(())
        }
        "NEWMEM" => {
            let push: NewMemberPush = decode_body(packet.method, &packet.body)?;
            store
                .write()
                .await
                .member_joined(push.channel_id, &push.member, &push.feed, bus)
                .map(|_| ())
        }
        "DELMEM" => {
            let push: DelMemberPush = decode_body(packet.method, &packet.body)?;
            store
                .write()
                .await
                .member_left(push.channel_id, push.user_id, &push.feed, bus)
                .map(|_| ())
        }
        "SYNCJOIN" => {
            let push: SyncJoinPush = decode_body(packet.method, &packet.body)?;
            let id = store.write().await.register_channel(push.channel);
            bus.publish(ClientEvent::ChannelJoined(id));
            Ok(())
        }
        "LEFT" => {
            let push: LeftPush = decode_body(packet.method, &packet.body)?;
            store
                .write()
                .await
                .remove_channel(push.channel_id)
                .ok_or(ClientError::UnknownChannel(push.channel_id))?;
            bus.drop_channel(push.channel_id);
            bus.publish(ClientEvent::ChannelLeft(push.channel_id));
            Ok(())
        }
        other => {
            warn!(method = other, "ignoring unhandled push");
            Ok(())
        }
    }
}
