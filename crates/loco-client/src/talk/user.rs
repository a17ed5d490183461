//! User entities.
//!
//! Two kinds with a shared display profile: [`ChatUser`] for channel
//! members, and [`ClientUser`] for the logged-in account itself. The client
//! user never appears in a channel's member table; membership operations
//! that name it are rejected upstream.

use loco_core::protocol::payloads::MemberData;
use loco_core::UserId;

use crate::auth::ClientSettings;

/// Display profile shared by every user kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub nickname: String,
    pub profile_image_url: Option<String>,
}

impl UserProfile {
    pub fn from_member(member: &MemberData) -> UserProfile {
        UserProfile {
            nickname: member.nickname.clone(),
            profile_image_url: member.profile_image_url.clone(),
        }
    }

    /// Applies fresher profile fields in place. Used by reconciliation for
    /// members that are already present.
    pub fn update_from(&mut self, member: &MemberData) {
        self.nickname = member.nickname.clone();
        self.profile_image_url = member.profile_image_url.clone();
    }
}

/// A member of a chat channel, as known to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: UserId,
    pub profile: UserProfile,
}

impl ChatUser {
    pub fn from_member(member: &MemberData) -> ChatUser {
        ChatUser {
            id: member.user_id,
            profile: UserProfile::from_member(member),
        }
    }
}

/// The logged-in account. Carries the open-chat token the handshake
/// returned alongside the channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientUser {
    pub id: UserId,
    pub profile: UserProfile,
    pub open_chat_token: i32,
}

impl ClientUser {
    pub fn from_settings(id: UserId, settings: &ClientSettings, open_chat_token: i32) -> ClientUser {
        ClientUser {
            id,
            profile: UserProfile {
                nickname: settings.nickname.clone(),
                profile_image_url: settings.profile_image_url.clone(),
            },
            open_chat_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: UserId, nickname: &str) -> MemberData {
        MemberData {
            user_id: id,
            nickname: nickname.to_string(),
            profile_image_url: None,
        }
    }

    #[test]
    fn test_chat_user_from_member_copies_profile() {
        let user = ChatUser::from_member(&member(5, "ada"));
        assert_eq!(user.id, 5);
        assert_eq!(user.profile.nickname, "ada");
    }

    #[test]
    fn test_profile_update_replaces_fields() {
        let mut profile = UserProfile::from_member(&member(5, "ada"));
        let newer = MemberData {
            user_id: 5,
            nickname: "ada-l".to_string(),
            profile_image_url: Some("https://img.example/5.png".to_string()),
        };
        profile.update_from(&newer);
        assert_eq!(profile.nickname, "ada-l");
        assert!(profile.profile_image_url.is_some());
    }
}
