use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::SessionError;

pub mod memory;

/// Errors reported by a [`PlatformClient`]
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Not authorized: {message}")]
    Unauthorized { message: String },

    #[error("Two-step verification password required")]
    PasswordRequired,

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Flood wait requested for {seconds}s")]
    FloodWait { seconds: u64 },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Identifies the chat or user a message belongs to or was sent by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum PeerId {
    User(i64),
    Chat(i64),
    Channel(i64),
}

impl PeerId {
    pub fn id(&self) -> i64 {
        match *self {
            PeerId::User(id) | PeerId::Chat(id) | PeerId::Channel(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerKind {
    Channel,
    Group,
}

/// Addressable reference used to request the history of a chat.
///
/// Supergroups are channel-type peers and need their access hash, plain groups
/// are addressed by id alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerRef {
    Channel { id: i64, access_hash: i64 },
    Group { id: i64 },
}

impl PeerRef {
    pub fn id(&self) -> i64 {
        match *self {
            PeerRef::Channel { id, .. } | PeerRef::Group { id } => id,
        }
    }

    pub fn kind(&self) -> PeerKind {
        match self {
            PeerRef::Channel { .. } => PeerKind::Channel,
            PeerRef::Group { .. } => PeerKind::Group,
        }
    }
}

/// A monitored channel, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: i64,
    pub access_hash: i64,
    pub title: String,
}

impl ChannelRef {
    pub fn new(id: i64, access_hash: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            access_hash,
            title: title.into(),
        }
    }

    pub fn peer(&self) -> PeerRef {
        PeerRef::Channel {
            id: self.id,
            access_hash: self.access_hash,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl UserRecord {
    /// First and last name joined, falling back to the username
    pub fn display_name(&self) -> String {
        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !full_name.is_empty() {
            return full_name;
        }

        self.username
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }
}

/// Broadcast channels and supergroups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: i64,
    pub access_hash: i64,
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub broadcast: bool,
}

/// Plain (non-super) groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatRecord {
    Channel(ChannelRecord),
    Group(GroupRecord),
}

impl ChatRecord {
    pub fn id(&self) -> i64 {
        match self {
            ChatRecord::Channel(channel) => channel.id,
            ChatRecord::Group(group) => group.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ChatRecord::Channel(channel) => &channel.title,
            ChatRecord::Group(group) => &group.title,
        }
    }

    /// The peer reference used to address this chat
    pub fn peer(&self) -> PeerRef {
        match self {
            ChatRecord::Channel(channel) => PeerRef::Channel {
                id: channel.id,
                access_hash: channel.access_hash,
            },
            ChatRecord::Group(group) => PeerRef::Group { id: group.id },
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, ChatRecord::Channel(channel) if channel.broadcast)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub peer: PeerId,
    #[serde(default)]
    pub from: Option<PeerId>,
    /// Unix timestamp in seconds
    pub date: i64,
    #[serde(default)]
    pub text: String,
    /// Set for posts published by a broadcast channel
    #[serde(default)]
    pub post: bool,
    /// Signature of the admin who published a channel post
    #[serde(default)]
    pub post_author: Option<String>,
}

impl Message {
    pub fn new(id: i64, peer: PeerId, date: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            peer,
            from: None,
            date,
            text: text.into(),
            post: false,
            post_author: None,
        }
    }

    pub fn from_peer(mut self, from: PeerId) -> Self {
        self.from = Some(from);
        self
    }

    pub fn as_post(mut self) -> Self {
        self.post = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMessage {
    pub id: i64,
    pub peer: PeerId,
    pub date: i64,
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageClass {
    Message(Message),
    Service(ServiceMessage),
    Empty { id: i64 },
}

impl MessageClass {
    /// Returns the message if it is a regular message carrying text
    pub fn text_message(&self) -> Option<&Message> {
        match self {
            MessageClass::Message(message) if !message.text.is_empty() => Some(message),
            _ => None,
        }
    }
}

impl From<Message> for MessageClass {
    fn from(message: Message) -> Self {
        MessageClass::Message(message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedHandle {
    pub peer: Option<PeerId>,
    #[serde(default)]
    pub chats: Vec<ChatRecord>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    #[serde(default)]
    pub messages: Vec<MessageClass>,
    #[serde(default)]
    pub chats: Vec<ChatRecord>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullChannelInfo {
    #[serde(default)]
    pub linked_chat_id: Option<i64>,
    #[serde(default)]
    pub chats: Vec<ChatRecord>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

/// A new or edited message together with the entities it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdate {
    pub message: MessageClass,
    #[serde(default)]
    pub chats: Vec<ChatRecord>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

/// Live notification pushed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    NewMessage(MessageUpdate),
    NewChannelMessage(MessageUpdate),
    EditMessage(MessageUpdate),
    DeleteMessages {
        #[serde(default)]
        ids: Vec<i64>,
    },
    #[serde(other)]
    Other,
}

/// Capabilities of the remote chat platform.
///
/// Authentication, session rotation and transport concerns live behind this
/// trait; the monitoring pipeline only sees typed results.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Checks the current session and returns the logged-in account
    async fn authorize(&self) -> PlatformResult<UserRecord>;

    async fn resolve_handle(&self, handle: &str) -> PlatformResult<ResolvedHandle>;

    async fn get_history(&self, peer: &PeerRef, limit: usize) -> PlatformResult<History>;

    async fn get_full_channel(&self, channel: &ChannelRef) -> PlatformResult<FullChannelInfo>;

    async fn get_users(&self, ids: &[i64]) -> PlatformResult<Vec<UserRecord>>;

    async fn get_channels(&self, ids: &[i64]) -> PlatformResult<Vec<ChatRecord>>;

    /// Pushes live notifications onto `tx` until `cancel` fires or the
    /// receiver goes away.
    async fn run_updates(
        &self,
        tx: mpsc::Sender<Notification>,
        cancel: CancellationToken,
    ) -> PlatformResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_message_classes() {
        let json = serde_json::json!([
            {"type": "message", "id": 7, "peer": {"type": "channel", "id": 42}, "date": 1705764600, "text": "hello", "post": true},
            {"type": "service", "id": 8, "peer": {"type": "channel", "id": 42}, "date": 1705764601, "action": "pin"},
            {"type": "empty", "id": 9}
        ]);

        let messages: Vec<MessageClass> = serde_json::from_value(json).unwrap();
        assert_eq!(messages.len(), 3);

        let first = messages[0].text_message().unwrap();
        assert_eq!(first.peer, PeerId::Channel(42));
        assert!(first.post);
        assert!(first.from.is_none());

        assert!(messages[1].text_message().is_none());
        assert!(messages[2].text_message().is_none());
    }

    #[test]
    fn test_text_message_skips_empty_text() {
        let message: MessageClass = Message::new(1, PeerId::Chat(5), 0, "").into();
        assert!(message.text_message().is_none());
    }

    #[test]
    fn test_parse_notifications() {
        let json = serde_json::json!({
            "type": "new_channel_message",
            "message": {"type": "message", "id": 100, "peer": {"type": "channel", "id": 42}, "date": 0, "text": "post", "post": true},
            "chats": [{"type": "channel", "id": 42, "access_hash": 1, "title": "News", "broadcast": true}]
        });
        let notification: Notification = serde_json::from_value(json).unwrap();
        match notification {
            Notification::NewChannelMessage(update) => {
                assert_eq!(update.chats.len(), 1);
                assert!(update.chats[0].is_broadcast());
                assert!(update.users.is_empty());
            }
            other => panic!("unexpected notification: {other:?}"),
        }

        let unknown: Notification =
            serde_json::from_value(serde_json::json!({"type": "user_status", "user_id": 1}))
                .unwrap();
        assert_eq!(unknown, Notification::Other);
    }

    #[test]
    fn test_user_display_name() {
        let mut user = UserRecord {
            id: 1,
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            username: Some("ada".to_string()),
        };
        assert_eq!(user.display_name(), "Ada Lovelace");

        user.last_name = None;
        assert_eq!(user.display_name(), "Ada");

        user.first_name = Some("  ".to_string());
        assert_eq!(user.display_name(), "ada");

        user.username = None;
        assert_eq!(user.display_name(), "");
    }

    #[test]
    fn test_chat_record_peer() {
        let supergroup = ChatRecord::Channel(ChannelRecord {
            id: 10,
            access_hash: 99,
            title: "Talk".to_string(),
            username: None,
            broadcast: false,
        });
        assert_eq!(supergroup.peer().kind(), PeerKind::Channel);
        assert!(!supergroup.is_broadcast());

        let group = ChatRecord::Group(GroupRecord {
            id: 11,
            title: "Old talk".to_string(),
        });
        assert_eq!(group.peer(), PeerRef::Group { id: 11 });
        assert_eq!(group.peer().kind(), PeerKind::Group);
    }
}
