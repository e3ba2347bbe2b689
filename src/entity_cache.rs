use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::platform::{ChatRecord, PeerId, PlatformClient, UserRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    /// Channels, supergroups and plain groups
    Channel,
}

impl EntityKind {
    /// Label used when no display name can be found
    pub fn fallback_label(self, id: i64) -> String {
        match self {
            EntityKind::User => format!("user{id}"),
            EntityKind::Channel => format!("channel{id}"),
        }
    }

    /// Cache key for a peer
    pub fn of(peer: PeerId) -> (EntityKind, i64) {
        match peer {
            PeerId::User(id) => (EntityKind::User, id),
            PeerId::Chat(id) | PeerId::Channel(id) => (EntityKind::Channel, id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: i64,
    pub display_name: String,
    pub kind: EntityKind,
}

/// Shared display-name cache for users and chats.
///
/// Records are overwritten when fresher data arrives and never removed.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    entries: Arc<RwLock<HashMap<(EntityKind, i64), EntityRecord>>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, kind: EntityKind, id: i64) -> Option<EntityRecord> {
        self.entries.read().await.get(&(kind, id)).cloned()
    }

    /// Inserts or refreshes a record; empty names are ignored
    pub async fn insert(&self, record: EntityRecord) {
        if record.display_name.trim().is_empty() {
            return;
        }
        self.entries
            .write()
            .await
            .insert((record.kind, record.id), record);
    }

    pub async fn absorb_users(&self, users: &[UserRecord]) {
        let records: Vec<_> = users.iter().filter_map(user_entity).collect();
        if records.is_empty() {
            return;
        }
        let mut entries = self.entries.write().await;
        for record in records {
            entries.insert((record.kind, record.id), record);
        }
    }

    pub async fn absorb_chats(&self, chats: &[ChatRecord]) {
        let records: Vec<_> = chats.iter().filter_map(chat_entity).collect();
        if records.is_empty() {
            return;
        }
        let mut entries = self.entries.write().await;
        for record in records {
            entries.insert((record.kind, record.id), record);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Resolves the display name of `peer`.
    ///
    /// Order: cached record, then a direct lookup through `client` (written
    /// back on success), then a synthesized `user<id>` / `channel<id>` label.
    pub async fn display_name(&self, client: &dyn PlatformClient, peer: PeerId) -> String {
        let (kind, id) = EntityKind::of(peer);

        if let Some(record) = self.get(kind, id).await {
            return record.display_name;
        }

        let looked_up = match kind {
            EntityKind::User => match client.get_users(&[id]).await {
                Ok(users) => users
                    .iter()
                    .find(|user| user.id == id)
                    .and_then(user_entity),
                Err(e) => {
                    debug!("User lookup for {id} failed: {e}");
                    None
                }
            },
            EntityKind::Channel => match client.get_channels(&[id]).await {
                Ok(chats) => chats
                    .iter()
                    .find(|chat| chat.id() == id)
                    .and_then(chat_entity),
                Err(e) => {
                    debug!("Channel lookup for {id} failed: {e}");
                    None
                }
            },
        };

        match looked_up {
            Some(record) => {
                let name = record.display_name.clone();
                self.insert(record).await;
                name
            }
            None => kind.fallback_label(id),
        }
    }
}

fn user_entity(user: &UserRecord) -> Option<EntityRecord> {
    let display_name = user.display_name();
    (!display_name.is_empty()).then(|| EntityRecord {
        id: user.id,
        display_name,
        kind: EntityKind::User,
    })
}

fn chat_entity(chat: &ChatRecord) -> Option<EntityRecord> {
    let title = chat.title().trim();
    (!title.is_empty()).then(|| EntityRecord {
        id: chat.id(),
        display_name: title.to_string(),
        kind: EntityKind::Channel,
    })
}
