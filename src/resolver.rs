use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::entity_cache::EntityCache;
use crate::platform::{
    ChannelRecord, ChannelRef, ChatRecord, PeerId, PlatformClient, PlatformError, ResolvedHandle,
};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("None of the {attempted} configured channel handles could be resolved")]
    NoChannels { attempted: usize },
}

/// Why a directory answer did not yield a channel
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rejection {
    NotAChannel(PeerId),
    NoChannelMatch,
    Ambiguous(usize),
}

/// Maps configured channel handles to stable channel references
pub struct ChannelResolver {
    client: Arc<dyn PlatformClient>,
    cache: EntityCache,
}

impl ChannelResolver {
    pub fn new(client: Arc<dyn PlatformClient>, cache: EntityCache) -> Self {
        Self { client, cache }
    }

    /// Resolves every handle with one directory lookup each.
    ///
    /// Handles that cannot be resolved to a channel are skipped with a warning;
    /// the result keeps the input order. Fails only if nothing resolved.
    pub async fn resolve(&self, handles: &[String]) -> Result<Vec<ChannelRef>, ResolveError> {
        let mut channels: Vec<ChannelRef> = Vec::with_capacity(handles.len());

        for raw in handles {
            let Some(handle) = normalize_handle(raw) else {
                warn!("Skipping invalid channel handle: {raw:?}");
                continue;
            };

            let Some(channel) = self.resolve_one(&handle).await else {
                continue;
            };

            if channels.iter().any(|known| known.id == channel.id) {
                warn!(
                    "Channel @{handle} ({id}) is already monitored, skipping duplicate",
                    id = channel.id
                );
                continue;
            }

            info!(
                "Resolved @{handle} to channel {title:?} ({id})",
                title = channel.title,
                id = channel.id
            );
            channels.push(channel);
        }

        if channels.is_empty() {
            return Err(ResolveError::NoChannels {
                attempted: handles.len(),
            });
        }

        Ok(channels)
    }

    async fn resolve_one(&self, handle: &str) -> Option<ChannelRef> {
        let resolved = match self.client.resolve_handle(handle).await {
            Ok(resolved) => resolved,
            Err(PlatformError::NotFound { .. }) => {
                warn!("Channel @{handle} does not exist");
                return None;
            }
            Err(e) => {
                warn!("Failed to resolve @{handle}: {e}");
                return None;
            }
        };

        self.cache.absorb_chats(&resolved.chats).await;
        self.cache.absorb_users(&resolved.users).await;

        match pick_channel(&resolved) {
            Ok(channel) => {
                if !channel.broadcast {
                    debug!("@{handle} is a supergroup, monitoring it as a channel");
                }
                Some(ChannelRef::new(
                    channel.id,
                    channel.access_hash,
                    channel.title.clone(),
                ))
            }
            Err(Rejection::NotAChannel(peer)) => {
                warn!("@{handle} is not a channel (resolved to {peer:?})");
                None
            }
            Err(Rejection::NoChannelMatch) => {
                warn!("Channel not found for @{handle}");
                None
            }
            Err(Rejection::Ambiguous(count)) => {
                warn!("@{handle} is ambiguous ({count} candidate channels)");
                None
            }
        }
    }
}

/// Picks the channel a directory answer points at
fn pick_channel(resolved: &ResolvedHandle) -> Result<&ChannelRecord, Rejection> {
    let channels: Vec<&ChannelRecord> = resolved
        .chats
        .iter()
        .filter_map(|chat| match chat {
            ChatRecord::Channel(channel) => Some(channel),
            ChatRecord::Group(_) => None,
        })
        .collect();

    match resolved.peer {
        Some(PeerId::Channel(id)) => channels
            .into_iter()
            .find(|channel| channel.id == id)
            .ok_or(Rejection::NoChannelMatch),
        Some(peer) => Err(Rejection::NotAChannel(peer)),
        None => match channels.as_slice() {
            [] => Err(Rejection::NoChannelMatch),
            [channel] => Ok(channel),
            many => Err(Rejection::Ambiguous(many.len())),
        },
    }
}

/// Public usernames: 4 to 32 characters, starting with a letter. Four
/// character names exist as collectibles.
const HANDLE_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9_]{3,31}$";

/// Normalizes a configured handle: `@name`, `t.me/name` and
/// `https://t.me/name` all become `name`. Returns `None` if the result is not
/// a valid username.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let mut handle = raw.trim();

    for prefix in ["https://", "http://"] {
        if let Some(rest) = handle.strip_prefix(prefix) {
            handle = rest;
        }
    }
    for prefix in ["www.t.me/", "t.me/", "telegram.me/"] {
        if let Some(rest) = handle.strip_prefix(prefix) {
            handle = rest;
        }
    }

    let handle = handle.trim_start_matches('@').trim_end_matches('/');

    let re = Regex::new(HANDLE_PATTERN).ok()?;
    re.is_match(handle).then(|| handle.to_string())
}
