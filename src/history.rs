use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::activity::{ActivityItem, ActivityKind, ActivitySource};
use crate::datetime_utils::from_unix_timestamp;
use crate::entity_cache::EntityCache;
use crate::platform::{ChannelRef, FullChannelInfo, History, PeerRef, PlatformClient};

/// Number of posts and comments requested per fetch
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Discussion group a channel forwards its posts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionPeer {
    pub peer: PeerRef,
    pub title: String,
}

/// Link between a channel and its discussion group, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionLink {
    pub channel_id: i64,
    pub linked_peer: Option<DiscussionPeer>,
}

impl DiscussionLink {
    /// Builds the link from a full-channel answer.
    ///
    /// Returns the linked chat id as the error when the channel names a
    /// discussion group that is missing from the bundled chats.
    pub fn from_full_info(channel_id: i64, info: &FullChannelInfo) -> Result<Self, i64> {
        let Some(linked_id) = info.linked_chat_id else {
            return Ok(Self {
                channel_id,
                linked_peer: None,
            });
        };

        let chat = info
            .chats
            .iter()
            .find(|chat| chat.id() == linked_id)
            .ok_or(linked_id)?;

        Ok(Self {
            channel_id,
            linked_peer: Some(DiscussionPeer {
                peer: chat.peer(),
                title: chat.title().to_string(),
            }),
        })
    }
}

/// Fetches recent posts of a channel and recent comments of its discussion group
pub struct HistoryFetcher {
    client: Arc<dyn PlatformClient>,
    cache: EntityCache,
    limit: usize,
}

impl HistoryFetcher {
    pub fn new(client: Arc<dyn PlatformClient>, cache: EntityCache) -> Self {
        Self {
            client,
            cache,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the channel's recent posts followed by recent discussion
    /// comments, each group oldest first.
    ///
    /// Never fails: a failing step is logged and contributes no items.
    pub async fn fetch_activity(&self, channel: &ChannelRef) -> Vec<ActivityItem> {
        let mut items = self.fetch_posts(channel).await;

        let Some(discussion) = self.discussion_peer(channel).await else {
            return items;
        };

        items.extend(self.fetch_comments(channel, &discussion).await);
        items
    }

    async fn fetch_posts(&self, channel: &ChannelRef) -> Vec<ActivityItem> {
        let history = match self.client.get_history(&channel.peer(), self.limit).await {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    "Failed to fetch history of {title:?} ({id}): {e}",
                    title = channel.title,
                    id = channel.id
                );
                return Vec::new();
            }
        };

        let mut posts: Vec<ActivityItem> = history
            .messages
            .iter()
            .filter_map(|message| message.text_message())
            .map(|message| ActivityItem {
                channel_id: channel.id,
                message_id: message.id,
                author: message
                    .post_author
                    .as_deref()
                    .map(str::trim)
                    .filter(|signature| !signature.is_empty())
                    .unwrap_or(channel.title.as_str())
                    .to_string(),
                text: message.text.clone(),
                timestamp: from_unix_timestamp(message.date),
                kind: ActivityKind::Post,
                chat_title: channel.title.clone(),
                source: ActivitySource::Poll,
            })
            .collect();
        posts.sort_by_key(|item| item.message_id);

        debug!(
            "Fetched {count} posts from {title:?}",
            count = posts.len(),
            title = channel.title
        );
        posts
    }

    async fn discussion_peer(&self, channel: &ChannelRef) -> Option<DiscussionPeer> {
        let info = match self.client.get_full_channel(channel).await {
            Ok(info) => info,
            Err(e) => {
                warn!(
                    "Failed to get full info of {title:?} ({id}): {e}",
                    title = channel.title,
                    id = channel.id
                );
                return None;
            }
        };

        self.cache.absorb_chats(&info.chats).await;
        self.cache.absorb_users(&info.users).await;

        match DiscussionLink::from_full_info(channel.id, &info) {
            Ok(DiscussionLink {
                linked_peer: Some(peer),
                ..
            }) => Some(peer),
            Ok(_) => {
                info!(
                    "No discussion group for channel {title:?}",
                    title = channel.title
                );
                None
            }
            Err(linked_id) => {
                warn!(
                    "Discussion peer {linked_id} not found for channel {title:?}",
                    title = channel.title
                );
                None
            }
        }
    }

    async fn fetch_comments(
        &self,
        channel: &ChannelRef,
        discussion: &DiscussionPeer,
    ) -> Vec<ActivityItem> {
        let history = match self.client.get_history(&discussion.peer, self.limit).await {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    "Failed to fetch comments of {title:?} ({id}): {e}",
                    title = discussion.title,
                    id = discussion.peer.id()
                );
                return Vec::new();
            }
        };

        let comments = self.comment_items(discussion, &history).await;
        debug!(
            "Fetched {count} comments for {title:?}",
            count = comments.len(),
            title = channel.title
        );
        comments
    }

    async fn comment_items(
        &self,
        discussion: &DiscussionPeer,
        history: &History,
    ) -> Vec<ActivityItem> {
        self.cache.absorb_users(&history.users).await;
        self.cache.absorb_chats(&history.chats).await;

        let discussion_id = discussion.peer.id();
        let mut comments = Vec::new();
        for message in history.messages.iter().filter_map(|m| m.text_message()) {
            let author = match message.from {
                Some(from) => self.cache.display_name(self.client.as_ref(), from).await,
                // Anonymous admins post as the group itself
                None => discussion.title.clone(),
            };

            comments.push(ActivityItem {
                channel_id: discussion_id,
                message_id: message.id,
                author,
                text: message.text.clone(),
                timestamp: from_unix_timestamp(message.date),
                kind: ActivityKind::Comment,
                chat_title: discussion.title.clone(),
                source: ActivitySource::Poll,
            });
        }
        comments.sort_by_key(|item| item.message_id);
        comments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::{MemoryPlatform, Op};
    use crate::platform::{
        ChannelRecord, ChatRecord, GroupRecord, Message, MessageClass, PeerId, UserRecord,
    };
    use pretty_assertions::assert_eq;

    const CHANNEL_ID: i64 = 42;
    const DISCUSSION_ID: i64 = 43;

    fn channel_ref() -> ChannelRef {
        ChannelRef::new(CHANNEL_ID, 4200, "News")
    }

    fn setup() -> Arc<MemoryPlatform> {
        let platform = Arc::new(MemoryPlatform::new());
        platform.add_channel(
            "news_feed",
            ChannelRecord {
                id: CHANNEL_ID,
                access_hash: 4200,
                title: "News".to_string(),
                username: Some("news_feed".to_string()),
                broadcast: true,
            },
        );
        platform.set_history(
            CHANNEL_ID,
            vec![
                Message::new(100, PeerId::Channel(CHANNEL_ID), 1000, "first post")
                    .as_post()
                    .into(),
                MessageClass::Empty { id: 101 },
                Message::new(102, PeerId::Channel(CHANNEL_ID), 1002, "second post")
                    .as_post()
                    .into(),
            ],
        );
        platform
    }

    fn link_supergroup(platform: &MemoryPlatform) {
        platform.link_discussion(
            CHANNEL_ID,
            ChatRecord::Channel(ChannelRecord {
                id: DISCUSSION_ID,
                access_hash: 4300,
                title: "News chat".to_string(),
                username: None,
                broadcast: false,
            }),
        );
        platform.set_history(
            DISCUSSION_ID,
            vec![
                Message::new(7, PeerId::Channel(DISCUSSION_ID), 1010, "nice")
                    .from_peer(PeerId::User(1))
                    .into(),
                Message::new(6, PeerId::Channel(DISCUSSION_ID), 1005, "")
                    .from_peer(PeerId::User(1))
                    .into(),
                Message::new(5, PeerId::Channel(DISCUSSION_ID), 1004, "anon")
                    .into(),
            ],
        );
        platform.set_history_users(
            DISCUSSION_ID,
            vec![UserRecord {
                id: 1,
                first_name: Some("Alice".to_string()),
                ..UserRecord::default()
            }],
        );
    }

    #[tokio::test]
    async fn test_posts_without_discussion() {
        let platform = setup();
        let fetcher = HistoryFetcher::new(platform.clone(), EntityCache::new());

        let items = fetcher.fetch_activity(&channel_ref()).await;

        let ids: Vec<i64> = items.iter().map(|item| item.message_id).collect();
        assert_eq!(ids, vec![100, 102]);
        assert!(items.iter().all(|item| item.kind == ActivityKind::Post));
        assert!(items.iter().all(|item| item.author == "News"));
        assert_eq!(items[0].timestamp.timestamp(), 1000);
        // Only the channel history was requested
        assert_eq!(platform.call_count(&Op::History(CHANNEL_ID)), 1);
        assert_eq!(platform.call_count(&Op::History(DISCUSSION_ID)), 0);
    }

    #[tokio::test]
    async fn test_posts_and_comments() {
        let platform = setup();
        link_supergroup(&platform);
        let fetcher = HistoryFetcher::new(platform.clone(), EntityCache::new());

        let items = fetcher.fetch_activity(&channel_ref()).await;
        let comments: Vec<&ActivityItem> = items
            .iter()
            .filter(|item| item.kind == ActivityKind::Comment)
            .collect();

        assert_eq!(items.len(), 4);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].message_id, 5);
        assert_eq!(comments[0].author, "News chat");
        assert_eq!(comments[1].message_id, 7);
        assert_eq!(comments[1].author, "Alice");
        assert!(comments.iter().all(|c| c.channel_id == DISCUSSION_ID));
        // Bundled users make direct lookups unnecessary
        assert_eq!(platform.call_count(&Op::Users), 0);
    }

    #[tokio::test]
    async fn test_plain_group_discussion() {
        let platform = setup();
        platform.link_discussion(
            CHANNEL_ID,
            ChatRecord::Group(GroupRecord {
                id: DISCUSSION_ID,
                title: "Old chat".to_string(),
            }),
        );
        platform.set_history(
            DISCUSSION_ID,
            vec![Message::new(3, PeerId::Chat(DISCUSSION_ID), 1003, "hi")
                .from_peer(PeerId::User(9))
                .into()],
        );
        platform.fail(Op::Users);
        let fetcher = HistoryFetcher::new(platform, EntityCache::new());

        let items = fetcher.fetch_activity(&channel_ref()).await;
        let comment = items.last().unwrap();

        assert_eq!(comment.kind, ActivityKind::Comment);
        assert_eq!(comment.author, "user9");
        assert_eq!(comment.chat_title, "Old chat");
    }

    #[tokio::test]
    async fn test_post_signature_is_author() {
        let platform = setup();
        let mut signed = Message::new(103, PeerId::Channel(CHANNEL_ID), 1003, "signed").as_post();
        signed.post_author = Some("Editor".to_string());
        platform.set_history(CHANNEL_ID, vec![signed.into()]);

        let fetcher = HistoryFetcher::new(platform, EntityCache::new());
        let items = fetcher.fetch_activity(&channel_ref()).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].author, "Editor");
    }

    #[tokio::test]
    async fn test_failures_yield_partial_results() {
        // Channel history fails, comments still arrive
        let platform = setup();
        link_supergroup(&platform);
        platform.fail(Op::History(CHANNEL_ID));
        let fetcher = HistoryFetcher::new(platform.clone(), EntityCache::new());
        let items = fetcher.fetch_activity(&channel_ref()).await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.kind == ActivityKind::Comment));

        // Full channel info fails, posts still arrive
        platform.recover(&Op::History(CHANNEL_ID));
        platform.fail(Op::FullChannel(CHANNEL_ID));
        let items = fetcher.fetch_activity(&channel_ref()).await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.kind == ActivityKind::Post));

        // Discussion history fails
        platform.recover(&Op::FullChannel(CHANNEL_ID));
        platform.fail(Op::History(DISCUSSION_ID));
        let items = fetcher.fetch_activity(&channel_ref()).await;
        assert_eq!(items.len(), 2);

        // Everything fails
        platform.fail(Op::History(CHANNEL_ID));
        platform.fail(Op::FullChannel(CHANNEL_ID));
        assert!(fetcher.fetch_activity(&channel_ref()).await.is_empty());
    }

    #[tokio::test]
    async fn test_linked_peer_missing_from_chats() {
        let platform = setup();
        platform.set_full_channel(
            CHANNEL_ID,
            FullChannelInfo {
                linked_chat_id: Some(DISCUSSION_ID),
                ..FullChannelInfo::default()
            },
        );
        let fetcher = HistoryFetcher::new(platform.clone(), EntityCache::new());

        let items = fetcher.fetch_activity(&channel_ref()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(platform.call_count(&Op::History(DISCUSSION_ID)), 0);
    }

    #[tokio::test]
    async fn test_history_limit() {
        let platform = setup();
        let fetcher = HistoryFetcher::new(platform, EntityCache::new()).with_limit(1);

        let items = fetcher.fetch_activity(&channel_ref()).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].message_id, 102);
    }

    #[test]
    fn test_discussion_link() {
        let group = ChatRecord::Group(GroupRecord {
            id: 5,
            title: "Talk".to_string(),
        });
        let info = FullChannelInfo {
            linked_chat_id: Some(5),
            chats: vec![group.clone()],
            users: Vec::new(),
        };
        let link = DiscussionLink::from_full_info(1, &info).unwrap();
        assert_eq!(
            link.linked_peer,
            Some(DiscussionPeer {
                peer: PeerRef::Group { id: 5 },
                title: "Talk".to_string(),
            })
        );

        let none = DiscussionLink::from_full_info(1, &FullChannelInfo::default()).unwrap();
        assert!(none.linked_peer.is_none());

        let dangling = FullChannelInfo {
            linked_chat_id: Some(9),
            ..FullChannelInfo::default()
        };
        assert_eq!(DiscussionLink::from_full_info(1, &dangling), Err(9));
    }
}
