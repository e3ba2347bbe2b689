use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::activity::{ActivityItem, ActivityKind, ActivitySource};
use crate::datetime_utils::from_unix_timestamp;
use crate::dedup::ActivityDeduper;
use crate::entity_cache::EntityCache;
use crate::platform::{Notification, PeerId, PlatformClient};

/// Upper bound on draining queued notifications after shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Turns pushed notifications into activity items and feeds the deduper
pub struct LiveUpdateSink {
    client: Arc<dyn PlatformClient>,
    cache: EntityCache,
    deduper: Arc<ActivityDeduper>,
    received: AtomicU64,
}

impl LiveUpdateSink {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        cache: EntityCache,
        deduper: Arc<ActivityDeduper>,
    ) -> Self {
        Self {
            client,
            cache,
            deduper,
            received: AtomicU64::new(0),
        }
    }

    /// Notifications taken off the queue so far
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Converts a notification into an activity item.
    ///
    /// Only new messages with text are relevant. Group and private messages
    /// without a known sender are dropped.
    pub async fn to_activity(&self, notification: Notification) -> Option<ActivityItem> {
        let update = match notification {
            Notification::NewMessage(update) | Notification::NewChannelMessage(update) => update,
            other => {
                trace!("Ignoring notification {other:?}");
                return None;
            }
        };

        let Some(message) = update.message.text_message() else {
            trace!("Ignoring message without text");
            return None;
        };

        self.cache.absorb_users(&update.users).await;
        self.cache.absorb_chats(&update.chats).await;

        let client = self.client.as_ref();
        let (kind, channel_id, author, chat_title) = match message.peer {
            PeerId::Channel(id) if message.post => {
                let channel_name = self.cache.display_name(client, message.peer).await;
                let author = message
                    .post_author
                    .as_deref()
                    .map(str::trim)
                    .filter(|signature| !signature.is_empty())
                    .map_or_else(|| channel_name.clone(), str::to_string);
                (ActivityKind::Post, id, author, channel_name)
            }
            PeerId::Channel(id) | PeerId::Chat(id) => {
                let Some(from) = message.from else {
                    trace!(
                        "Dropping group message {message_id} without sender",
                        message_id = message.id
                    );
                    return None;
                };
                let author = self.cache.display_name(client, from).await;
                let chat_title = self.cache.display_name(client, message.peer).await;
                (ActivityKind::Comment, id, author, chat_title)
            }
            PeerId::User(id) => {
                // Outgoing private messages carry no sender
                let Some(from) = message.from else {
                    trace!(
                        "Dropping private message {message_id} without sender",
                        message_id = message.id
                    );
                    return None;
                };
                let author = self.cache.display_name(client, from).await;
                (ActivityKind::Direct, id, author.clone(), author)
            }
        };

        Some(ActivityItem {
            channel_id,
            message_id: message.id,
            author,
            text: message.text.clone(),
            timestamp: from_unix_timestamp(message.date),
            kind,
            chat_title,
            source: ActivitySource::Live,
        })
    }

    /// Handles one notification; returns true if it produced new activity
    pub async fn handle(&self, notification: Notification) -> bool {
        self.received.fetch_add(1, Ordering::Relaxed);
        match self.to_activity(notification).await {
            Some(item) => self.deduper.observe(&item),
            None => false,
        }
    }

    /// Consumes notifications until `cancel` fires or every sender is gone.
    ///
    /// After cancellation, notifications already queued are still handled
    /// for at most [`DRAIN_TIMEOUT`].
    pub async fn run(&self, mut rx: mpsc::Receiver<Notification>, cancel: CancellationToken) {
        info!("Live update processing started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                notification = rx.recv() => match notification {
                    Some(notification) => {
                        self.handle(notification).await;
                    }
                    None => {
                        debug!("Update stream closed");
                        return;
                    }
                },
            }
        }

        rx.close();
        let drain = async {
            let mut drained = 0usize;
            while let Some(notification) = rx.recv().await {
                self.handle(notification).await;
                drained += 1;
            }
            drained
        };

        match time::timeout(DRAIN_TIMEOUT, drain).await {
            Ok(0) => {}
            Ok(drained) => debug!("Drained {drained} queued notifications"),
            Err(_) => warn!("Gave up draining queued notifications"),
        }
        info!("Live update processing stopped");
    }
}
