use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::info;

use crate::datetime_utils::format_for_display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Published by a broadcast channel
    Post,
    /// Written in a group, usually a channel's discussion group
    Comment,
    /// Private message to the monitoring account
    Direct,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivityKind::Post => "post",
            ActivityKind::Comment => "comment",
            ActivityKind::Direct => "direct",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    Poll,
    Live,
}

impl fmt::Display for ActivitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivitySource::Poll => f.write_str("poll"),
            ActivitySource::Live => f.write_str("live"),
        }
    }
}

/// Identity of an activity item for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivityKey {
    pub channel_id: i64,
    pub message_id: i64,
    pub kind: ActivityKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityItem {
    /// Chat containing the message; message ids are only unique per chat
    pub channel_id: i64,
    pub message_id: i64,
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    /// Title of the containing chat, for reporting
    pub chat_title: String,
    pub source: ActivitySource,
}

impl ActivityItem {
    pub fn key(&self) -> ActivityKey {
        ActivityKey {
            channel_id: self.channel_id,
            message_id: self.message_id,
            kind: self.kind,
        }
    }
}

/// Receives every distinct activity item exactly once
pub trait ActivitySink: Send + Sync {
    fn emit(&self, item: &ActivityItem);
}

/// Reports activity as structured log events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ActivitySink for TracingSink {
    fn emit(&self, item: &ActivityItem) {
        let date = format_for_display(&item.timestamp);
        match item.kind {
            ActivityKind::Post => info!(
                channel = %item.chat_title,
                author = %item.author,
                source = %item.source,
                %date,
                text = %item.text,
                "Channel post"
            ),
            ActivityKind::Comment => info!(
                channel = %item.chat_title,
                author = %item.author,
                source = %item.source,
                %date,
                text = %item.text,
                "Discussion comment"
            ),
            ActivityKind::Direct => info!(
                author = %item.author,
                source = %item.source,
                %date,
                text = %item.text,
                "Direct message"
            ),
        }
    }
}

/// Keeps emitted items in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    items: Mutex<Vec<ActivityItem>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<ActivityItem> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActivitySink for CollectingSink {
    fn emit(&self, item: &ActivityItem) {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(item.clone());
    }
}
