//! In-memory [`PlatformClient`] with scriptable content and failures.
//!
//! Used to drive the pipeline without a gateway: channels, histories and
//! users are registered up front, individual operations can be switched to
//! fail, and every call is recorded for later inspection.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    ChannelRecord, ChannelRef, ChatRecord, FullChannelInfo, History, MessageClass, Notification,
    PeerId, PeerRef, PlatformClient, PlatformError, PlatformResult, ResolvedHandle, UserRecord,
};

/// Operations that can be made to fail
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Authorize,
    ResolveHandle(String),
    History(i64),
    FullChannel(i64),
    Users,
    Channels,
}

#[derive(Default)]
struct MemoryState {
    me: Option<UserRecord>,
    handles: HashMap<String, ResolvedHandle>,
    histories: HashMap<i64, History>,
    full_channels: HashMap<i64, FullChannelInfo>,
    users: HashMap<i64, UserRecord>,
    chats: HashMap<i64, ChatRecord>,
    failures: HashSet<Op>,
    calls: Vec<Op>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryPlatform {
    state: Mutex<MemoryState>,
    history_delay: Mutex<Option<Duration>>,
    history_in_flight: AtomicUsize,
    max_history_in_flight: AtomicUsize,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_me(&self, user: UserRecord) {
        self.state().me = Some(user);
    }

    /// Registers a channel reachable through `handle`
    pub fn add_channel(&self, handle: &str, channel: ChannelRecord) {
        let mut state = self.state();
        let record = ChatRecord::Channel(channel.clone());
        state.handles.insert(
            handle.to_string(),
            ResolvedHandle {
                peer: Some(PeerId::Channel(channel.id)),
                chats: vec![record.clone()],
                users: Vec::new(),
            },
        );
        state.chats.insert(channel.id, record);
        state.full_channels.entry(channel.id).or_default();
    }

    /// Registers an arbitrary directory answer for `handle`
    pub fn add_handle(&self, handle: &str, resolved: ResolvedHandle) {
        self.state().handles.insert(handle.to_string(), resolved);
    }

    /// Links `discussion` as the discussion group of `channel_id`
    pub fn link_discussion(&self, channel_id: i64, discussion: ChatRecord) {
        let mut state = self.state();
        let mut chats = Vec::new();
        if let Some(channel) = state.chats.get(&channel_id) {
            chats.push(channel.clone());
        }
        chats.push(discussion.clone());
        state.full_channels.insert(
            channel_id,
            FullChannelInfo {
                linked_chat_id: Some(discussion.id()),
                chats,
                users: Vec::new(),
            },
        );
        state.chats.insert(discussion.id(), discussion);
    }

    /// Stores a full-channel answer verbatim
    pub fn set_full_channel(&self, channel_id: i64, info: FullChannelInfo) {
        self.state().full_channels.insert(channel_id, info);
    }

    pub fn set_history(&self, peer_id: i64, messages: Vec<MessageClass>) {
        self.state().histories.insert(
            peer_id,
            History {
                messages,
                ..History::default()
            },
        );
    }

    /// Adds users that are returned together with the history of `peer_id`
    pub fn set_history_users(&self, peer_id: i64, users: Vec<UserRecord>) {
        self.state().histories.entry(peer_id).or_default().users = users;
    }

    /// Makes a user available to direct lookups
    pub fn add_user(&self, user: UserRecord) {
        self.state().users.insert(user.id, user);
    }

    pub fn add_chat(&self, chat: ChatRecord) {
        self.state().chats.insert(chat.id(), chat);
    }

    pub fn fail(&self, op: Op) {
        self.state().failures.insert(op);
    }

    pub fn recover(&self, op: &Op) {
        self.state().failures.remove(op);
    }

    /// Queues a notification delivered by the next `run_updates`
    pub fn queue_notification(&self, notification: Notification) {
        self.state().notifications.push(notification);
    }

    /// Delays every history request, to simulate slow passes
    pub fn set_history_delay(&self, delay: Duration) {
        *self
            .history_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(delay);
    }

    pub fn calls(&self) -> Vec<Op> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: &Op) -> usize {
        self.state().calls.iter().filter(|call| *call == op).count()
    }

    /// Highest number of history requests that were running at once
    pub fn max_concurrent_history(&self) -> usize {
        self.max_history_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, op: Op) -> PlatformResult<()> {
        let mut state = self.state();
        state.calls.push(op.clone());
        if state.failures.contains(&op) {
            return Err(PlatformError::Rpc {
                code: 500,
                message: format!("injected failure for {op:?}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for MemoryPlatform {
    async fn authorize(&self) -> PlatformResult<UserRecord> {
        self.record(Op::Authorize)?;
        self.state()
            .me
            .clone()
            .ok_or_else(|| PlatformError::Unauthorized {
                message: "no session".to_string(),
            })
    }

    async fn resolve_handle(&self, handle: &str) -> PlatformResult<ResolvedHandle> {
        self.record(Op::ResolveHandle(handle.to_string()))?;
        self.state()
            .handles
            .get(handle)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound {
                what: format!("username {handle}"),
            })
    }

    async fn get_history(&self, peer: &PeerRef, limit: usize) -> PlatformResult<History> {
        self.record(Op::History(peer.id()))?;

        let in_flight = self.history_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_history_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self
            .history_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let history = self.state().histories.get(&peer.id()).cloned();
        self.history_in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut history = history.ok_or_else(|| PlatformError::NotFound {
            what: format!("peer {id}", id = peer.id()),
        })?;
        // Newest first, like the real history endpoint
        history.messages.sort_by_key(|message| match message {
            MessageClass::Message(m) => std::cmp::Reverse(m.id),
            MessageClass::Service(m) => std::cmp::Reverse(m.id),
            MessageClass::Empty { id } => std::cmp::Reverse(*id),
        });
        history.messages.truncate(limit);
        Ok(history)
    }

    async fn get_full_channel(&self, channel: &ChannelRef) -> PlatformResult<FullChannelInfo> {
        self.record(Op::FullChannel(channel.id))?;
        self.state()
            .full_channels
            .get(&channel.id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound {
                what: format!("channel {id}", id = channel.id),
            })
    }

    async fn get_users(&self, ids: &[i64]) -> PlatformResult<Vec<UserRecord>> {
        self.record(Op::Users)?;
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn get_channels(&self, ids: &[i64]) -> PlatformResult<Vec<ChatRecord>> {
        self.record(Op::Channels)?;
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.chats.get(id).cloned())
            .collect())
    }

    async fn run_updates(
        &self,
        tx: mpsc::Sender<Notification>,
        cancel: CancellationToken,
    ) -> PlatformResult<()> {
        let queued = std::mem::take(&mut self.state().notifications);
        for notification in queued {
            if tx.send(notification).await.is_err() {
                return Ok(());
            }
        }
        cancel.cancelled().await;
        Ok(())
    }
}
