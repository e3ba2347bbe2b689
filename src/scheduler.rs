use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dedup::ActivityDeduper;
use crate::history::HistoryFetcher;
use crate::platform::ChannelRef;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Outcome of one polling pass over every channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub channels: usize,
    pub fetched: usize,
    pub emitted: usize,
    pub duplicates: usize,
    pub elapsed: Duration,
}

/// Polls all channels once at start, then once per interval.
pub struct Scheduler {
    fetcher: HistoryFetcher,
    deduper: Arc<ActivityDeduper>,
    channels: Vec<ChannelRef>,
    interval: Duration,
    state: Mutex<SchedulerState>,
    passes: AtomicU64,
}

impl Scheduler {
    pub fn new(
        fetcher: HistoryFetcher,
        deduper: Arc<ActivityDeduper>,
        channels: Vec<ChannelRef>,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            deduper,
            channels,
            interval: interval.max(Duration::from_millis(1)),
            state: Mutex::new(SchedulerState::Idle),
            passes: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: SchedulerState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn channels(&self) -> &[ChannelRef] {
        &self.channels
    }

    /// Number of passes that ran to completion
    pub fn passes_completed(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Fetches every channel in order and feeds the results to the deduper
    pub async fn run_pass(&self) -> PassSummary {
        let started = Instant::now();
        let mut summary = PassSummary {
            channels: self.channels.len(),
            ..PassSummary::default()
        };

        for channel in &self.channels {
            let items = self.fetcher.fetch_activity(channel).await;
            summary.fetched += items.len();
            for item in &items {
                if self.deduper.observe(item) {
                    summary.emitted += 1;
                } else {
                    summary.duplicates += 1;
                }
            }
        }

        summary.elapsed = started.elapsed();
        self.passes.fetch_add(1, Ordering::Relaxed);

        info!(
            "Polling pass completed in {duration:.2}s - {channels} channels, {fetched} items, {emitted} new",
            duration = summary.elapsed.as_secs_f64(),
            channels = summary.channels,
            fetched = summary.fetched,
            emitted = summary.emitted
        );
        summary
    }

    /// Runs the baseline pass, then spawns the periodic loop.
    ///
    /// Cancelling `cancel` abandons the pass in flight and stops the loop.
    pub async fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        self.set_state(SchedulerState::Running);
        info!(
            "Running initial pass over {count} channels",
            count = self.channels.len()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Initial pass interrupted by shutdown");
            }
            _ = self.run_pass() => {}
        }

        tokio::spawn(async move { self.run_periodic(cancel).await })
    }

    /// Runs a pass every interval until cancelled; the first tick is one
    /// interval from now.
    pub async fn run_periodic(&self, cancel: CancellationToken) {
        self.set_state(SchedulerState::Running);

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Polling pass abandoned for shutdown");
                    break;
                }
                _ = self.run_pass() => {}
            }
        }

        self.set_state(SchedulerState::Stopped);
        debug!(
            "Scheduler stopped after {passes} passes",
            passes = self.passes_completed()
        );
    }
}
