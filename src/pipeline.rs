use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::activity::ActivitySink;
use crate::config::MonitorSettings;
use crate::dedup::{ActivityDeduper, DEFAULT_RETENTION};
use crate::entity_cache::EntityCache;
use crate::history::{HistoryFetcher, DEFAULT_HISTORY_LIMIT};
use crate::live::LiveUpdateSink;
use crate::platform::{ChannelRef, PlatformClient};
use crate::resolver::{ChannelResolver, ResolveError};
use crate::scheduler::{PassSummary, Scheduler, DEFAULT_POLL_INTERVAL};

/// Notifications buffered between the update loop and the live sink
const UPDATE_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub poll_interval: Duration,
    pub history_limit: usize,
    pub dedup_retention: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            history_limit: DEFAULT_HISTORY_LIMIT,
            dedup_retention: DEFAULT_RETENTION,
        }
    }
}

impl From<&MonitorSettings> for PipelineConfig {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            history_limit: settings.history_limit,
            dedup_retention: settings.dedup_retention,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub channels: usize,
    pub passes: u64,
    pub emitted: u64,
    pub suppressed: u64,
    pub live_received: u64,
    pub cached_entities: usize,
}

/// The assembled monitoring pipeline.
///
/// Polling and live updates share one entity cache and one deduper; the
/// deduper hands every new item to the reporting sink.
pub struct Pipeline {
    client: Arc<dyn PlatformClient>,
    cache: EntityCache,
    deduper: Arc<ActivityDeduper>,
    scheduler: Arc<Scheduler>,
    live: Arc<LiveUpdateSink>,
}

impl Pipeline {
    /// Resolves `handles` and wires the components together.
    ///
    /// Fails when none of the handles resolves to a channel.
    pub async fn build(
        client: Arc<dyn PlatformClient>,
        sink: Arc<dyn ActivitySink>,
        handles: &[String],
        config: &PipelineConfig,
    ) -> Result<Self, ResolveError> {
        let cache = EntityCache::new();
        let channels = ChannelResolver::new(client.clone(), cache.clone())
            .resolve(handles)
            .await?;

        let deduper = Arc::new(ActivityDeduper::new(
            sink,
            config.dedup_retention.max(config.history_limit),
        ));
        let fetcher =
            HistoryFetcher::new(client.clone(), cache.clone()).with_limit(config.history_limit);
        let scheduler = Arc::new(Scheduler::new(
            fetcher,
            deduper.clone(),
            channels,
            config.poll_interval,
        ));
        let live = Arc::new(LiveUpdateSink::new(
            client.clone(),
            cache.clone(),
            deduper.clone(),
        ));

        Ok(Self {
            client,
            cache,
            deduper,
            scheduler,
            live,
        })
    }

    pub fn channels(&self) -> &[ChannelRef] {
        self.scheduler.channels()
    }

    pub fn live(&self) -> &Arc<LiveUpdateSink> {
        &self.live
    }

    /// Runs a single polling pass
    pub async fn run_once(&self) -> PassSummary {
        self.scheduler.run_pass().await
    }

    /// Runs polling and live updates until `cancel` fires.
    ///
    /// The baseline pass completes before the live path starts. Returns
    /// after every task has stopped.
    pub async fn run(&self, cancel: CancellationToken) {
        let scheduler_handle = self.scheduler.clone().start(cancel.clone()).await;

        let (tx, rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
        let live_handle = {
            let live = self.live.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { live.run(rx, cancel).await })
        };

        if !cancel.is_cancelled() {
            match self.client.run_updates(tx, cancel.clone()).await {
                Ok(()) if !cancel.is_cancelled() => {
                    debug!("Live updates ended before shutdown, continuing with polling only")
                }
                Ok(()) => {}
                Err(e) => error!("Live updates stopped: {e}. Continuing with polling only"),
            }
            cancel.cancelled().await;
        }

        info!("Waiting for pipeline tasks to finish");
        if let Err(e) = scheduler_handle.await {
            warn!("Scheduler task failed: {e}");
        }
        if let Err(e) = live_handle.await {
            warn!("Live update task failed: {e}");
        }
    }

    pub async fn stats(&self) -> PipelineStats {
        PipelineStats {
            channels: self.scheduler.channels().len(),
            passes: self.scheduler.passes_completed(),
            emitted: self.deduper.emitted(),
            suppressed: self.deduper.suppressed(),
            live_received: self.live.received(),
            cached_entities: self.cache.len().await,
        }
    }
}
