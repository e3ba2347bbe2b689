use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tgwatch::activity::TracingSink;
use tgwatch::config::{ConnectionArgs, MonitorArgs, MonitorSettings};
use tgwatch::datetime_utils::format_uptime;
use tgwatch::pipeline::{Pipeline, PipelineConfig, PipelineStats};

use super::{ensure_authorized, open_gateway};

/// How often running statistics are logged
const STATS_INTERVAL: Duration = Duration::from_secs(600);

/// Runs the monitoring pipeline until Ctrl+C
pub async fn execute(connection: &ConnectionArgs, monitor: &MonitorArgs) -> Result<()> {
    let settings = MonitorSettings::validate(monitor)?;
    let gateway = open_gateway(connection)?;
    ensure_authorized(&gateway, monitor.phone.as_deref()).await?;

    info!(
        "Starting monitor for {count} channels with {interval} second interval",
        count = settings.channels.len(),
        interval = settings.poll_interval.as_secs()
    );

    let pipeline = Arc::new(
        Pipeline::build(
            gateway,
            Arc::new(TracingSink),
            &settings.channels,
            &PipelineConfig::from(&settings),
        )
        .await
        .context("Failed to resolve channels")?,
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = signal::ctrl_c().await;
            info!("Received shutdown signal (Ctrl+C)");
            cancel.cancel();
        });
    }

    let start_time = Instant::now();
    let stats_handle = spawn_stats_reporter(pipeline.clone(), start_time);

    pipeline.run(cancel).await;

    stats_handle.abort();
    print_final_stats(&pipeline.stats().await, start_time.elapsed());
    info!("Monitor shutdown complete");
    Ok(())
}

fn spawn_stats_reporter(
    pipeline: Arc<Pipeline>,
    start_time: Instant,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + STATS_INTERVAL, STATS_INTERVAL);

        loop {
            interval.tick().await;

            let stats = pipeline.stats().await;
            info!(
                "Stats | Uptime: {uptime} | Passes: {passes} | Emitted: {emitted} | Duplicates: {suppressed} | Live: {live_received}",
                uptime = format_uptime(start_time.elapsed()),
                passes = stats.passes,
                emitted = stats.emitted,
                suppressed = stats.suppressed,
                live_received = stats.live_received
            );
        }
    })
}

fn print_final_stats(stats: &PipelineStats, uptime: Duration) {
    info!("=== Final Monitor Statistics ===");
    info!("Uptime: {uptime}", uptime = format_uptime(uptime));
    info!("Channels monitored: {channels}", channels = stats.channels);
    info!("Polling passes: {passes}", passes = stats.passes);
    info!(
        "Live notifications received: {live_received}",
        live_received = stats.live_received
    );
    info!("Activity emitted: {emitted}", emitted = stats.emitted);
    info!("Duplicates suppressed: {suppressed}", suppressed = stats.suppressed);
    info!(
        "Cached entities: {cached_entities}",
        cached_entities = stats.cached_entities
    );
    info!("================================");
}
