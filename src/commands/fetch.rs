use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use tgwatch::activity::{ActivityItem, ActivitySink};
use tgwatch::config::{ConnectionArgs, MonitorArgs, MonitorSettings};
use tgwatch::datetime_utils::format_for_display;
use tgwatch::error_utils::serialize_to_json_with_context;
use tgwatch::pipeline::{Pipeline, PipelineConfig};

use super::{ensure_authorized, open_gateway};

/// Prints activity to stdout, one item per line
struct StdoutSink {
    json: bool,
}

impl ActivitySink for StdoutSink {
    fn emit(&self, item: &ActivityItem) {
        if self.json {
            match serialize_to_json_with_context(item, "activity item") {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("{e:#}"),
            }
            return;
        }

        println!(
            "[{date}] {kind} in {chat}: {author}: {text}",
            date = format_for_display(&item.timestamp),
            kind = item.kind,
            chat = item.chat_title,
            author = item.author,
            text = item.text
        );
    }
}

/// Resolves the channels, runs one polling pass and prints what it found
pub async fn execute(connection: &ConnectionArgs, monitor: &MonitorArgs, json: bool) -> Result<()> {
    let settings = MonitorSettings::validate(monitor)?;
    let gateway = open_gateway(connection)?;
    ensure_authorized(&gateway, monitor.phone.as_deref()).await?;

    let pipeline = Pipeline::build(
        gateway,
        Arc::new(StdoutSink { json }),
        &settings.channels,
        &PipelineConfig::from(&settings),
    )
    .await
    .context("Failed to resolve channels")?;

    let summary = pipeline.run_once().await;
    info!(
        "Fetched {emitted} items from {channels} channels in {duration:.2}s",
        emitted = summary.emitted,
        channels = summary.channels,
        duration = summary.elapsed.as_secs_f64()
    );
    Ok(())
}
