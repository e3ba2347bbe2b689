use anyhow::{Context, Result};
use tracing::info;

use tgwatch::config::ConnectionArgs;
use tgwatch::entity_cache::EntityCache;
use tgwatch::resolver::ChannelResolver;

use super::{ensure_authorized, open_gateway};

/// Resolves channel handles and prints `id access_hash title` per channel
pub async fn execute(
    connection: &ConnectionArgs,
    channels: &[String],
    phone: Option<&str>,
) -> Result<()> {
    let gateway = open_gateway(connection)?;
    ensure_authorized(&gateway, phone).await?;

    let resolved = ChannelResolver::new(gateway, EntityCache::new())
        .resolve(channels)
        .await
        .context("Failed to resolve channels")?;

    for channel in &resolved {
        println!(
            "{id}\t{access_hash}\t{title}",
            id = channel.id,
            access_hash = channel.access_hash,
            title = channel.title
        );
    }
    info!(
        "Resolved {count} of {total} channels",
        count = resolved.len(),
        total = channels.len()
    );
    Ok(())
}
