use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use tgwatch::config::{ConnectionArgs, ConnectionSettings};
use tgwatch::gateway::HttpGateway;
use tgwatch::platform::{PlatformClient, PlatformError, UserRecord};
use tgwatch::session::FileSessionStore;

pub mod fetch;
pub mod login;
pub mod logout;
pub mod monitor;
pub mod resolve;

/// Validates the connection settings and opens the gateway client
pub fn open_gateway(connection: &ConnectionArgs) -> Result<Arc<HttpGateway>> {
    let settings = ConnectionSettings::validate(connection)?;
    let store = FileSessionStore::new(&settings.session_file);
    let gateway = HttpGateway::connect(&settings.gateway_url, settings.credentials, Arc::new(store))
        .context("Failed to initialize gateway client")?;
    Ok(Arc::new(gateway))
}

/// Checks the stored session, logging in with `phone` when it is not valid
pub async fn ensure_authorized(gateway: &HttpGateway, phone: Option<&str>) -> Result<UserRecord> {
    let me = match gateway.authorize().await {
        Ok(me) => me,
        Err(PlatformError::Unauthorized { message }) => {
            let phone = phone.with_context(|| {
                format!(
                    "Not logged in ({message}). Run `tgwatch login --phone <number>` or pass --phone"
                )
            })?;
            info!("No valid session, starting login");
            login::interactive_login(gateway, phone).await?
        }
        Err(e) => return Err(e).context("Failed to check session"),
    };

    info!(
        "Logged in as {name} ({id})",
        name = me.display_name(),
        id = me.id
    );
    Ok(me)
}
