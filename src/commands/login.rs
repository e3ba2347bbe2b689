use anyhow::{bail, Context, Result};
use tracing::info;

use tgwatch::config::ConnectionArgs;
use tgwatch::error_utils::prompt_line;
use tgwatch::gateway::HttpGateway;
use tgwatch::platform::{PlatformClient, PlatformError, UserRecord};

use super::open_gateway;

/// Logs in with a code sent to `phone` and stores the session
pub async fn execute(connection: &ConnectionArgs, phone: &str, force: bool) -> Result<()> {
    let gateway = open_gateway(connection)?;

    if !force {
        if let Ok(me) = gateway.authorize().await {
            info!(
                "Already logged in as {name} ({id}), use --force to log in again",
                name = me.display_name(),
                id = me.id
            );
            return Ok(());
        }
    }

    let me = interactive_login(&gateway, phone).await?;
    info!(
        "Logged in as {name} ({id}), session stored in {path}",
        name = me.display_name(),
        id = me.id,
        path = connection.session_file.display()
    );
    Ok(())
}

/// Runs the code login flow, reading the code from the terminal
pub async fn interactive_login(gateway: &HttpGateway, phone: &str) -> Result<UserRecord> {
    let phone_code_hash = gateway
        .send_code(phone)
        .await
        .context("Failed to request login code")?;

    let code = tokio::task::spawn_blocking(|| prompt_line("Enter the login code: "))
        .await
        .context("Login prompt task failed")??;
    if code.is_empty() {
        bail!("No login code entered");
    }

    let me = match gateway.sign_in(phone, &phone_code_hash, &code).await {
        Ok(me) => me,
        Err(PlatformError::PasswordRequired) => {
            bail!("This account has two-step verification enabled, which is not supported")
        }
        Err(e) => return Err(e).context("Failed to sign in"),
    };

    if !gateway.has_session() {
        bail!("Gateway accepted the login but returned no session");
    }
    Ok(me)
}
