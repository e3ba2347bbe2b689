//! [`PlatformClient`] speaking JSON over HTTP to an MTProto gateway.
//!
//! Every call is a `POST {base}/{method}` carrying the application
//! credentials and the current session. Responses use the envelope
//! `{"ok": true, "result": ...}` or
//! `{"ok": false, "error_code": n, "description": "..."}`, and any response
//! may carry a rotated `session` which is persisted right away.

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoffBuilder};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error_utils::create_http_client_with_context;
use crate::platform::{
    ChannelRef, ChatRecord, FullChannelInfo, History, Notification, PeerRef, PlatformClient,
    PlatformError, PlatformResult, ResolvedHandle, UserRecord,
};
use crate::session::{SessionError, SessionStore};

pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8081";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
/// Longest flood wait that is slept through instead of reported
const MAX_FLOOD_WAIT_SECS: u64 = 60;
/// Server-side wait of one `updates.poll` long poll
const UPDATES_POLL_SECS: u64 = 25;

/// Application credentials issued by the platform
#[derive(Clone)]
pub struct GatewayCredentials {
    pub api_id: i32,
    pub api_hash: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    error_code: Option<i32>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentCode {
    phone_code_hash: String,
}

/// Maps a gateway error reply onto [`PlatformError`]
pub fn classify_rpc_error(
    status: u16,
    error_code: Option<i32>,
    description: &str,
) -> PlatformError {
    if let Some(seconds) = description
        .strip_prefix("FLOOD_WAIT_")
        .and_then(|rest| rest.parse::<u64>().ok())
    {
        return PlatformError::FloodWait { seconds };
    }

    if description.contains("SESSION_PASSWORD_NEEDED") {
        return PlatformError::PasswordRequired;
    }

    if ["USERNAME_NOT_OCCUPIED", "USERNAME_INVALID", "CHANNEL_INVALID"]
        .iter()
        .any(|marker| description.contains(marker))
    {
        return PlatformError::NotFound {
            what: description.to_string(),
        };
    }

    let code = error_code.unwrap_or(i32::from(status));
    match code {
        401 => PlatformError::Unauthorized {
            message: description.to_string(),
        },
        404 => PlatformError::NotFound {
            what: description.to_string(),
        },
        429 => PlatformError::FloodWait {
            // "Too Many Requests: retry after 5"
            seconds: description
                .rsplit(' ')
                .next()
                .and_then(|last| last.parse().ok())
                .unwrap_or(1),
        },
        _ => PlatformError::Rpc {
            code,
            message: description.to_string(),
        },
    }
}

/// Production [`PlatformClient`] backed by an HTTP gateway
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    credentials: GatewayCredentials,
    store: Arc<dyn SessionStore>,
    /// Base64 session sent with every request
    session: RwLock<Option<String>>,
}

impl HttpGateway {
    /// Creates a gateway client and loads the stored session, if any
    pub fn connect(
        base_url: &str,
        credentials: GatewayCredentials,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid gateway URL: {base_url}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let session = match store.load() {
            Ok(data) => Some(BASE64.encode(data)),
            Err(SessionError::NotFound) => {
                debug!("No stored session, starting unauthenticated");
                None
            }
            Err(e) => return Err(e).context("Failed to load stored session"),
        };

        let client = create_http_client_with_context(REQUEST_TIMEOUT)?;

        Ok(Self {
            client,
            base_url,
            credentials,
            store,
            session: RwLock::new(session),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn has_session(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Requests a login code for `phone`; returns the code hash for [`Self::sign_in`]
    pub async fn send_code(&self, phone: &str) -> PlatformResult<String> {
        let sent: SentCode = self.call("auth.sendCode", json!({ "phone": phone })).await?;
        info!("Login code sent to {phone}");
        Ok(sent.phone_code_hash)
    }

    /// Completes the code login. Accounts with two-step verification fail
    /// with [`PlatformError::PasswordRequired`].
    pub async fn sign_in(
        &self,
        phone: &str,
        phone_code_hash: &str,
        code: &str,
    ) -> PlatformResult<UserRecord> {
        self.call(
            "auth.signIn",
            json!({
                "phone": phone,
                "phone_code_hash": phone_code_hash,
                "code": code,
            }),
        )
        .await
    }

    fn adopt_session(&self, encoded: String) {
        let decoded = match BASE64.decode(encoded.as_bytes()) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Ignoring malformed session from gateway: {e}");
                return;
            }
        };

        {
            let mut session = self
                .session
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if session.as_deref() == Some(encoded.as_str()) {
                return;
            }
            *session = Some(encoded);
        }

        match self.store.store(&decoded) {
            Ok(()) => debug!("Stored rotated session"),
            Err(e) => warn!("Failed to persist rotated session: {e}"),
        }
    }

    /// Sends one request without retrying
    async fn call_once(
        &self,
        method: &str,
        params: &Value,
        timeout: Duration,
    ) -> PlatformResult<Value> {
        let url = self
            .base_url
            .join(method)
            .map_err(|e| PlatformError::Decode {
                what: format!("method name {method}"),
                message: e.to_string(),
            })?;

        let session = self
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut request = self
            .client
            .post(url)
            .header("X-Api-Id", self.credentials.api_id.to_string())
            .header("X-Api-Hash", &self.credentials.api_hash)
            .timeout(timeout)
            .json(params);
        if let Some(session) = session {
            request = request.header("X-Session", session);
        }

        trace!("Calling gateway method {method}");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: Envelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(PlatformError::Decode {
                    what: format!("{method} response"),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                let reason = status.canonical_reason().unwrap_or("unknown status");
                return Err(classify_rpc_error(status.as_u16(), None, reason));
            }
        };

        if let Some(rotated) = envelope.session {
            self.adopt_session(rotated);
        }

        if envelope.ok && status.is_success() {
            return Ok(envelope.result.unwrap_or(Value::Null));
        }

        let description = envelope
            .description
            .unwrap_or_else(|| status.to_string());
        let status = if status == StatusCode::OK {
            // Errors reported inside a 200 envelope
            envelope
                .error_code
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(400)
        } else {
            status.as_u16()
        };
        Err(classify_rpc_error(status, envelope.error_code, &description))
    }

    /// Calls `method`, retrying timeouts and short flood waits
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> PlatformResult<T> {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(10))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .build();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.call_once(method, &params, REQUEST_TIMEOUT).await {
                Ok(result) => {
                    return serde_json::from_value(result).map_err(|e| PlatformError::Decode {
                        what: format!("{method} result"),
                        message: e.to_string(),
                    })
                }
                Err(error) => error,
            };

            let wait = match &error {
                PlatformError::Transport(err) if err.is_timeout() || err.is_connect() => Some(
                    backoff
                        .next_backoff()
                        .unwrap_or(Duration::from_secs(u64::from(attempt))),
                ),
                PlatformError::FloodWait { seconds } if *seconds <= MAX_FLOOD_WAIT_SECS => {
                    Some(Duration::from_secs(*seconds))
                }
                _ => None,
            };

            match wait {
                Some(base) if attempt < MAX_ATTEMPTS => {
                    let sleep_duration = with_jitter(base);
                    debug!(
                        "{method} failed: {error}. Retrying in {sleep_duration:?} (attempt {attempt}/{MAX_ATTEMPTS})"
                    );
                    tokio::time::sleep(sleep_duration).await;
                }
                _ => return Err(error),
            }
        }
    }
}

/// Adds up to 250ms of random jitter
fn with_jitter(base: Duration) -> Duration {
    base + Duration::from_millis(rand::random::<u64>() % 250)
}

#[async_trait]
impl PlatformClient for HttpGateway {
    async fn authorize(&self) -> PlatformResult<UserRecord> {
        if !self.has_session() {
            return Err(PlatformError::Unauthorized {
                message: "no stored session".to_string(),
            });
        }
        self.call("users.getSelf", json!({})).await
    }

    async fn resolve_handle(&self, handle: &str) -> PlatformResult<ResolvedHandle> {
        self.call("contacts.resolveUsername", json!({ "username": handle }))
            .await
    }

    async fn get_history(&self, peer: &PeerRef, limit: usize) -> PlatformResult<History> {
        self.call("messages.getHistory", json!({ "peer": peer, "limit": limit }))
            .await
    }

    async fn get_full_channel(&self, channel: &ChannelRef) -> PlatformResult<FullChannelInfo> {
        self.call(
            "channels.getFullChannel",
            json!({ "channel": { "id": channel.id, "access_hash": channel.access_hash } }),
        )
        .await
    }

    async fn get_users(&self, ids: &[i64]) -> PlatformResult<Vec<UserRecord>> {
        self.call("users.getUsers", json!({ "ids": ids })).await
    }

    async fn get_channels(&self, ids: &[i64]) -> PlatformResult<Vec<ChatRecord>> {
        self.call("channels.getChannels", json!({ "ids": ids })).await
    }

    async fn run_updates(
        &self,
        tx: mpsc::Sender<Notification>,
        cancel: CancellationToken,
    ) -> PlatformResult<()> {
        let poll_timeout = REQUEST_TIMEOUT + Duration::from_secs(UPDATES_POLL_SECS);
        let mut offset: i64 = 0;
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(None)
            .build();

        info!("Listening for live updates");

        loop {
            let params = json!({ "offset": offset, "timeout": UPDATES_POLL_SECS });
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                result = self.call_once("updates.poll", &params, poll_timeout) => result,
            };

            let updates = match result {
                Ok(Value::Array(updates)) => {
                    backoff.reset();
                    updates
                }
                Ok(other) => {
                    warn!("Unexpected updates.poll result: {other}");
                    Vec::new()
                }
                Err(e @ PlatformError::Unauthorized { .. }) => return Err(e),
                Err(e) => {
                    let delay = match e {
                        PlatformError::FloodWait { seconds } => Duration::from_secs(seconds),
                        _ => backoff.next_backoff().unwrap_or(Duration::from_secs(60)),
                    };
                    warn!("Update polling failed: {e}. Retrying in {delay:?}");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(with_jitter(delay)) => {}
                    }
                    continue;
                }
            };

            for update in updates {
                if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(update_id.saturating_add(1));
                }

                let notification = match serde_json::from_value::<Notification>(update) {
                    Ok(Notification::Other) => continue,
                    Ok(notification) => notification,
                    Err(e) => {
                        debug!("Skipping malformed update: {e}");
                        continue;
                    }
                };

                if tx.send(notification).await.is_err() {
                    debug!("Update receiver closed");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MessageClass, PeerId};
    use crate::session::FileSessionStore;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const API_HASH: &str = "0123456789abcdef0123456789abcdef";

    fn credentials() -> GatewayCredentials {
        GatewayCredentials {
            api_id: 12345,
            api_hash: API_HASH.to_string(),
        }
    }

    fn gateway(url: &str, temp_dir: &TempDir, session: Option<&[u8]>) -> HttpGateway {
        let store = FileSessionStore::new(temp_dir.path().join("session.json"));
        if let Some(session) = session {
            store.store(session).unwrap();
        }
        HttpGateway::connect(url, credentials(), Arc::new(store)).unwrap()
    }

    #[test]
    fn test_classify_rpc_error() {
        assert!(matches!(
            classify_rpc_error(420, Some(420), "FLOOD_WAIT_17"),
            PlatformError::FloodWait { seconds: 17 }
        ));
        assert!(matches!(
            classify_rpc_error(400, Some(400), "USERNAME_NOT_OCCUPIED"),
            PlatformError::NotFound { .. }
        ));
        assert!(matches!(
            classify_rpc_error(400, Some(400), "CHANNEL_INVALID"),
            PlatformError::NotFound { .. }
        ));
        assert!(matches!(
            classify_rpc_error(401, None, "AUTH_KEY_UNREGISTERED"),
            PlatformError::Unauthorized { .. }
        ));
        assert!(matches!(
            classify_rpc_error(401, Some(401), "SESSION_PASSWORD_NEEDED"),
            PlatformError::PasswordRequired
        ));
        assert!(matches!(
            classify_rpc_error(429, None, "Too Many Requests: retry after 5"),
            PlatformError::FloodWait { seconds: 5 }
        ));
        assert!(matches!(
            classify_rpc_error(500, Some(500), "INTERNAL"),
            PlatformError::Rpc { code: 500, .. }
        ));
    }

    #[test]
    fn test_credentials_debug_hides_hash() {
        let debug = format!("{:?}", credentials());
        assert!(debug.contains("12345"));
        assert!(!debug.contains(API_HASH));
    }

    #[tokio::test]
    async fn test_authorize_sends_credentials_and_session() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/users.getSelf")
            .match_header("x-api-id", "12345")
            .match_header("x-api-hash", API_HASH)
            .match_header("x-session", BASE64.encode(b"stored").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true, "result": {"id": 1, "first_name": "Me"}}"#)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &temp_dir, Some(b"stored"));

        let me = gateway.authorize().await.unwrap();
        assert_eq!(me.display_name(), "Me");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_authorize_without_session() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = gateway("http://127.0.0.1:9", &temp_dir, None);

        assert!(!gateway.has_session());
        assert!(matches!(
            gateway.authorize().await,
            Err(PlatformError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_session_rotation_is_persisted() {
        let mut server = mockito::Server::new_async().await;
        let rotated = BASE64.encode(b"rotated");
        let body = json!({
            "ok": true,
            "result": {"peer": {"type": "channel", "id": 42}, "chats": [], "users": []},
            "session": rotated,
        });
        server
            .mock("POST", "/contacts.resolveUsername")
            .match_body(Matcher::PartialJson(json!({"username": "news_feed"})))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;
        let follow_up = server
            .mock("POST", "/users.getUsers")
            .match_header("x-session", rotated.as_str())
            .with_status(200)
            .with_body(r#"{"ok": true, "result": []}"#)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &temp_dir, Some(b"original"));

        let resolved = gateway.resolve_handle("news_feed").await.unwrap();
        assert_eq!(resolved.peer, Some(PeerId::Channel(42)));

        let store = FileSessionStore::new(temp_dir.path().join("session.json"));
        assert_eq!(store.load().unwrap(), b"rotated");

        assert!(gateway.get_users(&[1]).await.unwrap().is_empty());
        follow_up.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_envelopes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contacts.resolveUsername")
            .with_status(400)
            .with_body(r#"{"ok": false, "error_code": 400, "description": "USERNAME_NOT_OCCUPIED"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/users.getSelf")
            .with_status(401)
            .with_body(r#"{"ok": false, "error_code": 401, "description": "AUTH_KEY_UNREGISTERED"}"#)
            .create_async()
            .await;
        let long_flood = server
            .mock("POST", "/channels.getChannels")
            .with_status(420)
            .with_body(r#"{"ok": false, "error_code": 420, "description": "FLOOD_WAIT_600"}"#)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/users.getUsers")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &temp_dir, Some(b"s"));

        assert!(matches!(
            gateway.resolve_handle("missing_one").await,
            Err(PlatformError::NotFound { .. })
        ));
        assert!(matches!(
            gateway.authorize().await,
            Err(PlatformError::Unauthorized { .. })
        ));
        assert!(matches!(
            gateway.get_channels(&[1]).await,
            Err(PlatformError::FloodWait { seconds: 600 })
        ));
        long_flood.assert_async().await;
        assert!(matches!(
            gateway.get_users(&[1]).await,
            Err(PlatformError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_short_flood_wait_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/users.getUsers")
            .with_status(420)
            .with_body(r#"{"ok": false, "error_code": 420, "description": "FLOOD_WAIT_0"}"#)
            .expect(3)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &temp_dir, Some(b"s"));

        assert!(matches!(
            gateway.get_users(&[1]).await,
            Err(PlatformError::FloodWait { seconds: 0 })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_history_request_shape() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "ok": true,
            "result": {
                "messages": [
                    {"type": "message", "id": 100, "peer": {"type": "channel", "id": 42}, "date": 1, "text": "hi", "post": true}
                ]
            }
        });
        let mock = server
            .mock("POST", "/messages.getHistory")
            .match_body(Matcher::PartialJson(json!({
                "peer": {"type": "channel", "id": 42, "access_hash": 7},
                "limit": 10
            })))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let gateway = gateway(&server.url(), &temp_dir, Some(b"s"));
        let history = gateway
            .get_history(&PeerRef::Channel { id: 42, access_hash: 7 }, 10)
            .await
            .unwrap();

        assert_eq!(history.messages.len(), 1);
        assert!(matches!(history.messages[0], MessageClass::Message(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_updates_skips_malformed() {
        let mut server = mockito::Server::new_async().await;
        let first_batch = json!({
            "ok": true,
            "result": [
                {"update_id": 1, "type": "new_message", "message": {"type": "message", "id": 5, "peer": {"type": "user", "id": 9}, "date": 0, "text": "hi"}},
                {"update_id": 2, "type": "new_message", "message": "garbage"},
                {"update_id": 3, "type": "user_typing"}
            ]
        });
        server
            .mock("POST", "/updates.poll")
            .match_body(Matcher::PartialJson(json!({"offset": 0})))
            .with_status(200)
            .with_body(first_batch.to_string())
            .create_async()
            .await;
        let next_poll = server
            .mock("POST", "/updates.poll")
            .match_body(Matcher::PartialJson(json!({"offset": 4})))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": []}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let gateway = Arc::new(gateway(&server.url(), &temp_dir, Some(b"s")));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = {
            let gateway = gateway.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gateway.run_updates(tx, cancel).await })
        };

        let notification = rx.recv().await.unwrap();
        assert!(matches!(notification, Notification::NewMessage(_)));

        // Wait until the offset moved past the whole batch
        while !next_poll.matched_async().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_updates_offset_saturates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/updates.poll")
            .match_body(Matcher::PartialJson(json!({"offset": 0})))
            .with_status(200)
            .with_body(
                json!({
                    "ok": true,
                    "result": [
                        {"update_id": i64::MAX, "type": "new_message", "message": {"type": "message", "id": 5, "peer": {"type": "user", "id": 9}, "date": 0, "text": "hi"}}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let next_poll = server
            .mock("POST", "/updates.poll")
            .match_body(Matcher::PartialJson(json!({"offset": i64::MAX})))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": []}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let gateway = Arc::new(gateway(&server.url(), &temp_dir, Some(b"s")));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = {
            let gateway = gateway.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gateway.run_updates(tx, cancel).await })
        };

        assert!(matches!(rx.recv().await.unwrap(), Notification::NewMessage(_)));
        while !next_poll.matched_async().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
