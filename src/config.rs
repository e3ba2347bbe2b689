use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::dedup::DEFAULT_RETENTION;
use crate::gateway::{GatewayCredentials, DEFAULT_GATEWAY_URL};
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::session::DEFAULT_SESSION_FILE;

/// Largest history window the platform serves in one request
pub const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not set. Pass {flag} or set the {name} environment variable")]
    Missing {
        name: &'static str,
        flag: &'static str,
    },

    #[error("TELEGRAM_API_ID must be a positive integer, got {value:?}")]
    InvalidApiId { value: String },

    #[error("TELEGRAM_API_HASH must be 32 hexadecimal characters")]
    InvalidApiHash,

    #[error("Invalid gateway URL {value:?}: {reason}")]
    InvalidGatewayUrl { value: String, reason: String },

    #[error("No channels configured. Pass --channel or set TGWATCH_CHANNELS")]
    NoChannels,

    #[error("Poll interval must be at least one second")]
    InvalidPollInterval,

    #[error("History limit must be between 1 and 100, got {value}")]
    InvalidHistoryLimit { value: usize },
}

/// How to reach the platform gateway
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Application id issued by the platform
    #[arg(long, env = "TELEGRAM_API_ID", global = true)]
    pub api_id: Option<String>,

    /// Application hash issued by the platform
    #[arg(long, env = "TELEGRAM_API_HASH", global = true, hide_env_values = true)]
    pub api_hash: Option<String>,

    /// Base URL of the MTProto HTTP gateway
    #[arg(long, env = "TGWATCH_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL, global = true)]
    pub gateway_url: String,

    /// File holding the authenticated session
    #[arg(long, env = "TGWATCH_SESSION_FILE", default_value = DEFAULT_SESSION_FILE, global = true)]
    pub session_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub credentials: GatewayCredentials,
    pub gateway_url: String,
    pub session_file: PathBuf,
}

impl ConnectionSettings {
    pub fn validate(args: &ConnectionArgs) -> Result<Self, ConfigError> {
        let api_id = args
            .api_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing {
                name: "TELEGRAM_API_ID",
                flag: "--api-id",
            })?;
        let api_id = api_id
            .parse::<i32>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ConfigError::InvalidApiId {
                value: api_id.to_string(),
            })?;

        let api_hash = args
            .api_hash
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing {
                name: "TELEGRAM_API_HASH",
                flag: "--api-hash",
            })?;
        if api_hash.len() != 32 || !api_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidApiHash);
        }

        let gateway_url = args.gateway_url.trim().to_string();
        let parsed = Url::parse(&gateway_url).map_err(|e| ConfigError::InvalidGatewayUrl {
            value: gateway_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidGatewayUrl {
                value: gateway_url,
                reason: "scheme must be http or https".to_string(),
            });
        }

        Ok(Self {
            credentials: GatewayCredentials {
                api_id,
                api_hash: api_hash.to_string(),
            },
            gateway_url,
            session_file: args.session_file.clone(),
        })
    }
}

/// What to monitor and how often
#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    /// Channel handle to monitor (repeatable, or comma-separated)
    #[arg(short, long = "channel", env = "TGWATCH_CHANNELS", value_delimiter = ',')]
    pub channels: Vec<String>,

    /// Seconds between polling passes
    #[arg(short, long, env = "TGWATCH_POLL_INTERVAL", default_value_t = 60)]
    pub poll_interval: u64,

    /// Posts and comments fetched per channel and pass
    #[arg(long, env = "TGWATCH_HISTORY_LIMIT", default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// Message ids remembered per chat for deduplication
    #[arg(long, env = "TGWATCH_DEDUP_RETENTION", default_value_t = DEFAULT_RETENTION)]
    pub dedup_retention: usize,

    /// Phone number used to log in when no valid session exists
    #[arg(long, env = "TGWATCH_PHONE")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub channels: Vec<String>,
    pub poll_interval: Duration,
    pub history_limit: usize,
    pub dedup_retention: usize,
}

impl MonitorSettings {
    pub fn validate(args: &MonitorArgs) -> Result<Self, ConfigError> {
        let channels: Vec<String> = args
            .channels
            .iter()
            .map(|channel| channel.trim())
            .filter(|channel| !channel.is_empty())
            .map(str::to_string)
            .collect();
        if channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }

        if args.poll_interval == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        if !(1..=MAX_HISTORY_LIMIT).contains(&args.history_limit) {
            return Err(ConfigError::InvalidHistoryLimit {
                value: args.history_limit,
            });
        }

        Ok(Self {
            channels,
            poll_interval: Duration::from_secs(args.poll_interval),
            history_limit: args.history_limit,
            // One fetch window must always fit
            dedup_retention: args.dedup_retention.max(args.history_limit),
        })
    }
}
