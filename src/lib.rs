//! Channel monitoring for the Telegram platform.
//!
//! Configured channel handles are resolved once, then polled on a fixed
//! interval for recent posts and discussion comments while live updates are
//! consumed in parallel. Both paths feed one deduplicating sink.

pub mod activity;
pub mod config;
pub mod datetime_utils;
pub mod dedup;
pub mod entity_cache;
pub mod error_utils;
pub mod gateway;
pub mod history;
pub mod live;
pub mod pipeline;
pub mod platform;
pub mod resolver;
pub mod scheduler;
pub mod session;
