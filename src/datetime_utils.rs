use chrono::{DateTime, Utc};
use std::time::Duration;

/// Common date/time formats used throughout the application
pub mod formats {
    /// Human-readable format for display: "2024-01-20 15:30:00"
    pub const DISPLAY_FULL: &str = "%Y-%m-%d %H:%M:%S";
}

/// Format a datetime for human-readable display
pub fn format_for_display(datetime: &DateTime<Utc>) -> String {
    datetime.format(formats::DISPLAY_FULL).to_string()
}

/// Convert a platform Unix timestamp to DateTime
pub fn from_unix_timestamp(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Format an uptime as "2h05m"
pub fn format_uptime(uptime: Duration) -> String {
    let hours = uptime.as_secs() / 3600;
    let minutes = (uptime.as_secs() % 3600) / 60;
    format!("{hours}h{minutes:02}m")
}
