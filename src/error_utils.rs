use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;

/// JSON serialization error handling utilities
///
/// Serialize data to compact JSON with contextual error handling
pub fn serialize_to_json_with_context<T: Serialize>(data: &T, data_desc: &str) -> Result<String> {
    serde_json::to_string(data).with_context(|| format!("Failed to serialize {data_desc} to JSON"))
}

/// Create HTTP client with contextual error handling
pub fn create_http_client_with_context(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("tgwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Reads one trimmed line from stdin after printing `prompt`
pub fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::{BufRead, Write};

    let mut stdout = std::io::stdout();
    write!(stdout, "{prompt}").context("Failed to write prompt")?;
    stdout.flush().context("Failed to flush prompt")?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}
