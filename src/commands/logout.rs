use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use tgwatch::session::{FileSessionStore, SessionError, SessionStore};

/// Deletes the stored session
pub fn execute(session_file: &Path) -> Result<()> {
    let store = FileSessionStore::new(session_file);
    match store.clear() {
        Ok(()) => info!("Removed session {path}", path = session_file.display()),
        Err(SessionError::NotFound) => {
            info!("No session stored at {path}", path = session_file.display())
        }
        Err(e) => return Err(e).context("Failed to remove session"),
    }
    Ok(())
}
