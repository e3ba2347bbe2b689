use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Default file holding the authenticated session
pub const DEFAULT_SESSION_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No stored session")]
    NotFound,

    #[error("Session store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persists the opaque session blob negotiated with the platform
pub trait SessionStore: Send + Sync {
    /// Returns [`SessionError::NotFound`] when no session was stored yet
    fn load(&self) -> Result<Vec<u8>, SessionError>;

    fn store(&self, data: &[u8]) -> Result<(), SessionError>;

    fn clear(&self) -> Result<(), SessionError>;
}

/// Session store backed by a single file.
///
/// Writes go to a temporary sibling file which is then renamed over the
/// target, so an interrupted write leaves the previous session intact.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn write_temp(&self, temp_path: &Path, data: &[u8]) -> io::Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(temp_path)?;
        file.write_all(data)?;
        file.sync_all()
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Vec<u8>, SessionError> {
        match fs::read(&self.path) {
            Ok(data) => {
                debug!(
                    "Loaded {len} byte session from {path}",
                    len = data.len(),
                    path = self.path.display()
                );
                Ok(data)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SessionError::NotFound),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn store(&self, data: &[u8]) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        if let Err(e) = self.write_temp(&temp_path, data) {
            let _ = fs::remove_file(&temp_path);
            return Err(self.io_error(e));
        }

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(self.io_error(e));
        }

        debug!(
            "Stored {len} byte session to {path}",
            len = data.len(),
            path = self.path.display()
        );
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SessionError::NotFound),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
