//! Session persistence.
//!
//! A store holds at most one [`Session`]. Writes replace the whole session and
//! reads never observe half of one: a stored record missing either token reads
//! back as `None`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::Session;

/// Process-wide holder for the current session.
///
/// Injected as `Arc<S>` into the bootstrap flow and the request helper.
pub trait TokenStore: Send + Sync + 'static {
    /// Replace the stored session.
    fn save(&self, session: &Session) -> Result<(), Error>;

    /// The stored session, or `None` if either token is absent.
    fn read(&self) -> Result<Option<Session>, Error>;

    /// Remove the stored session. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), Error>;
}

/// In-memory store, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    session: RwLock<Option<Session>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, session: &Session) -> Result<(), Error> {
        let mut guard = self
            .session
            .write()
            .map_err(|_| Error::Store("session lock poisoned".into()))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn read(&self) -> Result<Option<Session>, Error> {
        let guard = self
            .session
            .read()
            .map_err(|_| Error::Store("session lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn clear(&self) -> Result<(), Error> {
        let mut guard = self
            .session
            .write()
            .map_err(|_| Error::Store("session lock poisoned".into()))?;
        *guard = None;
        Ok(())
    }
}

/// On-disk record. Every field is optional so that a hand-edited or truncated
/// file degrades to "logged out" instead of failing.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
}

impl StoredTokens {
    fn into_session(self) -> Option<Session> {
        let session = Session::new(self.access_token?, self.refresh_token?).ok()?;
        Some(
            session
                .with_token_type(self.token_type.unwrap_or_default())
                .with_expires_in(self.expires_in),
        )
    }
}

impl From<&Session> for StoredTokens {
    fn from(session: &Session) -> Self {
        Self {
            access_token: Some(session.access_token().to_owned()),
            refresh_token: Some(session.refresh_token().to_owned()),
            token_type: Some(session.token_type().to_owned()),
            expires_in: session.expires_in(),
        }
    }
}

/// JSON file store with owner-only permissions, surviving restarts.
///
/// Saves write a sibling temp file and rename it over the target, so readers
/// see either the old session or the new one.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write `contents` to a freshly created file. A leftover file at `path`
    /// is removed first so it cannot pass on wider permissions.
    fn write_restricted(path: &Path, contents: &[u8]) -> Result<(), Error> {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale temp file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, session: &Session) -> Result<(), Error> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Store("write lock poisoned".into()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_vec_pretty(&StoredTokens::from(session))
            .map_err(|e| Error::Store(format!("serialize session: {e}")))?;
        let temp = self.temp_path();
        Self::write_restricted(&temp, &contents)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn read(&self) -> Result<Option<Session>, Error> {
        let contents = match fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<StoredTokens>(&contents) {
            Ok(stored) => Ok(stored.into_session()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Unreadable session file, treating as logged out");
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<(), Error> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Store("write lock poisoned".into()))?;

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
