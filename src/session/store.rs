//! Persisted session record.
//!
//! One JSON file in the installation's state directory holds the current
//! session identifier and the wall-clock moment it was created. A record
//! older than 24 hours is ignored on load, and the caller falls back to
//! creating a new session. Save overwrites; clear deletes. Single writer,
//! no locking.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AppError, Result};

/// Resume window for a persisted session identifier.
pub const SESSION_TTL_MILLIS: i64 = 24 * 60 * 60 * 1_000;

/// File name of the record inside the state directory.
pub const RECORD_FILE: &str = "acp-session.json";

/// On-disk shape: `{"sessionId": …, "timestamp": <epoch millis>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub timestamp: i64,
}

/// Store for the single persisted session record.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `state_dir`.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(RECORD_FILE),
        }
    }

    /// Path of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted identifier, honouring the 24-hour window.
    #[must_use]
    pub fn load(&self) -> Option<String> {
        self.load_at(Utc::now().timestamp_millis())
    }

    /// Load as of `now_millis`. Returns `None` when the file is missing,
    /// unparseable, or expired.
    #[must_use]
    pub fn load_at(&self, now_millis: i64) -> Option<String> {
        let text = fs::read_to_string(&self.path).ok()?;
        let record: SessionRecord = match serde_json::from_str(&text) {
            Ok(record) => record,
            Err(err) => {
                debug!(path = %self.path.display(), %err, "unreadable session record, ignoring");
                return None;
            }
        };

        let age = now_millis.saturating_sub(record.timestamp);
        if age >= SESSION_TTL_MILLIS {
            debug!(
                session_id = %record.session_id,
                age_millis = age,
                "persisted session record expired"
            );
            return None;
        }

        Some(record.session_id)
    }

    /// Persist `session_id` with the current moment, overwriting any
    /// previous record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the state directory cannot be created
    /// or the file cannot be written.
    pub fn save(&self, session_id: &str) -> Result<()> {
        let record = SessionRecord {
            session_id: session_id.to_owned(),
            timestamp: Utc::now().timestamp_millis(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(&record)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// Delete the record. Deleting a missing record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] on any failure other than the file being
    /// absent.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Io(err.to_string())),
        }
    }
}
