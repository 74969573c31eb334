//! Session identity persistence.
//!
//! Two files back the interactive session lifecycle:
//!   - a latest-session file holding exactly one id (the resume target),
//!   - an append-only history log, one `<timestamp>\t<id>` line per
//!     session, deduplicated against its own last line so retries and
//!     reconnects to the same session never double-log.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

use tabletalk_core::config::StateConfig;
use tabletalk_core::errors::PersistError;

use crate::atomic::write_atomic_or_plain;

/// How much of the history tail we inspect for the dedupe check. One
/// line is well under this.
const TAIL_CHUNK: u64 = 4096;

pub struct SessionStore {
    latest_path: PathBuf,
    history_path: PathBuf,
    current: Option<String>,
}

impl SessionStore {
    pub fn new(state: &StateConfig) -> Self {
        Self {
            latest_path: state.session_id_path(),
            history_path: state.history_path(),
            current: None,
        }
    }

    #[cfg(test)]
    pub fn with_paths(latest_path: PathBuf, history_path: PathBuf) -> Self {
        Self { latest_path, history_path, current: None }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn latest_path(&self) -> &PathBuf {
        &self.latest_path
    }

    /// Reads the resume target from the latest-session file. A missing or
    /// empty file means a fresh session; a read failure is logged and
    /// treated the same way.
    pub fn resolve_resume_id(&self) -> Option<String> {
        match fs::read_to_string(&self.latest_path) {
            Ok(raw) => {
                let id = raw.trim();
                if id.is_empty() {
                    debug!(path = %self.latest_path.display(), "latest-session file is empty");
                    None
                } else {
                    Some(id.to_string())
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
            Err(error) => {
                warn!(
                    path = %self.latest_path.display(),
                    error = %error,
                    "could not read latest-session file; starting fresh"
                );
                None
            }
        }
    }

    /// Records a newly observed session id: remember it in memory, append
    /// it to the history log (skipped when it matches the last recorded
    /// id), then replace the latest-session file atomically.
    ///
    /// The in-memory update always happens; file failures are reported to
    /// the caller but must not tear down the conversation.
    pub fn record_new_session(&mut self, session_id: &str) -> Result<(), PersistError> {
        if self.current.as_deref() == Some(session_id) {
            debug!(session_id, "session id unchanged");
            return Ok(());
        }
        self.current = Some(session_id.to_string());

        let history_result = self.append_history(session_id);
        let latest_result = write_atomic_or_plain(&self.latest_path, session_id.as_bytes());

        history_result?;
        latest_result?;
        info!(session_id, "recorded session id");
        Ok(())
    }

    fn append_history(&self, session_id: &str) -> Result<(), PersistError> {
        if self.last_history_id()?.as_deref() == Some(session_id) {
            debug!(session_id, "session id matches last history entry; not re-appending");
            return Ok(());
        }

        if let Some(parent) = self.history_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| PersistError::Write { path: parent.to_path_buf(), source })?;
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let line = format!("{timestamp}\t{session_id}\n");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .map_err(|source| PersistError::Write { path: self.history_path.clone(), source })?;
        file.write_all(line.as_bytes())
            .map_err(|source| PersistError::Write { path: self.history_path.clone(), source })
    }

    /// Session id from the last non-empty history line, read by seeking
    /// into the file tail rather than loading the whole log.
    fn last_history_id(&self) -> Result<Option<String>, PersistError> {
        let mut file = match fs::File::open(&self.history_path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistError::Read { path: self.history_path.clone(), source })
            }
        };

        let len = file
            .metadata()
            .map_err(|source| PersistError::Read { path: self.history_path.clone(), source })?
            .len();
        let start = len.saturating_sub(TAIL_CHUNK);
        file.seek(SeekFrom::Start(start))
            .map_err(|source| PersistError::Read { path: self.history_path.clone(), source })?;

        let mut tail = String::new();
        file.read_to_string(&mut tail)
            .map_err(|source| PersistError::Read { path: self.history_path.clone(), source })?;

        let last_id = tail
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| line.rsplit('\t').next())
            .map(|id| id.trim().to_string());

        Ok(last_id)
    }

    /// Archives the resume target into history (if not already there) and
    /// clears it so the next run starts a fresh session. If the latest
    /// file cannot be removed it is truncated instead.
    pub fn archive_and_clear(&mut self) -> Result<(), PersistError> {
        self.current = None;

        if let Some(id) = self.resolve_resume_id() {
            if let Err(error) = self.append_history(&id) {
                warn!(error = %error, "could not archive session id to history");
            }
        }

        match fs::remove_file(&self.latest_path) {
            Ok(()) => {
                info!(path = %self.latest_path.display(), "cleared latest-session file");
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(remove_error) => {
                warn!(
                    path = %self.latest_path.display(),
                    error = %remove_error,
                    "could not remove latest-session file; truncating"
                );
                fs::write(&self.latest_path, b"")
                    .map_err(|source| PersistError::Write { path: self.latest_path.clone(), source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::SessionStore;

    fn store_in(dir: &std::path::Path) -> SessionStore {
        SessionStore::with_paths(
            dir.join("session_id.txt"),
            dir.join("history").join("session_ids.txt"),
        )
    }

    #[test]
    fn resolve_returns_none_when_file_missing() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert_eq!(store.resolve_resume_id(), None);
    }

    #[test]
    fn resolve_trims_whitespace() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.latest_path(), "  abc123\n").unwrap();
        assert_eq!(store.resolve_resume_id().as_deref(), Some("abc123"));
    }

    #[test]
    fn resolve_treats_empty_file_as_fresh() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.latest_path(), "\n  \n").unwrap();
        assert_eq!(store.resolve_resume_id(), None);
    }

    #[test]
    fn record_then_resolve_round_trips() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.record_new_session("sess-1").unwrap();
        assert_eq!(store.current(), Some("sess-1"));
        assert_eq!(store.resolve_resume_id().as_deref(), Some("sess-1"));
    }

    #[test]
    fn recording_same_id_twice_appends_history_once() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.record_new_session("sess-1").unwrap();
        store.record_new_session("sess-1").unwrap();

        let history = fs::read_to_string(dir.path().join("history").join("session_ids.txt")).unwrap();
        assert_eq!(history.lines().count(), 1);
        assert!(history.trim_end().ends_with("\tsess-1"));
    }

    #[test]
    fn interleaved_ids_are_all_recorded() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.record_new_session("s1").unwrap();
        store.record_new_session("s2").unwrap();
        store.record_new_session("s1").unwrap();

        let history = fs::read_to_string(dir.path().join("history").join("session_ids.txt")).unwrap();
        let ids: Vec<_> =
            history.lines().map(|line| line.rsplit('\t').next().unwrap()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s1"]);
    }

    #[test]
    fn history_lines_carry_utc_timestamps() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.record_new_session("sess-1").unwrap();

        let history = fs::read_to_string(dir.path().join("history").join("session_ids.txt")).unwrap();
        let (timestamp, _) = history.trim_end().split_once('\t').unwrap();
        assert!(timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn archive_and_clear_removes_resume_target_but_keeps_history() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.record_new_session("sess-1").unwrap();
        store.archive_and_clear().unwrap();

        assert_eq!(store.current(), None);
        assert_eq!(store.resolve_resume_id(), None);
        let history = fs::read_to_string(dir.path().join("history").join("session_ids.txt")).unwrap();
        assert!(history.contains("sess-1"));
    }

    #[test]
    fn archive_and_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.archive_and_clear().unwrap();
        store.archive_and_clear().unwrap();
    }
}
