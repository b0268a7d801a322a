//! The two physical log files and the single write path into them.
//!
//! Both stores append through [`EventLog::append`]:
//!
//! 1. Reject self-links, then run the configured validator.
//! 2. Encode the event as one JSON line.
//! 3. Open the target file with `O_APPEND` and take an exclusive advisory
//!    lock on that handle, bounded by the lock timeout.
//! 4. `write_all` + `flush`, and `sync_data` when durable.
//! 5. Release the lock by dropping the guard.
//!
//! A failed write is not rolled back. A torn trailing line surfaces as a
//! parse error on the next read.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::event::validate::check_append_boundary;
use crate::event::{encode_line, parse_lines, Event, EventValidator, LogFile, SchemaValidator};
use crate::lock::{FileLock, LockKind};

/// Shared handle to the log directory.
#[derive(Clone)]
pub struct EventLog {
    root: PathBuf,
    validator: Option<Arc<dyn EventValidator>>,
    lock_timeout: Duration,
    durable: bool,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("root", &self.root)
            .field("validator", &self.validator.is_some())
            .field("lock_timeout", &self.lock_timeout)
            .field("durable", &self.durable)
            .finish()
    }
}

impl EventLog {
    /// A log rooted at `root` with no validator beyond the self-link check.
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Duration, durable: bool) -> Self {
        Self {
            root: root.into(),
            validator: None,
            lock_timeout,
            durable,
        }
    }

    /// Build from config; installs [`SchemaValidator`] when `validate` is on.
    pub fn from_config(root: impl Into<PathBuf>, config: &StoreConfig) -> Self {
        let log = Self::new(root, config.lock_timeout(), config.durable);
        if config.validate {
            log.with_validator(Arc::new(SchemaValidator))
        } else {
            log
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn EventValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, file: LogFile) -> PathBuf {
        self.root.join(file.file_name())
    }

    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Validate and append one event to the file it belongs in.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Invalid`] if the event is rejected; nothing is written.
    /// - [`StoreError::LockTimeout`] if another writer holds the file.
    /// - [`StoreError::PermissionDenied`], [`StoreError::DiskFull`] or
    ///   [`StoreError::Corruption`] for I/O failures.
    pub fn append(&self, event: &Event) -> Result<(), StoreError> {
        check_append_boundary(event).map_err(|e| StoreError::Invalid { reason: e.reason })?;
        if let Some(validator) = &self.validator {
            validator
                .validate(event)
                .map_err(|e| StoreError::Invalid { reason: e.reason })?;
        }
        let line = encode_line(event).map_err(|e| StoreError::Invalid {
            reason: format!("cannot encode {}: {e}", event.name()),
        })?;

        let path = self.path(event.log_file());
        fs::create_dir_all(&self.root)
            .map_err(|e| StoreError::from_io(&e, &self.root, "create directory"))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::from_io(&e, &path, "open for append"))?;
        let guard = FileLock::lock(file, &path, self.lock_timeout, LockKind::Exclusive)?;

        let mut handle = guard.file();
        handle
            .write_all(line.as_bytes())
            .and_then(|()| handle.flush())
            .map_err(|e| StoreError::from_io(&e, &path, "append to"))?;
        if self.durable {
            handle
                .sync_data()
                .map_err(|e| StoreError::from_io(&e, &path, "sync"))?;
        }
        drop(guard);

        tracing::debug!(
            event = event.name(),
            file = event.log_file().file_name(),
            bytes = line.len(),
            "appended event"
        );
        Ok(())
    }

    /// Whole contents of one log; a missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Classified I/O failure, or [`StoreError::Corruption`] for non-UTF-8
    /// content.
    pub fn read_all(&self, file: LogFile) -> Result<String, StoreError> {
        let path = self.path(file);
        match fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes).map_err(|e| StoreError::Corruption {
                path: path.clone(),
                reason: format!("not valid UTF-8: {e}"),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(StoreError::from_io(&e, &path, "read")),
        }
    }

    /// Parse one log in append order.
    ///
    /// # Errors
    ///
    /// The first [`StoreError::Parse`], or a read failure.
    pub fn read_events(&self, file: LogFile) -> Result<Vec<Event>, StoreError> {
        let text = self.read_all(file)?;
        parse_lines(&self.path(file), &text)
    }

    /// Current byte length of one log; zero when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Classified I/O failure from `stat`.
    pub fn size(&self, file: LogFile) -> Result<u64, StoreError> {
        let path = self.path(file);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StoreError::from_io(&e, &path, "stat")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::validate::ValidationError;
    use crate::model::{Issue, IssueKind, Link, LinkType, Status};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn created(id: &str) -> Event {
        let ts = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
        Event::IssueCreated {
            issue: Issue {
                id: id.into(),
                title: "t".into(),
                body: None,
                kind: IssueKind::Note,
                priority: 1,
                status: Status::Open,
                labels: vec![],
                created_at: ts,
                updated_at: ts,
                closed_at: None,
            },
        }
    }

    fn link(from: &str, to: &str) -> Event {
        Event::LinkAdded {
            link: Link {
                from: from.into(),
                to: to.into(),
                link_type: LinkType::Related,
                created_at: Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap(),
            },
        }
    }

    fn log(dir: &TempDir) -> EventLog {
        EventLog::new(dir.path(), Duration::from_millis(100), false)
    }

    #[test]
    fn events_land_in_their_own_file() -> Result<(), StoreError> {
        let dir = TempDir::new().unwrap();
        let log = log(&dir);
        log.append(&created("tg-aaaa"))?;
        log.append(&link("tg-aaaa", "tg-bbbb"))?;
        log.append(&created("tg-bbbb"))?;

        assert_eq!(log.read_events(LogFile::Issues)?.len(), 2);
        assert_eq!(log.read_events(LogFile::Links)?, vec![link("tg-aaaa", "tg-bbbb")]);
        let raw = log.read_all(LogFile::Issues)?;
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));
        Ok(())
    }

    #[test]
    fn missing_files_read_as_empty() -> Result<(), StoreError> {
        let dir = TempDir::new().unwrap();
        let log = log(&dir);
        assert!(log.read_events(LogFile::Links)?.is_empty());
        assert_eq!(log.size(LogFile::Issues)?, 0);
        Ok(())
    }

    #[test]
    fn self_link_is_rejected_without_a_validator() {
        let dir = TempDir::new().unwrap();
        let log = log(&dir);
        let err = log.append(&link("tg-aaaa", "tg-aaaa")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
        assert!(!log.path(LogFile::Links).exists());
    }

    #[test]
    fn custom_validator_runs_before_write() {
        struct RejectAll;
        impl EventValidator for RejectAll {
            fn validate(&self, _event: &Event) -> Result<(), ValidationError> {
                Err(ValidationError::new("frozen"))
            }
        }

        let dir = TempDir::new().unwrap();
        let log = log(&dir).with_validator(Arc::new(RejectAll));
        let err = log.append(&created("tg-aaaa")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid { ref reason } if reason == "frozen"));
        assert!(!log.path(LogFile::Issues).exists());
    }

    #[test]
    fn append_times_out_while_file_is_locked() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::new(dir.path(), Duration::from_millis(20), false);
        let path = log.path(LogFile::Issues);
        let _held =
            FileLock::acquire(&path, Duration::from_millis(50), LockKind::Exclusive).unwrap();

        let err = log.append(&created("tg-aaaa")).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { timeout_ms: 20, .. }));
        assert_eq!(log.size(LogFile::Issues).unwrap(), 0);
    }

    #[test]
    fn schema_validator_is_installed_from_config() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::from_config(dir.path(), &StoreConfig::default());
        let err = log.append(&created("bad-id")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
    }
}
