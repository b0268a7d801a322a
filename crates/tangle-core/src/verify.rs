//! Integrity verification and duplicate-create repair for the logs.
//!
//! Verification never stops at the first problem: every line of both logs
//! is decoded on its own and each failure becomes an [`IntegrityIssue`].
//! Replay stays tolerant of everything reported here; this module is how
//! operators find out about it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::error::StoreError;
use crate::event::{decode_line, Event, LogFile};
use crate::graph::{find_violations, materialize_from_events, Violation};
use crate::lock::{FileLock, LockKind};
use crate::model::LinkType;
use crate::store::snapshot::{self, HEADS_LOCK};
use crate::store::EventLog;

/// Size and content hash of one log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDigest {
    pub file: LogFile,
    pub byte_len: u64,
    /// `blake3:<lowercase hex>`.
    pub hash: String,
    pub events: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// More than one `IssueCreated` for the same id. `lines` are 1-based
    /// line numbers in `issues.jsonl`, in file order.
    DuplicateIssueId { id: String, lines: Vec<usize> },
    ParseFailure {
        file: LogFile,
        line: usize,
        reason: String,
    },
    /// A link whose endpoint was never created.
    DanglingLink {
        from: String,
        to: String,
        link_type: LinkType,
    },
    /// A patch or status change for an id that is never created.
    UnknownIssueEvent { id: String, line: usize },
    Invariant(Violation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub logs: Vec<LogDigest>,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn duplicates(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.issues.iter().filter_map(|issue| match issue {
            IntegrityIssue::DuplicateIssueId { id, lines } => Some((id.as_str(), lines.as_slice())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    /// `(id, line)` of every removed `IssueCreated`, line numbers as they
    /// were before the rewrite.
    pub removed: Vec<(String, usize)>,
    /// Copy of `issues.jsonl` taken before the rewrite, if one was needed.
    pub backup: Option<PathBuf>,
}

impl RepairReport {
    #[must_use]
    pub fn lines_removed(&self) -> usize {
        self.removed.len()
    }
}

/// Check both logs line by line.
///
/// # Errors
///
/// Only I/O failures; content problems are reported, not returned.
pub fn verify_integrity(log: &EventLog) -> Result<IntegrityReport, StoreError> {
    let mut issues = Vec::new();
    let mut logs = Vec::new();
    let mut events = Vec::new();
    let mut created_lines: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut touched: Vec<(String, usize)> = Vec::new();

    for file in LogFile::ALL {
        let path = log.path(file);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::from_io(&e, &path, "read")),
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut parsed = 0;

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let event = match decode_line(&path, line, raw) {
                Ok(event) => event,
                Err(err) => {
                    let reason = match err {
                        StoreError::Parse { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    issues.push(IntegrityIssue::ParseFailure { file, line, reason });
                    continue;
                }
            };
            parsed += 1;
            match &event {
                Event::IssueCreated { issue } => {
                    created_lines.entry(issue.id.clone()).or_default().push(line);
                }
                Event::IssuePatched { id, .. } | Event::IssueStatusSet { id, .. } => {
                    touched.push((id.clone(), line));
                }
                Event::LinkAdded { .. } | Event::LinkRemoved { .. } => {}
            }
            events.push(event);
        }

        logs.push(LogDigest {
            file,
            byte_len: bytes.len() as u64,
            hash: format!("blake3:{}", blake3::hash(&bytes).to_hex()),
            events: parsed,
        });
    }

    for (id, lines) in &created_lines {
        if lines.len() > 1 {
            issues.push(IntegrityIssue::DuplicateIssueId {
                id: id.clone(),
                lines: lines.clone(),
            });
        }
    }
    for (id, line) in touched {
        if !created_lines.contains_key(&id) {
            issues.push(IntegrityIssue::UnknownIssueEvent { id, line });
        }
    }

    let state = materialize_from_events(&events);
    for link in state.links() {
        if state.issue(&link.from).is_none() || state.issue(&link.to).is_none() {
            issues.push(IntegrityIssue::DanglingLink {
                from: link.from.clone(),
                to: link.to.clone(),
                link_type: link.link_type,
            });
        }
    }
    issues.extend(find_violations(&state).into_iter().map(IntegrityIssue::Invariant));

    tracing::info!(
        events = events.len(),
        problems = issues.len(),
        "verified log integrity"
    );
    Ok(IntegrityReport { logs, issues })
}

/// Remove every `IssueCreated` after the first for each id.
///
/// Runs under the exclusive append lock on `issues.jsonl` and, once a
/// duplicate is found, an exclusive `heads.lock` held until the rewrite is
/// done. The heads cache is invalidated before the log changes, so a
/// failure at any later step leaves a cold cache rather than one that
/// disagrees with the log. The original is copied to `issues.jsonl.bak`
/// before the rewrite. Lines that do not decode are kept verbatim.
///
/// # Errors
///
/// [`StoreError::LockTimeout`] if a writer holds the log or readers hold
/// `heads.lock`; the log is untouched in both cases. Classified I/O
/// failures otherwise.
pub fn repair(log: &EventLog) -> Result<RepairReport, StoreError> {
    let path = log.path(LogFile::Issues);
    let file = match OpenOptions::new().read(true).write(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(RepairReport {
                removed: Vec::new(),
                backup: None,
            });
        }
        Err(e) => return Err(StoreError::from_io(&e, &path, "open for repair")),
    };
    let guard = FileLock::lock(file, &path, log.lock_timeout(), LockKind::Exclusive)?;
    let mut handle = guard.file();

    let mut content = String::new();
    handle
        .seek(SeekFrom::Start(0))
        .and_then(|_| handle.read_to_string(&mut content))
        .map_err(|e| StoreError::from_io(&e, &path, "read"))?;

    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut removed = Vec::new();
    let mut kept = String::with_capacity(content.len());
    for (idx, raw) in content.split_inclusive('\n').enumerate() {
        let line = idx + 1;
        let body = raw.trim_end_matches('\n');
        if let Ok(Event::IssueCreated { issue }) = decode_line(&path, line, body) {
            if !seen.insert(issue.id.clone()) {
                removed.push((issue.id, line));
                continue;
            }
        }
        kept.push_str(raw);
    }

    if removed.is_empty() {
        return Ok(RepairReport {
            removed,
            backup: None,
        });
    }

    let heads_lock = FileLock::acquire(
        &log.root().join(HEADS_LOCK),
        log.lock_timeout(),
        LockKind::Exclusive,
    )?;
    snapshot::invalidate(log.root())?;

    let mut backup = path.clone().into_os_string();
    backup.push(".bak");
    let backup = PathBuf::from(backup);
    fs::write(&backup, content.as_bytes())
        .map_err(|e| StoreError::from_io(&e, &backup, "write backup"))?;

    handle
        .set_len(0)
        .and_then(|()| handle.seek(SeekFrom::Start(0)))
        .and_then(|_| handle.write_all(kept.as_bytes()))
        .and_then(|()| handle.sync_all())
        .map_err(|e| StoreError::from_io(&e, &path, "rewrite"))?;
    drop(heads_lock);
    drop(guard);

    tracing::info!(
        removed = removed.len(),
        backup = %backup.display(),
        "repaired duplicate issue creates"
    );
    Ok(RepairReport {
        removed,
        backup: Some(backup),
    })
}
