//! Incremental materialization from byte-offset bookmarks.
//!
//! Each call runs one pass of this state machine:
//!
//! ```text
//! NoCache  -> FullScan -> Persist
//! HasCache -> EmptyTail    -> ReturnCached
//!          -> NonEmptyTail -> ApplyDelta -> Persist
//! ```
//!
//! Offsets are always recomputed from the sizes measured at the start of
//! the call. When two readers race, the slower one may persist older
//! offsets over newer ones; the next call then re-reads those bytes. Work
//! can be repeated but events are never skipped.
//!
//! Cache files that are missing, malformed, carry another format version,
//! or disagree with each other are a cold cache, never an error.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::log::EventLog;
use super::snapshot::{
    self, HeadsMeta, IssueHead, Offsets, SnapshotFile, FORMAT_VERSION, HEADS_LOCK,
};
use super::tail::{read_tail, Tail};
use super::LogStore;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::event::{Event, LogFile};
use crate::graph::{apply_event, GraphState};
use crate::lock::{FileLock, LockKind, ReadLock};

/// Which branch of the state machine a call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializePath {
    /// No usable cache; both logs were replayed from byte zero.
    Bootstrap,
    /// Nothing new since the snapshot.
    Cached,
    /// The snapshot plus newly appended events.
    Delta,
}

/// What one materialization did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    pub path: MaterializePath,
    pub events_applied: usize,
    pub bytes_read: u64,
    /// `None` when the shared read lock was held for the call.
    pub lock_skipped: Option<String>,
    /// Logs whose recorded offset was past their current size.
    pub clamped: Vec<LogFile>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct HeadsStore {
    log: EventLog,
    read_lock_timeout: Duration,
    chunk: usize,
}

struct Pass {
    tails: Vec<(LogFile, Tail)>,
    sizes: Offsets,
    clamped: Vec<LogFile>,
}

impl Pass {
    fn events(&self) -> usize {
        self.tails.iter().map(|(_, t)| t.events.len()).sum()
    }

    fn bytes(&self) -> u64 {
        self.tails.iter().map(|(_, t)| t.bytes_read).sum()
    }
}

impl HeadsStore {
    pub fn new(log: EventLog, read_lock_timeout: Duration, chunk: usize) -> Self {
        Self {
            log,
            read_lock_timeout,
            chunk: chunk.max(1),
        }
    }

    pub fn from_config(log: EventLog, config: &StoreConfig) -> Self {
        Self::new(log, config.read_lock_timeout(), config.tail_chunk())
    }

    /// Materialize and describe how.
    ///
    /// # Errors
    ///
    /// Parse or I/O failures reading the logs, or a failure to persist the
    /// new snapshot. Cache read failures are not errors.
    pub fn materialize_with_report(&self) -> Result<(GraphState, MaterializeReport), StoreError> {
        let started = Instant::now();
        let root = self.log.root();
        let read_lock = ReadLock::try_shared(&root.join(HEADS_LOCK), self.read_lock_timeout);
        let lock_skipped = match &read_lock {
            ReadLock::Acquired(_) => None,
            ReadLock::Skipped { reason } => Some(reason.clone()),
        };

        let cache = self.load_cache();
        let (state, path, pass) = match cache {
            None => {
                let pass = self.read_pass(None)?;
                let mut state = GraphState::new();
                let mut heads = BTreeMap::new();
                fold_pass(&mut state, &mut heads, &pass);
                self.persist(&state, heads, &pass)?;
                (state, MaterializePath::Bootstrap, pass)
            }
            Some((meta, cached)) => {
                let pass = self.read_pass(Some(&meta))?;
                if pass.events() == 0 && pass.clamped.is_empty() {
                    (cached.into_state(), MaterializePath::Cached, pass)
                } else {
                    let mut state = cached.into_state();
                    let mut heads = meta.heads;
                    fold_pass(&mut state, &mut heads, &pass);
                    self.persist(&state, heads, &pass)?;
                    (state, MaterializePath::Delta, pass)
                }
            }
        };
        drop(read_lock);

        let report = MaterializeReport {
            path,
            events_applied: pass.events(),
            bytes_read: pass.bytes(),
            lock_skipped,
            clamped: pass.clamped,
            elapsed: started.elapsed(),
        };
        match path {
            MaterializePath::Cached => tracing::debug!(
                elapsed_ms = report.elapsed.as_millis(),
                "heads cache is current"
            ),
            MaterializePath::Bootstrap | MaterializePath::Delta => tracing::info!(
                path = ?path,
                events = report.events_applied,
                bytes = report.bytes_read,
                elapsed_ms = report.elapsed.as_millis(),
                "materialized from heads"
            ),
        }
        Ok((state, report))
    }

    /// Delete `heads.json` and `state.json` under an exclusive `heads.lock`.
    ///
    /// # Errors
    ///
    /// [`StoreError::LockTimeout`] if readers hold the lock past the append
    /// lock timeout, or a classified I/O failure.
    pub fn invalidate(&self) -> Result<(), StoreError> {
        invalidate_cache(&self.log)
    }

    fn load_cache(&self) -> Option<(HeadsMeta, SnapshotFile)> {
        let root = self.log.root();
        let meta = snapshot::load_meta(root);
        let cached = snapshot::load_snapshot(root);
        match (meta, cached) {
            (Some(meta), Some(cached)) if meta.offsets == cached.offsets => Some((meta, cached)),
            (Some(_), Some(_)) => {
                tracing::warn!(
                    root = %root.display(),
                    "snapshot offsets disagree with heads.json, rebuilding"
                );
                None
            }
            (None, _) | (_, None) => {
                tracing::debug!(root = %root.display(), "no heads cache, bootstrapping");
                None
            }
        }
    }

    fn read_pass(&self, meta: Option<&HeadsMeta>) -> Result<Pass, StoreError> {
        let mut pass = Pass {
            tails: Vec::new(),
            sizes: Offsets::new(),
            clamped: Vec::new(),
        };
        for file in LogFile::ALL {
            let size = self.log.size(file)?;
            let recorded = meta.map_or(0, |m| m.offset(file));
            if recorded > size {
                tracing::warn!(
                    file = file.file_name(),
                    recorded,
                    size,
                    "log is shorter than its recorded offset, clamping"
                );
                pass.clamped.push(file);
            }
            let start = recorded.min(size);
            let tail = read_tail(&self.log.path(file), start, size, self.chunk)?;
            pass.sizes.insert(file.file_name().to_string(), size);
            pass.tails.push((file, tail));
        }
        Ok(pass)
    }

    fn persist(
        &self,
        state: &GraphState,
        heads: BTreeMap<String, IssueHead>,
        pass: &Pass,
    ) -> Result<(), StoreError> {
        let meta = HeadsMeta {
            version: FORMAT_VERSION,
            offsets: pass.sizes.clone(),
            heads,
        };
        let cached = SnapshotFile::from_state(state, pass.sizes.clone());
        snapshot::persist(self.log.root(), &meta, &cached)
    }
}

/// Shared by [`HeadsStore::invalidate`] and repair, which may run without a
/// store instance.
pub(crate) fn invalidate_cache(log: &EventLog) -> Result<(), StoreError> {
    let root = log.root();
    let guard = FileLock::acquire(&root.join(HEADS_LOCK), log.lock_timeout(), LockKind::Exclusive)?;
    snapshot::invalidate(root)?;
    drop(guard);
    tracing::info!(root = %root.display(), "heads cache invalidated");
    Ok(())
}

fn fold_pass(state: &mut GraphState, heads: &mut BTreeMap<String, IssueHead>, pass: &Pass) {
    for (_, tail) in &pass.tails {
        for (event, offset) in tail.events.iter().zip(&tail.positions) {
            *state = apply_event(std::mem::take(state), event);
            record_head(heads, event, *offset);
        }
    }
}

fn record_head(heads: &mut BTreeMap<String, IssueHead>, event: &Event, offset: u64) {
    if let Some(id) = event.issue_id() {
        heads.insert(
            id.to_string(),
            IssueHead {
                event: event.name().to_string(),
                offset,
                at: event.at(),
            },
        );
    }
}

impl LogStore for HeadsStore {
    fn log(&self) -> &EventLog {
        &self.log
    }

    fn materialize(&self) -> Result<GraphState, StoreError> {
        self.materialize_with_report().map(|(state, _)| state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::materialize_from_events;
    use crate::model::{Issue, IssueKind, Status};
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn created(id: &str, minute: u32) -> Event {
        let ts = Utc.with_ymd_and_hms(2025, 11, 1, 0, minute, 0).unwrap();
        Event::IssueCreated {
            issue: Issue {
                id: id.into(),
                title: id.into(),
                body: None,
                kind: IssueKind::Chore,
                priority: 1,
                status: Status::Open,
                labels: vec![],
                created_at: ts,
                updated_at: ts,
                closed_at: None,
            },
        }
    }

    fn store(dir: &TempDir) -> HeadsStore {
        let log = EventLog::new(dir.path(), Duration::from_millis(100), false);
        HeadsStore::new(log, Duration::from_millis(50), 32)
    }

    #[test]
    fn first_call_bootstraps_then_caches() -> Result<(), StoreError> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append(&created("tg-aaaa", 0))?;

        let (state, report) = store.materialize_with_report()?;
        assert_eq!(report.path, MaterializePath::Bootstrap);
        assert_eq!(report.events_applied, 1);
        assert!(report.lock_skipped.is_none());
        assert_eq!(state.issue_count(), 1);

        let (again, report) = store.materialize_with_report()?;
        assert_eq!(report.path, MaterializePath::Cached);
        assert_eq!(report.bytes_read, 0);
        assert_eq!(again, state);
        Ok(())
    }

    #[test]
    fn scan_lists_issue_log_before_link_log() -> Result<(), StoreError> {
        use crate::model::{Link, LinkType};

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let link = Event::LinkAdded {
            link: Link {
                from: "tg-aaaa".into(),
                to: "tg-bbbb".into(),
                link_type: LinkType::Related,
                created_at: Utc.with_ymd_and_hms(2025, 11, 1, 0, 5, 0).unwrap(),
            },
        };
        store.append(&link)?;
        store.append(&created("tg-aaaa", 0))?;

        let full = crate::store::FullReplayStore::new(store.log().clone());
        let events = store.scan()?;
        assert_eq!(events, vec![created("tg-aaaa", 0), link]);
        assert_eq!(events, full.scan()?);
        Ok(())
    }

    #[test]
    fn delta_reads_only_new_bytes() -> Result<(), StoreError> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append(&created("tg-aaaa", 0))?;
        store.materialize()?;
        let before = store.log().size(LogFile::Issues)?;

        store.append(&created("tg-bbbb", 1))?;
        let (state, report) = store.materialize_with_report()?;
        assert_eq!(report.path, MaterializePath::Delta);
        assert_eq!(report.bytes_read, store.log().size(LogFile::Issues)? - before);
        assert_eq!(state, materialize_from_events(&store.scan()?));

        let meta = snapshot::load_meta(dir.path()).unwrap();
        assert_eq!(meta.heads["tg-bbbb"].offset, before);
        assert_eq!(meta.heads["tg-bbbb"].event, "IssueCreated");
        Ok(())
    }

    #[test]
    fn stale_version_forces_bootstrap() -> Result<(), StoreError> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append(&created("tg-aaaa", 0))?;
        store.materialize()?;

        let heads_path = dir.path().join(snapshot::HEADS_FILE);
        let mut meta: serde_json::Value =
            serde_json::from_slice(&fs::read(&heads_path).unwrap()).unwrap();
        meta["version"] = serde_json::json!(FORMAT_VERSION + 7);
        fs::write(&heads_path, serde_json::to_vec(&meta).unwrap()).unwrap();

        let (_, report) = store.materialize_with_report()?;
        assert_eq!(report.path, MaterializePath::Bootstrap);
        Ok(())
    }

    #[test]
    fn read_lock_is_skipped_not_fatal() -> Result<(), StoreError> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append(&created("tg-aaaa", 0))?;
        let _writer = FileLock::acquire(
            &dir.path().join(HEADS_LOCK),
            Duration::from_millis(50),
            LockKind::Exclusive,
        )?;

        let (state, report) = store.materialize_with_report()?;
        assert!(report.lock_skipped.is_some());
        assert_eq!(state.issue_count(), 1);
        Ok(())
    }

    #[test]
    fn invalidate_times_out_under_reader_and_succeeds_after() -> Result<(), StoreError> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append(&created("tg-aaaa", 0))?;
        store.materialize()?;

        let reader = FileLock::acquire(
            &dir.path().join(HEADS_LOCK),
            Duration::from_millis(50),
            LockKind::Shared,
        )?;
        assert!(matches!(
            store.invalidate(),
            Err(StoreError::LockTimeout { .. })
        ));
        reader.release();

        store.invalidate()?;
        assert!(!dir.path().join(snapshot::STATE_FILE).exists());
        let (_, report) = store.materialize_with_report()?;
        assert_eq!(report.path, MaterializePath::Bootstrap);
        Ok(())
    }
}
