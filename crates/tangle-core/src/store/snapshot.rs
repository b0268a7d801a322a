//! On-disk format of the heads store's auxiliary files.
//!
//! `heads.json` holds byte offsets into each log plus per-issue head
//! bookmarks. `state.json` holds the materialized graph as ordered
//! `[key, value]` lists. Both carry [`FORMAT_VERSION`]; anything else is
//! treated as absent. The snapshot also records the offsets it was built
//! at, and a snapshot whose offsets disagree with `heads.json` is ignored.
//!
//! [`persist`] writes both files through temp files and renames them into
//! place. A crash between the two renames leaves a snapshot whose offsets
//! disagree with `heads.json`, which the next read treats as a cold cache.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::event::LogFile;
use crate::graph::GraphState;
use crate::model::{Issue, Link};

/// Bump whenever the layout of either file changes.
pub const FORMAT_VERSION: u32 = 1;

pub const HEADS_FILE: &str = "heads.json";
pub const STATE_FILE: &str = "state.json";
pub const HEADS_LOCK: &str = "heads.lock";

/// Byte offset reached in each log, keyed by file name.
pub type Offsets = BTreeMap<String, u64>;

/// Where the latest event touching an issue starts. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueHead {
    pub event: String,
    pub offset: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadsMeta {
    pub version: u32,
    pub offsets: Offsets,
    #[serde(default)]
    pub heads: BTreeMap<String, IssueHead>,
}

impl HeadsMeta {
    pub fn offset(&self, file: LogFile) -> u64 {
        self.offsets.get(file.file_name()).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: u32,
    pub offsets: Offsets,
    pub issues: Vec<(String, Issue)>,
    pub outgoing: Vec<(String, Vec<Link>)>,
    pub incoming: Vec<(String, Vec<Link>)>,
}

impl SnapshotFile {
    pub fn from_state(state: &GraphState, offsets: Offsets) -> Self {
        Self {
            version: FORMAT_VERSION,
            offsets,
            issues: state
                .issues()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            outgoing: state
                .outgoing_map()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            incoming: state
                .incoming_map()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn into_state(self) -> GraphState {
        GraphState::from_parts(
            self.issues.into_iter().collect(),
            self.outgoing.into_iter().collect(),
            self.incoming.into_iter().collect(),
        )
    }
}

/// Read `heads.json`. Missing, unreadable, malformed or wrong-version files
/// all come back as `None`; the reason is logged.
pub fn load_meta(root: &Path) -> Option<HeadsMeta> {
    let meta: HeadsMeta = load_json(&root.join(HEADS_FILE))?;
    check_version(&root.join(HEADS_FILE), meta.version).then_some(meta)
}

/// Read `state.json` with the same cold-cache rules as [`load_meta`].
pub fn load_snapshot(root: &Path) -> Option<SnapshotFile> {
    let snapshot: SnapshotFile = load_json(&root.join(STATE_FILE))?;
    check_version(&root.join(STATE_FILE), snapshot.version).then_some(snapshot)
}

fn check_version(path: &Path, found: u32) -> bool {
    if found == FORMAT_VERSION {
        return true;
    }
    tracing::warn!(
        path = %path.display(),
        found,
        expected = FORMAT_VERSION,
        "cache format version mismatch, ignoring"
    );
    false
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read cache file");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cache file is malformed");
            None
        }
    }
}

/// Atomically replace `state.json` and then `heads.json`.
///
/// Both files are fully written and synced under unique temp names before
/// either rename. On failure every temp file is removed; a failure before
/// the first rename leaves the previous pair untouched.
///
/// # Errors
///
/// Classified I/O failure for whichever step failed.
pub fn persist(root: &Path, meta: &HeadsMeta, snapshot: &SnapshotFile) -> Result<(), StoreError> {
    let state_path = root.join(STATE_FILE);
    let heads_path = root.join(HEADS_FILE);
    let state_tmp = tmp_path(&state_path);
    let heads_tmp = tmp_path(&heads_path);

    let result = write_tmp(&state_tmp, snapshot)
        .and_then(|()| write_tmp(&heads_tmp, meta))
        .and_then(|()| rename(&state_tmp, &state_path))
        .and_then(|()| rename(&heads_tmp, &heads_path))
        .and_then(|()| sync_dir(root));

    if result.is_err() {
        let _ = fs::remove_file(&state_tmp);
        let _ = fs::remove_file(&heads_tmp);
    }
    result
}

/// Delete both cache files so the next materialize bootstraps.
///
/// # Errors
///
/// Classified I/O failure other than the files already being gone.
pub fn invalidate(root: &Path) -> Result<(), StoreError> {
    for name in [HEADS_FILE, STATE_FILE] {
        let path = root.join(name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::from_io(&e, &path, "remove")),
        }
    }
    Ok(())
}

fn write_tmp<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Corruption {
        path: path.to_path_buf(),
        reason: format!("cannot serialize cache file: {e}"),
    })?;
    let mut file = File::create(path).map_err(|e| StoreError::from_io(&e, path, "create"))?;
    file.write_all(&bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| StoreError::from_io(&e, path, "write"))
}

fn rename(from: &Path, to: &Path) -> Result<(), StoreError> {
    fs::rename(from, to).map_err(|e| StoreError::from_io(&e, to, "rename into"))
}

fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    // Opening a directory for fsync is not supported on every platform.
    match File::open(dir) {
        Ok(handle) => {
            let _ = handle.sync_all();
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(StoreError::from_io(&e, dir, "sync directory"))
        }
        Err(_) => Ok(()),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let unique: u32 = rand::thread_rng().r#gen();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{unique:08x}", std::process::id()));
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::graph::materialize_from_events;
    use crate::model::{IssueKind, LinkType, Status};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_state() -> GraphState {
        let ts = Utc.with_ymd_and_hms(2025, 9, 9, 9, 9, 9).unwrap();
        materialize_from_events(&[
            Event::IssueCreated {
                issue: Issue {
                    id: "tg-aaaa".into(),
                    title: "A".into(),
                    body: None,
                    kind: IssueKind::Epic,
                    priority: 0,
                    status: Status::Doing,
                    labels: vec!["x".into()],
                    created_at: ts,
                    updated_at: ts,
                    closed_at: None,
                },
            },
            Event::LinkAdded {
                link: Link {
                    from: "tg-aaaa".into(),
                    to: "tg-bbbb".into(),
                    link_type: LinkType::ParentChild,
                    created_at: ts,
                },
            },
        ])
    }

    fn offsets(issues: u64, links: u64) -> Offsets {
        BTreeMap::from([
            ("issues.jsonl".to_string(), issues),
            ("links.jsonl".to_string(), links),
        ])
    }

    fn meta(issues: u64, links: u64) -> HeadsMeta {
        HeadsMeta {
            version: FORMAT_VERSION,
            offsets: offsets(issues, links),
            heads: BTreeMap::new(),
        }
    }

    #[test]
    fn snapshot_maps_are_key_value_lists() {
        let snapshot = SnapshotFile::from_state(&sample_state(), offsets(10, 20));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["issues"][0][0], "tg-aaaa");
        assert_eq!(json["outgoing"][0][1][0]["type"], "parent-child");
        assert_eq!(json["incoming"][0][0], "tg-bbbb");
        assert_eq!(snapshot.into_state(), sample_state());
    }

    #[test]
    fn persist_then_load_restores_pair() {
        let dir = TempDir::new().unwrap();
        let snapshot = SnapshotFile::from_state(&sample_state(), offsets(10, 20));
        persist(dir.path(), &meta(10, 20), &snapshot).unwrap();

        let loaded_meta = load_meta(dir.path()).unwrap();
        assert_eq!(loaded_meta.offset(LogFile::Links), 20);
        assert_eq!(load_snapshot(dir.path()).unwrap(), snapshot);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn version_mismatch_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let mut stale = meta(1, 1);
        stale.version = FORMAT_VERSION + 1;
        fs::write(
            dir.path().join(HEADS_FILE),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join(STATE_FILE), b"{not json").unwrap();

        assert!(load_meta(dir.path()).is_none());
        assert!(load_snapshot(dir.path()).is_none());
    }

    #[test]
    fn failed_persist_removes_temp_files() {
        let dir = TempDir::new().unwrap();
        let first = SnapshotFile::from_state(&sample_state(), offsets(1, 1));
        persist(dir.path(), &meta(1, 1), &first).unwrap();

        // A directory where heads.json should go makes the final rename fail.
        fs::remove_file(dir.path().join(HEADS_FILE)).unwrap();
        fs::create_dir(dir.path().join(HEADS_FILE)).unwrap();
        fs::write(dir.path().join(HEADS_FILE).join("occupied"), b"x").unwrap();

        let second = SnapshotFile::from_state(&GraphState::new(), offsets(2, 2));
        assert!(persist(dir.path(), &meta(2, 2), &second).is_err());

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0);
        // state.json was already swapped, so its offsets no longer match.
        assert_eq!(load_snapshot(dir.path()).unwrap().offsets, offsets(2, 2));
    }

    #[test]
    fn invalidate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        persist(
            dir.path(),
            &meta(0, 0),
            &SnapshotFile::from_state(&GraphState::new(), offsets(0, 0)),
        )
        .unwrap();
        invalidate(dir.path()).unwrap();
        invalidate(dir.path()).unwrap();
        assert!(load_meta(dir.path()).is_none());
        assert!(!dir.path().join(STATE_FILE).exists());
    }
}
