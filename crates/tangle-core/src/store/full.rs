//! The simple strategy: read everything, every time.

use std::collections::BTreeSet;

use super::log::EventLog;
use super::{IdLister, LogStore};
use crate::error::StoreError;
use crate::event::{Event, LogFile};
use crate::graph::{materialize_from_events, GraphState};

#[derive(Debug, Clone)]
pub struct FullReplayStore {
    log: EventLog,
}

impl FullReplayStore {
    pub const fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl LogStore for FullReplayStore {
    fn log(&self) -> &EventLog {
        &self.log
    }

    fn materialize(&self) -> Result<GraphState, StoreError> {
        let events = self.scan()?;
        tracing::debug!(events = events.len(), "full replay");
        Ok(materialize_from_events(&events))
    }

    fn as_id_lister(&self) -> Option<&dyn IdLister> {
        Some(self)
    }
}

impl IdLister for FullReplayStore {
    fn existing_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .log
            .read_events(LogFile::Issues)?
            .into_iter()
            .filter_map(|event| match event {
                Event::IssueCreated { issue } => Some(issue.id),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Issue, IssueKind, Link, LinkType, Status};
    use chrono::{TimeZone, Utc};
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    fn created(id: &str) -> Event {
        let ts = Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap();
        Event::IssueCreated {
            issue: Issue {
                id: id.into(),
                title: id.into(),
                body: None,
                kind: IssueKind::Feature,
                priority: 2,
                status: Status::Open,
                labels: vec![],
                created_at: ts,
                updated_at: ts,
                closed_at: None,
            },
        }
    }

    fn store(dir: &TempDir) -> FullReplayStore {
        FullReplayStore::new(EventLog::new(dir.path(), Duration::from_millis(100), false))
    }

    #[test]
    fn materialize_reflects_both_logs() -> Result<(), StoreError> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append(&created("tg-aaaa"))?;
        store.append(&Event::LinkAdded {
            link: Link {
                from: "tg-aaaa".into(),
                to: "tg-bbbb".into(),
                link_type: LinkType::Blocks,
                created_at: Utc.with_ymd_and_hms(2025, 10, 1, 0, 1, 0).unwrap(),
            },
        })?;
        store.append(&created("tg-bbbb"))?;

        let state = store.materialize()?;
        assert_eq!(state.issue_count(), 2);
        assert_eq!(state.blockers_of("tg-bbbb").collect::<Vec<_>>(), vec!["tg-aaaa"]);
        assert_eq!(store.scan()?.len(), 3);
        Ok(())
    }

    #[test]
    fn existing_ids_come_from_creates_only() -> Result<(), StoreError> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append(&created("tg-aaaa"))?;
        store.append(&Event::IssueStatusSet {
            id: "tg-zzzz".into(),
            status: Status::Done,
            at: Utc.with_ymd_and_hms(2025, 10, 2, 0, 0, 0).unwrap(),
        })?;

        let lister = store.as_id_lister().expect("full store lists ids");
        assert_eq!(
            lister.existing_ids()?,
            BTreeSet::from(["tg-aaaa".to_string()])
        );
        Ok(())
    }

    #[test]
    fn bad_line_aborts_scan() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append(&created("tg-aaaa")).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("issues.jsonl"))
            .unwrap();
        file.write_all(b"{\"event\":\"IssueCreated\"}\n").unwrap();

        let err = store.materialize().unwrap_err();
        assert!(matches!(err, StoreError::Parse { line: 2, .. }));
    }
}
