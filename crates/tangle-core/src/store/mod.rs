//! Log stores: where events are written and how they are read back.
//!
//! Two strategies share one append path ([`log::EventLog`]):
//!
//! - [`FullReplayStore`] parses both logs on every read.
//! - [`HeadsStore`] keeps byte offsets and a snapshot next to the logs and
//!   only parses bytes appended since the last read.
//!
//! Both return the same [`GraphState`] for the same logs.

pub mod full;
pub mod heads;
pub mod log;
pub mod snapshot;
pub mod tail;

pub use full::FullReplayStore;
pub use heads::{HeadsStore, MaterializePath, MaterializeReport};
pub use log::EventLog;

use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::event::{Event, LogFile};
use crate::graph::GraphState;

/// A persistence strategy for the event log.
pub trait LogStore: Send + Sync {
    /// The shared append path and file layout.
    fn log(&self) -> &EventLog;

    /// Validate and durably append one event.
    ///
    /// # Errors
    ///
    /// See [`EventLog::append`].
    fn append(&self, event: &Event) -> Result<(), StoreError> {
        self.log().append(event)
    }

    /// Every event in both logs, issue log first.
    ///
    /// # Errors
    ///
    /// The first parse failure aborts the scan.
    fn scan(&self) -> Result<Vec<Event>, StoreError> {
        let mut events = Vec::new();
        for file in LogFile::ALL {
            events.extend(self.log().read_events(file)?);
        }
        Ok(events)
    }

    /// Replay the logs into a fresh state.
    ///
    /// # Errors
    ///
    /// Parse or I/O failures while reading the logs.
    fn materialize(&self) -> Result<GraphState, StoreError>;

    /// Optional cheap listing of known ids.
    fn as_id_lister(&self) -> Option<&dyn IdLister> {
        None
    }
}

/// Stores that can list issue ids without a full materialization.
pub trait IdLister {
    /// Ids of every `IssueCreated` event in the issue log.
    ///
    /// # Errors
    ///
    /// Parse or I/O failures while reading the issue log.
    fn existing_ids(&self) -> Result<BTreeSet<String>, StoreError>;
}
