//! Pure graph layer: state, event application, indexes and invariants.
//!
//! Nothing in here touches the filesystem.

pub mod apply;
pub mod index;
pub mod invariants;
pub mod state;

pub use apply::{apply_event, apply_events, materialize_from_events};
pub use index::{build_indexes, index_issue_created, IndexedGraphState};
pub use invariants::{check_invariants, find_violations, Violation};
pub use state::GraphState;
