//! Secondary indexes over a materialized graph.
//!
//! Built once per materialization by [`build_indexes`] and thrown away with
//! the state. [`index_issue_created`] covers the one incremental case that
//! matters in practice: a freshly created issue that nothing else depends on
//! yet.

use std::collections::{BTreeMap, BTreeSet};

use super::state::GraphState;
use crate::model::{Issue, Status};

/// A [`GraphState`] plus status, priority and label memberships and the
/// precomputed ready set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedGraphState {
    graph: GraphState,
    by_status: BTreeMap<Status, BTreeSet<String>>,
    by_priority: BTreeMap<u8, BTreeSet<String>>,
    by_label: BTreeMap<String, BTreeSet<String>>,
    ready: BTreeSet<String>,
}

/// Index every issue in one pass.
#[must_use]
pub fn build_indexes(graph: GraphState) -> IndexedGraphState {
    let mut indexed = IndexedGraphState {
        graph,
        ..IndexedGraphState::default()
    };
    let ids: Vec<String> = indexed.graph.issues().keys().cloned().collect();
    for id in ids {
        indexed.index_one(&id);
    }
    indexed
}

/// Add (or re-index) a single just-created issue.
///
/// Only `issue` is recomputed, using the adjacency already present in the
/// graph. Issues whose readiness depends on `issue` are not revisited, so
/// call this before any link points at the new issue, or rebuild instead.
#[must_use]
pub fn index_issue_created(mut indexed: IndexedGraphState, issue: &Issue) -> IndexedGraphState {
    indexed.unindex(&issue.id);
    indexed.graph.issues.insert(issue.id.clone(), issue.clone());
    indexed.index_one(&issue.id);
    indexed
}

/// Ready iff active and every `blocks` predecessor is resolved.
///
/// Predecessors that are not in the graph do not block.
#[must_use]
pub fn is_ready(graph: &GraphState, issue: &Issue) -> bool {
    issue.status.is_active()
        && graph
            .blockers_of(&issue.id)
            .filter_map(|from| graph.issue(from))
            .all(|blocker| blocker.status.is_resolved())
}

impl IndexedGraphState {
    fn index_one(&mut self, id: &str) {
        let Some(issue) = self.graph.issue(id) else {
            return;
        };
        let ready = is_ready(&self.graph, issue);
        let (status, priority) = (issue.status, issue.priority);
        let labels = issue.labels.clone();

        self.by_status
            .entry(status)
            .or_default()
            .insert(id.to_string());
        self.by_priority
            .entry(priority)
            .or_default()
            .insert(id.to_string());
        for label in labels {
            self.by_label.entry(label).or_default().insert(id.to_string());
        }
        if ready {
            self.ready.insert(id.to_string());
        }
    }

    fn unindex(&mut self, id: &str) {
        for set in self.by_status.values_mut() {
            set.remove(id);
        }
        for set in self.by_priority.values_mut() {
            set.remove(id);
        }
        for set in self.by_label.values_mut() {
            set.remove(id);
        }
        self.by_status.retain(|_, set| !set.is_empty());
        self.by_priority.retain(|_, set| !set.is_empty());
        self.by_label.retain(|_, set| !set.is_empty());
        self.ready.remove(id);
    }

    pub const fn graph(&self) -> &GraphState {
        &self.graph
    }

    #[must_use]
    pub fn into_graph(self) -> GraphState {
        self.graph
    }

    #[must_use]
    pub fn with_status(&self, status: Status) -> Option<&BTreeSet<String>> {
        self.by_status.get(&status)
    }

    #[must_use]
    pub fn with_priority(&self, priority: u8) -> Option<&BTreeSet<String>> {
        self.by_priority.get(&priority)
    }

    #[must_use]
    pub fn with_label(&self, label: &str) -> Option<&BTreeSet<String>> {
        self.by_label.get(label)
    }

    pub const fn ready_ids(&self) -> &BTreeSet<String> {
        &self.ready
    }

    /// Ready issues ordered by priority, then creation time, then id.
    #[must_use]
    pub fn ready_issues(&self) -> Vec<&Issue> {
        let mut issues: Vec<&Issue> = self
            .ready
            .iter()
            .filter_map(|id| self.graph.issue(id))
            .collect();
        issues.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        issues
    }
}
