//! The materialized projection of the log.

use std::collections::BTreeMap;

use crate::model::{Issue, Link, LinkType};

/// Issues keyed by id plus both directions of the adjacency.
///
/// `outgoing` is keyed by the link source, `incoming` by the link target.
/// Link endpoints are not required to exist in `issues`: replay keeps edges
/// that reference issues it has not seen, and integrity checks report them.
///
/// Values are only ever produced by the materializer; once handed to a
/// caller they are not changed again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphState {
    pub(crate) issues: BTreeMap<String, Issue>,
    pub(crate) outgoing: BTreeMap<String, Vec<Link>>,
    pub(crate) incoming: BTreeMap<String, Vec<Link>>,
}

impl GraphState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassemble a state from its three mappings, e.g. after loading a
    /// snapshot.
    #[must_use]
    pub const fn from_parts(
        issues: BTreeMap<String, Issue>,
        outgoing: BTreeMap<String, Vec<Link>>,
        incoming: BTreeMap<String, Vec<Link>>,
    ) -> Self {
        Self {
            issues,
            outgoing,
            incoming,
        }
    }

    pub const fn issues(&self) -> &BTreeMap<String, Issue> {
        &self.issues
    }

    pub const fn outgoing_map(&self) -> &BTreeMap<String, Vec<Link>> {
        &self.outgoing
    }

    pub const fn incoming_map(&self) -> &BTreeMap<String, Vec<Link>> {
        &self.incoming
    }

    #[must_use]
    pub fn issue(&self, id: &str) -> Option<&Issue> {
        self.issues.get(id)
    }

    /// Links whose source is `id`.
    #[must_use]
    pub fn outgoing(&self, id: &str) -> &[Link] {
        self.outgoing.get(id).map_or(&[][..], Vec::as_slice)
    }

    /// Links whose target is `id`.
    #[must_use]
    pub fn incoming(&self, id: &str) -> &[Link] {
        self.incoming.get(id).map_or(&[][..], Vec::as_slice)
    }

    /// Sources of `blocks` edges pointing at `id`.
    pub fn blockers_of<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.incoming(id)
            .iter()
            .filter(|l| l.link_type == LinkType::Blocks)
            .map(|l| l.from.as_str())
    }

    /// Targets of `parent-child` edges leaving `id`.
    pub fn children_of<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.outgoing(id)
            .iter()
            .filter(|l| l.link_type == LinkType::ParentChild)
            .map(|l| l.to.as_str())
    }

    /// Every link, in source order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.outgoing.values().flatten()
    }

    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.outgoing.is_empty()
    }
}
