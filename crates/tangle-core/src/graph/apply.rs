//! Event application: the only code that turns events into state.
//!
//! [`apply_event`] is total. Events that reference unknown issues are
//! ignored, duplicate creates overwrite, and re-adding an existing edge is a
//! no-op, so a damaged or out-of-order log still replays.

use super::state::GraphState;
use crate::event::Event;
use crate::model::{Link, Status};

/// Apply one event, consuming the old state and returning the next one.
#[must_use]
pub fn apply_event(mut state: GraphState, event: &Event) -> GraphState {
    match event {
        Event::IssueCreated { issue } => {
            state.issues.insert(issue.id.clone(), issue.clone());
        }
        Event::IssuePatched {
            id,
            patch,
            updated_at,
        } => {
            if let Some(issue) = state.issues.get_mut(id) {
                if let Some(title) = &patch.title {
                    issue.title.clone_from(title);
                }
                if let Some(body) = &patch.body {
                    issue.body = Some(body.clone());
                }
                if let Some(kind) = patch.kind {
                    issue.kind = kind;
                }
                if let Some(priority) = patch.priority {
                    issue.priority = priority;
                }
                if let Some(labels) = &patch.labels {
                    issue.labels.clone_from(labels);
                }
                issue.updated_at = *updated_at;
            }
        }
        Event::IssueStatusSet { id, status, at } => {
            if let Some(issue) = state.issues.get_mut(id) {
                issue.status = *status;
                issue.updated_at = *at;
                // Reopening keeps the previous closedAt.
                if *status == Status::Done {
                    issue.closed_at = Some(*at);
                }
            }
        }
        Event::LinkAdded { link } => add_link(&mut state, link),
        Event::LinkRemoved {
            from,
            to,
            link_type,
            ..
        } => {
            let keep = |l: &Link| !l.matches(from, to, *link_type);
            retain_in(&mut state.outgoing, from, keep);
            retain_in(&mut state.incoming, to, keep);
        }
    }
    state
}

/// Fold `events` over `state` in order.
#[must_use]
pub fn apply_events<'a, I>(state: GraphState, events: I) -> GraphState
where
    I: IntoIterator<Item = &'a Event>,
{
    events.into_iter().fold(state, apply_event)
}

/// Replay a full event sequence from the empty state.
#[must_use]
pub fn materialize_from_events(events: &[Event]) -> GraphState {
    apply_events(GraphState::new(), events)
}

fn add_link(state: &mut GraphState, link: &Link) {
    let exists = state
        .outgoing
        .get(&link.from)
        .is_some_and(|links| links.iter().any(|l| l.key() == link.key()));
    if exists {
        return;
    }
    state
        .outgoing
        .entry(link.from.clone())
        .or_default()
        .push(link.clone());
    state
        .incoming
        .entry(link.to.clone())
        .or_default()
        .push(link.clone());
}

fn retain_in(
    map: &mut std::collections::BTreeMap<String, Vec<Link>>,
    key: &str,
    keep: impl Fn(&Link) -> bool,
) {
    if let Some(links) = map.get_mut(key) {
        links.retain(|l| keep(l));
        if links.is_empty() {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::IssuePatch;
    use crate::model::{Issue, IssueKind, LinkType};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 5, 10, minute, 0).unwrap()
    }

    fn created(id: &str, title: &str, minute: u32) -> Event {
        Event::IssueCreated {
            issue: Issue {
                id: id.into(),
                title: title.into(),
                body: None,
                kind: IssueKind::Feature,
                priority: 2,
                status: Status::Open,
                labels: vec![],
                created_at: ts(minute),
                updated_at: ts(minute),
                closed_at: None,
            },
        }
    }

    fn link_added(from: &str, to: &str, link_type: LinkType, minute: u32) -> Event {
        Event::LinkAdded {
            link: Link {
                from: from.into(),
                to: to.into(),
                link_type,
                created_at: ts(minute),
            },
        }
    }

    fn status(id: &str, status: Status, minute: u32) -> Event {
        Event::IssueStatusSet {
            id: id.into(),
            status,
            at: ts(minute),
        }
    }

    #[test]
    fn readding_identical_link_is_a_noop() {
        let events = vec![
            created("tg-aaaa", "A", 0),
            created("tg-bbbb", "B", 1),
            link_added("tg-aaaa", "tg-bbbb", LinkType::Blocks, 2),
            link_added("tg-aaaa", "tg-bbbb", LinkType::Blocks, 3),
        ];
        let state = materialize_from_events(&events);
        assert_eq!(state.outgoing("tg-aaaa").len(), 1);
        assert_eq!(state.incoming("tg-bbbb").len(), 1);
        // The first add wins; the later timestamp is not recorded.
        assert_eq!(state.outgoing("tg-aaaa")[0].created_at, ts(2));
    }

    #[test]
    fn same_endpoints_with_different_type_are_distinct_edges() {
        let events = vec![
            link_added("tg-aaaa", "tg-bbbb", LinkType::Blocks, 0),
            link_added("tg-aaaa", "tg-bbbb", LinkType::Related, 1),
        ];
        let state = materialize_from_events(&events);
        assert_eq!(state.link_count(), 2);
    }

    #[test]
    fn links_to_unknown_issues_are_retained() {
        let state = materialize_from_events(&[link_added(
            "tg-ghst",
            "tg-nope",
            LinkType::Blocks,
            0,
        )]);
        assert_eq!(state.issue_count(), 0);
        assert_eq!(state.outgoing("tg-ghst").len(), 1);
        assert_eq!(state.incoming("tg-nope").len(), 1);
    }

    #[test]
    fn link_removed_clears_both_directions() {
        let events = vec![
            link_added("tg-aaaa", "tg-bbbb", LinkType::Blocks, 0),
            link_added("tg-aaaa", "tg-cccc", LinkType::Blocks, 1),
            Event::LinkRemoved {
                from: "tg-aaaa".into(),
                to: "tg-bbbb".into(),
                link_type: LinkType::Blocks,
                at: ts(2),
            },
        ];
        let state = materialize_from_events(&events);
        assert_eq!(state.outgoing("tg-aaaa").len(), 1);
        assert!(state.incoming("tg-bbbb").is_empty());
        assert!(!state.incoming_map().contains_key("tg-bbbb"));
    }

    #[test]
    fn patch_and_status_on_missing_issue_are_ignored() {
        let events = vec![
            status("tg-miss", Status::Done, 0),
            Event::IssuePatched {
                id: "tg-miss".into(),
                patch: IssuePatch {
                    title: Some("x".into()),
                    ..IssuePatch::default()
                },
                updated_at: ts(1),
            },
        ];
        assert_eq!(materialize_from_events(&events), GraphState::new());
    }

    #[test]
    fn patch_merges_present_fields_and_refreshes_updated_at() {
        let events = vec![
            created("tg-aaaa", "Old", 0),
            Event::IssuePatched {
                id: "tg-aaaa".into(),
                patch: IssuePatch {
                    title: Some("New".into()),
                    labels: Some(vec!["x".into(), "x".into()]),
                    ..IssuePatch::default()
                },
                updated_at: ts(5),
            },
        ];
        let state = materialize_from_events(&events);
        let issue = state.issue("tg-aaaa").unwrap();
        assert_eq!(issue.title, "New");
        assert_eq!(issue.priority, 2);
        assert_eq!(issue.labels, vec!["x".to_string(), "x".to_string()]);
        assert_eq!(issue.updated_at, ts(5));
        assert_eq!(issue.created_at, ts(0));
    }

    #[test]
    fn done_sets_closed_at_and_reopen_keeps_it() {
        let events = vec![
            created("tg-aaaa", "A", 0),
            status("tg-aaaa", Status::Done, 10),
            status("tg-aaaa", Status::Open, 20),
        ];
        let state = materialize_from_events(&events);
        let issue = state.issue("tg-aaaa").unwrap();
        assert_eq!(issue.status, Status::Open);
        assert_eq!(issue.closed_at, Some(ts(10)));
        assert_eq!(issue.updated_at, ts(20));
    }

    #[test]
    fn duplicate_create_overwrites() {
        let state =
            materialize_from_events(&[created("tg-aaaa", "First", 0), created("tg-aaaa", "Second", 1)]);
        assert_eq!(state.issue_count(), 1);
        assert_eq!(state.issue("tg-aaaa").unwrap().title, "Second");
    }

    #[test]
    fn prefix_then_suffix_equals_full_replay() {
        let events = vec![
            created("tg-aaaa", "A", 0),
            created("tg-bbbb", "B", 1),
            link_added("tg-aaaa", "tg-bbbb", LinkType::Blocks, 2),
            status("tg-aaaa", Status::Done, 3),
            Event::LinkRemoved {
                from: "tg-aaaa".into(),
                to: "tg-bbbb".into(),
                link_type: LinkType::Blocks,
                at: ts(4),
            },
        ];
        for split in 0..=events.len() {
            let (prefix, suffix) = events.split_at(split);
            let incremental = apply_events(materialize_from_events(prefix), suffix);
            assert_eq!(incremental, materialize_from_events(&events), "split at {split}");
        }
    }
}
