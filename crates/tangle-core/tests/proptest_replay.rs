//! Property tests for replay: determinism, prefix/suffix equivalence, and
//! agreement between the full-replay and heads stores on real files.

use proptest::prelude::*;
use std::time::Duration;
use tangle_core::event::Event;
use tangle_core::graph::{apply_event, apply_events, build_indexes, materialize_from_events};
use tangle_core::store::{EventLog, FullReplayStore, HeadsStore, LogStore};
use tempfile::TempDir;

use generators::*;

fn stores(dir: &TempDir, chunk: usize) -> (FullReplayStore, HeadsStore) {
    let log = EventLog::new(dir.path(), Duration::from_secs(1), false);
    (
        FullReplayStore::new(log.clone()),
        HeadsStore::new(log, Duration::from_millis(100), chunk),
    )
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn replay_is_deterministic(events in arb_events(40)) {
        prop_assert_eq!(materialize_from_events(&events), materialize_from_events(&events));
    }

    #[test]
    fn prefix_then_suffix_matches_full_replay(events in arb_events(40), split in 0usize..40) {
        let split = split.min(events.len());
        let (prefix, suffix) = events.split_at(split);
        let incremental = apply_events(materialize_from_events(prefix), suffix);
        prop_assert_eq!(incremental, materialize_from_events(&events));
    }

    #[test]
    fn readding_a_present_link_changes_nothing(events in arb_events(30)) {
        let state = materialize_from_events(&events);
        let links: Vec<_> = state.links().cloned().collect();
        let mut again = state.clone();
        for link in links {
            again = apply_event(again, &Event::LinkAdded { link });
        }
        prop_assert_eq!(again, state);
    }

    #[test]
    fn every_link_is_indexed_in_both_directions(events in arb_events(40)) {
        let state = materialize_from_events(&events);
        for link in state.links() {
            prop_assert!(state.incoming(&link.to).contains(link));
        }
        let incoming: usize = state.incoming_map().values().map(Vec::len).sum();
        prop_assert_eq!(incoming, state.link_count());
    }

    #[test]
    fn ready_issues_are_active_and_unblocked(events in arb_events(40)) {
        let indexed = build_indexes(materialize_from_events(&events));
        for issue in indexed.ready_issues() {
            prop_assert!(issue.status.is_active());
            for blocker in indexed.graph().blockers_of(&issue.id) {
                if let Some(blocker) = indexed.graph().issue(blocker) {
                    prop_assert!(blocker.status.is_resolved());
                }
            }
        }
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(48))]

    #[test]
    fn heads_store_matches_full_replay(
        first in arb_events(20),
        second in arb_events(20),
        chunk in 1usize..200,
    ) {
        let dir = TempDir::new().unwrap();
        let (full, heads) = stores(&dir, chunk);

        for event in &first {
            heads.append(event).unwrap();
        }
        prop_assert_eq!(heads.materialize().unwrap(), full.materialize().unwrap());

        for event in &second {
            heads.append(event).unwrap();
        }
        let (state, report) = heads.materialize_with_report().unwrap();
        prop_assert_eq!(report.events_applied, second.len());
        prop_assert_eq!(&state, &full.materialize().unwrap());
        prop_assert_eq!(state, materialize_from_events(&full.scan().unwrap()));
    }
}
