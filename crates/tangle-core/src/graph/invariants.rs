//! Advisory invariant checks over a materialized graph.
//!
//! Nothing here runs automatically. Callers invoke [`check_invariants`]
//! after bulk edits or as part of integrity verification.
//!
//! Two rules are checked:
//!
//! - **No blocking cycles.** A three-color DFS over `blocks` edges only.
//!   The first back edge found is reported and the search stops.
//! - **Done parents have finished children.** A `done` issue whose
//!   `parent-child` children include one that is neither done nor canceled
//!   is reported.

use std::collections::BTreeMap;
use std::fmt;

use super::state::GraphState;
use crate::model::{LinkType, Status};

/// A broken domain rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// `path` starts and ends at the node where the back edge was found.
    BlockingCycle { detected_at: String, path: Vec<String> },
    UnfinishedChildren {
        parent: String,
        children: Vec<(String, Status)>,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockingCycle { detected_at, path } => write!(
                f,
                "blocking cycle detected at '{detected_at}': {}",
                path.join(" -> ")
            ),
            Self::UnfinishedChildren { parent, children } => {
                let listed: Vec<String> = children
                    .iter()
                    .map(|(id, status)| format!("{id} ({status})"))
                    .collect();
                write!(
                    f,
                    "done parent '{parent}' has unfinished children: {}",
                    listed.join(", ")
                )
            }
        }
    }
}

/// Run every check and render the violations. Empty means healthy.
#[must_use]
pub fn check_invariants(state: &GraphState) -> Vec<String> {
    find_violations(state)
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Typed form of [`check_invariants`].
#[must_use]
pub fn find_violations(state: &GraphState) -> Vec<Violation> {
    let mut violations = Vec::new();
    if let Some(cycle) = find_blocking_cycle(state) {
        violations.push(cycle);
    }
    violations.extend(unfinished_children(state));
    violations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Iterative three-color DFS over `blocks` edges, in id order.
#[must_use]
pub fn find_blocking_cycle(state: &GraphState) -> Option<Violation> {
    let mut color: BTreeMap<&str, Color> = BTreeMap::new();
    for id in state.issues().keys().chain(state.outgoing_map().keys()) {
        color.insert(id.as_str(), Color::White);
    }
    let roots: Vec<&str> = color.keys().copied().collect();

    for root in roots {
        if color.get(root) != Some(&Color::White) {
            continue;
        }
        // Each frame is a node and the index of its next edge to explore.
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        color.insert(root, Color::Gray);

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            let edges = state.outgoing(node);
            let Some(offset) = edges[next..]
                .iter()
                .position(|l| l.link_type == LinkType::Blocks)
            else {
                color.insert(node, Color::Black);
                stack.pop();
                continue;
            };
            frame.1 = next + offset + 1;

            let target = edges[next + offset].to.as_str();
            match color.get(target).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    let start = stack
                        .iter()
                        .position(|(id, _)| *id == target)
                        .unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|(id, _)| (*id).to_string()).collect();
                    path.push(target.to_string());
                    return Some(Violation::BlockingCycle {
                        detected_at: node.to_string(),
                        path,
                    });
                }
                Color::White => {
                    color.insert(target, Color::Gray);
                    stack.push((target, 0));
                }
                Color::Black => {}
            }
        }
    }
    None
}

fn unfinished_children(state: &GraphState) -> Vec<Violation> {
    state
        .issues()
        .values()
        .filter(|issue| issue.status == Status::Done)
        .filter_map(|parent| {
            let children: Vec<(String, Status)> = state
                .children_of(&parent.id)
                .filter_map(|child| state.issue(child))
                .filter(|child| !child.status.is_resolved())
                .map(|child| (child.id.clone(), child.status))
                .collect();
            (!children.is_empty()).then(|| Violation::UnfinishedChildren {
                parent: parent.id.clone(),
                children,
            })
        })
        .collect()
}
