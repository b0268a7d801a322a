//! Event model for the tangle log.
//!
//! Events are the only source of truth. Each variant carries every field it
//! needs to be applied, so replay never looks anything up outside the event
//! itself.
//!
//! # Line format
//!
//! One compact JSON object per line, discriminated by the `event` field:
//!
//! ```text
//! {"event":"IssueCreated","issue":{"id":"tg-a1b2","title":"...",...}}
//! {"event":"IssuePatched","id":"tg-a1b2","patch":{"priority":0},"updatedAt":"..."}
//! {"event":"IssueStatusSet","id":"tg-a1b2","status":"done","at":"..."}
//! {"event":"LinkAdded","link":{"from":"tg-a1b2","to":"tg-c3d4","type":"blocks","createdAt":"..."}}
//! {"event":"LinkRemoved","from":"tg-a1b2","to":"tg-c3d4","type":"blocks","at":"..."}
//! ```

pub mod codec;
pub mod validate;

pub use codec::{decode_line, encode_line, parse_lines};
pub use validate::{EventValidator, SchemaValidator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Issue, IssueKind, Link, LinkType, Status};

/// A partial field update. Absent fields are left untouched by replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<IssueKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl IssuePatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.kind.is_none()
            && self.priority.is_none()
            && self.labels.is_none()
    }
}

/// A single immutable record in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    IssueCreated {
        issue: Issue,
    },
    #[serde(rename_all = "camelCase")]
    IssuePatched {
        id: String,
        patch: IssuePatch,
        updated_at: DateTime<Utc>,
    },
    IssueStatusSet {
        id: String,
        status: Status,
        at: DateTime<Utc>,
    },
    LinkAdded {
        link: Link,
    },
    LinkRemoved {
        from: String,
        to: String,
        #[serde(rename = "type")]
        link_type: LinkType,
        at: DateTime<Utc>,
    },
}

/// The physical log file an event is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogFile {
    Issues,
    Links,
}

impl LogFile {
    pub const ALL: [Self; 2] = [Self::Issues, Self::Links];

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Issues => "issues.jsonl",
            Self::Links => "links.jsonl",
        }
    }
}

impl Event {
    /// Issue lifecycle events go to `issues.jsonl`, link events to
    /// `links.jsonl`.
    #[must_use]
    pub const fn log_file(&self) -> LogFile {
        match self {
            Self::IssueCreated { .. } | Self::IssuePatched { .. } | Self::IssueStatusSet { .. } => {
                LogFile::Issues
            }
            Self::LinkAdded { .. } | Self::LinkRemoved { .. } => LogFile::Links,
        }
    }

    /// The issue this event mutates, for issue lifecycle events.
    #[must_use]
    pub fn issue_id(&self) -> Option<&str> {
        match self {
            Self::IssueCreated { issue } => Some(&issue.id),
            Self::IssuePatched { id, .. } | Self::IssueStatusSet { id, .. } => Some(id),
            Self::LinkAdded { .. } | Self::LinkRemoved { .. } => None,
        }
    }

    /// When the event happened.
    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::IssueCreated { issue } => issue.created_at,
            Self::IssuePatched { updated_at, .. } => *updated_at,
            Self::IssueStatusSet { at, .. } | Self::LinkRemoved { at, .. } => *at,
            Self::LinkAdded { link } => link.created_at,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::IssueCreated { .. } => "IssueCreated",
            Self::IssuePatched { .. } => "IssuePatched",
            Self::IssueStatusSet { .. } => "IssueStatusSet",
            Self::LinkAdded { .. } => "LinkAdded",
            Self::LinkRemoved { .. } => "LinkRemoved",
        }
    }
}
