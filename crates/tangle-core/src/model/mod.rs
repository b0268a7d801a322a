//! Domain records: issues, links and their identifiers.

pub mod id;
pub mod issue;
pub mod link;

pub use issue::{Issue, IssueKind, ParseEnumError, Status};
pub use link::{Link, LinkType};
