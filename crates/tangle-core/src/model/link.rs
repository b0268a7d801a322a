use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::issue::ParseEnumError;

/// The closed set of relationship types.
///
/// Only [`LinkType::Blocks`] affects readiness and cycle checks, and only
/// [`LinkType::ParentChild`] participates in the parent/child rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkType {
    Blocks,
    ParentChild,
    Related,
    DiscoveredFrom,
}

impl LinkType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::ParentChild => "parent-child",
            Self::Related => "related",
            Self::DiscoveredFrom => "discovered-from",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocks" => Ok(Self::Blocks),
            "parent-child" => Ok(Self::ParentChild),
            "related" => Ok(Self::Related),
            "discovered-from" => Ok(Self::DiscoveredFrom),
            _ => Err(ParseEnumError {
                expected: "link type",
                got: s.to_string(),
            }),
        }
    }
}

/// A directed edge `from → to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
    pub created_at: DateTime<Utc>,
}

impl Link {
    /// Edge identity. Two links with the same key are the same edge no
    /// matter when they were created.
    #[must_use]
    pub fn key(&self) -> (&str, &str, LinkType) {
        (self.from.as_str(), self.to.as_str(), self.link_type)
    }

    #[must_use]
    pub fn matches(&self, from: &str, to: &str, link_type: LinkType) -> bool {
        self.from == from && self.to == to && self.link_type == link_type
    }

    #[must_use]
    pub fn is_self_link(&self) -> bool {
        self.from == self.to
    }
}
