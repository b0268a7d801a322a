//! Embedding API over a tangle directory.
//!
//! A [`Repository`] owns one log directory, picks the store from config,
//! and turns high-level edits into events. Reads go through an optional
//! [`CachePort`] before falling back to the store.
//!
//! ```no_run
//! use tangle_core::model::{LinkType, Status};
//! use tangle_core::repo::{NewIssue, Repository};
//!
//! # fn main() -> Result<(), tangle_core::repo::RepoError> {
//! let repo = Repository::open(".tangle")?;
//! let api = repo.create_issue(NewIssue::new("Design the API").priority(0))?;
//! let impl_ = repo.create_issue(NewIssue::new("Implement it"))?;
//! repo.add_link(&api.id, &impl_.id, LinkType::Blocks)?;
//! repo.set_status(&api.id, Status::Done)?;
//! assert_eq!(repo.ready()?[0].id, impl_.id);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::cache::CachePort;
use crate::config::{load_config, StoreConfig, StoreKind};
use crate::error::{ErrorCode, StoreError};
use crate::event::{Event, IssuePatch};
use crate::graph::{build_indexes, check_invariants, GraphState, IndexedGraphState};
use crate::model::id::{self, IdError};
use crate::model::{Issue, IssueKind, Link, LinkType, Status};
use crate::store::{
    EventLog, FullReplayStore, HeadsStore, LogStore, MaterializeReport,
};
use crate::verify::{self, IntegrityReport, RepairReport};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid configuration in {}: {reason}", .root.display())]
    Config { root: PathBuf, reason: String },

    #[error("issue '{id}' not found")]
    IssueNotFound { id: String },

    #[error("cannot link '{id}' to itself")]
    SelfLink { id: String },

    #[error(transparent)]
    Id(#[from] IdError),
}

impl RepoError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Store(err) => err.code(),
            Self::Config { .. } => ErrorCode::ConfigParseError,
            Self::IssueNotFound { .. } => ErrorCode::IssueNotFound,
            Self::SelfLink { .. } => ErrorCode::SelfLink,
            Self::Id(_) => ErrorCode::InvalidEvent,
        }
    }
}

/// Fields for a new issue. Everything else is filled in on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub body: Option<String>,
    pub kind: IssueKind,
    pub priority: u8,
    pub labels: Vec<String>,
}

impl NewIssue {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: None,
            kind: IssueKind::Feature,
            priority: 2,
            labels: Vec::new(),
        }
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub const fn kind(mut self, kind: IssueKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }
}

#[derive(Debug)]
enum Backend {
    Heads(HeadsStore),
    Full(FullReplayStore),
}

impl Backend {
    fn store(&self) -> &dyn LogStore {
        match self {
            Self::Heads(store) => store,
            Self::Full(store) => store,
        }
    }
}

pub struct Repository {
    root: PathBuf,
    config: StoreConfig,
    backend: Backend,
    cache: Option<Arc<dyn CachePort>>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl Repository {
    /// Open (creating if needed) the directory at `root`, reading
    /// `config.toml` from it.
    ///
    /// # Errors
    ///
    /// [`RepoError::Config`] for an unreadable config, or a classified I/O
    /// failure creating the directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::from_io(&e, &root, "create directory"))?;
        let config = load_config(&root).map_err(|e| RepoError::Config {
            root: root.clone(),
            reason: format!("{e:#}"),
        })?;
        Self::open_with(root, config)
    }

    /// Open with an explicit config; `config.toml` and the environment are
    /// ignored.
    ///
    /// # Errors
    ///
    /// A classified I/O failure creating the directory.
    pub fn open_with(root: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, RepoError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::from_io(&e, &root, "create directory"))?;
        let log = EventLog::from_config(&root, &config);
        let backend = match config.store {
            StoreKind::Heads => Backend::Heads(HeadsStore::from_config(log, &config)),
            StoreKind::Full => Backend::Full(FullReplayStore::new(log)),
        };
        tracing::debug!(root = %root.display(), store = %config.store, "opened repository");
        Ok(Self {
            root,
            config,
            backend,
            cache: None,
        })
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CachePort>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn LogStore {
        self.backend.store()
    }

    /// Create an issue with a fresh collision-checked id.
    ///
    /// # Errors
    ///
    /// Validation, lock or I/O failures from the store, or id exhaustion.
    pub fn create_issue(&self, new: NewIssue) -> Result<Issue, RepoError> {
        let existing = self.existing_ids()?;
        let now = Utc::now();
        let issue = Issue {
            id: id::generate(&existing)?,
            title: new.title,
            body: new.body,
            kind: new.kind,
            priority: new.priority,
            status: Status::Open,
            labels: new.labels,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        self.append(&Event::IssueCreated {
            issue: issue.clone(),
        })?;
        tracing::info!(id = %issue.id, "created issue");
        Ok(issue)
    }

    /// Apply a partial update and return the updated issue.
    ///
    /// # Errors
    ///
    /// [`RepoError::IssueNotFound`], or a store failure.
    pub fn patch_issue(&self, id: &str, patch: IssuePatch) -> Result<Issue, RepoError> {
        self.require(id)?;
        self.append(&Event::IssuePatched {
            id: id.to_string(),
            patch,
            updated_at: Utc::now(),
        })?;
        self.require(id)
    }

    /// # Errors
    ///
    /// [`RepoError::IssueNotFound`], or a store failure.
    pub fn set_status(&self, id: &str, status: Status) -> Result<Issue, RepoError> {
        self.require(id)?;
        self.append(&Event::IssueStatusSet {
            id: id.to_string(),
            status,
            at: Utc::now(),
        })?;
        self.require(id)
    }

    /// Add a directed link between two existing issues.
    ///
    /// # Errors
    ///
    /// [`RepoError::SelfLink`] before anything is written, then
    /// [`RepoError::IssueNotFound`] for a missing endpoint, or a store
    /// failure.
    pub fn add_link(&self, from: &str, to: &str, link_type: LinkType) -> Result<Link, RepoError> {
        if from == to {
            return Err(RepoError::SelfLink { id: from.to_string() });
        }
        let graph = self.graph()?;
        for endpoint in [from, to] {
            if graph.issue(endpoint).is_none() {
                return Err(RepoError::IssueNotFound {
                    id: endpoint.to_string(),
                });
            }
        }
        let link = Link {
            from: from.to_string(),
            to: to.to_string(),
            link_type,
            created_at: Utc::now(),
        };
        self.append(&Event::LinkAdded { link: link.clone() })?;
        Ok(link)
    }

    /// Remove a link. Removing a link that does not exist is recorded and
    /// has no effect on the graph.
    ///
    /// # Errors
    ///
    /// A store failure.
    pub fn remove_link(&self, from: &str, to: &str, link_type: LinkType) -> Result<(), RepoError> {
        self.append(&Event::LinkRemoved {
            from: from.to_string(),
            to: to.to_string(),
            link_type,
            at: Utc::now(),
        })
    }

    /// Current graph, from the cache when it has one.
    ///
    /// # Errors
    ///
    /// A store failure while materializing.
    pub fn graph(&self) -> Result<GraphState, RepoError> {
        if let Some(state) = self.cache.as_ref().and_then(|cache| cache.hydrate()) {
            tracing::debug!("graph served from cache");
            return Ok(state);
        }
        self.materialize()
    }

    /// Materialize through the heads store and return its report. `None`
    /// for the full-replay store.
    ///
    /// # Errors
    ///
    /// A store failure while materializing.
    pub fn materialize_with_report(
        &self,
    ) -> Result<Option<(GraphState, MaterializeReport)>, RepoError> {
        match &self.backend {
            Backend::Heads(store) => {
                let (state, report) = store.materialize_with_report()?;
                self.remember(&state);
                Ok(Some((state, report)))
            }
            Backend::Full(_) => Ok(None),
        }
    }

    /// # Errors
    ///
    /// A store failure while materializing.
    pub fn indexed(&self) -> Result<IndexedGraphState, RepoError> {
        Ok(build_indexes(self.graph()?))
    }

    /// Ready issues by priority, then creation time, then id.
    ///
    /// # Errors
    ///
    /// A store failure while materializing.
    pub fn ready(&self) -> Result<Vec<Issue>, RepoError> {
        let indexed = self.indexed()?;
        Ok(indexed.ready_issues().into_iter().cloned().collect())
    }

    /// # Errors
    ///
    /// A store failure while materializing.
    pub fn check_invariants(&self) -> Result<Vec<String>, RepoError> {
        Ok(check_invariants(&self.graph()?))
    }

    /// # Errors
    ///
    /// I/O failures reading the logs.
    pub fn verify_integrity(&self) -> Result<IntegrityReport, RepoError> {
        Ok(verify::verify_integrity(self.store().log())?)
    }

    /// Remove duplicate creates and refresh the cache from the repaired log.
    ///
    /// # Errors
    ///
    /// Lock or I/O failures; see [`verify::repair`].
    pub fn repair(&self) -> Result<RepairReport, RepoError> {
        let report = verify::repair(self.store().log())?;
        if report.lines_removed() > 0 {
            self.materialize()?;
        }
        Ok(report)
    }

    fn append(&self, event: &Event) -> Result<(), RepoError> {
        self.store().append(event)?;
        if self.cache.is_some() {
            self.materialize()?;
        }
        Ok(())
    }

    fn materialize(&self) -> Result<GraphState, RepoError> {
        let state = self.store().materialize()?;
        self.remember(&state);
        Ok(state)
    }

    fn remember(&self, state: &GraphState) {
        if let Some(cache) = &self.cache {
            cache.persist(state);
        }
    }

    fn require(&self, id: &str) -> Result<Issue, RepoError> {
        self.graph()?
            .issue(id)
            .cloned()
            .ok_or_else(|| RepoError::IssueNotFound { id: id.to_string() })
    }

    fn existing_ids(&self) -> Result<BTreeSet<String>, RepoError> {
        if let Some(lister) = self.store().as_id_lister() {
            return Ok(lister.existing_ids()?);
        }
        Ok(self.graph()?.issues().keys().cloned().collect())
    }
}
