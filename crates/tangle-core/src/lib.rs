//! tangle-core: an embeddable, event-sourced dependency-graph store.
//!
//! Issues and the links between them are recorded as immutable events in
//! two append-only JSON-lines files and replayed into an in-memory
//! [`graph::GraphState`]. There is no server: every process that opens the
//! directory reads and writes the files directly, coordinated by advisory
//! file locks.
//!
//! # Layout
//!
//! - [`model`], [`event`]: the data types and their line format.
//! - [`graph`]: pure replay, secondary indexes and invariant checks.
//! - [`store`]: the append path plus the full-replay and incremental
//!   ("heads") read strategies.
//! - [`verify`]: integrity reports and duplicate-create repair.
//! - [`repo`]: the embedding API most callers want.
//!
//! # Conventions
//!
//! - **Errors**: [`error::StoreError`] below the repository, [`repo::RepoError`]
//!   above it; `anyhow` only at the config boundary.
//! - **Logging**: `tracing` macros with structured fields. The library never
//!   installs a subscriber.

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod lock;
pub mod model;
pub mod repo;
pub mod store;
pub mod verify;

pub use error::{ErrorCode, StoreError};
pub use repo::{NewIssue, RepoError, Repository};
