use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment variable that overrides [`StoreConfig::store`].
pub const STORE_ENV: &str = "TANGLE_STORE";

/// Which log store [`crate::repo::Repository`] opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Offset bookmarks plus a snapshot; only new bytes are replayed.
    #[default]
    Heads,
    /// Replay both logs on every read.
    Full,
}

impl StoreKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "heads" | "incremental" => Some(Self::Heads),
            "full" | "replay" => Some(Self::Full),
            _ => None,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Heads => "heads",
            Self::Full => "full",
        })
    }
}

/// Store tuning read from `<root>/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_read_lock_timeout_ms")]
    pub read_lock_timeout_ms: u64,
    /// `sync_data` after every append.
    #[serde(default = "default_true")]
    pub durable: bool,
    #[serde(default = "default_tail_chunk_bytes")]
    pub tail_chunk_bytes: usize,
    #[serde(default)]
    pub store: StoreKind,
    /// Install the built-in schema validator.
    #[serde(default = "default_true")]
    pub validate: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            read_lock_timeout_ms: default_read_lock_timeout_ms(),
            durable: default_true(),
            tail_chunk_bytes: default_tail_chunk_bytes(),
            store: StoreKind::default(),
            validate: default_true(),
        }
    }
}

impl StoreConfig {
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub const fn read_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.read_lock_timeout_ms)
    }

    /// Chunk size for tail reads, never zero.
    pub fn tail_chunk(&self) -> usize {
        self.tail_chunk_bytes.max(1)
    }
}

/// Load `<root>/config.toml`, falling back to defaults when it is absent,
/// then apply the `TANGLE_STORE` override.
///
/// # Errors
///
/// Fails if the file exists but cannot be read or parsed.
pub fn load_config(root: &Path) -> Result<StoreConfig> {
    let path = root.join("config.toml");
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<StoreConfig>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        StoreConfig::default()
    };

    config.store = resolve_store_kind(config.store, env::var(STORE_ENV).ok());
    Ok(config)
}

fn resolve_store_kind(configured: StoreKind, env_value: Option<String>) -> StoreKind {
    let Some(raw) = env_value else {
        return configured;
    };
    StoreKind::parse(&raw).unwrap_or_else(|| {
        tracing::warn!(
            value = %raw,
            fallback = %configured,
            "ignoring unrecognized {STORE_ENV}"
        );
        configured
    })
}

const fn default_true() -> bool {
    true
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}

const fn default_read_lock_timeout_ms() -> u64 {
    1_000
}

const fn default_tail_chunk_bytes() -> usize {
    64 * 1024
}
