//! Key-value store abstraction for Watch Pro
//!
//! The service persists chats and caches search responses through a small
//! Redis-like command set. Two backends implement it:
//!
//! - [`RestStore`]: a hosted key-value service spoken to over its JSON REST
//!   command API
//! - [`LocalStore`]: an embedded store on local disk
//!
//! The backend is chosen once, at startup, by [`create_store`]. Callers hold
//! an `Arc<dyn KvStore>` and never branch on the concrete type.

pub mod local;
pub mod rest;

pub use local::LocalStore;
pub use rest::RestStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{Result, WatchProError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A single store command
///
/// Commands are plain data so they can be batched into a pipeline and
/// translated by each backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Read a string value
    Get { key: String },
    /// Write a string value, optionally expiring after `ttl`
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    /// Delete a key of any type
    Del { key: String },
    /// Remaining time to live of a key
    Ttl { key: String },
    /// Keys starting with `prefix`
    Scan { prefix: String },
    /// Set fields on a hash
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Read all fields of a hash
    HGetAll { key: String },
    /// Add or update a sorted-set member
    ZAdd {
        key: String,
        score: f64,
        member: String,
    },
    /// Remove a sorted-set member
    ZRem { key: String, member: String },
    /// Members by rank; negative indices count from the end
    ZRange {
        key: String,
        start: i64,
        stop: i64,
        rev: bool,
    },
}

impl Command {
    /// Name of the command, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "GET",
            Self::Set { .. } => "SET",
            Self::Del { .. } => "DEL",
            Self::Ttl { .. } => "PTTL",
            Self::Scan { .. } => "KEYS",
            Self::HSet { .. } => "HSET",
            Self::HGetAll { .. } => "HGETALL",
            Self::ZAdd { .. } => "ZADD",
            Self::ZRem { .. } => "ZREM",
            Self::ZRange { .. } => "ZRANGE",
        }
    }
}

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key does not exist (or has already expired)
    Missing,
    /// Key exists without an expiry
    Persistent,
    /// Key expires after this duration
    Expires(Duration),
}

impl Ttl {
    /// Whether a cleanup sweep should delete the key
    ///
    /// Mirrors a `ttl <= 0` check: missing keys, keys without expiry, and
    /// keys at or past their deadline are all eligible.
    pub fn is_sweepable(&self) -> bool {
        match self {
            Self::Missing | Self::Persistent => true,
            Self::Expires(remaining) => remaining.is_zero(),
        }
    }
}

/// Reply to a store command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// No value
    Nil,
    /// Acknowledgement
    Ok,
    /// Integer reply (counts of affected items)
    Int(i64),
    /// String value
    Text(String),
    /// List of strings (keys, sorted-set members)
    List(Vec<String>),
    /// Hash contents
    Map(HashMap<String, String>),
    /// Remaining lifetime
    Ttl(Ttl),
}

impl Reply {
    fn unexpected(self, wanted: &str) -> anyhow::Error {
        WatchProError::Storage(format!("Expected {} reply, got {:?}", wanted, self)).into()
    }

    /// Interpret as an optional string value
    pub fn into_text(self) -> Result<Option<String>> {
        match self {
            Self::Nil => Ok(None),
            Self::Text(s) => Ok(Some(s)),
            other => Err(other.unexpected("text")),
        }
    }

    /// Interpret as a list of strings (nil is an empty list)
    pub fn into_list(self) -> Result<Vec<String>> {
        match self {
            Self::Nil => Ok(Vec::new()),
            Self::List(items) => Ok(items),
            other => Err(other.unexpected("list")),
        }
    }

    /// Interpret as hash contents (nil is an empty hash)
    pub fn into_map(self) -> Result<HashMap<String, String>> {
        match self {
            Self::Nil => Ok(HashMap::new()),
            Self::Map(map) => Ok(map),
            other => Err(other.unexpected("map")),
        }
    }

    /// Interpret as an integer count
    pub fn into_int(self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(n),
            Self::Ok => Ok(1),
            other => Err(other.unexpected("integer")),
        }
    }

    /// Interpret as a time to live
    pub fn into_ttl(self) -> Result<Ttl> {
        match self {
            Self::Ttl(ttl) => Ok(ttl),
            other => Err(other.unexpected("ttl")),
        }
    }
}

/// Uniform key-value store interface
///
/// Backends implement [`KvStore::execute`]; every typed helper is built on
/// it. [`KvStore::pipeline`] defaults to sequential execution and backends
/// with a native batch API override it.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Execute a single command
    async fn execute(&self, command: Command) -> Result<Reply>;

    /// Execute commands in order, returning one reply per command
    async fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            replies.push(self.execute(command).await?);
        }
        Ok(replies)
    }

    /// Release backend resources
    ///
    /// The default implementation does nothing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Read a string value
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.execute(Command::Get {
            key: key.to_string(),
        })
        .await?
        .into_text()
    }

    /// Write a string value with an optional expiry
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.execute(Command::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        })
        .await?;
        Ok(())
    }

    /// Delete a key, returning whether it existed
    async fn del(&self, key: &str) -> Result<bool> {
        let removed = self
            .execute(Command::Del {
                key: key.to_string(),
            })
            .await?
            .into_int()?;
        Ok(removed > 0)
    }

    /// Remaining time to live of a key
    async fn ttl(&self, key: &str) -> Result<Ttl> {
        self.execute(Command::Ttl {
            key: key.to_string(),
        })
        .await?
        .into_ttl()
    }

    /// Keys starting with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.execute(Command::Scan {
            prefix: prefix.to_string(),
        })
        .await?
        .into_list()
    }

    /// Read all fields of a hash
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.execute(Command::HGetAll {
            key: key.to_string(),
        })
        .await?
        .into_map()
    }

    /// Sorted-set members by rank
    async fn zrange(&self, key: &str, start: i64, stop: i64, rev: bool) -> Result<Vec<String>> {
        self.execute(Command::ZRange {
            key: key.to_string(),
            start,
            stop,
            rev,
        })
        .await?
        .into_list()
    }
}

/// Open the store backend selected by configuration
///
/// # Arguments
///
/// * `config` - Store section; `backend` picks the local or hosted store
///
/// # Returns
///
/// Returns the opened backend behind a shared trait object
///
/// # Errors
///
/// Returns `WatchProError::MissingCredentials` when the hosted backend is
/// selected without a token, or `WatchProError::Storage` when the local
/// database cannot be opened.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn KvStore>> {
    match config.backend {
        StoreBackend::Hosted => {
            let url = config.rest_url.clone().ok_or_else(|| {
                WatchProError::Config("store.rest_url is required for the hosted backend".into())
            })?;
            let token = config
                .rest_token
                .clone()
                .ok_or_else(|| WatchProError::MissingCredentials("store.rest_token".into()))?;
            Ok(Arc::new(RestStore::new(url, token)?))
        }
        StoreBackend::Local => Ok(Arc::new(LocalStore::open(&config.local_path)?)),
    }
}

/// Select a rank window `[start, stop]` (inclusive, negative from the end)
/// out of `len` items, returning the half-open index range.
pub(crate) fn rank_window(len: usize, start: i64, stop: i64) -> Option<std::ops::Range<usize>> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some(start as usize..(stop + 1) as usize)
}
