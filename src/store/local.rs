//! Embedded key-value store backend
//!
//! Keeps strings, hashes, and sorted sets in three `sled` trees on local
//! disk. String expiry is lazy: an expired value reads as missing and is
//! physically removed by the next delete or cleanup sweep.

use super::{rank_window, Command, KvStore, Reply, Ttl};
use crate::error::{Result, WatchProError};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

/// Separator between a key and a hash field or sorted-set member
const SEP: u8 = 0;

/// String value with its optional deadline
#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<i64>,
}

impl StoredValue {
    fn remaining(&self, now_ms: i64) -> Ttl {
        match self.expires_at_ms {
            None => Ttl::Persistent,
            Some(deadline) if deadline <= now_ms => Ttl::Missing,
            Some(deadline) => Ttl::Expires(Duration::from_millis((deadline - now_ms) as u64)),
        }
    }
}

/// Local store backed by an embedded `sled` database
///
/// # Examples
///
/// ```
/// use watchpro::store::{KvStore, LocalStore};
///
/// # async fn example() -> watchpro::error::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let store = LocalStore::open(dir.path().join("kv"))?;
/// store.set("greeting", "hello", None).await?;
/// assert_eq!(store.get("greeting").await?, Some("hello".to_string()));
/// # Ok(())
/// # }
/// ```
pub struct LocalStore {
    db: Db,
    strings: Tree,
    hashes: Tree,
    zsets: Tree,
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> anyhow::Error {
    WatchProError::Storage(format!("{}: {}", context, e)).into()
}

fn composite_key(key: &str, part: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + part.len() + 1);
    out.extend_from_slice(key.as_bytes());
    out.push(SEP);
    out.extend_from_slice(part.as_bytes());
    out
}

fn composite_prefix(key: &str) -> Vec<u8> {
    let mut out = key.as_bytes().to_vec();
    out.push(SEP);
    out
}

fn split_composite(raw: &[u8]) -> Option<(String, String)> {
    let pos = raw.iter().position(|b| *b == SEP)?;
    let key = String::from_utf8_lossy(&raw[..pos]).into_owned();
    let part = String::from_utf8_lossy(&raw[pos + 1..]).into_owned();
    Some((key, part))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl LocalStore {
    /// Open or create a store at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Database directory, created if missing
    ///
    /// # Errors
    ///
    /// Returns `WatchProError::Storage` if the database cannot be opened
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            tracing::error!("Failed to open local store at {}: {}", path.display(), e);
            storage_err("Failed to open database", e)
        })?;
        let strings = db
            .open_tree("strings")
            .map_err(|e| storage_err("Failed to open strings tree", e))?;
        let hashes = db
            .open_tree("hashes")
            .map_err(|e| storage_err("Failed to open hashes tree", e))?;
        let zsets = db
            .open_tree("zsets")
            .map_err(|e| storage_err("Failed to open zsets tree", e))?;

        tracing::info!("Opened local store at {}", path.display());

        Ok(Self {
            db,
            strings,
            hashes,
            zsets,
        })
    }

    fn read_string(&self, key: &str) -> Result<Option<StoredValue>> {
        match self
            .strings
            .get(key.as_bytes())
            .map_err(|e| storage_err("Get failed", e))?
        {
            Some(bytes) => {
                let stored: StoredValue = serde_json::from_slice(&bytes)
                    .map_err(|e| storage_err("Corrupt string value", e))?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    fn op_get(&self, key: &str) -> Result<Reply> {
        let now = now_ms();
        match self.read_string(key)? {
            Some(stored) if stored.remaining(now) != Ttl::Missing => Ok(Reply::Text(stored.value)),
            _ => Ok(Reply::Nil),
        }
    }

    fn op_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<Reply> {
        let stored = StoredValue {
            value: value.to_string(),
            expires_at_ms: ttl.map(|t| now_ms() + t.as_millis() as i64),
        };
        let bytes = serde_json::to_vec(&stored)?;
        self.strings
            .insert(key.as_bytes(), bytes)
            .map_err(|e| storage_err("Insert failed", e))?;
        Ok(Reply::Ok)
    }

    fn remove_prefixed(tree: &Tree, prefix: &[u8]) -> Result<i64> {
        let mut removed = 0;
        for entry in tree.scan_prefix(prefix).keys() {
            let k = entry.map_err(|e| storage_err("Scan failed", e))?;
            tree.remove(k).map_err(|e| storage_err("Remove failed", e))?;
            removed += 1;
        }
        Ok(removed)
    }

    fn op_del(&self, key: &str) -> Result<Reply> {
        let now = now_ms();
        let mut existed = false;

        if let Some(stored) = self.read_string(key)? {
            existed |= stored.remaining(now) != Ttl::Missing;
            self.strings
                .remove(key.as_bytes())
                .map_err(|e| storage_err("Remove failed", e))?;
        }

        let prefix = composite_prefix(key);
        existed |= Self::remove_prefixed(&self.hashes, &prefix)? > 0;
        existed |= Self::remove_prefixed(&self.zsets, &prefix)? > 0;

        Ok(Reply::Int(i64::from(existed)))
    }

    fn op_ttl(&self, key: &str) -> Result<Reply> {
        if let Some(stored) = self.read_string(key)? {
            return Ok(Reply::Ttl(stored.remaining(now_ms())));
        }

        let prefix = composite_prefix(key);
        let is_collection = self.hashes.scan_prefix(&prefix).next().is_some()
            || self.zsets.scan_prefix(&prefix).next().is_some();

        Ok(Reply::Ttl(if is_collection {
            Ttl::Persistent
        } else {
            Ttl::Missing
        }))
    }

    /// Lists every physically present key, including lazily expired
    /// strings, so a sweep can find and remove them.
    fn op_scan(&self, prefix: &str) -> Result<Reply> {
        let mut keys = BTreeSet::new();

        for entry in self.strings.scan_prefix(prefix.as_bytes()).keys() {
            let k = entry.map_err(|e| storage_err("Scan failed", e))?;
            keys.insert(String::from_utf8_lossy(&k).into_owned());
        }

        for tree in [&self.hashes, &self.zsets] {
            for entry in tree.scan_prefix(prefix.as_bytes()).keys() {
                let k = entry.map_err(|e| storage_err("Scan failed", e))?;
                if let Some((key, _)) = split_composite(&k) {
                    keys.insert(key);
                }
            }
        }

        Ok(Reply::List(keys.into_iter().collect()))
    }

    fn op_hset(&self, key: &str, fields: &[(String, String)]) -> Result<Reply> {
        let mut added = 0;
        for (field, value) in fields {
            let previous = self
                .hashes
                .insert(composite_key(key, field), value.as_bytes())
                .map_err(|e| storage_err("Hash insert failed", e))?;
            if previous.is_none() {
                added += 1;
            }
        }
        Ok(Reply::Int(added))
    }

    fn op_hgetall(&self, key: &str) -> Result<Reply> {
        let mut map = HashMap::new();
        for entry in self.hashes.scan_prefix(composite_prefix(key)) {
            let (k, v) = entry.map_err(|e| storage_err("Hash scan failed", e))?;
            if let Some((_, field)) = split_composite(&k) {
                map.insert(field, String::from_utf8_lossy(&v).into_owned());
            }
        }
        if map.is_empty() {
            return Ok(Reply::Nil);
        }
        Ok(Reply::Map(map))
    }

    fn op_zadd(&self, key: &str, score: f64, member: &str) -> Result<Reply> {
        let previous = self
            .zsets
            .insert(composite_key(key, member), score.to_be_bytes().to_vec())
            .map_err(|e| storage_err("Sorted set insert failed", e))?;
        Ok(Reply::Int(i64::from(previous.is_none())))
    }

    fn op_zrem(&self, key: &str, member: &str) -> Result<Reply> {
        let previous = self
            .zsets
            .remove(composite_key(key, member))
            .map_err(|e| storage_err("Sorted set remove failed", e))?;
        Ok(Reply::Int(i64::from(previous.is_some())))
    }

    fn op_zrange(&self, key: &str, start: i64, stop: i64, rev: bool) -> Result<Reply> {
        let mut members: Vec<(f64, String)> = Vec::new();
        for entry in self.zsets.scan_prefix(composite_prefix(key)) {
            let (k, v) = entry.map_err(|e| storage_err("Sorted set scan failed", e))?;
            let Some((_, member)) = split_composite(&k) else {
                continue;
            };
            let raw: &[u8] = &v;
            let bytes: [u8; 8] = raw
                .try_into()
                .map_err(|_| storage_err("Corrupt sorted set score", member.clone()))?;
            members.push((f64::from_be_bytes(bytes), member));
        }

        members.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        if rev {
            members.reverse();
        }

        let window = match rank_window(members.len(), start, stop) {
            Some(range) => members[range].iter().map(|(_, m)| m.clone()).collect(),
            None => Vec::new(),
        };
        Ok(Reply::List(window))
    }
}

#[async_trait]
impl KvStore for LocalStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn execute(&self, command: Command) -> Result<Reply> {
        tracing::trace!(command = command.name(), "local store command");
        match &command {
            Command::Get { key } => self.op_get(key),
            Command::Set { key, value, ttl } => self.op_set(key, value, *ttl),
            Command::Del { key } => self.op_del(key),
            Command::Ttl { key } => self.op_ttl(key),
            Command::Scan { prefix } => self.op_scan(prefix),
            Command::HSet { key, fields } => self.op_hset(key, fields),
            Command::HGetAll { key } => self.op_hgetall(key),
            Command::ZAdd { key, score, member } => self.op_zadd(key, *score, member),
            Command::ZRem { key, member } => self.op_zrem(key, member),
            Command::ZRange {
                key,
                start,
                stop,
                rev,
            } => self.op_zrange(key, *start, *stop, *rev),
        }
    }

    async fn close(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| storage_err("Flush failed", e))?;
        tracing::debug!("Local store flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (LocalStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path().join("kv")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let (store, _dir) = open_temp();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.ttl("k").await.unwrap(), Ttl::Persistent);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (store, _dir) = open_temp();
        assert_eq!(store.get("nope").await.unwrap(), None);
        assert_eq!(store.ttl("nope").await.unwrap(), Ttl::Missing);
    }

    #[tokio::test]
    async fn test_expired_value_reads_as_missing() {
        let (store, _dir) = open_temp();
        store
            .set("short", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(matches!(store.ttl("short").await.unwrap(), Ttl::Expires(_)));

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.ttl("short").await.unwrap(), Ttl::Missing);
        // still physically present until swept
        assert_eq!(store.scan_prefix("sh").await.unwrap(), vec!["short"]);
    }

    #[tokio::test]
    async fn test_del_removes_all_types() {
        let (store, _dir) = open_temp();
        store
            .execute(Command::HSet {
                key: "h".into(),
                fields: vec![("a".into(), "1".into())],
            })
            .await
            .unwrap();
        assert!(store.del("h").await.unwrap());
        assert!(store.hgetall("h").await.unwrap().is_empty());
        assert!(!store.del("h").await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_roundtrip() {
        let (store, _dir) = open_temp();
        let added = store
            .execute(Command::HSet {
                key: "chat:1".into(),
                fields: vec![
                    ("id".into(), "1".into()),
                    ("title".into(), "Rolex".into()),
                ],
            })
            .await
            .unwrap();
        assert_eq!(added, Reply::Int(2));

        let map = store.hgetall("chat:1").await.unwrap();
        assert_eq!(map.get("title"), Some(&"Rolex".to_string()));
        assert_eq!(map.len(), 2);
        assert_eq!(store.ttl("chat:1").await.unwrap(), Ttl::Persistent);
    }

    #[tokio::test]
    async fn test_zrange_orders_by_score() {
        let (store, _dir) = open_temp();
        for (score, member) in [(3.0, "c"), (1.0, "a"), (2.0, "b")] {
            store
                .execute(Command::ZAdd {
                    key: "z".into(),
                    score,
                    member: member.into(),
                })
                .await
                .unwrap();
        }

        assert_eq!(store.zrange("z", 0, -1, false).await.unwrap(), ["a", "b", "c"]);
        assert_eq!(store.zrange("z", 0, -1, true).await.unwrap(), ["c", "b", "a"]);
        assert_eq!(store.zrange("z", 0, 0, true).await.unwrap(), ["c"]);

        store
            .execute(Command::ZRem {
                key: "z".into(),
                member: "b".into(),
            })
            .await
            .unwrap();
        assert_eq!(store.zrange("z", 0, -1, false).await.unwrap(), ["a", "c"]);
    }

    #[tokio::test]
    async fn test_scan_prefix_spans_types() {
        let (store, _dir) = open_temp();
        store.set("search:a", "1", None).await.unwrap();
        store.set("search:b", "2", None).await.unwrap();
        store.set("other", "3", None).await.unwrap();
        store
            .execute(Command::ZAdd {
                key: "search:z".into(),
                score: 1.0,
                member: "m".into(),
            })
            .await
            .unwrap();

        let keys = store.scan_prefix("search:").await.unwrap();
        assert_eq!(keys, vec!["search:a", "search:b", "search:z"]);
    }

    #[tokio::test]
    async fn test_pipeline_replies_in_order() {
        let (store, _dir) = open_temp();
        let replies = store
            .pipeline(vec![
                Command::Set {
                    key: "a".into(),
                    value: "1".into(),
                    ttl: None,
                },
                Command::Get { key: "a".into() },
                Command::Get { key: "b".into() },
            ])
            .await
            .unwrap();
        assert_eq!(
            replies,
            vec![Reply::Ok, Reply::Text("1".into()), Reply::Nil]
        );
    }

    #[tokio::test]
    async fn test_close_flushes() {
        let (store, _dir) = open_temp();
        store.set("k", "v", None).await.unwrap();
        assert!(store.close().await.is_ok());
    }
}
