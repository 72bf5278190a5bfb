//! Chat history persistence on top of the key-value store
//!
//! Each chat is a hash at `chat:<id>`. Chats are indexed per user by the
//! sorted set `user:chat:<userId>`, scored by creation time in milliseconds,
//! so listing is a reverse rank range followed by one pipelined `HGETALL`
//! per member.

use crate::error::{Result, WatchProError};
use crate::store::{Command, KvStore};
use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub mod types;
pub use types::{Chat, ChatMessage, MessageKind, Role};

const CHAT_PREFIX: &str = "chat:";
const USER_CHAT_PREFIX: &str = "user:chat:";

fn chat_key(id: &str) -> String {
    format!("{}{}", CHAT_PREFIX, id)
}

fn user_chat_key(user_id: &str) -> String {
    format!("{}{}", USER_CHAT_PREFIX, user_id)
}

/// Parse a stored `createdAt` value
///
/// Accepts RFC 3339 text or integer epoch milliseconds.
fn parse_created_at(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| WatchProError::Storage(format!("Invalid createdAt value: {}", raw)).into())
}

/// Flatten a chat into hash fields
fn chat_to_fields(chat: &Chat) -> Result<Vec<(String, String)>> {
    let messages = serde_json::to_string(&chat.messages)
        .map_err(WatchProError::from)
        .context("Failed to serialize chat messages")?;

    let mut fields = vec![
        ("id".to_string(), chat.id.clone()),
        ("title".to_string(), chat.title.clone()),
        ("createdAt".to_string(), chat.created_at.to_rfc3339()),
        ("userId".to_string(), chat.user_id.clone()),
        ("path".to_string(), chat.path.clone()),
        ("messages".to_string(), messages),
    ];
    if let Some(share_path) = &chat.share_path {
        fields.push(("sharePath".to_string(), share_path.clone()));
    }
    Ok(fields)
}

/// Rebuild a chat from hash fields
fn chat_from_fields(mut fields: HashMap<String, String>) -> Result<Chat> {
    let mut take = |name: &str| fields.remove(name);

    let id = take("id").ok_or_else(|| WatchProError::Storage("Chat hash missing id".into()))?;
    let created_at = match take("createdAt") {
        Some(raw) => parse_created_at(&raw)?,
        None => {
            return Err(WatchProError::Storage(format!("Chat {} missing createdAt", id)).into())
        }
    };
    let messages = match take("messages") {
        Some(raw) if !raw.is_empty() => serde_json::from_str(&raw)
            .with_context(|| format!("Failed to deserialize messages of chat {}", id))?,
        _ => Vec::new(),
    };

    Ok(Chat {
        title: take("title").unwrap_or_default(),
        user_id: take("userId").unwrap_or_default(),
        path: take("path").unwrap_or_else(|| format!("/search/{}", id)),
        share_path: take("sharePath").filter(|p| !p.is_empty()),
        created_at,
        messages,
        id,
    })
}

/// Chat history repository
///
/// # Examples
///
/// ```no_run
/// use watchpro::storage::{Chat, ChatStorage};
/// use watchpro::store::LocalStore;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let storage = ChatStorage::new(Arc::new(LocalStore::open("/tmp/watchpro.db")?));
/// storage.save_chat(&Chat::new("abc", "user-1")).await?;
/// let chats = storage.get_chats("user-1").await?;
/// assert_eq!(chats.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatStorage {
    store: Arc<dyn KvStore>,
}

impl ChatStorage {
    /// Create a repository over an already-opened store
    ///
    /// # Arguments
    ///
    /// * `store` - Backend holding the chat hashes and per-user indexes
    ///
    /// # Returns
    ///
    /// Returns a repository sharing `store`
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// All chats of a user, newest first
    ///
    /// Index entries whose hash has disappeared, or which cannot be decoded,
    /// are skipped with a warning.
    pub async fn get_chats(&self, user_id: &str) -> Result<Vec<Chat>> {
        let ids = self
            .store
            .zrange(&user_chat_key(user_id), 0, -1, true)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let commands = ids
            .iter()
            .map(|id| Command::HGetAll { key: chat_key(id) })
            .collect();
        let replies = self.store.pipeline(commands).await?;

        let mut chats = Vec::with_capacity(replies.len());
        for (id, reply) in ids.iter().zip(replies) {
            let fields = reply.into_map()?;
            if fields.is_empty() {
                tracing::warn!("Chat index for {} references missing chat {}", user_id, id);
                continue;
            }
            match chat_from_fields(fields) {
                Ok(chat) => chats.push(chat),
                Err(e) => tracing::warn!("Skipping unreadable chat {}: {}", id, e),
            }
        }

        tracing::debug!("Loaded {} chats for user {}", chats.len(), user_id);
        Ok(chats)
    }

    /// A single chat by id
    ///
    /// # Arguments
    ///
    /// * `id` - Chat identifier
    ///
    /// # Returns
    ///
    /// Returns the chat, or `None` when no hash exists for `id`
    ///
    /// # Errors
    ///
    /// Returns error if the store fails or the hash cannot be decoded
    pub async fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        let fields = self.store.hgetall(&chat_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        chat_from_fields(fields).map(Some)
    }

    /// Create or overwrite a chat and index it under its owner
    ///
    /// The hash write and the index update go out as one pipeline.
    ///
    /// # Arguments
    ///
    /// * `chat` - Chat to persist; its `created_at` becomes the index score
    ///
    /// # Errors
    ///
    /// Returns error if the messages cannot be serialized or the store fails
    pub async fn save_chat(&self, chat: &Chat) -> Result<()> {
        let commands = vec![
            Command::HSet {
                key: chat_key(&chat.id),
                fields: chat_to_fields(chat)?,
            },
            Command::ZAdd {
                key: user_chat_key(&chat.user_id),
                score: chat.created_at.timestamp_millis() as f64,
                member: chat.id.clone(),
            },
        ];
        self.store.pipeline(commands).await?;

        tracing::debug!(
            "Saved chat {} ({} messages) for user {}",
            chat.id,
            chat.messages.len(),
            chat.user_id
        );
        Ok(())
    }

    /// Delete every chat of a user, returning how many were removed
    pub async fn clear_chats(&self, user_id: &str) -> Result<usize> {
        let index = user_chat_key(user_id);
        let ids = self.store.zrange(&index, 0, -1, false).await?;

        let mut commands: Vec<Command> = ids
            .iter()
            .map(|id| Command::Del { key: chat_key(id) })
            .collect();
        commands.push(Command::Del { key: index });
        self.store.pipeline(commands).await?;

        tracing::info!("Cleared {} chats for user {}", ids.len(), user_id);
        Ok(ids.len())
    }

    /// Mark a chat as shared
    ///
    /// # Arguments
    ///
    /// * `id` - Chat identifier
    /// * `user_id` - Caller, who must own the chat
    ///
    /// # Returns
    ///
    /// Returns the chat with `share_path` set, or `Ok(None)` when the chat
    /// does not exist
    ///
    /// # Errors
    ///
    /// Returns `WatchProError::Forbidden` when `user_id` does not own the chat.
    pub async fn share_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>> {
        let Some(mut chat) = self.get_chat(id).await? else {
            return Ok(None);
        };
        if chat.user_id != user_id {
            return Err(WatchProError::Forbidden(format!(
                "chat {} is not owned by {}",
                id, user_id
            ))
            .into());
        }

        let share_path = format!("/share/{}", id);
        self.store
            .execute(Command::HSet {
                key: chat_key(id),
                fields: vec![("sharePath".to_string(), share_path.clone())],
            })
            .await?;
        chat.share_path = Some(share_path);

        tracing::info!("Shared chat {}", id);
        Ok(Some(chat))
    }

    /// A chat by id, only if it has been shared
    pub async fn get_shared_chat(&self, id: &str) -> Result<Option<Chat>> {
        Ok(self
            .get_chat(id)
            .await?
            .filter(|chat| chat.share_path.is_some()))
    }
}
