//! Hosted REST key-value store backend
//!
//! Speaks the JSON command API of Upstash-style hosted key-value services:
//! a single command is posted to the base URL as a JSON array of strings
//! (`["SET", "k", "v"]`) and answered with `{"result": ...}` or
//! `{"error": "..."}`. A batch is posted to `/pipeline` as an array of such
//! arrays and answered with one result object per command.

use super::{Command, KvStore, Reply, Ttl};
use crate::error::{Result, WatchProError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// One command result as returned by the REST API
#[derive(Debug, Deserialize)]
struct RestResult {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Hosted key-value store reached over HTTPS
///
/// # Examples
///
/// ```
/// use watchpro::store::RestStore;
///
/// let store = RestStore::new("https://example.upstash.io", "token").unwrap();
/// assert_eq!(store.base_url(), "https://example.upstash.io");
/// ```
pub struct RestStore {
    client: Client,
    base_url: String,
    token: String,
}

impl RestStore {
    /// Create a client for the service at `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - Service URL; a trailing slash is ignored
    /// * `token` - Bearer token sent with every request
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("watchpro/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WatchProError::Storage(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::info!("Initialized hosted store client: url={}", base_url);

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    /// The service base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Hosted store request failed: {}", e);
                WatchProError::Storage(format!("Hosted store unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Hosted store returned error {}: {}", status, error_text);
            return Err(WatchProError::Storage(format!(
                "Hosted store returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        Ok(response)
    }
}

/// Escape glob metacharacters so a prefix matches literally in `KEYS`
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Translate a command into its wire arguments
pub(crate) fn command_args(command: &Command) -> Vec<String> {
    match command {
        Command::Get { key } => vec!["GET".into(), key.clone()],
        Command::Set { key, value, ttl } => {
            let mut args = vec!["SET".into(), key.clone(), value.clone()];
            if let Some(ttl) = ttl {
                args.push("PX".into());
                args.push(ttl.as_millis().max(1).to_string());
            }
            args
        }
        Command::Del { key } => vec!["DEL".into(), key.clone()],
        Command::Ttl { key } => vec!["PTTL".into(), key.clone()],
        Command::Scan { prefix } => vec!["KEYS".into(), format!("{}*", escape_glob(prefix))],
        Command::HSet { key, fields } => {
            let mut args = vec!["HSET".into(), key.clone()];
            for (field, value) in fields {
                args.push(field.clone());
                args.push(value.clone());
            }
            args
        }
        Command::HGetAll { key } => vec!["HGETALL".into(), key.clone()],
        Command::ZAdd { key, score, member } => {
            vec!["ZADD".into(), key.clone(), score.to_string(), member.clone()]
        }
        Command::ZRem { key, member } => vec!["ZREM".into(), key.clone(), member.clone()],
        Command::ZRange {
            key,
            start,
            stop,
            rev,
        } => {
            let mut args = vec![
                "ZRANGE".into(),
                key.clone(),
                start.to_string(),
                stop.to_string(),
            ];
            if *rev {
                args.push("REV".into());
            }
            args
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn value_to_int(command: &Command, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        WatchProError::Storage(format!(
            "{} returned a non-integer result: {}",
            command.name(),
            value
        ))
        .into()
    })
}

fn value_to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_to_string).collect(),
        _ => Vec::new(),
    }
}

/// Interpret a raw result according to the command that produced it
pub(crate) fn decode_result(command: &Command, value: Value) -> Result<Reply> {
    let reply = match command {
        Command::Get { .. } => match value_to_string(&value) {
            Some(s) => Reply::Text(s),
            None => Reply::Nil,
        },
        Command::Set { .. } => Reply::Ok,
        Command::Del { .. } | Command::HSet { .. } | Command::ZAdd { .. } | Command::ZRem { .. } => {
            Reply::Int(value_to_int(command, &value)?)
        }
        Command::Ttl { .. } => Reply::Ttl(match value_to_int(command, &value)? {
            -2 => Ttl::Missing,
            -1 => Ttl::Persistent,
            ms => Ttl::Expires(Duration::from_millis(ms.max(0) as u64)),
        }),
        Command::Scan { .. } | Command::ZRange { .. } => Reply::List(value_to_list(&value)),
        Command::HGetAll { .. } => {
            let map: HashMap<String, String> = match &value {
                Value::Array(items) => items
                    .chunks(2)
                    .filter_map(|pair| match pair {
                        [field, val] => Some((value_to_string(field)?, value_to_string(val)?)),
                        _ => None,
                    })
                    .collect(),
                Value::Object(obj) => obj
                    .iter()
                    .filter_map(|(k, v)| Some((k.clone(), value_to_string(v)?)))
                    .collect(),
                _ => HashMap::new(),
            };
            if map.is_empty() {
                Reply::Nil
            } else {
                Reply::Map(map)
            }
        }
    };
    Ok(reply)
}

fn unwrap_result(command: &Command, raw: RestResult) -> Result<Reply> {
    if let Some(error) = raw.error {
        return Err(WatchProError::Storage(format!("{} failed: {}", command.name(), error)).into());
    }
    decode_result(command, raw.result)
}

#[async_trait]
impl KvStore for RestStore {
    fn backend_name(&self) -> &'static str {
        "hosted"
    }

    async fn execute(&self, command: Command) -> Result<Reply> {
        let body = serde_json::to_value(command_args(&command))?;
        tracing::trace!(command = command.name(), "hosted store command");

        let raw: RestResult = self
            .post(&self.base_url, &body)
            .await?
            .json()
            .await
            .map_err(|e| WatchProError::Storage(format!("Malformed store response: {}", e)))?;

        unwrap_result(&command, raw)
    }

    async fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::to_value(commands.iter().map(command_args).collect::<Vec<_>>())?;
        tracing::debug!("Sending hosted store pipeline of {} commands", commands.len());

        let url = format!("{}/pipeline", self.base_url);
        let raw: Vec<RestResult> = self
            .post(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| WatchProError::Storage(format!("Malformed pipeline response: {}", e)))?;

        if raw.len() != commands.len() {
            return Err(WatchProError::Storage(format!(
                "Pipeline returned {} results for {} commands",
                raw.len(),
                commands.len()
            ))
            .into());
        }

        commands
            .iter()
            .zip(raw)
            .map(|(command, result)| unwrap_result(command, result))
            .collect()
    }
}
