use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    /// Role name as sent to model providers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

/// What a chat message carries, independent of who wrote it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Final research answer
    Answer,
    /// Structured clarifying question (JSON `Inquiry`)
    Inquiry,
    /// Suggested follow-up queries (JSON `RelatedQueries`)
    Related,
    /// Prompt for the user to continue
    Followup,
    /// Record of one tool call (JSON `{name, args, result}`)
    Tool,
    /// Free-form user input
    Input,
    /// User picked a related query
    InputRelated,
    /// User skipped an inquiry
    Skip,
    /// End-of-session marker
    End,
}

impl MessageKind {
    /// Whether messages of this kind are part of the model transcript
    ///
    /// Tool records, suggestions, follow-up prompts and end markers only
    /// exist for the client.
    pub fn is_model_visible(&self) -> bool {
        !matches!(self, Self::Tool | Self::Related | Self::Followup | Self::End)
    }
}

/// One message in a chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    /// Plain text, or serialized JSON for structured kinds
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Tool name for tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Create a message with a fresh id
    pub fn new(role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            kind,
            name: None,
        }
    }

    /// A user message of the given kind
    pub fn user(kind: MessageKind, content: impl Into<String>) -> Self {
        Self::new(Role::User, kind, content)
    }

    /// An assistant message of the given kind
    pub fn assistant(kind: MessageKind, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, kind, content)
    }

    /// A tool-call record
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Tool, MessageKind::Tool, content);
        message.name = Some(name.into());
        message
    }
}

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    /// Client route of the chat, `/search/<id>`
    pub path: String,
    pub messages: Vec<ChatMessage>,
    /// Public route once shared, `/share/<id>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_path: Option<String>,
}

impl Chat {
    /// Start a new, empty chat owned by `user_id`
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            path: format!("/search/{}", id),
            id,
            title: String::new(),
            created_at: Utc::now(),
            user_id: user_id.into(),
            messages: Vec::new(),
            share_path: None,
        }
    }

    /// Title derived from the first user message, when none is set yet
    pub fn ensure_title(&mut self) {
        if !self.title.is_empty() {
            return;
        }
        if let Some(first) = self.messages.iter().find(|m| m.role == Role::User) {
            self.title = first.content.chars().take(100).collect();
        }
    }
}
