//! Model transcript built from a chat's messages
//!
//! The chat record holds every message the client sees. Only some of them
//! are meaningful to the model: tool records, related-query suggestions,
//! follow-up prompts and end markers are dropped, and the remainder is
//! windowed to the most recent messages.

use crate::providers::{Message, ToolCall};
use crate::storage::types::{ChatMessage, Role};

/// Messages of `history` the model should see, oldest first
///
/// Filters out client-only kinds, then keeps the last `max_messages`.
///
/// # Examples
///
/// ```
/// use watchpro::agent::conversation::visible_history;
/// use watchpro::storage::types::{ChatMessage, MessageKind};
///
/// let history = vec![
///     ChatMessage::user(MessageKind::Input, "Best dive watch under $1000?"),
///     ChatMessage::assistant(MessageKind::Answer, "The Seiko SKX007..."),
///     ChatMessage::assistant(MessageKind::Related, "{\"items\":[]}"),
/// ];
/// assert_eq!(visible_history(&history, 10).len(), 2);
/// ```
pub fn visible_history(history: &[ChatMessage], max_messages: usize) -> Vec<&ChatMessage> {
    let visible: Vec<&ChatMessage> = history
        .iter()
        .filter(|m| m.kind.is_model_visible() && m.role != Role::Tool)
        .collect();
    let start = visible.len().saturating_sub(max_messages);
    visible[start..].to_vec()
}

fn to_provider_message(message: &ChatMessage) -> Message {
    match message.role {
        Role::User => Message::user(message.content.clone()),
        Role::Assistant => Message::assistant(message.content.clone()),
        Role::System => Message::system(message.content.clone()),
        Role::Tool => Message::user(message.content.clone()),
    }
}

/// Transcript sent to the model for one workflow step
///
/// Starts with the step's system prompt followed by the windowed chat
/// history. The researcher extends it with its own tool calls and results,
/// which never leave the step.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    token_count: usize,
}

impl Conversation {
    /// Creates a transcript from a system prompt and the chat history
    ///
    /// # Examples
    ///
    /// ```
    /// use watchpro::agent::Conversation;
    /// use watchpro::storage::types::{ChatMessage, MessageKind};
    ///
    /// let history = vec![ChatMessage::user(MessageKind::Input, "What is a tourbillon?")];
    /// let conversation = Conversation::from_chat("You are a watch expert.", &history, 10);
    /// assert_eq!(conversation.len(), 2);
    /// assert_eq!(conversation.messages()[0].role, "system");
    /// ```
    pub fn from_chat(
        system_prompt: impl Into<String>,
        history: &[ChatMessage],
        max_messages: usize,
    ) -> Self {
        let mut conversation = Self {
            messages: Vec::new(),
            token_count: 0,
        };
        conversation.push(Message::system(system_prompt));
        for message in visible_history(history, max_messages) {
            conversation.push(to_provider_message(message));
        }
        conversation
    }

    fn push(&mut self, message: Message) {
        self.token_count += estimate_tokens(message.text());
        if let Some(calls) = &message.tool_calls {
            for call in calls {
                self.token_count += estimate_tokens(&call.function.name);
                self.token_count += estimate_tokens(&call.function.arguments);
            }
        }
        self.messages.push(message);
    }

    /// Appends an assistant message
    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    /// Appends an assistant message requesting tool calls
    pub fn add_tool_calls(&mut self, content: Option<String>, calls: Vec<ToolCall>) {
        self.push(Message::assistant_with_tools(content, calls));
    }

    /// Appends the result of one tool call
    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.push(Message::tool_result(tool_call_id, content));
    }

    /// Returns all messages in the transcript
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Estimated token count of the transcript
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Returns the number of messages in the transcript
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the transcript has no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Rough token estimate: characters / 4
fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}
