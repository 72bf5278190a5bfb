//! Request orchestration workflow
//!
//! One run handles one chat submission:
//!
//! 1. the task manager classifies the request as `proceed` or `inquire`
//! 2. on `inquire`, a clarifying question is appended and the run halts
//! 3. otherwise the researcher answers, calling `search`/`retrieve` for at
//!    most `max_research_steps` model steps while its text is streamed
//! 4. the query suggestor appends three related queries, then a follow-up
//!    prompt closes the turn
//!
//! Progress is reported as [`WorkflowEvent`]s on a bounded channel. Dropping
//! the receiver cancels the run at its next send. Step failures become an
//! `error` event and an [`Outcome::Error`]; they never escape `run`.

use crate::agent::conversation::Conversation;
use crate::agent::output::{
    parse_inquiry, parse_model_json, NextAction, RelatedQueries, TaskDecision,
};
use crate::config::WorkflowConfig;
use crate::error::{Result, WatchProError};
use crate::prompts::{build_system_prompt, Step, FOLLOWUP_TEXT};
use crate::providers::{CompletionResponse, Message, Provider, ToolCall};
use crate::storage::types::{Chat, ChatMessage, MessageKind};
use crate::storage::ChatStorage;
use crate::tools::{ToolRegistry, ToolResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A user turn submitted to the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Existing chat to continue; a new chat is started when absent
    #[serde(default)]
    pub chat_id: Option<String>,
    /// Owner of the chat; falls back to the configured default user
    #[serde(default)]
    pub user_id: Option<String>,
    /// Text typed or picked by the user
    #[serde(default)]
    pub input: String,
    /// Kind of the user message, usually `input`
    #[serde(default = "default_input_kind")]
    pub kind: MessageKind,
    /// Go straight to research, as when answering an inquiry
    #[serde(default, alias = "skip")]
    pub skip_classification: bool,
}

fn default_input_kind() -> MessageKind {
    MessageKind::Input
}

impl Submission {
    /// A free-form question starting a new chat
    ///
    /// # Examples
    ///
    /// ```
    /// use watchpro::agent::Submission;
    ///
    /// let submission = Submission::new("How accurate is a COSC chronometer?")
    ///     .with_user("collector-42");
    /// assert!(!submission.skip_classification);
    /// assert_eq!(submission.user_id.as_deref(), Some("collector-42"));
    /// ```
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            chat_id: None,
            user_id: None,
            input: input.into(),
            kind: MessageKind::Input,
            skip_classification: false,
        }
    }

    /// Continue the chat `chat_id`
    pub fn with_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Submit on behalf of `user_id`
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the kind of the user message
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Bypass classification
    pub fn skip_classification(mut self) -> Self {
        self.skip_classification = true;
        self
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A clarifying question was asked
    Inquired,
    /// An answer, related queries and a follow-up were appended
    Answered,
    /// A step failed
    Error,
    /// The event receiver was dropped
    Cancelled,
}

/// Progress of a run, in emission order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The run started on `chat_id`
    Started { chat_id: String },
    /// The task manager decided (or classification was skipped)
    Classified { next: NextAction },
    /// Researcher text as it is produced
    TextDelta { text: String },
    /// A message was appended to the chat
    MessageAppended { message: ChatMessage },
    /// User-facing error text
    Error { message: String },
    /// Always the last event of a run
    Done { outcome: Outcome },
}

impl WorkflowEvent {
    /// Event name, matching the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Classified { .. } => "classified",
            Self::TextDelta { .. } => "text_delta",
            Self::MessageAppended { .. } => "message_appended",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }
}

/// Final chat state and outcome of a run
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub chat: Chat,
    pub outcome: Outcome,
}

/// Why a run stopped before its normal end
enum Halt {
    Cancelled,
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for Halt {
    fn from(e: anyhow::Error) -> Self {
        Halt::Failed(e)
    }
}

type StepResult<T> = std::result::Result<T, Halt>;

/// Joins the text of successive research steps
const ANSWER_STEP_SEPARATOR: &str = "\n\n";

async fn emit(events: &mpsc::Sender<WorkflowEvent>, event: WorkflowEvent) -> StepResult<()> {
    events.send(event).await.map_err(|_| Halt::Cancelled)
}

/// Forwards one text delta, preceded by `lead` the first time text arrives
async fn emit_delta(
    events: &mpsc::Sender<WorkflowEvent>,
    lead: &mut Option<&str>,
    text: String,
) -> StepResult<()> {
    if text.is_empty() {
        return Ok(());
    }
    if let Some(lead) = lead.take() {
        emit(
            events,
            WorkflowEvent::TextDelta {
                text: lead.to_string(),
            },
        )
        .await?;
    }
    emit(events, WorkflowEvent::TextDelta { text }).await
}

fn to_json_string<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value).map_err(WatchProError::from)?)
}

/// Message shown to the user when a step fails
fn user_facing_error(e: &anyhow::Error) -> String {
    match e.downcast_ref::<WatchProError>() {
        Some(WatchProError::Forbidden(_)) => "You do not have access to this chat.".to_string(),
        _ => format!("An error occurred while answering: {}. Please try again.", e),
    }
}

/// The orchestration workflow
///
/// Shared across requests behind an `Arc`; every run owns its chat.
pub struct Workflow {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    storage: Option<ChatStorage>,
    config: WorkflowConfig,
}

impl Workflow {
    /// Creates a workflow without persistence
    ///
    /// # Arguments
    ///
    /// * `provider` - Model used by every step
    /// * `tools` - Tools offered to the researcher
    /// * `config` - Step limits and event buffer size
    ///
    /// # Returns
    ///
    /// Returns a workflow; attach storage with [`Workflow::with_storage`]
    pub fn new(provider: Arc<dyn Provider>, tools: ToolRegistry, config: WorkflowConfig) -> Self {
        Self {
            provider,
            tools,
            storage: None,
            config,
        }
    }

    /// Load and save chats through `storage`
    pub fn with_storage(mut self, storage: ChatStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Returns the workflow configuration
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Returns the attached chat storage, if any
    pub fn storage(&self) -> Option<&ChatStorage> {
        self.storage.as_ref()
    }

    /// Runs `submission` on a spawned task and returns its event stream
    ///
    /// Dropping the receiver cancels the run.
    ///
    /// # Returns
    ///
    /// Returns the receiving end of the run's events, ending with
    /// [`WorkflowEvent::Done`]
    pub fn spawn(self: &Arc<Self>, submission: Submission) -> mpsc::Receiver<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let workflow = Arc::clone(self);
        tokio::spawn(async move {
            workflow.run(submission, tx).await;
        });
        rx
    }

    /// Runs one submission to a terminal state
    ///
    /// The chat is saved (when storage is attached) whatever the outcome,
    /// with every message appended so far. The last event sent is always
    /// [`WorkflowEvent::Done`].
    ///
    /// # Arguments
    ///
    /// * `submission` - User turn to process
    /// * `events` - Channel receiving progress events
    ///
    /// # Returns
    ///
    /// Returns the terminal outcome together with the chat as saved
    pub async fn run(
        &self,
        submission: Submission,
        events: mpsc::Sender<WorkflowEvent>,
    ) -> WorkflowRun {
        let user_id = submission
            .user_id
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.config.default_user_id.clone());
        let chat_id = submission
            .chat_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut chat = match self.load_chat(&chat_id, &user_id).await {
            Ok(chat) => chat,
            Err(e) => {
                error!("Failed to load chat {}: {:#}", chat_id, e);
                let _ = events
                    .send(WorkflowEvent::Error {
                        message: user_facing_error(&e),
                    })
                    .await;
                let _ = events
                    .send(WorkflowEvent::Done {
                        outcome: Outcome::Error,
                    })
                    .await;
                return WorkflowRun {
                    chat: Chat::new(chat_id, user_id),
                    outcome: Outcome::Error,
                };
            }
        };

        info!("Starting workflow for chat {}", chat.id);
        let outcome = match self.drive(&mut chat, &submission, &events).await {
            Ok(outcome) => outcome,
            Err(Halt::Cancelled) => {
                info!("Event receiver dropped, stopping chat {}", chat.id);
                Outcome::Cancelled
            }
            Err(Halt::Failed(e)) => {
                error!("Workflow failed for chat {}: {:#}", chat.id, e);
                let _ = events
                    .send(WorkflowEvent::Error {
                        message: user_facing_error(&e),
                    })
                    .await;
                Outcome::Error
            }
        };

        chat.ensure_title();
        self.persist(&chat, &events).await;

        info!(
            "Workflow for chat {} finished: {:?}, {} messages",
            chat.id,
            outcome,
            chat.messages.len()
        );
        let _ = events.send(WorkflowEvent::Done { outcome }).await;
        WorkflowRun { chat, outcome }
    }

    async fn load_chat(&self, chat_id: &str, user_id: &str) -> Result<Chat> {
        if let Some(storage) = &self.storage {
            if let Some(chat) = storage.get_chat(chat_id).await? {
                if chat.user_id != user_id {
                    return Err(WatchProError::Forbidden(format!(
                        "chat {} belongs to another user",
                        chat_id
                    ))
                    .into());
                }
                debug!("Loaded chat {} with {} messages", chat_id, chat.messages.len());
                return Ok(chat);
            }
        }
        Ok(Chat::new(chat_id, user_id))
    }

    async fn persist(&self, chat: &Chat, events: &mpsc::Sender<WorkflowEvent>) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(e) = storage.save_chat(chat).await {
            error!("Failed to save chat {}: {:#}", chat.id, e);
            let _ = events
                .send(WorkflowEvent::Error {
                    message: "The chat could not be saved.".to_string(),
                })
                .await;
        }
    }

    async fn drive(
        &self,
        chat: &mut Chat,
        submission: &Submission,
        events: &mpsc::Sender<WorkflowEvent>,
    ) -> StepResult<Outcome> {
        emit(
            events,
            WorkflowEvent::Started {
                chat_id: chat.id.clone(),
            },
        )
        .await?;

        let is_skip = submission.kind == MessageKind::Skip;
        if submission.input.trim().is_empty() && !is_skip {
            return Err(anyhow::Error::from(WatchProError::Config(
                "submission has no input".to_string(),
            ))
            .into());
        }

        self.append(
            chat,
            ChatMessage::user(submission.kind, submission.input.clone()),
            events,
        )
        .await?;

        let next = if submission.skip_classification || is_skip {
            debug!("Classification skipped");
            NextAction::Proceed
        } else {
            self.task_manager(chat).await?
        };
        emit(events, WorkflowEvent::Classified { next }).await?;

        if next == NextAction::Inquire {
            self.inquire(chat, events).await?;
            return Ok(Outcome::Inquired);
        }

        self.researcher(chat, events).await?;
        self.query_suggestor(chat, events).await?;
        self.append(
            chat,
            ChatMessage::assistant(MessageKind::Followup, FOLLOWUP_TEXT),
            events,
        )
        .await?;
        Ok(Outcome::Answered)
    }

    async fn append(
        &self,
        chat: &mut Chat,
        message: ChatMessage,
        events: &mpsc::Sender<WorkflowEvent>,
    ) -> StepResult<()> {
        chat.messages.push(message.clone());
        emit(events, WorkflowEvent::MessageAppended { message }).await
    }

    fn conversation(&self, step: Step, chat: &Chat) -> Conversation {
        Conversation::from_chat(
            build_system_prompt(step),
            &chat.messages,
            self.config.max_history_messages,
        )
    }

    async fn task_manager(&self, chat: &Chat) -> StepResult<NextAction> {
        let conversation = self.conversation(Step::TaskManager, chat);
        debug!(
            "Classifying with {} messages (~{} tokens)",
            conversation.len(),
            conversation.token_count()
        );
        let response = self
            .provider
            .complete(conversation.messages(), &[])
            .await
            .context("Task manager model call failed")?;
        let decision: TaskDecision =
            parse_model_json(Step::TaskManager, response.message.text())?;
        debug!("Task manager decided {:?}", decision.next);
        Ok(decision.next)
    }

    async fn inquire(
        &self,
        chat: &mut Chat,
        events: &mpsc::Sender<WorkflowEvent>,
    ) -> StepResult<()> {
        let conversation = self.conversation(Step::Inquire, chat);
        let response = self
            .provider
            .complete(conversation.messages(), &[])
            .await
            .context("Inquire model call failed")?;
        let inquiry = parse_inquiry(response.message.text())?;
        let content = to_json_string(&inquiry)?;
        self.append(
            chat,
            ChatMessage::assistant(MessageKind::Inquiry, content),
            events,
        )
        .await
    }

    async fn researcher(
        &self,
        chat: &mut Chat,
        events: &mpsc::Sender<WorkflowEvent>,
    ) -> StepResult<()> {
        let mut conversation = self.conversation(Step::Researcher, chat);
        let tools = self.tools.all_definitions();
        let max_steps = self.config.max_research_steps.max(1);
        let mut answer = String::new();

        for step in 1..=max_steps {
            // Final step gets no tools so the model has to answer.
            let offered: &[Value] = if step == max_steps { &[] } else { &tools };
            debug!(
                "Research step {}/{}, ~{} tokens",
                step,
                max_steps,
                conversation.token_count()
            );

            let lead = (!answer.is_empty()).then_some(ANSWER_STEP_SEPARATOR);
            let response = self
                .stream_completion(conversation.messages(), offered, lead, events)
                .await?;
            let message = response.message;
            let text = message.text();
            if !text.is_empty() {
                if !answer.is_empty() {
                    answer.push_str(ANSWER_STEP_SEPARATOR);
                }
                answer.push_str(text);
            }

            let calls = match message.tool_calls {
                Some(calls) if !calls.is_empty() => calls,
                _ => break,
            };

            debug!("Executing {} tool calls", calls.len());
            conversation.add_tool_calls(message.content.clone(), calls.clone());
            for call in &calls {
                let (args, result) = self.execute_tool_call(call).await;
                conversation.add_tool_result(&call.id, result.to_message());

                let record = json!({
                    "name": call.function.name,
                    "args": args,
                    "result": result.to_json(),
                });
                self.append(
                    chat,
                    ChatMessage::tool(&call.function.name, record.to_string()),
                    events,
                )
                .await?;
            }
        }

        if answer.trim().is_empty() {
            return Err(anyhow::Error::from(WatchProError::InvalidModelOutput {
                step: Step::Researcher.to_string(),
                message: "no answer was produced".to_string(),
            })
            .into());
        }

        self.append(
            chat,
            ChatMessage::assistant(MessageKind::Answer, answer),
            events,
        )
        .await
    }

    /// Streams one researcher completion, forwarding text as events
    ///
    /// `lead` is sent once, before the first non-empty delta.
    async fn stream_completion(
        &self,
        messages: &[Message],
        tools: &[Value],
        mut lead: Option<&str>,
        events: &mpsc::Sender<WorkflowEvent>,
    ) -> StepResult<CompletionResponse> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let completion = self.provider.complete_stream(messages, tools, tx);
        tokio::pin!(completion);

        let response = loop {
            tokio::select! {
                biased;
                Some(text) = rx.recv() => {
                    emit_delta(events, &mut lead, text).await?;
                }
                result = &mut completion => {
                    break result.context("Researcher model call failed")?;
                }
            }
        };

        while let Ok(text) = rx.try_recv() {
            emit_delta(events, &mut lead, text).await?;
        }
        Ok(response)
    }

    /// Executes one tool call, returning the parsed arguments and result
    ///
    /// Unknown tools, malformed arguments and executor errors become failed
    /// results the model can read.
    async fn execute_tool_call(&self, call: &ToolCall) -> (Value, ToolResult) {
        let name = &call.function.name;
        let raw = call.function.arguments.trim();
        let args: Value = if raw.is_empty() {
            json!({})
        } else {
            match serde_json::from_str(raw) {
                Ok(args) => args,
                Err(e) => {
                    warn!("Malformed arguments for tool '{}': {}", name, e);
                    return (
                        Value::String(raw.to_string()),
                        ToolResult::error(format!(
                            "Failed to parse tool arguments for '{}': {}",
                            name, e
                        )),
                    );
                }
            }
        };

        let Some(executor) = self.tools.get(name) else {
            warn!("Model requested unknown tool '{}'", name);
            return (args, ToolResult::error(format!("Tool not found: {}", name)));
        };

        debug!("Executing tool: {}", name);
        match executor.execute(args.clone()).await {
            Ok(result) => (args, result),
            Err(e) => {
                warn!("Tool '{}' failed: {:#}", name, e);
                (
                    args,
                    ToolResult::error(format!("Tool '{}' execution failed: {}", name, e)),
                )
            }
        }
    }

    async fn query_suggestor(
        &self,
        chat: &mut Chat,
        events: &mpsc::Sender<WorkflowEvent>,
    ) -> StepResult<()> {
        let conversation = self.conversation(Step::QuerySuggestor, chat);
        let response = self
            .provider
            .complete(conversation.messages(), &[])
            .await
            .context("Query suggestor model call failed")?;
        let related = parse_model_json::<RelatedQueries>(
            Step::QuerySuggestor,
            response.message.text(),
        )?
        .normalize()?;
        let content = to_json_string(&related)?;
        self.append(
            chat,
            ChatMessage::assistant(MessageKind::Related, content),
            events,
        )
        .await
    }
}
