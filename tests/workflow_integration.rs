mod common;

use common::{
    create_temp_store, related_reply, search_config, text_reply, tool_call_reply,
    ScriptedProvider,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use watchpro::agent::{Inquiry, Outcome, RelatedQueries, Submission, Workflow, WorkflowEvent};
use watchpro::config::WorkflowConfig;
use watchpro::storage::types::{MessageKind, Role};
use watchpro::storage::ChatStorage;
use watchpro::tools::{SearchClient, ToolRegistry};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn drain(mut rx: mpsc::Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn kinds(messages: &[watchpro::storage::types::ChatMessage]) -> Vec<MessageKind> {
    messages.iter().map(|m| m.kind).collect()
}

#[tokio::test]
async fn test_inquire_appends_one_inquiry_and_skips_research() {
    let provider = ScriptedProvider::new(vec![
        text_reply(r#"{"next": "inquire"}"#),
        text_reply(
            r#"Here you go: {"question":"What is your budget?","options":[{"value":"low","label":"Under $1,000"},{"value":"high","label":"Over $1,000"}],"allowsInput":true,"inputLabel":"Budget"}"#,
        ),
    ]);
    let requests = provider.requests.clone();
    let workflow = Workflow::new(
        Arc::new(provider),
        ToolRegistry::new(),
        WorkflowConfig::default(),
    );

    let (tx, rx) = mpsc::channel(64);
    let run = workflow
        .run(Submission::new("Which watch should I buy?"), tx)
        .await;

    assert_eq!(run.outcome, Outcome::Inquired);
    assert_eq!(
        kinds(&run.chat.messages),
        vec![MessageKind::Input, MessageKind::Inquiry]
    );
    let inquiry: Inquiry = serde_json::from_str(&run.chat.messages[1].content).unwrap();
    assert_eq!(inquiry.options.len(), 2);
    assert!(inquiry.allows_input);

    // Only classify and inquire ran.
    assert_eq!(requests.lock().unwrap().len(), 2);

    let events = drain(rx).await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::TextDelta { .. })));
    assert_eq!(
        events.last(),
        Some(&WorkflowEvent::Done {
            outcome: Outcome::Inquired
        })
    );
}

#[tokio::test]
async fn test_proceed_runs_research_and_suggestions_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({"query": "Omega Speedmaster calibre"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "title": "Speedmaster Moonwatch",
                "url": "https://www.omegawatches.com/speedmaster",
                "content": "Co-Axial Master Chronometer Calibre 3861"
            }],
            "images": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(SearchClient::new(&search_config(&server.uri())).unwrap());
    let provider = ScriptedProvider::new(vec![
        text_reply(r#"{"next":"proceed"}"#),
        tool_call_reply(
            "call_1",
            "search",
            r#"{"query":"Omega Speedmaster calibre","max_results":5}"#,
        ),
        text_reply("The current Moonwatch uses calibre 3861 [[1]](https://www.omegawatches.com/speedmaster)."),
        related_reply(),
    ]);
    let requests = provider.requests.clone();
    let workflow = Workflow::new(
        Arc::new(provider),
        ToolRegistry::research(client),
        WorkflowConfig::default(),
    );

    let (tx, rx) = mpsc::channel(256);
    let run = workflow
        .run(
            Submission::new("Which movement is in the Speedmaster?").with_user("u1"),
            tx,
        )
        .await;

    assert_eq!(run.outcome, Outcome::Answered);
    assert_eq!(
        kinds(&run.chat.messages),
        vec![
            MessageKind::Input,
            MessageKind::Tool,
            MessageKind::Answer,
            MessageKind::Related,
            MessageKind::Followup,
        ]
    );

    let tool = &run.chat.messages[1];
    assert_eq!(tool.role, Role::Tool);
    assert_eq!(tool.name.as_deref(), Some("search"));
    let record: Value = serde_json::from_str(&tool.content).unwrap();
    assert_eq!(record["name"], "search");
    assert_eq!(record["args"]["query"], "Omega Speedmaster calibre");
    assert_eq!(record["result"]["number_of_results"], 1);

    let related: RelatedQueries = serde_json::from_str(&run.chat.messages[3].content).unwrap();
    assert_eq!(related.items.len(), 3);

    // The researcher saw the search output as a tool result.
    let research_step_two = &requests.lock().unwrap()[2];
    let tool_result = research_step_two.last().unwrap();
    assert_eq!(tool_result.role, "tool");
    assert!(tool_result.text().contains("Calibre 3861"));

    // Streamed text matches the stored answer.
    let events = drain(rx).await;
    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, run.chat.messages[2].content);
}

#[tokio::test]
async fn test_suggestion_failure_keeps_answer_and_reports_error() {
    let provider = ScriptedProvider::new(vec![
        text_reply("The Datejust 41 measures 41mm."),
        text_reply(r#"{"items":[{"query":"only one"}]}"#),
    ]);
    let workflow = Workflow::new(
        Arc::new(provider),
        ToolRegistry::new(),
        WorkflowConfig::default(),
    );

    let (tx, rx) = mpsc::channel(64);
    let run = workflow
        .run(
            Submission::new("How big is the Datejust 41?").skip_classification(),
            tx,
        )
        .await;

    assert_eq!(run.outcome, Outcome::Error);
    assert_eq!(
        kinds(&run.chat.messages),
        vec![MessageKind::Input, MessageKind::Answer]
    );
    let events = drain(rx).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::Error { message } if message.contains("try again"))));
}

#[tokio::test]
async fn test_chat_is_persisted_and_continued() {
    let (store, _tmp) = create_temp_store();
    let storage = ChatStorage::new(store);

    let provider = ScriptedProvider::new(vec![
        text_reply("A GMT hand tracks a second time zone."),
        related_reply(),
        text_reply(r#"{"next":"proceed"}"#),
        text_reply("The Rolex GMT-Master II is a classic example."),
        related_reply(),
    ]);
    let requests = provider.requests.clone();
    let workflow = Arc::new(
        Workflow::new(
            Arc::new(provider),
            ToolRegistry::new(),
            WorkflowConfig::default(),
        )
        .with_storage(storage.clone()),
    );

    let events = drain(workflow.spawn(
        Submission::new("What is a GMT watch?")
            .with_chat("gmt-chat")
            .with_user("u1")
            .skip_classification(),
    ))
    .await;
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::Done {
            outcome: Outcome::Answered
        })
    ));

    let saved = storage.get_chat("gmt-chat").await.unwrap().unwrap();
    assert_eq!(saved.title, "What is a GMT watch?");
    assert_eq!(saved.messages.len(), 4);

    // A run whose receiver is already gone stops before touching the model.
    let (tx, rx) = mpsc::channel(64);
    drop(rx);
    let run = workflow
        .run(
            Submission::new("Name a famous one")
                .with_chat("gmt-chat")
                .with_user("u1"),
            tx,
        )
        .await;
    assert_eq!(run.outcome, Outcome::Cancelled);
    assert_eq!(storage.get_chat("gmt-chat").await.unwrap().unwrap().messages.len(), 4);

    let (tx, _rx) = mpsc::channel(256);
    let run = workflow
        .run(
            Submission::new("Name a famous one")
                .with_chat("gmt-chat")
                .with_user("u1"),
            tx,
        )
        .await;
    assert_eq!(run.outcome, Outcome::Answered);
    assert_eq!(run.chat.messages.len(), 8);
    assert_eq!(run.chat.title, "What is a GMT watch?");

    // Classifier transcript: system prompt, then only model-visible history.
    let classify = &requests.lock().unwrap()[2];
    let roles: Vec<&str> = classify.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);

    let (tx, _rx) = mpsc::channel(64);
    let other_user = workflow
        .run(
            Submission::new("Let me in").with_chat("gmt-chat").with_user("u2"),
            tx,
        )
        .await;
    assert_eq!(other_user.outcome, Outcome::Error);
}
