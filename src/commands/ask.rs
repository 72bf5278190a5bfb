//! `watchpro ask`: one workflow run in the terminal

use crate::agent::{Inquiry, Outcome, RelatedQueries, Submission, WorkflowEvent};
use crate::config::Config;
use crate::error::{Result, WatchProError};
use crate::storage::types::{ChatMessage, MessageKind};
use crate::store::create_store;
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;

/// Ask one question and print the answer as it streams
///
/// # Errors
///
/// Returns error if setup fails or the run ends in an error.
pub async fn run_ask(
    config: Config,
    question: String,
    chat_id: Option<String>,
    user_id: Option<String>,
    skip_inquiry: bool,
) -> Result<()> {
    let store = create_store(&config.store)?;
    let workflow = Arc::new(super::build_workflow(&config, Arc::clone(&store))?);

    let mut submission = Submission::new(question);
    submission.chat_id = chat_id;
    submission.user_id = user_id;
    submission.skip_classification = skip_inquiry;

    let mut events = workflow.spawn(submission);
    let mut outcome = Outcome::Error;
    let mut chat_id = String::new();

    while let Some(event) = events.recv().await {
        match event {
            WorkflowEvent::Started { chat_id: id } => chat_id = id,
            WorkflowEvent::TextDelta { text } => {
                print!("{}", text);
                std::io::stdout().flush().map_err(WatchProError::from)?;
            }
            WorkflowEvent::MessageAppended { message } => print_message(&message),
            WorkflowEvent::Error { message } => eprintln!("{}", message.red()),
            WorkflowEvent::Classified { .. } => {}
            WorkflowEvent::Done { outcome: done } => {
                outcome = done;
                break;
            }
        }
    }

    store.close().await?;

    if !chat_id.is_empty() {
        println!();
        println!(
            "Chat {} ({})",
            chat_id.cyan(),
            format!("{:?}", outcome).to_lowercase()
        );
    }

    match outcome {
        Outcome::Error => Err(WatchProError::Provider(
            "the question could not be answered".to_string(),
        )
        .into()),
        _ => Ok(()),
    }
}

fn print_message(message: &ChatMessage) {
    match message.kind {
        MessageKind::Tool => {
            let name = message.name.as_deref().unwrap_or("tool");
            let query = serde_json::from_str::<serde_json::Value>(&message.content)
                .ok()
                .and_then(|record| {
                    let args = &record["args"];
                    args["query"]
                        .as_str()
                        .or_else(|| args["url"].as_str())
                        .map(str::to_string)
                })
                .unwrap_or_default();
            println!("{}", format!("[{}] {}", name, query).dimmed());
        }
        MessageKind::Answer => println!(),
        MessageKind::Inquiry => match serde_json::from_str::<Inquiry>(&message.content) {
            Ok(inquiry) => {
                println!("{}", inquiry.question.bold());
                for option in &inquiry.options {
                    println!("  - {}", option.label);
                }
                if inquiry.allows_input {
                    let label = inquiry.input_label.as_deref().unwrap_or("Other");
                    println!("  - {} (free text)", label);
                }
                println!(
                    "{}",
                    "Answer with --chat <ID> --skip-inquiry to continue.".dimmed()
                );
            }
            Err(_) => println!("{}", message.content),
        },
        MessageKind::Related => {
            if let Ok(related) = serde_json::from_str::<RelatedQueries>(&message.content) {
                println!();
                println!("{}", "Related:".bold());
                for item in &related.items {
                    println!("  {}", item.query.cyan());
                }
            }
        }
        MessageKind::Followup => println!("{}", message.content.green()),
        _ => {}
    }
}
