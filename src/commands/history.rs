use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::Result;
use crate::storage::types::{Chat, MessageKind};
use crate::storage::ChatStorage;
use crate::store::create_store;
use colored::Colorize;
use prettytable::{format, Table};

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn print_chat(chat: &Chat) {
    println!("{} {}", "Chat".bold(), chat.id.cyan());
    println!("Title:   {}", chat.title);
    println!("User:    {}", chat.user_id);
    println!("Created: {}", chat.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(share_path) = &chat.share_path {
        println!("Shared:  {}", share_path);
    }
    println!();

    for message in &chat.messages {
        let tag = format!("[{}/{:?}]", message.role.as_str(), message.kind).to_lowercase();
        let body = match message.kind {
            MessageKind::Tool => shorten(&message.content, 120),
            _ => message.content.clone(),
        };
        println!("{} {}", tag.dimmed(), body);
    }
}

/// Handle history commands
pub async fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let store = create_store(&config.store)?;
    let storage = ChatStorage::new(store.clone());
    let default_user = &config.workflow.default_user_id;

    match command {
        HistoryCommand::List { user } => {
            let user = user.as_ref().unwrap_or(default_user);
            let chats = storage.get_chats(user).await?;

            if chats.is_empty() {
                println!("{}", "No chat history found.".yellow());
            } else {
                let mut table = Table::new();
                table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

                table.add_row(prettytable::row![
                    "ID".bold(),
                    "Title".bold(),
                    "Messages".bold(),
                    "Created".bold(),
                    "Shared".bold()
                ]);

                for chat in chats {
                    let shared = if chat.share_path.is_some() { "yes" } else { "-" };
                    table.add_row(prettytable::row![
                        chat.id.cyan(),
                        shorten(&chat.title, 40),
                        chat.messages.len(),
                        chat.created_at.format("%Y-%m-%d %H:%M").to_string(),
                        shared
                    ]);
                }

                println!("\nChat History for {}:", user);
                table.printstd();
                println!();
                println!(
                    "Use {} to continue a chat.",
                    "watchpro ask --chat <ID> <QUESTION>".cyan()
                );
                println!();
            }
        }
        HistoryCommand::Show { id } => match storage.get_chat(&id).await? {
            Some(chat) => print_chat(&chat),
            None => println!("{}", format!("Chat {} not found", id).yellow()),
        },
        HistoryCommand::Clear { user } => {
            let user = user.as_ref().unwrap_or(default_user);
            let deleted = storage.clear_chats(user).await?;
            println!("{}", format!("Deleted {} chats for {}", deleted, user).green());
        }
    }

    store.close().await
}
