use crate::core::models::{Conversation, Message, Role};
use crate::core::state::StoreSnapshot;
use colored::*;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.chars().count()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
}

pub fn print_message(message: &Message) {
    let label = match message.role {
        Role::User => "You".yellow().bold(),
        Role::Assistant => "Assistant".magenta().bold(),
    };
    let stamp = message.timestamp.format("%H:%M:%S").to_string();
    let marker = if message.pending { " …" } else { "" };
    println!("{} {}{}: {}", stamp.dimmed(), label, marker, message.content);
}

pub fn print_conversation(conversation: &Conversation) {
    print_header(&conversation.title);
    println!(
        "{}",
        format!(
            "id {} | mode {} | {} messages",
            conversation.id,
            conversation.mode,
            conversation.message_count()
        )
        .dimmed()
    );
    for message in &conversation.messages {
        print_message(message);
    }
}

/// One line per conversation, most recent first; the current one is starred
pub fn print_conversation_list(snapshot: &StoreSnapshot) {
    if snapshot.is_empty() {
        print_info("No conversations yet");
        return;
    }

    for (index, conversation) in snapshot.conversations.iter().enumerate() {
        let selected = snapshot.current_conversation_id.as_deref() == Some(conversation.id.as_str());
        let marker = if selected { "*".green().bold() } else { " ".normal() };
        println!(
            "{} {:>2}. {} {}",
            marker,
            index + 1,
            conversation.title.bold(),
            format!(
                "({} messages, updated {})",
                conversation.message_count(),
                conversation.updated_at.format("%Y-%m-%d %H:%M")
            )
            .dimmed()
        );
    }
}

pub fn print_last_error(snapshot: &StoreSnapshot) {
    if let Some(error) = &snapshot.last_error {
        print_error(&format!("Error: {}", error));
    }
}
