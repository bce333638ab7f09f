use anyhow::{bail, Result};
use chatkeep::cli::{Cli, Commands, PrefsAction};
use chatkeep::config::BackendKind;
use chatkeep::{utils, Engine, Mode, PreferencesPatch, SendOutcome, Settings, UiPreferences};
use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut settings = Settings::new()?;
    if let Some(storage) = cli.storage {
        settings.storage.kind = storage.into();
    }
    if let Some(url) = cli.backend_url {
        settings.backend.kind = BackendKind::Http;
        settings.backend.base_url = url;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let backend = Engine::backend_from_settings(&settings)?;
    let engine = Engine::new(&settings, backend).await;
    engine.load_initial_state().await?;

    let result = match cli.command {
        Commands::Interactive { mode } => {
            handle_interactive(&engine, mode, settings.engine.max_messages_per_conversation).await
        }
        Commands::Send {
            message,
            conversation,
            mode,
        } => handle_send(&engine, conversation.as_deref(), &message, mode).await,
        Commands::List => {
            utils::print_conversation_list(&engine.snapshot());
            Ok(())
        }
        Commands::Show { id } => handle_show(&engine, id.as_deref()),
        Commands::New { title } => handle_new(&engine, title.as_deref()).await,
        Commands::Delete { id } => handle_delete(&engine, &id).await,
        Commands::Prefs { action } => handle_prefs(&engine, action).await,
        Commands::Reset => {
            engine.reset().await;
            utils::print_success("Stored data cleared");
            Ok(())
        }
    };

    engine.dispose().await?;

    result
}

async fn handle_send(
    engine: &Engine,
    conversation: Option<&str>,
    message: &str,
    mode: Mode,
) -> Result<()> {
    let pending = engine.send_message(conversation, message, mode).await?;
    match pending.wait().await {
        SendOutcome::Delivered(reply) => {
            utils::print_message(&reply);
            Ok(())
        }
        SendOutcome::Failed(cause) => bail!("send failed: {}", cause),
        SendOutcome::Discarded => {
            utils::print_info("Conversation was deleted before the reply arrived");
            Ok(())
        }
    }
}

fn handle_show(engine: &Engine, id: Option<&str>) -> Result<()> {
    let snapshot = engine.snapshot();
    let conversation = match id {
        Some(id) => snapshot.conversation(id),
        None => snapshot.current(),
    };

    match conversation {
        Some(conversation) => utils::print_conversation(conversation),
        None => utils::print_info("No such conversation"),
    }
    Ok(())
}

async fn handle_new(engine: &Engine, title: Option<&str>) -> Result<()> {
    let id = engine.store().create_conversation(title).await?;
    utils::print_success(&format!("Created conversation {}", id));
    Ok(())
}

async fn handle_delete(engine: &Engine, id: &str) -> Result<()> {
    match engine.store().delete_conversation(id).await? {
        Some(_) => utils::print_success(&format!("Deleted conversation {}", id)),
        None => utils::print_info("No such conversation"),
    }
    utils::print_last_error(&engine.snapshot());
    Ok(())
}

async fn handle_prefs(engine: &Engine, action: Option<PrefsAction>) -> Result<()> {
    let prefs = engine.preferences();
    let updated = match action {
        None => prefs.current().await,
        Some(PrefsAction::Theme { theme }) => {
            prefs
                .update(PreferencesPatch {
                    theme: Some(theme.into()),
                    ..PreferencesPatch::default()
                })
                .await
        }
        Some(PrefsAction::Language { language }) => {
            prefs
                .update(PreferencesPatch {
                    language: Some(language.into()),
                    ..PreferencesPatch::default()
                })
                .await
        }
        Some(PrefsAction::Sidebar { open }) => {
            prefs
                .update(PreferencesPatch {
                    sidebar_open: Some(open),
                    ..PreferencesPatch::default()
                })
                .await
        }
        Some(PrefsAction::Resize { width }) => prefs.handle_resize(width).await,
    };

    print_preferences(&updated);
    Ok(())
}

fn print_preferences(prefs: &UiPreferences) {
    utils::print_header("Preferences");
    println!("  theme:    {:?}", prefs.theme);
    println!(
        "  language: {:?}{}",
        prefs.language,
        if prefs.language.is_rtl() { " (rtl)" } else { "" }
    );
    println!("  sidebar:  {}", if prefs.sidebar_open { "open" } else { "closed" });
    println!("  page:     {:?}", prefs.current_page);
    println!("  mobile:   {}", prefs.is_mobile);
}

async fn handle_interactive(engine: &Engine, mut mode: Mode, max_messages: usize) -> Result<()> {
    utils::print_header("Interactive Mode");
    utils::print_info("Type your messages, /help for commands (Ctrl+C to exit)\n");

    if let Some(current) = engine.snapshot().current() {
        utils::print_success(&format!(
            "Resumed '{}' with {} messages",
            current.title,
            current.message_count()
        ));
    }

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        utils::print_prompt("You: ");
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            return Ok(());
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            let (name, argument) = match command.split_once(' ') {
                Some((name, argument)) => (name, argument.trim()),
                None => (command, ""),
            };

            match name {
                "new" => {
                    let title = (!argument.is_empty()).then_some(argument);
                    handle_new(engine, title).await?;
                }
                "list" => utils::print_conversation_list(&engine.snapshot()),
                "show" => handle_show(engine, None)?,
                "select" => {
                    let selected = match resolve_conversation(engine, argument) {
                        Some(id) => engine.store().select_conversation(&id).await?,
                        None => false,
                    };
                    if selected {
                        handle_show(engine, None)?;
                    } else {
                        utils::print_error("No such conversation");
                    }
                }
                "delete" => match resolve_conversation(engine, argument) {
                    Some(id) => handle_delete(engine, &id).await?,
                    None => utils::print_error("No such conversation"),
                },
                "rename" => match engine.snapshot().current_conversation_id {
                    Some(id) => {
                        engine.store().rename_conversation(&id, argument).await?;
                        utils::print_last_error(&engine.snapshot());
                    }
                    None => utils::print_error("No conversation selected"),
                },
                "mode" => match argument.parse::<Mode>() {
                    Ok(new_mode) => {
                        mode = new_mode;
                        if let Some(id) = engine.snapshot().current_conversation_id {
                            engine.store().set_mode(&id, mode).await?;
                        }
                        utils::print_success(&format!("Mode set to {}", mode));
                    }
                    Err(e) => utils::print_error(&e),
                },
                "clear-error" => engine.store().clear_error().await?,
                "help" => print_help(),
                other => utils::print_error(&format!("Unknown command /{}", other)),
            }
            println!();
            continue;
        }

        match engine.send_message(None, input, mode).await {
            Ok(pending) => {
                utils::print_info("Assistant is typing...");
                match pending.wait().await {
                    SendOutcome::Delivered(reply) => {
                        utils::print_message(&reply);
                        let snapshot = engine.snapshot();
                        if let Some(current) = snapshot.current() {
                            if current.is_full(max_messages) {
                                utils::print_info(&format!(
                                    "This conversation has reached {} messages, consider /new",
                                    max_messages
                                ));
                            }
                        }
                    }
                    SendOutcome::Failed(_) => utils::print_last_error(&engine.snapshot()),
                    SendOutcome::Discarded => {}
                }
            }
            Err(e) => utils::print_error(&e.to_string()),
        }
        println!();
    }
}

/// Accept either a conversation id or its 1-based position in `/list`
fn resolve_conversation(engine: &Engine, argument: &str) -> Option<String> {
    let snapshot = engine.snapshot();
    if let Ok(position) = argument.parse::<usize>() {
        return snapshot
            .conversations
            .get(position.checked_sub(1)?)
            .map(|c| c.id.clone());
    }
    snapshot.conversation(argument).map(|c| c.id.clone())
}

fn print_help() {
    println!("Special commands:");
    println!("  /new [title]     - Start a new conversation");
    println!("  /list            - List conversations");
    println!("  /show            - Show the current conversation");
    println!("  /select <n|id>   - Switch conversation");
    println!("  /delete <n|id>   - Delete a conversation");
    println!("  /rename <title>  - Rename the current conversation");
    println!("  /mode <mode>     - normal, deepthink or research");
    println!("  /clear-error     - Dismiss the last error");
    println!("  /help            - Show this help");
    println!("  Ctrl+C           - Exit");
}
