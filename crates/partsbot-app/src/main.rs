//! Partsbot application binary - composition root.
//!
//! 1. Load configuration from TOML
//! 2. Load the JSON catalog
//! 3. Build the intent router (flow + NLU guard + session store)
//! 4. Start the session eviction sweeper
//! 5. Run the console driver on stdin
//!
//! The console stands in for a messaging webhook: each line is one inbound
//! event and every outbound intent is printed with its button tokens so they
//! can be sent back with `/qr` or `/pb`.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use partsbot_chat::{Flow, GuardedNlu, HeuristicNlu, InMemoryCatalog, IntentRouter, SessionStore};
use partsbot_core::config::PartsbotConfig;
use partsbot_core::types::{Button, InboundEvent, Outbound, UserId};

use cli::CliArgs;

/// One line typed into the console.
#[derive(Debug, PartialEq, Eq)]
enum ConsoleLine {
    Event(InboundEvent),
    SwitchUser(String),
    Quit,
    Empty,
}

fn parse_line(line: &str) -> ConsoleLine {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleLine::Empty;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "/qr" if !rest.is_empty() => ConsoleLine::Event(InboundEvent::QuickReply(rest.to_string())),
        "/pb" if !rest.is_empty() => ConsoleLine::Event(InboundEvent::Postback(rest.to_string())),
        "/user" if !rest.is_empty() => ConsoleLine::SwitchUser(rest.to_string()),
        "/quit" | "/exit" => ConsoleLine::Quit,
        _ => ConsoleLine::Event(InboundEvent::FreeText(line.to_string())),
    }
}

fn print_buttons(buttons: &[Button], indent: &str) {
    for button in buttons {
        println!("{indent}[{}] {}", button.title, button.payload);
    }
}

fn print_outbound(message: &Outbound) {
    match message {
        Outbound::Text {
            text,
            quick_replies,
        } => {
            println!("bot> {}", text.replace('\n', "\n     "));
            print_buttons(quick_replies, "     ");
        }
        Outbound::Carousel { cards } => {
            for (i, card) in cards.iter().enumerate() {
                println!("  #{} {} | {}", i + 1, card.title, card.subtitle);
                print_buttons(&card.buttons, "      ");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = PartsbotConfig::load_or_default(&config_file);

    // Tracing. RUST_LOG wins over the flag and the config file.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting partsbot v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Catalog.
    let catalog_path = args.resolve_catalog_path(&config.catalog.path);
    let catalog = match InMemoryCatalog::load(&catalog_path) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(path = %catalog_path.display(), error = %e, "Failed to load catalog");
            return Err(e.into());
        }
    };

    // Engine.
    let nlu = GuardedNlu::new(Arc::new(HeuristicNlu::new()), &config.nlu);
    let flow = Flow::new(catalog, nlu, &config);
    let store = Arc::new(SessionStore::new(config.session.timeout_minutes));
    let router = IntentRouter::new(flow, Arc::clone(&store), config.messaging.max_message_chars);
    tracing::info!(
        timeout_minutes = config.session.timeout_minutes,
        "Intent router ready"
    );

    // === Background tasks ===

    let sweeper = Arc::clone(&store)
        .spawn_sweeper(Duration::from_secs(config.session.sweep_interval_secs.max(1)));

    // === Console ===

    let mut user = UserId::new(args.user.clone());
    println!("partsbot console. Type a message, /qr <token>, /pb <token>, /user <id>, /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ConsoleLine::Empty => continue,
            ConsoleLine::Quit => break,
            ConsoleLine::SwitchUser(id) => {
                user = UserId::new(id);
                println!("(now chatting as {user})");
            }
            ConsoleLine::Event(event) => match router.handle(&user, event).await {
                Ok(messages) => messages.iter().for_each(print_outbound),
                Err(e) => tracing::error!(user_id = %user, error = %e, "Event handling failed"),
            },
        }
    }

    sweeper.abort();
    tracing::info!(sessions = store.len(), "Console closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("   "), ConsoleLine::Empty);
        assert_eq!(
            parse_line("80/90-14"),
            ConsoleLine::Event(InboundEvent::FreeText("80/90-14".to_string()))
        );
        assert_eq!(
            parse_line("/qr SEL:S:80~90-14"),
            ConsoleLine::Event(InboundEvent::QuickReply("SEL:S:80~90-14".to_string()))
        );
        assert_eq!(
            parse_line("/pb MENU"),
            ConsoleLine::Event(InboundEvent::Postback("MENU".to_string()))
        );
        assert_eq!(parse_line("/user budi"), ConsoleLine::SwitchUser("budi".to_string()));
        assert_eq!(parse_line("/quit"), ConsoleLine::Quit);
    }

    #[test]
    fn test_bare_command_is_text() {
        assert_eq!(
            parse_line("/qr"),
            ConsoleLine::Event(InboundEvent::FreeText("/qr".to_string()))
        );
    }
}
