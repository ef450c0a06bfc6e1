//! Mentor Chat - Terminal client for the RenovarApp AI mentor
//!
//! Reads one message per line from stdin and prints the mentor's reply as it
//! streams in.
//!
//! # Usage
//!
//! ```bash
//! # Credentials come from flags or the environment
//! MENTOR_TOKEN=... MENTOR_USER_ID=... mentor-chat
//!
//! # Another backend, buffered replies only
//! mentor-chat --api-url https://api.renovar.app --no-stream
//!
//! # Verbose logging (goes to stderr)
//! RUST_LOG=mentor_core=debug mentor-chat
//! ```
//!
//! # Commands
//!
//! - `/history`: print the whole conversation
//! - `/clear`: forget the conversation
//! - `/quit`: exit (so does end of input)
//!
//! Ctrl-C while a reply is streaming stops that reply; at the prompt it exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::info;

use mentor_core::{
    default_config_path, load_config_from_path, ChatMessage, ConfigOverrides,
    ConversationController, FileHistoryStore, HttpChatBackend, Identity, MessageId, Sender,
};

/// Mentor Chat - talk to the RenovarApp AI mentor from a terminal
#[derive(Parser, Debug)]
#[command(name = "mentor-chat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Backend base URL (overrides config file and environment)
    #[arg(short = 'u', long, value_name = "URL")]
    api_url: Option<String>,

    /// Bearer token of the signed-in user
    #[arg(short = 't', long, env = "MENTOR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Id of the signed-in user
    #[arg(long, env = "MENTOR_USER_ID")]
    user_id: Option<String>,

    /// Skip streaming and always use the buffered endpoint
    #[arg(long)]
    no_stream: bool,

    /// Configuration file path
    #[arg(short = 'c', long, env = "MENTOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the conversation history
    #[arg(long, value_name = "DIR")]
    history_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "MENTOR_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so they never interleave with the reply on stdout.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("mentor_chat={level},mentor_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Terminal output
struct Terminal {
    out: Stdout,
}

impl Terminal {
    async fn write(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn line(&mut self, text: &str) -> Result<()> {
        self.write(text).await?;
        self.write("\n").await
    }

    async fn message(&mut self, message: &ChatMessage) -> Result<()> {
        let label = match message.sender {
            Sender::User => "you",
            Sender::Bot => "mentor",
            Sender::System => "notice",
        };
        self.line(&format!("{label}> {}", message.text)).await
    }
}

type Controller = ConversationController<HttpChatBackend>;

/// Print the pending reply as it grows, until it finishes or Ctrl-C
async fn follow_reply(controller: &mut Controller, term: &mut Terminal) -> Result<()> {
    let Some(bot_id) = controller.pending_message_id().cloned() else {
        return Ok(());
    };
    let mut printed = String::new();
    term.write("mentor> ").await?;

    loop {
        let progressed = tokio::select! {
            progressed = controller.next_event() => Some(progressed),
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(progressed) = progressed else {
            controller.cancel();
            term.line(" [stopped]").await?;
            return Ok(());
        };

        let messages = controller.messages();
        if let Some(bot) = messages.iter().find(|m| m.id == bot_id) {
            if let Some(rest) = bot.text.strip_prefix(printed.as_str()) {
                term.write(rest).await?;
            } else {
                // Buffered fallback replaced the partial text
                term.write("\nmentor> ").await?;
                term.write(&bot.text).await?;
            }
            printed.clone_from(&bot.text);
        }

        if !progressed || controller.pending_message_id().is_none() {
            term.write("\n").await?;
            print_after(&messages, &bot_id, term).await?;
            return Ok(());
        }
    }
}

/// Print the notices that follow a finished reply
async fn print_after(messages: &[ChatMessage], bot_id: &MessageId, term: &mut Terminal) -> Result<()> {
    let notices = messages
        .iter()
        .skip_while(|m| &m.id != bot_id)
        .skip(1)
        .filter(|m| m.sender == Sender::System);
    for notice in notices {
        term.message(notice).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let mut config = load_config_from_path(args.config.clone().or_else(default_config_path))
        .context("Failed to load configuration")?;
    let overrides = ConfigOverrides {
        base_url: args.api_url.clone(),
        streaming: args.no_stream.then_some(false),
        history_dir: args.history_dir.clone(),
    };
    overrides
        .apply(&mut config)
        .context("Invalid command-line option")?;

    let identity = Identity::from_parts(args.token.clone(), args.user_id.clone())
        .context("Both --token and --user-id (or MENTOR_TOKEN / MENTOR_USER_ID) are required")?;

    info!(
        base_url = %config.api.base_url,
        source = %config.source(),
        streaming = config.streaming.enabled,
        "Mentor chat starting"
    );

    let backend = Arc::new(HttpChatBackend::from_config(&config)?);
    let store = Arc::new(FileHistoryStore::new(
        config.history_dir(),
        &config.history.namespace,
    ));
    let mut controller =
        ConversationController::restore(backend, store, config.controller_config(), Some(identity))
            .await;

    let mut term = Terminal {
        out: tokio::io::stdout(),
    };
    for message in controller.messages().iter() {
        term.message(message).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        term.write("you> ").await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => {}
            "/quit" => break,
            "/clear" => {
                controller.clear_history().await;
                for message in controller.messages().iter() {
                    term.message(message).await?;
                }
            }
            "/history" => {
                for message in controller.messages().iter() {
                    term.message(message).await?;
                }
            }
            text => {
                controller.submit(text).await;
                follow_reply(&mut controller, &mut term).await?;
            }
        }
    }

    term.write("\n").await?;
    info!("Mentor chat exiting");
    Ok(())
}
