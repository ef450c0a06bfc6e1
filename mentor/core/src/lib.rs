//! Mentor Core - Streaming Chat for the RenovarApp AI Mentor
//!
//! This crate holds the chat logic of the RenovarApp client, independent of
//! any UI toolkit. A surface (mobile shell, terminal, test harness) hands it
//! user input and renders the history snapshots it publishes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          UI Surface                           │
//! │        submit(text) / cancel() / clear_history()              │
//! │                 ▲ history snapshots (watch)                   │
//! └─────────────────┼────────────────────────────────────────────┘
//!                   │
//! ┌─────────────────┼────────────────────────────────────────────┐
//! │          ConversationController (one chat session)            │
//! │  ┌──────────────┴─────┐   ┌───────────────┐   ┌────────────┐ │
//! │  │  History snapshot  │   │ supports_stream│   │HistoryStore│ │
//! │  │  (copy-on-write)   │   │  (sticky flag) │   │ (persisted)│ │
//! │  └────────────────────┘   └───────────────┘   └────────────┘ │
//! │                   │ OperationEvent channel                    │
//! └───────────────────┼──────────────────────────────────────────┘
//!                     │
//! ┌───────────────────┼──────────────────────────────────────────┐
//! │        ChatBackend (HttpChatBackend)                          │
//! │  ┌────────────────┴──────────────┐   ┌──────────────────────┐│
//! │  │ StreamTransport               │   │ buffered send_message ││
//! │  │  ChunkedHttp → EventPush      │   │ POST /chatbot/message ││
//! │  └───────────────────────────────┘   └──────────────────────┘│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mentor_core::{
//!     load_config, ConversationController, FileHistoryStore, HttpChatBackend, Identity,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let backend = Arc::new(HttpChatBackend::from_config(&config)?);
//!     let store = Arc::new(FileHistoryStore::new(config.history_dir(), &config.history.namespace));
//!     let identity = Identity::new("bearer-token", "user-42");
//!
//!     let mut controller =
//!         ConversationController::restore(backend, store, config.controller_config(), Some(identity))
//!             .await;
//!
//!     controller.submit("Will my job be automated?").await;
//!     controller.wait_idle().await;
//!
//!     for message in controller.messages().iter() {
//!         println!("{:?}: {}", message.sender, message.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: backend seam (`ChatBackend`), HTTP implementation, errors
//! - [`transport`]: streaming mechanisms and frame decoding
//! - [`controller`]: conversation controller and history snapshots
//! - [`message`]: chat message model and intent tags
//! - [`identity`]: authenticated identity input
//! - [`store`]: history persistence
//! - [`config`]: layered configuration (defaults, TOML, environment, CLI)

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod controller;
pub mod identity;
pub mod message;
pub mod store;
pub mod transport;

pub use backend::{BufferedReply, ChatBackend, ChatError, HttpChatBackend, ReplyHandler};
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, MentorConfig, MentorToml,
};
pub use controller::{ControllerConfig, ConversationController, History, ReplyPath};
pub use identity::Identity;
pub use message::{intent, ChatMessage, MessageId, Sender};
pub use store::{FileHistoryStore, HistoryStore, MemoryHistoryStore, StoreError};
pub use transport::{StreamMechanism, StreamTransport, TransportCapabilities};
