//! Chatbot Backend Integration
//!
//! This module provides access to the mentor chatbot backend through a common
//! trait interface, so the conversation controller can be driven by the HTTP
//! implementation in production and by scripted backends in tests.
//!
//! # Endpoints
//!
//! - `POST /chatbot/message/stream` - chunked reply frames
//! - `GET /chatbot/message/stream` - server-sent event reply frames
//! - `POST /chatbot/message` - buffered whole reply
//!
//! # Usage
//!
//! ```ignore
//! use mentor_core::backend::{ChatBackend, HttpChatBackend};
//!
//! let backend = HttpChatBackend::new("http://localhost:3333", Default::default())?;
//! let reply = backend.send_message(&identity, "Hello!").await?;
//! ```

mod error;
mod http;
mod traits;

pub use error::ChatError;
pub use http::HttpChatBackend;
pub use traits::{BufferedReply, ChatBackend, ReplyHandler};
