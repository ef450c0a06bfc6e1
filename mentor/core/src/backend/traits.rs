//! Chat Backend Traits
//!
//! Trait definitions for the chatbot backend. The controller is generic over
//! [`ChatBackend`], the same way a UI-agnostic core stays generic over the
//! service it talks to.
//!
//! # Event contract
//!
//! `stream_reply` reports progress through a [`ReplyHandler`]:
//! - `on_token` zero or more times, in delivery order
//! - then exactly one of `on_done` or `on_error`
//! - nothing at all once the cancellation token has fired

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::ChatError;
use crate::identity::Identity;

/// Receives the events of one streamed reply
pub trait ReplyHandler {
    /// A piece of the reply, to be appended to what came before
    fn on_token(&mut self, piece: String);

    /// The reply completed, with an optional classification tag
    fn on_done(&mut self, intent: Option<String>);

    /// The reply failed terminally
    fn on_error(&mut self, error: ChatError);
}

/// Whole reply returned by the buffered endpoint
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct BufferedReply {
    /// Reply text
    #[serde(default)]
    pub reply: String,
    /// Classification tag
    #[serde(default)]
    pub intent: Option<String>,
    /// Extra payload some intents carry
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Chatbot backend
///
/// Implement this trait to plug a different service (or a test double) under
/// the conversation controller.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Stream a reply for `message`, reporting through `handler`
    ///
    /// Never retries on its own and never reports after `cancel` fires.
    async fn stream_reply(
        &self,
        identity: &Identity,
        message: &str,
        handler: &mut (dyn ReplyHandler + Send),
        cancel: &CancellationToken,
    );

    /// Ask for the whole reply in one response
    async fn send_message(
        &self,
        identity: &Identity,
        message: &str,
    ) -> Result<BufferedReply, ChatError>;
}
