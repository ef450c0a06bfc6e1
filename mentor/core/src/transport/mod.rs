//! Streaming Transport
//!
//! Delivers a bot reply incrementally and normalizes two wire mechanisms into
//! one event contract ([`ReplyHandler`]).
//!
//! # Mechanisms
//!
//! Tried in order, each gated by [`TransportCapabilities`]:
//!
//! 1. [`StreamMechanism::ChunkedHttp`]: `POST /chatbot/message/stream`, body
//!    read chunk by chunk and split into `data:` frames
//! 2. [`StreamMechanism::EventPush`]: `GET /chatbot/message/stream?message=..&userId=..`
//!    consumed as a server-sent event stream
//!
//! Only [`ChatError::Unsupported`] moves on to the next mechanism. Any other
//! failure is reported once through `on_error`; retrying is the caller's
//! decision.
//!
//! # Cancellation
//!
//! Every network await is raced against the operation's
//! [`CancellationToken`], and every handler call is skipped once it fired.

mod chunked;
mod event_push;
pub mod frame;

use std::future::Future;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backend::{ChatError, ReplyHandler};
use crate::identity::Identity;
use frame::FrameAction;

/// Result of a mechanism that reached a terminal frame
type Outcome = Result<Option<String>, ChatError>;

/// Wire mechanisms able to stream a reply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMechanism {
    /// Incremental reads of a chunked HTTP response body
    ChunkedHttp,
    /// Server-sent event subscription
    EventPush,
}

impl StreamMechanism {
    /// All mechanisms, in the order they are attempted
    pub const ALL: [Self; 2] = [Self::ChunkedHttp, Self::EventPush];

    /// Short name for logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChunkedHttp => "chunked-http",
            Self::EventPush => "event-push",
        }
    }
}

impl std::fmt::Display for StreamMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streaming support available in the running environment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportCapabilities {
    /// Response bodies can be read incrementally
    pub chunked_body: bool,
    /// Server-sent event subscriptions are available
    pub event_push: bool,
}

impl Default for TransportCapabilities {
    fn default() -> Self {
        Self {
            chunked_body: true,
            event_push: true,
        }
    }
}

impl TransportCapabilities {
    /// No streaming support at all
    #[must_use]
    pub fn none() -> Self {
        Self {
            chunked_body: false,
            event_push: false,
        }
    }

    /// Whether `mechanism` can run here
    #[must_use]
    pub fn supports(&self, mechanism: StreamMechanism) -> bool {
        match mechanism {
            StreamMechanism::ChunkedHttp => self.chunked_body,
            StreamMechanism::EventPush => self.event_push,
        }
    }
}

/// JSON body of the chatbot endpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatRequest<'a> {
    user_id: &'a str,
    message: &'a str,
}

impl<'a> ChatRequest<'a> {
    pub(crate) fn new(identity: &'a Identity, message: &'a str) -> Self {
        Self {
            user_id: &identity.user_id,
            message,
        }
    }
}

/// Turn a non-success response into [`ChatError::Http`]
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Await `fut` unless the operation is cancelled first
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ChatError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ChatError::Cancelled),
        output = fut => Ok(output),
    }
}

/// Forwards frame actions to a handler, going silent once cancelled
pub(crate) struct Delivery<'a> {
    handler: &'a mut (dyn ReplyHandler + Send),
    cancel: CancellationToken,
    tokens: usize,
}

impl<'a> Delivery<'a> {
    fn new(handler: &'a mut (dyn ReplyHandler + Send), cancel: &CancellationToken) -> Self {
        Self {
            handler,
            cancel: cancel.clone(),
            tokens: 0,
        }
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Apply one raw chunked frame; `Some` once the frame ends the reply
    pub(crate) fn apply_frame(&mut self, frame: &str) -> Option<Outcome> {
        let Some(data) = frame::data_line(frame) else {
            tracing::debug!(frame = %frame, "Skipping frame without data line");
            return None;
        };
        self.apply_data(data)
    }

    /// Apply one frame payload; `Some` once the payload ends the reply
    pub(crate) fn apply_data(&mut self, data: &str) -> Option<Outcome> {
        let payload = frame::parse_payload(data)?;
        for action in payload.actions() {
            match action {
                FrameAction::Token(piece) => self.token(piece),
                FrameAction::Done { intent } => return Some(Ok(intent)),
                FrameAction::Error(reason) => return Some(Err(ChatError::Remote(reason))),
            }
        }
        None
    }

    fn token(&mut self, piece: String) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.tokens += 1;
        self.handler.on_token(piece);
    }

    fn finish(self, outcome: Outcome) {
        if self.cancel.is_cancelled() {
            tracing::trace!("Reply cancelled, dropping outcome");
            return;
        }
        match outcome {
            Ok(intent) => {
                tracing::debug!(tokens = self.tokens, intent = ?intent, "Reply stream completed");
                self.handler.on_done(intent);
            }
            Err(error) => {
                tracing::warn!(error = %error, tokens = self.tokens, "Reply stream failed");
                self.handler.on_error(error);
            }
        }
    }
}

/// Streams replies from the chatbot endpoints
#[derive(Clone, Debug)]
pub struct StreamTransport {
    /// HTTP client (shared with the buffered call)
    client: reqwest::Client,
    /// Base URL, without trailing slash
    base_url: String,
    /// What this environment can stream with
    capabilities: TransportCapabilities,
}

impl StreamTransport {
    /// Create a transport
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        capabilities: TransportCapabilities,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            capabilities,
        }
    }

    /// Capabilities this transport probes against
    #[must_use]
    pub fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    /// URL shared by both streaming mechanisms
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!("{}/chatbot/message/stream", self.base_url)
    }

    /// Stream a reply for `message` into `handler`
    ///
    /// Calls `on_token` zero or more times followed by exactly one of
    /// `on_done` / `on_error`, unless `cancel` fires, in which case the
    /// operation goes silent.
    pub async fn stream_reply(
        &self,
        identity: &Identity,
        message: &str,
        handler: &mut (dyn ReplyHandler + Send),
        cancel: &CancellationToken,
    ) {
        let mut delivery = Delivery::new(handler, cancel);
        let mut outcome = Err(ChatError::NoMechanism);

        for mechanism in StreamMechanism::ALL {
            let result = self
                .run_mechanism(mechanism, identity, message, &mut delivery)
                .await;
            match result {
                Err(e) if e.is_unsupported() => {
                    tracing::debug!(mechanism = %mechanism, "Mechanism unsupported, trying next");
                }
                other => {
                    outcome = other;
                    break;
                }
            }
        }

        delivery.finish(outcome);
    }

    async fn run_mechanism(
        &self,
        mechanism: StreamMechanism,
        identity: &Identity,
        message: &str,
        delivery: &mut Delivery<'_>,
    ) -> Outcome {
        if !self.capabilities.supports(mechanism) {
            return Err(ChatError::Unsupported(mechanism));
        }
        tracing::info!(mechanism = %mechanism, user_id = %identity.user_id, "Opening reply stream");
        match mechanism {
            StreamMechanism::ChunkedHttp => {
                chunked::stream(&self.client, &self.stream_url(), identity, message, delivery)
                    .await
            }
            StreamMechanism::EventPush => {
                event_push::stream(&self.client, &self.stream_url(), identity, message, delivery)
                    .await
            }
        }
    }
}
