//! HTTP Backend Implementation
//!
//! Talks to the RenovarApp API. Streaming goes through [`StreamTransport`];
//! the buffered fallback is a single JSON request/response.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::traits::{BufferedReply, ChatBackend, ReplyHandler};
use super::ChatError;
use crate::config::MentorConfig;
use crate::identity::Identity;
use crate::transport::{ensure_success, ChatRequest, StreamTransport, TransportCapabilities};

/// Default timeout for the buffered call
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connect timeout for every call
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Chatbot backend over HTTP
#[derive(Clone, Debug)]
pub struct HttpChatBackend {
    /// Base URL, without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
    /// Timeout for the buffered call
    request_timeout: Duration,
    /// Streaming mechanisms
    transport: StreamTransport,
}

impl HttpChatBackend {
    /// Create a backend with default timeouts
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        capabilities: TransportCapabilities,
    ) -> Result<Self, ChatError> {
        Self::with_timeouts(
            base_url,
            capabilities,
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    /// Create a backend with explicit timeouts
    ///
    /// Streaming calls only get the connect timeout; a reply may take as
    /// long as the model needs.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeouts(
        base_url: impl Into<String>,
        capabilities: TransportCapabilities,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ChatError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        let transport = StreamTransport::new(http_client.clone(), base_url.clone(), capabilities);

        Ok(Self {
            base_url,
            http_client,
            request_timeout,
            transport,
        })
    }

    /// Create from a loaded [`MentorConfig`]
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &MentorConfig) -> Result<Self, ChatError> {
        Self::with_timeouts(
            config.api.base_url.clone(),
            config.streaming.capabilities,
            config.api.connect_timeout,
            config.api.request_timeout,
        )
    }

    /// Base URL of the API
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Streaming transport used by this backend
    #[must_use]
    pub fn transport(&self) -> &StreamTransport {
        &self.transport
    }

    fn message_url(&self) -> String {
        format!("{}/chatbot/message", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    fn name(&self) -> &'static str {
        "RenovarApp API"
    }

    async fn stream_reply(
        &self,
        identity: &Identity,
        message: &str,
        handler: &mut (dyn ReplyHandler + Send),
        cancel: &CancellationToken,
    ) {
        self.transport
            .stream_reply(identity, message, handler, cancel)
            .await;
    }

    async fn send_message(
        &self,
        identity: &Identity,
        message: &str,
    ) -> Result<BufferedReply, ChatError> {
        let response = self
            .http_client
            .post(self.message_url())
            .bearer_auth(&identity.token)
            .timeout(self.request_timeout)
            .json(&ChatRequest::new(identity, message))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let body = response.bytes().await?;
        let reply: BufferedReply = serde_json::from_slice(&body)?;

        tracing::debug!(
            intent = reply.intent.as_deref().unwrap_or("-"),
            chars = reply.reply.chars().count(),
            "Buffered reply received"
        );
        Ok(reply)
    }
}
