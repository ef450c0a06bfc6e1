//! Conversation Controller
//!
//! Owns the chat history and drives one reply at a time. Surfaces (the
//! terminal client, a mobile bridge, tests) talk to the controller only:
//! they submit text, cancel, clear, and render snapshots.
//!
//! # Reply lifecycle
//!
//! ```text
//! submit ──► user msg + empty bot msg ──► streaming? ──yes──► stream_reply
//!                                            │                  │ on_error
//!                                            no                 ▼
//!                                            └─────────────► send_message
//! ```
//!
//! Each operation runs on its own task and reports through a private
//! channel. Events are applied on the controller's turn by [`poll`],
//! [`next_event`] or [`wait_idle`]; cancelling drops the channel, so nothing
//! queued by a stale operation can touch the history.
//!
//! The first streaming failure turns streaming off for the lifetime of the
//! controller.
//!
//! [`poll`]: ConversationController::poll
//! [`next_event`]: ConversationController::next_event
//! [`wait_idle`]: ConversationController::wait_idle

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::{BufferedReply, ChatBackend, ChatError, ReplyHandler};
use crate::identity::Identity;
use crate::message::{intent, ChatMessage, MessageId};
use crate::store::HistoryStore;
use crate::transport::cancellable;

/// Immutable snapshot of the conversation
pub type History = Arc<Vec<ChatMessage>>;

/// Texts and startup mode of a controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Seeded as the first bot message of an empty history
    pub welcome_message: String,
    /// Notice shown after a `QUOTA_EXCEEDED` reply
    pub quota_notice: String,
    /// Notice shown after any other non-normal reply
    pub fallback_notice: String,
    /// Bot text when no reply could be obtained at all
    pub failure_reply: String,
    /// Try streaming before the buffered call
    pub streaming: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            welcome_message: "Hi! I'm the RenovarApp AI mentor. I can help you understand the \
                future of your profession and suggest reskilling paths. How would you like to \
                start?"
                .to_string(),
            quota_notice: "Model usage limit reached. I can keep going with general guidance, \
                send another question."
                .to_string(),
            fallback_notice: "Model unavailable. I used a basic fallback, please try again later."
                .to_string(),
            failure_reply: "Oops, something went wrong. Please try again.".to_string(),
            streaming: true,
        }
    }
}

impl ControllerConfig {
    fn notice_for(&self, tag: &str) -> &str {
        if tag == intent::QUOTA_EXCEEDED {
            &self.quota_notice
        } else {
            &self.fallback_notice
        }
    }
}

/// How the pending reply is being obtained
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyPath {
    /// Incremental tokens through `stream_reply`
    Streaming,
    /// One `send_message` call
    Buffered,
}

/// Events sent from an operation task to the controller
#[derive(Debug)]
enum OperationEvent {
    Token(String),
    Done(Option<String>),
    StreamFailed(ChatError),
    Buffered(Result<BufferedReply, ChatError>),
}

/// Forwards handler calls into the operation channel
struct ChannelHandler {
    tx: mpsc::UnboundedSender<OperationEvent>,
}

impl ReplyHandler for ChannelHandler {
    fn on_token(&mut self, piece: String) {
        let _ = self.tx.send(OperationEvent::Token(piece));
    }

    fn on_done(&mut self, intent: Option<String>) {
        let _ = self.tx.send(OperationEvent::Done(intent));
    }

    fn on_error(&mut self, error: ChatError) {
        let _ = self.tx.send(OperationEvent::StreamFailed(error));
    }
}

/// The one in-flight reply
struct PendingReply {
    bot_id: MessageId,
    message: String,
    identity: Identity,
    path: ReplyPath,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<OperationEvent>,
}

/// Conversation state machine over a [`ChatBackend`]
pub struct ConversationController<B: ChatBackend + 'static> {
    /// Backend every operation talks to
    backend: Arc<B>,
    /// Durable copy of the history
    store: Arc<dyn HistoryStore>,
    /// Texts and startup mode
    config: ControllerConfig,
    /// Credentials for new submits
    identity: Option<Identity>,
    /// Current snapshot
    history: History,
    /// Publishes every new snapshot
    snapshots: watch::Sender<History>,
    /// Sticky; cleared on the first streaming failure
    supports_stream: bool,
    /// A reply is in flight
    loading: bool,
    /// The in-flight reply, if any
    pending: Option<PendingReply>,
}

impl<B: ChatBackend + 'static> ConversationController<B> {
    /// Create a controller, loading the stored history
    ///
    /// A missing, empty or unreadable history starts over with the welcome
    /// message.
    pub async fn restore(
        backend: Arc<B>,
        store: Arc<dyn HistoryStore>,
        config: ControllerConfig,
        identity: Option<Identity>,
    ) -> Self {
        let messages = match store.load().await {
            Ok(Some(messages)) if !messages.is_empty() => {
                tracing::debug!(count = messages.len(), "Restored chat history");
                messages
            }
            Ok(_) => vec![ChatMessage::welcome(config.welcome_message.clone())],
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load chat history, starting fresh");
                vec![ChatMessage::welcome(config.welcome_message.clone())]
            }
        };

        let history: History = Arc::new(messages);
        let (snapshots, _) = watch::channel(history.clone());

        tracing::info!(
            backend = backend.name(),
            streaming = config.streaming,
            "Conversation controller ready"
        );

        Self {
            backend,
            store,
            supports_stream: config.streaming,
            config,
            identity,
            history,
            snapshots,
            loading: false,
            pending: None,
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Current history snapshot
    #[must_use]
    pub fn messages(&self) -> History {
        self.history.clone()
    }

    /// Receive every new history snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<History> {
        self.snapshots.subscribe()
    }

    /// Whether a reply is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether the next submit will try streaming
    #[must_use]
    pub fn supports_stream(&self) -> bool {
        self.supports_stream
    }

    /// Id of the bot message currently being filled
    #[must_use]
    pub fn pending_message_id(&self) -> Option<&MessageId> {
        self.pending.as_ref().map(|p| &p.bot_id)
    }

    /// Path of the reply in flight
    #[must_use]
    pub fn pending_path(&self) -> Option<ReplyPath> {
        self.pending.as_ref().map(|p| p.path)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Replace the identity used by later submits
    pub fn set_identity(&mut self, identity: Option<Identity>) {
        self.identity = identity;
    }

    /// Send `text` and start obtaining a reply
    ///
    /// Ignored when the trimmed text is empty or no identity is set. Any
    /// reply still in flight is cancelled first.
    pub async fn submit(&mut self, text: &str) {
        let message = text.trim();
        if message.is_empty() {
            return;
        }
        let Some(identity) = self.identity.clone() else {
            tracing::debug!("Ignoring submit without identity");
            return;
        };

        self.abandon();

        let user = ChatMessage::user(message);
        let bot = ChatMessage::pending_bot();
        let bot_id = bot.id.clone();
        self.mutate(|messages| {
            messages.push(user);
            messages.push(bot);
        })
        .await;

        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let path = if self.supports_stream {
            Self::spawn_stream(
                self.backend.clone(),
                identity.clone(),
                message.to_string(),
                cancel.clone(),
                tx,
            );
            ReplyPath::Streaming
        } else {
            Self::spawn_buffered(
                self.backend.clone(),
                identity.clone(),
                message.to_string(),
                cancel.clone(),
                tx,
            );
            ReplyPath::Buffered
        };

        tracing::debug!(bot_id = %bot_id, path = ?path, "Reply requested");

        self.loading = true;
        self.pending = Some(PendingReply {
            bot_id,
            message: message.to_string(),
            identity,
            path,
            cancel,
            events,
        });
    }

    /// Stop the reply in flight
    ///
    /// The pending bot message keeps whatever text it already had.
    pub fn cancel(&mut self) {
        if self.pending.is_some() {
            tracing::debug!("Reply cancelled");
        }
        self.abandon();
    }

    /// Forget the conversation
    ///
    /// Cancels the reply in flight, removes the stored history and starts
    /// over with the welcome message.
    pub async fn clear_history(&mut self) {
        self.abandon();

        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Failed to remove stored chat history");
        }

        self.history = Arc::new(vec![ChatMessage::welcome(
            self.config.welcome_message.clone(),
        )]);
        self.snapshots.send_replace(self.history.clone());
        tracing::info!("Chat history cleared");
    }

    // ========================================================================
    // Event pumping
    // ========================================================================

    /// Apply every event that is ready, without waiting
    ///
    /// Returns true if anything was applied.
    pub async fn poll(&mut self) -> bool {
        let mut applied = false;
        loop {
            let Some(pending) = self.pending.as_mut() else {
                break;
            };
            match pending.events.try_recv() {
                Ok(event) => self.apply(event).await,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.operation_lost().await,
            }
            applied = true;
        }
        applied
    }

    /// Wait for the next event and apply it
    ///
    /// Returns false immediately when nothing is in flight.
    pub async fn next_event(&mut self) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };
        match pending.events.recv().await {
            Some(event) => self.apply(event).await,
            None => self.operation_lost().await,
        }
        true
    }

    /// Apply events until no reply is in flight
    pub async fn wait_idle(&mut self) {
        while self.next_event().await {}
    }

    async fn apply(&mut self, event: OperationEvent) {
        match event {
            OperationEvent::Token(piece) => {
                let Some(bot_id) = self.pending_message_id().cloned() else {
                    return;
                };
                self.mutate(|messages| {
                    if let Some(bot) = messages.iter_mut().find(|m| m.id == bot_id) {
                        bot.text.push_str(&piece);
                    }
                })
                .await;
            }
            OperationEvent::Done(tag) => self.finish(None, tag).await,
            OperationEvent::StreamFailed(error) => self.fall_back(&error),
            OperationEvent::Buffered(Ok(reply)) => self.finish(Some(reply.reply), reply.intent).await,
            OperationEvent::Buffered(Err(error)) => {
                tracing::warn!(error = %error, "Buffered reply failed");
                let text = self.config.failure_reply.clone();
                self.finish(Some(text), Some(intent::FALLBACK.to_string()))
                    .await;
            }
        }
    }

    /// Turn streaming off and retry the same message buffered
    fn fall_back(&mut self, error: &ChatError) {
        if self.supports_stream {
            tracing::warn!(error = %error, "Streaming failed, switching to buffered replies");
        }
        self.supports_stream = false;

        let backend = self.backend.clone();
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        let (tx, events) = mpsc::unbounded_channel();
        Self::spawn_buffered(
            backend,
            pending.identity.clone(),
            pending.message.clone(),
            pending.cancel.clone(),
            tx,
        );
        pending.events = events;
        pending.path = ReplyPath::Buffered;
    }

    /// The operation task went away without a terminal event
    async fn operation_lost(&mut self) {
        tracing::error!("Reply task ended without a result");
        let text = self.config.failure_reply.clone();
        self.finish(Some(text), Some(intent::FALLBACK.to_string()))
            .await;
    }

    /// Complete the pending reply, optionally replacing its text
    async fn finish(&mut self, text: Option<String>, tag: Option<String>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        self.loading = false;

        let notice = tag
            .as_deref()
            .filter(|t| intent::needs_notice(Some(t)))
            .map(|t| ChatMessage::notice(self.config.notice_for(t), t));

        tracing::debug!(bot_id = %pending.bot_id, intent = ?tag, "Reply finished");

        self.mutate(|messages| {
            if let Some(bot) = messages.iter_mut().find(|m| m.id == pending.bot_id) {
                if let Some(text) = text {
                    bot.text = text;
                }
                bot.intent = tag.filter(|t| !t.is_empty());
            }
            if let Some(notice) = notice {
                messages.push(notice);
            }
        })
        .await;
    }

    /// Cancel and forget the reply in flight
    fn abandon(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
        }
        self.loading = false;
    }

    /// Copy-on-write update, then publish and persist
    async fn mutate(&mut self, f: impl FnOnce(&mut Vec<ChatMessage>)) {
        f(Arc::make_mut(&mut self.history));
        self.snapshots.send_replace(self.history.clone());

        if let Err(e) = self.store.save(&self.history).await {
            tracing::warn!(error = %e, "Failed to persist chat history");
        }
    }

    // ========================================================================
    // Operation tasks
    // ========================================================================

    fn spawn_stream(
        backend: Arc<B>,
        identity: Identity,
        message: String,
        cancel: CancellationToken,
        tx: mpsc::UnboundedSender<OperationEvent>,
    ) {
        tokio::spawn(async move {
            let mut handler = ChannelHandler { tx };
            backend
                .stream_reply(&identity, &message, &mut handler, &cancel)
                .await;
        });
    }

    fn spawn_buffered(
        backend: Arc<B>,
        identity: Identity,
        message: String,
        cancel: CancellationToken,
        tx: mpsc::UnboundedSender<OperationEvent>,
    ) {
        tokio::spawn(async move {
            let Ok(result) = cancellable(&cancel, backend.send_message(&identity, &message)).await
            else {
                return;
            };
            let _ = tx.send(OperationEvent::Buffered(result));
        });
    }
}

impl<B: ChatBackend + 'static> Drop for ConversationController<B> {
    fn drop(&mut self) {
        self.abandon();
    }
}

impl<B: ChatBackend + 'static> std::fmt::Debug for ConversationController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationController")
            .field("backend", &self.backend.name())
            .field("identity", &self.identity)
            .field("messages", &self.history.len())
            .field("supports_stream", &self.supports_stream)
            .field("loading", &self.loading)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryHistoryStore;
    use async_trait::async_trait;

    /// Backend that never answers
    struct Silent;

    #[async_trait]
    impl ChatBackend for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn stream_reply(
            &self,
            _identity: &Identity,
            _message: &str,
            _handler: &mut (dyn ReplyHandler + Send),
            cancel: &CancellationToken,
        ) {
            cancel.cancelled().await;
        }

        async fn send_message(
            &self,
            _identity: &Identity,
            _message: &str,
        ) -> Result<BufferedReply, ChatError> {
            std::future::pending().await
        }
    }

    async fn controller(store: Arc<MemoryHistoryStore>) -> ConversationController<Silent> {
        ConversationController::restore(
            Arc::new(Silent),
            store,
            ControllerConfig::default(),
            Some(Identity::new("token", "user-1")),
        )
        .await
    }

    #[test]
    fn test_notice_selection() {
        let config = ControllerConfig::default();
        assert_eq!(config.notice_for(intent::QUOTA_EXCEEDED), config.quota_notice);
        assert_eq!(config.notice_for(intent::FALLBACK), config.fallback_notice);
        assert_eq!(config.notice_for("MODEL_DOWN"), config.fallback_notice);
    }

    #[tokio::test]
    async fn test_restore_seeds_welcome() {
        let store = Arc::new(MemoryHistoryStore::with_messages(Vec::new()));
        let ctrl = controller(store).await;

        let messages = ctrl.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, MessageId::welcome());
        assert!(ctrl.supports_stream());
        assert!(!ctrl.is_loading());
    }

    #[tokio::test]
    async fn test_snapshots_are_copy_on_write() {
        let store = Arc::new(MemoryHistoryStore::new());
        let mut ctrl = controller(store.clone()).await;
        let mut rx = ctrl.subscribe();

        let before = ctrl.messages();
        ctrl.submit("Will AI replace accountants?").await;

        assert_eq!(before.len(), 1);
        assert_eq!(ctrl.messages().len(), 3);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 3);
        assert_eq!(store.stored().map(|m| m.len()), Some(3));
        assert_eq!(ctrl.pending_path(), Some(ReplyPath::Streaming));
    }

    #[tokio::test]
    async fn test_poll_without_events() {
        let store = Arc::new(MemoryHistoryStore::new());
        let mut ctrl = controller(store).await;
        assert!(!ctrl.poll().await);

        ctrl.submit("hello").await;
        assert!(!ctrl.poll().await);
        assert!(ctrl.is_loading());

        ctrl.cancel();
        assert!(!ctrl.is_loading());
        assert!(ctrl.pending_message_id().is_none());
        assert!(!ctrl.next_event().await);
    }
}
