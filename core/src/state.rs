use crate::orchestrator::{ExchangeError, RequestOrchestrator};
use crate::transition::{transition, Effect, Event, TransitionError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single conversation turn. Fields are fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    id: Uuid,
    role: MessageRole,
    content: String,
    created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// What presentation sees after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Bumped on every accepted submission and every clear.
    pub generation: u64,
}

impl Conversation {
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.messages.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    #[error("a reply is still pending; wait for it or cancel it first")]
    Busy,
    #[error(transparent)]
    Transition(TransitionError),
}

/// The session's conversation. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct ConversationState {
    inner: Arc<Mutex<InnerState>>,
    updates: Arc<watch::Sender<ConversationSnapshot>>,
    orchestrator: RequestOrchestrator,
}

#[derive(Default)]
struct InnerState {
    conversation: Conversation,
    in_flight: Option<CancellationToken>,
}

impl ConversationState {
    pub fn new(orchestrator: RequestOrchestrator) -> Self {
        let (updates, _) = watch::channel(ConversationSnapshot::default());
        Self {
            inner: Arc::new(Mutex::new(InnerState::default())),
            updates: Arc::new(updates),
            orchestrator,
        }
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.inner.lock().conversation.snapshot()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().conversation.messages.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().conversation.is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().conversation.error.clone()
    }

    /// Watches the latest snapshot. Transitions that land in quick
    /// succession may reach a receiver as a single update, so compare
    /// message ids rather than counts to spot a reset.
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.updates.subscribe()
    }

    /// Appends `content` as a user turn and waits for the paired reply.
    ///
    /// The content is recorded exactly as given: trimming and rejecting empty
    /// input is the caller's job. A failed exchange is not an `Err`; it lands
    /// in [`ConversationState::error`] with the user turn kept in place.
    /// Returns [`ConversationError::Busy`] without touching the state when an
    /// earlier submission has not resolved yet.
    ///
    /// Dropping the returned future before it completes resolves the
    /// submission as cancelled.
    pub async fn submit(&self, content: impl Into<String>) -> Result<(), ConversationError> {
        let (guard, history) = {
            let mut inner = self.inner.lock();
            let result = transition(
                &inner.conversation,
                Event::Submit {
                    content: content.into(),
                },
            )
            .map_err(|err| match err {
                TransitionError::Busy => {
                    tracing::debug!("submission rejected while a reply is pending");
                    ConversationError::Busy
                }
                other => ConversationError::Transition(other),
            })?;
            let Some((generation, history)) =
                result.effects.into_iter().find_map(|effect| match effect {
                    Effect::RequestExchange {
                        generation,
                        history,
                    } => Some((generation, history)),
                    Effect::CancelExchange => None,
                })
            else {
                unreachable!("an accepted submission always requests an exchange");
            };
            let cancel = CancellationToken::new();
            inner.in_flight = Some(cancel.clone());
            inner.conversation = result.new_state;
            self.publish(&inner.conversation);
            let guard = PendingExchange {
                state: self,
                generation,
                cancel,
                settled: false,
            };
            (guard, history)
        };

        tracing::info!(
            generation = guard.generation,
            turns = history.len(),
            "submitting user turn"
        );
        let outcome = self.orchestrator.exchange(&history, &guard.cancel).await;
        guard.settle(outcome);
        Ok(())
    }

    fn resolve(&self, generation: u64, outcome: Result<String, ExchangeError>) {
        let mut inner = self.inner.lock();
        match transition(
            &inner.conversation,
            Event::Resolved {
                generation,
                outcome,
            },
        ) {
            Ok(result) => {
                inner.in_flight = None;
                inner.conversation = result.new_state;
                self.publish(&inner.conversation);
            }
            Err(err) => tracing::debug!(%err, "discarding stale exchange result"),
        }
    }

    /// Empties the conversation. An exchange still in flight is cancelled and
    /// its result dropped.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if let Ok(result) = transition(&inner.conversation, Event::Clear) {
            for effect in &result.effects {
                if matches!(effect, Effect::CancelExchange) {
                    if let Some(token) = inner.in_flight.take() {
                        token.cancel();
                    }
                }
            }
            inner.conversation = result.new_state;
            self.publish(&inner.conversation);
        }
    }

    pub fn set_error(&self, error: Option<String>) {
        let mut inner = self.inner.lock();
        if let Ok(result) = transition(&inner.conversation, Event::SetError(error)) {
            inner.conversation = result.new_state;
            self.publish(&inner.conversation);
        }
    }

    /// Aborts the pending exchange, which then resolves as a failure.
    /// Returns `false` when nothing was in flight.
    pub fn cancel(&self) -> bool {
        let inner = self.inner.lock();
        match &inner.in_flight {
            Some(token) if inner.conversation.is_loading => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    fn publish(&self, conversation: &Conversation) {
        self.updates.send_replace(conversation.snapshot());
    }
}

/// Resolves its submission as cancelled if dropped before `settle`.
struct PendingExchange<'a> {
    state: &'a ConversationState,
    generation: u64,
    cancel: CancellationToken,
    settled: bool,
}

impl PendingExchange<'_> {
    fn settle(mut self, outcome: Result<String, ExchangeError>) {
        self.settled = true;
        self.state.resolve(self.generation, outcome);
    }
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::debug!(generation = self.generation, "submission dropped before its reply");
        self.cancel.cancel();
        self.state.resolve(self.generation, Err(ExchangeError::Cancelled));
    }
}
