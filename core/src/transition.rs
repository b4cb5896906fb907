//! Pure state transitions for a conversation.
//!
//! Given the same state and event this always yields the same new state and
//! effects; running the effects is left to [`crate::state::ConversationState`].

use crate::orchestrator::ExchangeError;
use crate::state::{ChatMessage, Conversation, MessageRole};
use thiserror::Error;

#[derive(Debug)]
pub enum Event {
    /// The user submitted a turn.
    Submit { content: String },
    /// The exchange tagged with `generation` finished.
    Resolved {
        generation: u64,
        outcome: Result<String, ExchangeError>,
    },
    Clear,
    SetError(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start an exchange carrying the full post-append history.
    RequestExchange {
        generation: u64,
        history: Vec<ChatMessage>,
    },
    /// Abort whatever exchange is in flight.
    CancelExchange,
}

#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: Conversation,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: Conversation) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("a reply is still pending; wait for it or cancel it first")]
    Busy,
    #[error("exchange {generation} no longer belongs to this conversation (now at {current})")]
    StaleExchange { generation: u64, current: u64 },
}

pub fn transition(state: &Conversation, event: Event) -> Result<TransitionResult, TransitionError> {
    match event {
        Event::Submit { .. } if state.is_loading => Err(TransitionError::Busy),

        // Content is taken verbatim; callers own trimming and emptiness checks.
        Event::Submit { content } => {
            let mut next = state.clone();
            next.messages.push(ChatMessage::new(MessageRole::User, content));
            next.is_loading = true;
            next.error = None;
            next.generation += 1;
            let effect = Effect::RequestExchange {
                generation: next.generation,
                history: next.messages.clone(),
            };
            Ok(TransitionResult::new(next).with_effect(effect))
        }

        Event::Resolved { generation, .. }
            if generation != state.generation || !state.is_loading =>
        {
            Err(TransitionError::StaleExchange {
                generation,
                current: state.generation,
            })
        }

        Event::Resolved { outcome, .. } => {
            let mut next = state.clone();
            next.is_loading = false;
            match outcome {
                Ok(reply) => {
                    next.messages.push(ChatMessage::new(MessageRole::Assistant, reply));
                    next.error = None;
                }
                Err(err) => next.error = Some(err.to_string()),
            }
            Ok(TransitionResult::new(next))
        }

        Event::Clear => {
            let next = Conversation {
                messages: Vec::new(),
                is_loading: false,
                error: None,
                generation: state.generation + 1,
            };
            let result = TransitionResult::new(next);
            if state.is_loading {
                Ok(result.with_effect(Effect::CancelExchange))
            } else {
                Ok(result)
            }
        }

        Event::SetError(error) => {
            let mut next = state.clone();
            next.error = error;
            Ok(TransitionResult::new(next))
        }
    }
}
