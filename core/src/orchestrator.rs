use crate::state::{ChatMessage, MessageRole};
use crate::transport::{ChatRequest, FaultKind, Transport, TransportError, WireMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Persona prelude sent ahead of the history on every exchange.
pub const SYSTEM_PROMPT: &str = "You are the Mangrove assistant, a friendly guide to mangrove \
ecosystems. Answer questions about mangrove ecology, species, conservation and restoration \
using the reference documents available to you. Keep answers accurate and concise, say so \
when the documents do not cover a question, and politely steer unrelated conversations back \
to mangroves.";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("the chat service did not answer within {} seconds", .0.as_secs_f32())]
    TimedOut(Duration),
    #[error("request cancelled")]
    Cancelled,
}

impl ExchangeError {
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Transport(err) => err.kind(),
            Self::TimedOut(_) | Self::Cancelled => FaultKind::Aborted,
        }
    }
}

/// Turns a message history into a wire request and the wire outcome back
/// into reply text.
#[derive(Clone)]
pub struct RequestOrchestrator {
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
}

impl RequestOrchestrator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// `None` lets an exchange run until the transport gives up on its own.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn build_request(&self, history: &[ChatMessage]) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage {
            role: MessageRole::System,
            content: SYSTEM_PROMPT.to_string(),
        });
        messages.extend(history.iter().map(WireMessage::from));
        ChatRequest {
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub async fn exchange(
        &self,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        let request = self.build_request(history);
        let send = self.transport.send(&request);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExchangeError::Cancelled),
            result = with_deadline(self.timeout, send) => result,
        };
        match &outcome {
            Ok(_) => tracing::debug!(turns = history.len(), "exchange completed"),
            Err(err) => tracing::warn!(kind = ?err.kind(), error = %err, "exchange failed"),
        }
        outcome
    }
}

async fn with_deadline<F>(timeout: Option<Duration>, send: F) -> Result<String, ExchangeError>
where
    F: std::future::Future<Output = Result<crate::transport::ChatResponse, TransportError>>,
{
    let response = match timeout {
        Some(limit) => tokio::time::timeout(limit, send)
            .await
            .map_err(|_| ExchangeError::TimedOut(limit))??,
        None => send.await?,
    };
    Ok(response.response)
}
