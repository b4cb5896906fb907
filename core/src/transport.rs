use crate::state::{ChatMessage, MessageRole};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use url::Url;

/// One entry of the transmitted message list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireMessage {
    pub role: MessageRole,
    pub content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role(),
            content: message.content().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The exchange never completed.
    Transport,
    /// The exchange completed but its result signals failure.
    Protocol,
    /// The caller gave up on the exchange (timeout or cancellation).
    Aborted,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not reach the chat service: {cause}")]
    Unreachable { cause: String },
    #[error("{}", describe_status(.status, .detail))]
    Status { status: u16, detail: Option<String> },
    #[error("chat service sent an unreadable response (status {status}): {cause}")]
    MalformedBody { status: u16, cause: String },
}

impl TransportError {
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Unreachable { .. } => FaultKind::Transport,
            Self::Status { .. } | Self::MalformedBody { .. } => FaultKind::Protocol,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unreachable { .. } => None,
            Self::Status { status, .. } | Self::MalformedBody { status, .. } => Some(*status),
        }
    }

    pub(crate) fn unreachable(err: reqwest::Error) -> Self {
        Self::Unreachable {
            cause: error_chain(&err),
        }
    }
}

fn describe_status(status: &u16, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!("{detail} (status {status})"),
        None => format!("chat request failed with status {status}"),
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut description = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !description.contains(&text) {
            description.push_str(": ");
            description.push_str(&text);
        }
        source = cause.source();
    }
    description
}

/// A single request/response call to the inference endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(base_url: &Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &Url) -> Self {
        Self {
            client,
            endpoint: endpoint(base_url, "chat"),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError> {
        tracing::debug!(
            url = %self.endpoint,
            messages = request.messages.len(),
            "sending chat request"
        );
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(TransportError::unreachable)?;
        decode_json(response).await
    }
}

/// Appends `path` to the base address, keeping any path prefix the base
/// carries (`http://host/api` + `chat` is `http://host/api/chat`).
pub(crate) fn endpoint(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    let joined = format!(
        "{}/{}",
        base_url.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url
}

/// Maps a non-success status to [`TransportError::Status`] and parses a
/// success body into `T`.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: Response,
) -> Result<T, TransportError> {
    let status = response.status();
    let body = response.text().await.map_err(TransportError::unreachable)?;
    decode_body(status, &body)
}

pub(crate) fn decode_body<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<T, TransportError> {
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            detail: error_detail(body),
        });
    }
    serde_json::from_str(body).map_err(|err| TransportError::MalformedBody {
        status: status.as_u16(),
        cause: err.to_string(),
    })
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Value,
}

fn error_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        Value::String(text) if !text.trim().is_empty() => Some(text),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}
