pub mod config;
pub mod documents;
pub mod orchestrator;
pub mod state;
pub mod telemetry;
pub mod transition;
pub mod transport;

pub use config::{ClientConfigError, ClientSettings};
pub use documents::{DocumentError, DocumentLibrary};
pub use orchestrator::{ExchangeError, RequestOrchestrator};
pub use state::{
    ChatMessage, ConversationError, ConversationSnapshot, ConversationState, MessageRole,
};
pub use transport::{FaultKind, HttpTransport, Transport, TransportError};
