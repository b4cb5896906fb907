use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use mangrove_core::orchestrator::{RequestOrchestrator, SYSTEM_PROMPT};
use mangrove_core::state::ConversationState;
use mangrove_core::telemetry;
use mangrove_core::transport::{ChatRequest, ChatResponse, Transport, TransportError};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Mangrove")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lightweight smoke test that exercises the Mangrove core logic.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

/// Answers with the number of turns it was sent, failing on "fail".
struct LoopbackTransport;

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError> {
        if request.messages.first().map(|m| m.content.as_str()) != Some(SYSTEM_PROMPT) {
            return Err(TransportError::Status {
                status: 400,
                detail: Some("persona missing".into()),
            });
        }
        match request.messages.last() {
            Some(last) if last.content == "fail" => Err(TransportError::Status {
                status: 500,
                detail: None,
            }),
            _ => Ok(ChatResponse {
                response: format!("received {} turns", request.messages.len() - 1),
            }),
        }
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let state = ConversationState::new(RequestOrchestrator::new(Arc::new(LoopbackTransport)));

    runtime.block_on(state.submit("ping from xtask"))?;
    runtime.block_on(state.submit("fail"))?;
    let snapshot = state.snapshot();
    info!(
        "messages" = snapshot.messages.len(),
        "error" = ?snapshot.error,
        "smoke test conversation finished"
    );
    if snapshot.messages.len() != 3 || snapshot.error.is_none() || snapshot.is_loading {
        bail!("unexpected conversation state: {snapshot:?}");
    }

    state.clear();
    if state.snapshot() != Default::default() {
        bail!("clear left state behind");
    }
    Ok(())
}
