use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use mangrove::ConsoleApp;
use mangrove_core::config::ClientSettings;
use mangrove_core::documents::DocumentLibrary;
use mangrove_core::orchestrator::RequestOrchestrator;
use mangrove_core::state::ConversationState;
use mangrove_core::telemetry;
use mangrove_core::transport::HttpTransport;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mangrove", version, about = "Chat with the Mangrove assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    /// Base address of the chat API, e.g. http://localhost:8000/api
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Seconds to wait for a reply; 0 waits forever
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session (default)
    Chat,
    /// Ask a single question and print the reply
    Ask { question: Vec<String> },
    /// Manage the reference documents on the server
    Documents {
        #[command(subcommand)]
        action: DocumentsCommand,
    },
    /// Check that the chat API is running
    Health,
}

#[derive(Subcommand, Debug)]
enum DocumentsCommand {
    List,
    Upload { path: PathBuf },
    Delete { file_name: String },
}

fn main() -> Result<()> {
    telemetry::load_dotenv();
    telemetry::init_tracing(EnvFilter::from_default_env())?;

    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    info!(base_url = %settings.base_url, timeout = ?settings.timeout, "using chat API");

    let runtime = Runtime::new()?;
    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => runtime.block_on(chat(&settings)),
        Command::Ask { question } => runtime.block_on(ask(&settings, &question.join(" "))),
        Command::Documents { action } => runtime.block_on(documents(&settings, action)),
        Command::Health => runtime.block_on(health(&settings)),
    }
}

fn resolve_settings(cli: &Cli) -> Result<ClientSettings> {
    let mut settings = ClientSettings::load().map_err(|err| anyhow!(err.user_message()))?;
    let timeout = cli.timeout_secs.map(|secs| secs.to_string());
    settings
        .apply_overrides(cli.base_url.as_deref(), timeout.as_deref())
        .map_err(|err| anyhow!(err.user_message()))?;
    Ok(settings)
}

fn conversation(settings: &ClientSettings) -> ConversationState {
    let transport = Arc::new(HttpTransport::new(&settings.base_url));
    let orchestrator = RequestOrchestrator::new(transport).with_timeout(settings.timeout);
    ConversationState::new(orchestrator)
}

async fn chat(settings: &ClientSettings) -> Result<()> {
    println!("Ask about mangroves. /clear starts over, /cancel drops a pending reply, /quit exits.");
    let mut app = ConsoleApp::new(conversation(settings));
    let input = BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();
    app.run(input, &mut out).await
}

async fn ask(settings: &ClientSettings, question: &str) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        return Err(anyhow!("nothing to ask"));
    }
    let app = ConsoleApp::new(conversation(settings));
    let reply = app.ask(question).await?;
    println!("{reply}");
    Ok(())
}

async fn documents(settings: &ClientSettings, action: DocumentsCommand) -> Result<()> {
    let library = DocumentLibrary::new(&settings.base_url);
    let mut out = std::io::stdout();
    match action {
        DocumentsCommand::List => {
            let names = library.list().await?;
            if names.is_empty() {
                writeln!(out, "no documents loaded")?;
            }
            for name in names {
                writeln!(out, "{name}")?;
            }
        }
        DocumentsCommand::Upload { path } => {
            let receipt = library.upload(&path).await?;
            writeln!(out, "{} ({} chunks)", receipt.message, receipt.num_chunks)?;
        }
        DocumentsCommand::Delete { file_name } => {
            writeln!(out, "{}", library.delete(&file_name).await?)?;
        }
    }
    Ok(())
}

async fn health(settings: &ClientSettings) -> Result<()> {
    let status = DocumentLibrary::new(&settings.base_url).health().await?;
    println!("{}: {}", status.status, status.message);
    Ok(())
}
