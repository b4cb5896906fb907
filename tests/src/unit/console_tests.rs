use crate::support::{conversation, server_error, ScriptedTransport};
use mangrove::ui::CLEARED;
use mangrove::ConsoleApp;
use std::sync::Arc;

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn run_console(app: &mut ConsoleApp, input: &str) -> String {
    let runtime = test_runtime();
    let mut out = Vec::new();
    runtime
        .block_on(app.run(input.as_bytes(), &mut out))
        .expect("console run");
    String::from_utf8(out).expect("utf8 output")
}

#[test]
fn console_prints_question_reply_and_skips_blank_lines() {
    let transport = Arc::new(ScriptedTransport::replying([Ok(
        "Mangroves are coastal trees...",
    )]));
    let mut app = ConsoleApp::new(conversation(transport.clone()));

    let output = run_console(&mut app, "\n   \nWhat are mangroves?\n");

    assert!(output.contains("You: What are mangroves?"));
    assert!(output.contains("Mangrove: Mangroves are coastal trees..."));
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(app.state().messages().len(), 2);
}

#[test]
fn console_reports_failures() {
    let transport = Arc::new(ScriptedTransport::replying([Err(server_error(500))]));
    let mut app = ConsoleApp::new(conversation(transport));

    let output = run_console(&mut app, "test\n");

    assert!(output.contains("You: test"));
    assert!(output.contains("error: chat request failed with status 500"));
    assert!(!app.state().is_loading());
}

#[test]
fn console_clear_and_quit() {
    let transport = Arc::new(ScriptedTransport::default());
    let mut app = ConsoleApp::new(conversation(transport.clone()));
    app.state().set_error(Some("stale".into()));

    let output = run_console(&mut app, "/cancel\n/clear\n/quit\nnever sent\n");

    assert!(output.contains("nothing to cancel"));
    assert!(app.state().error().is_none());
    assert!(transport.requests().is_empty());
    assert!(!output.contains(CLEARED));
}

#[test]
fn ask_returns_reply_or_error() {
    let runtime = test_runtime();
    let ok = ConsoleApp::new(conversation(Arc::new(ScriptedTransport::replying([Ok(
        "Roots that breathe.",
    )]))));
    assert_eq!(
        runtime.block_on(ok.ask("What are pneumatophores?")).unwrap(),
        "Roots that breathe."
    );

    let failing = ConsoleApp::new(conversation(Arc::new(ScriptedTransport::replying([
        Err(server_error(503)),
    ]))));
    let err = runtime.block_on(failing.ask("hello")).unwrap_err();
    assert!(err.to_string().contains("503"));
}
