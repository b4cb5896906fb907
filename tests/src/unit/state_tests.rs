use crate::support::{conversation, server_error, ScriptedTransport};
use mangrove_core::orchestrator::SYSTEM_PROMPT;
use mangrove_core::state::{ConversationError, ConversationSnapshot, MessageRole};
use std::sync::Arc;

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn contents(snapshot: &ConversationSnapshot) -> Vec<(MessageRole, String)> {
    snapshot
        .messages
        .iter()
        .map(|msg| (msg.role(), msg.content().to_string()))
        .collect()
}

#[test]
fn new_conversation_is_idle_and_empty() {
    let state = conversation(Arc::new(ScriptedTransport::default()));
    assert_eq!(state.snapshot(), ConversationSnapshot::default());
    assert!(!state.is_loading());
    assert!(state.error().is_none());
}

#[test]
fn successful_exchange_appends_both_turns() {
    let runtime = test_runtime();
    let transport = Arc::new(ScriptedTransport::replying([Ok(
        "Mangroves are coastal trees...",
    )]));
    let state = conversation(transport.clone());

    runtime
        .block_on(state.submit("What are mangroves?"))
        .expect("submit accepted");

    let snapshot = state.snapshot();
    assert_eq!(
        contents(&snapshot),
        vec![
            (MessageRole::User, "What are mangroves?".to_string()),
            (MessageRole::Assistant, "Mangroves are coastal trees...".to_string()),
        ]
    );
    assert!(!snapshot.is_loading);
    assert!(snapshot.error.is_none());
}

#[test]
fn failed_exchange_keeps_user_turn_and_reports_status() {
    let runtime = test_runtime();
    let state = conversation(Arc::new(ScriptedTransport::replying([Err(server_error(
        500,
    ))])));

    runtime.block_on(state.submit("test")).expect("submit accepted");

    let snapshot = state.snapshot();
    assert_eq!(
        contents(&snapshot),
        vec![(MessageRole::User, "test".to_string())]
    );
    assert!(!snapshot.is_loading);
    assert!(snapshot.error.as_deref().unwrap().contains("500"));

    state.clear();
    assert_eq!(state.snapshot(), ConversationSnapshot::default());
    state.clear();
    assert_eq!(state.snapshot(), ConversationSnapshot::default());
}

#[test]
fn persona_is_sent_first_but_never_stored() {
    let runtime = test_runtime();
    let transport = Arc::new(ScriptedTransport::replying([
        Ok("Coastal trees."),
        Ok("In the tropics."),
    ]));
    let state = conversation(transport.clone());

    runtime.block_on(async {
        state.submit("What are mangroves?").await.unwrap();
        state.submit("Where do they grow?").await.unwrap();
    });

    assert!(state
        .messages()
        .iter()
        .all(|msg| msg.role() != MessageRole::System && msg.content() != SYSTEM_PROMPT));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.max_tokens, 500);
    }
    // The second exchange replays the first turn pair verbatim.
    let replayed: Vec<_> = requests[1].messages[1..]
        .iter()
        .map(|msg| msg.content.as_str())
        .collect();
    assert_eq!(
        replayed,
        vec!["What are mangroves?", "Coastal trees.", "Where do they grow?"]
    );
}

#[test]
fn history_grows_by_two_on_success_and_one_on_failure() {
    let runtime = test_runtime();
    let transport = Arc::new(ScriptedTransport::replying([
        Ok("first reply"),
        Err(server_error(502)),
        Ok("third reply"),
    ]));
    let state = conversation(transport);

    let mut lengths = vec![state.messages().len()];
    for question in ["one", "two", "three"] {
        runtime.block_on(state.submit(question)).unwrap();
        assert!(!state.is_loading());
        lengths.push(state.messages().len());
    }
    assert_eq!(lengths, vec![0, 2, 3, 5]);
    // The success after the failure cleared the old error.
    assert!(state.error().is_none());
}

#[test]
fn next_submission_clears_previous_error() {
    let runtime = test_runtime();
    let transport = Arc::new(
        ScriptedTransport::replying([Err(server_error(500)), Ok("recovered")]).gated(),
    );
    let state = conversation(transport.clone());

    runtime.block_on(async {
        transport.release();
        state.submit("first").await.unwrap();
        assert!(state.error().is_some());

        let mut updates = state.subscribe();
        let (submitted, observed) = futures::join!(state.submit("second"), async {
            let loading = updates
                .wait_for(|snapshot| snapshot.is_loading)
                .await
                .expect("state alive")
                .clone();
            transport.release();
            loading
        });
        submitted.unwrap();
        assert!(observed.error.is_none());
        assert_eq!(observed.messages.len(), 2);
    });
    assert_eq!(state.messages().len(), 3);
}

#[test]
fn clearing_after_any_number_of_turns_yields_empty_state() {
    let runtime = test_runtime();
    for turns in [1usize, 3] {
        let replies: Vec<_> = (0..turns).map(|_| Ok("reply")).collect();
        let state = conversation(Arc::new(ScriptedTransport::replying(replies)));
        for turn in 0..turns {
            runtime.block_on(state.submit(format!("question {turn}"))).unwrap();
        }
        assert_eq!(state.messages().len(), turns * 2);
        state.clear();
        assert_eq!(state.snapshot(), ConversationSnapshot::default());
    }
}

#[test]
fn rapid_second_submission_is_rejected_without_interleaving() {
    let runtime = test_runtime();
    let transport = Arc::new(
        ScriptedTransport::replying([Ok("reply to first"), Ok("unused")]).gated(),
    );
    let state = conversation(transport.clone());

    runtime.block_on(async {
        let mut updates = state.subscribe();
        let (first, second) = futures::join!(state.submit("first"), async {
            updates
                .wait_for(|snapshot| snapshot.is_loading)
                .await
                .expect("state alive");
            let second = state.submit("second").await;
            transport.release();
            second
        });
        assert_eq!(first, Ok(()));
        assert_eq!(second, Err(ConversationError::Busy));
    });

    assert_eq!(
        contents(&state.snapshot()),
        vec![
            (MessageRole::User, "first".to_string()),
            (MessageRole::Assistant, "reply to first".to_string()),
        ]
    );
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn set_error_surfaces_external_failures() {
    let state = conversation(Arc::new(ScriptedTransport::default()));
    state.set_error(Some("microphone unavailable".into()));
    assert_eq!(state.error().as_deref(), Some("microphone unavailable"));
    assert!(state.messages().is_empty());
    state.set_error(None);
    assert!(state.error().is_none());
}

#[test]
fn empty_content_is_forwarded_as_is() {
    let runtime = test_runtime();
    let transport = Arc::new(ScriptedTransport::replying([Ok("Ask me about mangroves.")]));
    let state = conversation(transport.clone());

    runtime.block_on(state.submit("  ")).unwrap();

    assert_eq!(state.messages()[0].content(), "  ");
    assert_eq!(transport.requests()[0].messages[1].content, "  ");
}
