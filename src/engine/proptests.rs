//! Property-based tests for the engine
//!
//! Each case drives a real engine over mocks on a fresh runtime.

use super::testing::*;
use super::*;
use crate::model::Role;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::User), Just(Role::Assistant), Just(Role::System)]
}

fn arb_history() -> impl Strategy<Value = Thread> {
    proptest::collection::vec((arb_role(), "[a-zA-Z0-9 ]{1,40}"), 0..12).prop_map(|entries| {
        let messages = entries
            .into_iter()
            .map(|(role, text)| server_message(role, &text))
            .collect();
        Thread::with_messages("prop-thread", messages)
    })
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9?!]{1,20}( [a-zA-Z0-9?!]{1,20}){0,4}"
}

fn arb_terminal_error() -> impl Strategy<Value = ThreadError> {
    prop_oneof![
        "[a-z ]{1,30}".prop_map(ThreadError::transport),
        "[a-z ]{1,30}".prop_map(ThreadError::validation),
    ]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // A failed send leaves the conversation exactly as it was
    #[test]
    fn prop_failed_send_restores_history(
        history in arb_history(),
        text in arb_text(),
        error in arb_terminal_error(),
    ) {
        let (before, after, recorded) = run(async {
            let transport = Arc::new(MockTransport::new());
            let store = Arc::new(InMemoryStore::with_thread(history));
            let engine = ThreadEngine::restore(Arc::clone(&transport), Arc::clone(&store)).await;
            let before = engine.thread();

            transport.queue_send_error(error.clone());
            let result = engine.send_message(&text).await;
            assert!(result.is_err());
            (before, engine.thread(), engine.error())
        });

        prop_assert_eq!(before, after);
        prop_assert_eq!(recorded, Some(error.message));
    }

    // Every confirmed send adds exactly the user message and its reply
    #[test]
    fn prop_sends_append_in_order(
        history in arb_history(),
        texts in proptest::collection::vec(arb_text(), 1..6),
    ) {
        let prior = history.messages().to_vec();
        let sent = texts.clone();
        let thread = run(async {
            let transport = Arc::new(MockTransport::new());
            let store = Arc::new(InMemoryStore::with_thread(history));
            let engine = ThreadEngine::restore(Arc::clone(&transport), Arc::clone(&store)).await;
            for text in &sent {
                let outcome = engine.send_message(text).await.unwrap();
                assert!(matches!(outcome, SendOutcome::Sent { .. }));
            }
            engine.thread().unwrap()
        });

        let messages = thread.messages();
        prop_assert_eq!(messages.len(), prior.len() + 2 * texts.len());
        prop_assert_eq!(&messages[..prior.len()], &prior[..]);

        for (pair, text) in messages[prior.len()..].chunks(2).zip(&texts) {
            prop_assert_eq!(pair[0].role, Role::User);
            prop_assert_eq!(&pair[0].content, text);
            prop_assert_eq!(pair[1].role, Role::Assistant);
            prop_assert_eq!(&pair[1].content, &format!("reply to {text}"));
        }
    }
}
