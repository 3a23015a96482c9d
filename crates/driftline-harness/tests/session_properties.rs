//! Property-based tests for session-level filtering invariants.

use std::{sync::Arc, time::Duration};

use driftline_client::{ChatSession, ConnectionManager, EventDispatcher, SessionConfig};
use driftline_core::{
    Message, MessageKind, ReconnectPolicy, ServerFrame, SyncEvent, User, UserRef,
};
use driftline_harness::{SimEnv, SimTransport};
use proptest::prelude::*;
use tokio::sync::Mutex as AsyncMutex;

fn frame_strategy() -> impl Strategy<Value = ServerFrame> {
    let conversation = prop::sample::select(vec!["conv-1", "conv-2", "conv-3"]);
    let sender = prop::sample::select(vec!["alice", "bob", "carol"]);

    prop_oneof![
        3 => (conversation.clone(), sender.clone(), "m[0-9]{1,3}", 0i64..1_000).prop_map(
            |(conversation_id, sender_id, id, ts)| ServerFrame::NewMessage {
                message: Message {
                    id,
                    conversation_id: conversation_id.into(),
                    sender: UserRef::Resolved(User {
                        id: sender_id.into(),
                        username: sender_id.into(),
                        email: None,
                    }),
                    content: "payload".into(),
                    timestamp_ms: ts,
                    read_by: Vec::new(),
                    kind: MessageKind::Text,
                    edited: false,
                    edited_at_ms: None,
                },
            }
        ),
        1 => (conversation.clone(), sender.clone()).prop_map(|(c, u)| ServerFrame::UserTyping {
            conversation_id: c.into(),
            user_id: u.into(),
        }),
        1 => (conversation, sender).prop_map(|(c, u)| ServerFrame::UserStoppedTyping {
            conversation_id: c.into(),
            user_id: u.into(),
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever the server throws at it, the session's store only ever holds
    /// messages for the bound conversation, in timestamp order, and the
    /// typing set never contains the local user.
    #[test]
    fn prop_session_state_stays_scoped(frames in prop::collection::vec(frame_strategy(), 0..60)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().map_err(|e| {
            TestCaseError::fail(e.to_string())
        })?;

        rt.block_on(async move {
            let env = SimEnv::with_seed(9);
            let (transport, _handle) = SimTransport::new();
            let dispatcher = Arc::new(EventDispatcher::new());
            let manager = Arc::new(AsyncMutex::new(ConnectionManager::new(
                env.clone(),
                transport,
                dispatcher,
                ReconnectPolicy::default(),
            )));
            let mut session = ChatSession::new(
                manager,
                env.clone(),
                "alice",
                SessionConfig::default(),
            );
            session.bind("conv-1").await;

            for frame in frames {
                session.handle_event(&SyncEvent::Frame(frame)).await;
                env.advance(Duration::from_millis(10));
            }

            let store = session.messages().ok_or_else(|| {
                TestCaseError::fail("store missing after bind")
            })?;
            prop_assert!(store.messages().all(|m| m.conversation_id == "conv-1"));

            let timestamps: Vec<i64> = store.messages().map(|m| m.timestamp_ms).collect();
            prop_assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));

            prop_assert!(!session.typists().contains(&"alice"));
            Ok(())
        })?;
    }
}
