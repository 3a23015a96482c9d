//! Conversation reconciliation against scripted gateways and live events.

use std::sync::Arc;

use driftline_client::{
    ConversationGateway, EventDispatcher, GatewayError, NotificationSink, Severity,
};
use driftline_core::{
    Conversation, ConversationFilter, ConversationStore, EventKind, LifecycleEvent, Message,
    MessageKind, PageInfo, ServerFrame, SyncEvent, User, UserRef,
};
use driftline_harness::{RecordingSink, ScriptedConversationGateway};

fn user(id: &str, name: &str) -> UserRef {
    UserRef::Resolved(User { id: id.into(), username: name.into(), email: None })
}

fn conversation(id: &str, activity: i64, unread: u32) -> Conversation {
    Conversation {
        id: id.into(),
        participants: vec![user("alice", "alice"), user("bob", "bob")],
        is_group: false,
        group_name: None,
        last_message: None,
        last_activity_ms: activity,
        unread_count: unread,
    }
}

fn inbound(conversation_id: &str, sender: &str, ts: i64) -> SyncEvent {
    SyncEvent::Frame(ServerFrame::NewMessage {
        message: Message {
            id: format!("m-{ts}"),
            conversation_id: conversation_id.into(),
            sender: user(sender, sender),
            content: "hello".into(),
            timestamp_ms: ts,
            read_by: Vec::new(),
            kind: MessageKind::Text,
            edited: false,
            edited_at_ms: None,
        },
    })
}

/// Load one listing page through the gateway seam into the store.
async fn load_page(
    store: &mut ConversationStore,
    gateway: &ScriptedConversationGateway,
    page: u32,
    limit: u32,
) -> Result<(), GatewayError> {
    let user_id = store.user_id().to_owned();
    let ticket = store.begin_page_load(page, limit);
    match gateway.list_conversations(&user_id, page, limit).await {
        Ok((items, info)) => {
            store.apply_page(&ticket, items, info);
            Ok(())
        },
        Err(error) => {
            store.fail_page_load(&ticket, error.to_string());
            Err(error)
        },
    }
}

#[tokio::test]
async fn listing_pages_merge_and_track_has_more() {
    let gateway = ScriptedConversationGateway::new();
    gateway.put_page(
        "alice",
        1,
        vec![conversation("c1", 100, 2), conversation("c2", 200, 0)],
        Some(PageInfo { page: 1, limit: 2, total: 3, has_more: true }),
    );
    gateway.put_page(
        "alice",
        2,
        vec![conversation("c3", 50, 1)],
        Some(PageInfo { page: 2, limit: 2, total: 3, has_more: false }),
    );

    let mut store = ConversationStore::new("alice");
    load_page(&mut store, &gateway, 1, 2).await.unwrap();
    assert!(store.has_more());

    load_page(&mut store, &gateway, 2, 2).await.unwrap();
    assert!(!store.has_more());

    let ids: Vec<&str> = store.conversations().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["c2", "c1", "c3"], "most recent activity first");
    assert_eq!(store.total_unread(), 3);
}

#[tokio::test]
async fn listing_failure_attaches_scoped_fault_and_retries() {
    let gateway = ScriptedConversationGateway::new();
    gateway.fail_next(GatewayError::Unavailable("connect timeout".into()));
    gateway.put_page("alice", 1, vec![conversation("c1", 100, 0)], None);

    let mut store = ConversationStore::new("alice");
    assert!(load_page(&mut store, &gateway, 1, 50).await.is_err());
    assert!(store.last_error().is_some());
    assert!(store.is_empty());

    load_page(&mut store, &gateway, 1, 50).await.unwrap();
    assert!(store.last_error().is_none());
    assert_eq!(store.len(), 1);
}

#[test]
fn unread_counts_stay_current_without_an_open_conversation() {
    let mut store = ConversationStore::new("alice");
    store.upsert(conversation("c1", 100, 0));
    store.upsert(conversation("c2", 200, 0));

    // No message store is alive; the conversation reconciler consumes the
    // dispatched events on its own.
    store.handle_event(&inbound("c1", "bob", 300));
    store.handle_event(&inbound("c1", "bob", 301));
    store.handle_event(&inbound("c2", "bob", 302));

    assert_eq!(store.get("c1").map(|c| c.unread_count), Some(2));
    assert_eq!(store.get("c2").map(|c| c.unread_count), Some(1));
    assert_eq!(store.total_unread(), 3);

    // Activity reordering followed the traffic.
    let ids: Vec<&str> = store.conversations().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["c2", "c1"]);

    // The user's own read event clears the counter.
    store.handle_event(&SyncEvent::Frame(ServerFrame::MessageRead {
        conversation_id: "c1".into(),
        message_ids: vec!["m-300".into(), "m-301".into()],
        reader: "alice".into(),
        read_at_ms: 400,
    }));
    assert_eq!(store.get("c1").map(|c| c.unread_count), Some(0));
}

#[test]
fn filters_are_pure_and_combine() {
    let mut store = ConversationStore::new("alice");
    store.upsert(conversation("dm-unread", 100, 3));
    let mut group = conversation("group", 200, 0);
    group.is_group = true;
    group.group_name = Some("launch".into());
    group.participants.push(user("carol", "carol"));
    store.upsert(group);

    let unread = store.filter(&ConversationFilter { unread_only: true, ..Default::default() });
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, "dm-unread");

    let carol_groups = store.filter(&ConversationFilter {
        groups_only: true,
        participant: Some("carol".into()),
        ..Default::default()
    });
    assert_eq!(carol_groups.len(), 1);

    let stale = store.filter(&ConversationFilter {
        active_before_ms: Some(150),
        ..Default::default()
    });
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, "dm-unread");
}

#[tokio::test]
async fn conversation_crud_round_trips_through_the_gateway() {
    let gateway = ScriptedConversationGateway::new();
    let mut store = ConversationStore::new("alice");

    let created = gateway
        .create_conversation(vec![user("alice", "alice"), user("bob", "bob")], false, None)
        .await
        .unwrap();
    store.upsert(created.clone());
    assert!(store.get(&created.id).is_some());

    gateway.delete_conversation(&created.id).await.unwrap();
    store.remove(&created.id).unwrap();
    assert!(store.is_empty());
    assert_eq!(gateway.deleted(), vec![created.id]);
}

#[test]
fn lifecycle_consumers_can_drive_a_notification_sink() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let sink = RecordingSink::new();
    {
        let sink = sink.clone();
        dispatcher.on(EventKind::MaxAttemptsReached, move |_| {
            sink.notify("connection lost; tap to retry", Severity::Error);
        });
    }

    dispatcher.emit(&SyncEvent::Lifecycle(LifecycleEvent::MaxAttemptsReached { attempts: 5 }));
    let recorded = sink.notifications();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].1, Severity::Error);
}
