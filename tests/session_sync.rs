//! End-to-end behaviour of a sync session over the in-memory adapters.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use inbox_sync::adapters::memory::{ApiCallKind, InMemoryNotificationApi, ScriptedPushTransport};
use inbox_sync::application::{
    InboxSync, SessionDeps, SessionSettings, SessionSupervisor, SyncSession,
};
use inbox_sync::domain::foundation::{Identity, NotificationId, Timestamp, UserId};
use inbox_sync::domain::notification::{
    ConnectionState, InboxSnapshot, Notification, NotificationType, ReadFailurePolicy,
};
use inbox_sync::ports::{ApiError, LEAVE_USER_ROOM_EVENT, NEW_NOTIFICATION_EVENT};

fn identity(id: &str) -> Identity {
    Identity::new(UserId::new(id).unwrap(), format!("token-{id}"))
}

fn note(id: &str, read: bool) -> Notification {
    Notification::new(id, NotificationType::Mention, format!("message {id}")).with_read(read)
}

fn ids(snapshot: &InboxSnapshot) -> Vec<String> {
    snapshot.items.iter().map(|n| n.id.as_str().to_string()).collect()
}

fn start(
    transport: &ScriptedPushTransport,
    api: &InMemoryNotificationApi,
    settings: SessionSettings,
) -> SyncSession {
    let deps = SessionDeps::with_shared_api(Arc::new(transport.clone()), Arc::new(api.clone()));
    SyncSession::start(identity("1"), &deps, &settings).unwrap()
}

async fn wait_connected(session: &SyncSession) {
    let mut state = session.subscribe_connection();
    let _ = state.wait_for(|s| s.is_connected()).await;
}

async fn wait_for_items(session: &SyncSession, count: usize) -> InboxSnapshot {
    let mut inbox = session.inbox().subscribe();
    let snapshot = inbox.wait_for(|s| s.items.len() >= count).await.unwrap().clone();
    snapshot
}

#[tokio::test]
async fn pushed_notification_reaches_inbox_once() {
    let transport = ScriptedPushTransport::new();
    let api = InMemoryNotificationApi::new();
    let session = start(&transport, &api, SessionSettings::default());
    wait_connected(&session).await;

    let payload = json!({ "id": 7, "type": "COMMENT_REPLY", "message": "hi", "isRead": false });
    transport.push(NEW_NOTIFICATION_EVENT, payload.clone());
    transport.push(NEW_NOTIFICATION_EVENT, payload);
    transport.push(NEW_NOTIFICATION_EVENT, json!({ "id": 8, "type": "MENTION" }));

    let snapshot = wait_for_items(&session, 2).await;
    assert_eq!(ids(&snapshot), vec!["8", "7"]);
    assert_eq!(snapshot.unread_count, 2);

    session.shutdown().await;
}

#[tokio::test]
async fn malformed_push_is_shown_as_unknown() {
    let transport = ScriptedPushTransport::new();
    let session = start(&transport, &InMemoryNotificationApi::new(), SessionSettings::default());
    wait_connected(&session).await;

    transport.push(NEW_NOTIFICATION_EVENT, json!({ "type": "BRAND_NEW", "message": "?" }));

    let snapshot = wait_for_items(&session, 1).await;
    assert_eq!(snapshot.items[0].kind, NotificationType::Unknown);
    assert_eq!(snapshot.items[0].kind.icon(), "🔔");

    session.shutdown().await;
}

#[tokio::test]
async fn push_then_refresh_merges_without_duplicates() {
    let api = InMemoryNotificationApi::new();
    let inbox = InboxSync::new(Arc::new(api.clone()));

    inbox.apply_push(note("n1", false)).await;
    api.insert(note("n1", true));
    api.insert(note("n2", false));
    inbox.refresh().await.unwrap();

    let snapshot = inbox.snapshot();
    assert_eq!(ids(&snapshot), vec!["n2", "n1"]);
    assert!(snapshot.items[1].is_read);
    assert_eq!(snapshot.unread_count, 1);
}

#[tokio::test]
async fn mark_all_read_twice_issues_two_calls() {
    let api = InMemoryNotificationApi::new()
        .with_notification(note("a", false))
        .with_notification(note("b", false))
        .with_notification(note("c", false));
    let inbox = InboxSync::new(Arc::new(api.clone()));
    inbox.refresh().await.unwrap();
    assert_eq!(inbox.unread_count(), 3);

    inbox.mark_all_read().await.unwrap();
    assert_eq!(inbox.unread_count(), 0);
    assert!(inbox.snapshot().items.iter().all(|n| n.is_read));

    inbox.mark_all_read().await.unwrap();
    assert_eq!(inbox.unread_count(), 0);
    assert_eq!(api.call_count(ApiCallKind::MarkAllRead), 2);
    assert_eq!(api.server_unread(), 0);
}

#[tokio::test]
async fn double_mark_read_decrements_once() {
    let api = InMemoryNotificationApi::new()
        .with_notification(note("a", false))
        .with_notification(note("b", false));
    let inbox = Arc::new(InboxSync::new(Arc::new(api.clone())));
    inbox.refresh().await.unwrap();

    let id = NotificationId::from("a");
    let (first, second) = tokio::join!(inbox.mark_read(&id), inbox.mark_read(&id));
    assert!(first.is_ok() && second.is_ok());

    assert_eq!(inbox.unread_count(), 1);
    assert_eq!(api.call_count(ApiCallKind::MarkRead), 1);
}

#[tokio::test]
async fn read_failure_policy_is_configurable() {
    for (policy, expect_read) in [
        (ReadFailurePolicy::Rollback, false),
        (ReadFailurePolicy::KeepOptimistic, true),
    ] {
        let api = InMemoryNotificationApi::new().with_notification(note("a", false));
        let transport = ScriptedPushTransport::new();
        let settings = SessionSettings {
            read_failure_policy: policy,
            ..SessionSettings::default()
        };
        let session = start(&transport, &api, settings);
        let panel = session.open_panel().await;

        api.fail_next(ApiCallKind::MarkRead, ApiError::Status { status: 500, message: "boom".into() });
        panel.mark_read(&"a".into()).await;

        let view = panel.view(&Timestamp::now());
        assert_eq!(view.items[0].is_read, expect_read, "{policy:?}");
        assert_eq!(view.unread_count, if expect_read { 0 } else { 1 }, "{policy:?}");

        panel.close();
        session.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn polling_covers_for_a_dead_push_channel() {
    let transport = ScriptedPushTransport::new();
    transport.refuse_all();
    let api = InMemoryNotificationApi::new().with_notification(note("a", false));
    let session = start(&transport, &api, SessionSettings::default());
    let indicator = session.indicator().await;
    assert_eq!(api.call_count(ApiCallKind::UnreadCount), 1);

    let mut state = session.subscribe_connection();
    let _ = state.wait_for(|s| *s == ConnectionState::GivenUp).await;
    assert_eq!(transport.attempts(), 6);

    api.insert(note("b", false));
    tokio::time::sleep(Duration::from_secs(65)).await;

    assert_eq!(api.call_count(ApiCallKind::UnreadCount), 3);
    assert_eq!(api.call_count(ApiCallKind::ListPage), 0, "no panel open");
    assert_eq!(indicator.view().unread_count, 2);
    assert!(!indicator.view().online);

    drop(indicator);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn polling_stays_quiet_while_connected() {
    let transport = ScriptedPushTransport::new();
    let api = InMemoryNotificationApi::new();
    let session = start(&transport, &api, SessionSettings::default());
    wait_connected(&session).await;

    let _indicator = session.indicator().await;
    let _panel = session.open_panel().await;
    let before = api.calls().len();

    tokio::time::sleep(Duration::from_secs(125)).await;

    assert_eq!(api.calls().len(), before);
    assert!(session.polling().stats().skipped_connected >= 4);
    session.shutdown().await;
}

#[tokio::test]
async fn identity_change_replaces_the_session() {
    let transport = ScriptedPushTransport::new();
    let api = InMemoryNotificationApi::new();
    let deps = SessionDeps::with_shared_api(Arc::new(transport.clone()), Arc::new(api.clone()));
    let (identity_tx, identity_rx) = watch::channel(Some(identity("1")));
    let supervisor = SessionSupervisor::spawn(identity_rx, deps, SessionSettings::default());
    let mut sessions = supervisor.subscribe();

    let first = sessions.wait_for(|s| s.is_some()).await.unwrap().clone().unwrap();
    wait_connected(&first).await;
    first.inbox().apply_push(note("old", false)).await;

    identity_tx.send_replace(Some(identity("2")));
    let second = sessions
        .wait_for(|s| matches!(s, Some(s) if s.identity().user_id.as_str() == "2"))
        .await
        .unwrap()
        .clone()
        .unwrap();
    wait_connected(&second).await;

    assert!(first.is_closed());
    assert_eq!(first.connection_state(), ConnectionState::Disconnected);
    assert_eq!(transport.emitted_named(LEAVE_USER_ROOM_EVENT).len(), 1);
    assert!(second.inbox().snapshot().items.is_empty(), "no state carried over");

    identity_tx.send_replace(None);
    let _ = sessions.wait_for(|s| s.is_none()).await;
    supervisor.shutdown().await;
    assert!(second.is_closed());
}
