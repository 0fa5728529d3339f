use super::chat::{ChatRoom, ModerationAction};
use super::notifications::NotificationFeed;
use super::push_bounded;
use super::stream_health::{AlertSeverity, HealthStatus, HealthSummary, StreamHealthMonitor};
use crate::client::RealtimeClient;
use crate::config::{AdapterSettings, ConnectionSettings};
use crate::transport::message::Envelope;
use crate::transport::status::ConnectionStatus;
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

fn offline_client() -> RealtimeClient {
    RealtimeClient::new(&ConnectionSettings::default()).unwrap()
}

fn deliver(client: &RealtimeClient, topic: &str, payload: Value) {
    client.router().dispatch(&Envelope::new(topic, payload));
}

fn chat_message(n: usize, event_id: &str) -> Value {
    json!({ "id": format!("m{n}"), "eventId": event_id, "message": format!("message {n}") })
}

#[test]
fn test_push_bounded_drops_oldest() {
    let mut items = VecDeque::new();
    for n in 0..5 {
        push_bounded(&mut items, n, 3);
    }
    assert_eq!(items, VecDeque::from(vec![2, 3, 4]));
}

#[test]
fn test_chat_keeps_the_most_recent_200_messages() {
    let client = offline_client();
    let room = ChatRoom::join(&client, "e1", &AdapterSettings::default());

    for n in 0..250 {
        deliver(&client, "chat.message", chat_message(n, "e1"));
    }

    let messages = room.messages();
    assert_eq!(messages.len(), 200);
    assert_eq!(messages.first().unwrap().id, "m50");
    assert_eq!(messages.last().unwrap().id, "m249");
}

#[test]
fn test_chat_ignores_other_events_and_bad_payloads() {
    let client = offline_client();
    let room = ChatRoom::join(&client, "e1", &AdapterSettings::default());

    deliver(&client, "chat.message", chat_message(1, "e2"));
    deliver(&client, "chat.message", json!({ "id": "m2" }));
    deliver(&client, "chat.message", chat_message(3, "e1"));

    let ids: Vec<String> = room.messages().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["m3"]);
}

#[test]
fn test_chat_moderation_tombstones_in_place() {
    let client = offline_client();
    let room = ChatRoom::join(&client, "e1", &AdapterSettings::default());
    for n in 0..3 {
        deliver(&client, "chat.message", chat_message(n, "e1"));
    }

    deliver(
        &client,
        "chat.moderation",
        json!({ "eventId": "e1", "messageId": "m1", "action": "delete" }),
    );
    // timeouts do not remove messages
    deliver(
        &client,
        "chat.moderation",
        json!({ "eventId": "e1", "messageId": "m2", "action": "timeout" }),
    );
    // unknown message id is harmless
    deliver(
        &client,
        "chat.moderation",
        json!({ "eventId": "e1", "messageId": "missing", "action": "hide" }),
    );

    let messages = room.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(
        messages.iter().map(|m| m.deleted).collect::<Vec<_>>(),
        vec![false, true, false]
    );
    assert_eq!(messages[1].message, "message 1");
}

#[test]
fn test_chat_tracks_room_status_and_unsubscribes_on_drop() {
    let client = offline_client();
    let room = ChatRoom::join(&client, "e1", &AdapterSettings::default());
    deliver(
        &client,
        "chat.status",
        json!({ "eventId": "e1", "status": "slow_mode", "slowModeSecs": 10 }),
    );
    let status = room.status().unwrap();
    assert_eq!(status.status, "slow_mode");
    assert_eq!(status.slow_mode_secs, Some(10));

    // commands fail quietly while offline
    assert!(!room.send_message("hello"));
    assert!(!room.moderate("m1", ModerationAction::Delete, Some("spam")));

    assert_eq!(client.router().subscriber_count("chat.message"), 1);
    room.leave();
    assert_eq!(client.router().subscriber_count("chat.message"), 0);
    assert_eq!(client.router().subscriber_count("chat.moderation"), 0);
    assert_eq!(client.router().subscriber_count("chat.status"), 0);
}

fn notification(id: &str) -> Value {
    json!({ "id": id, "type": "billing", "title": format!("title {id}") })
}

#[test]
fn test_notifications_are_capped_at_50_newest_first() {
    let client = offline_client();
    let feed = NotificationFeed::subscribe(&client, &AdapterSettings::default());

    for n in 0..60 {
        deliver(&client, "notification.new", notification(&format!("n{n}")));
    }

    let items = feed.notifications();
    assert_eq!(items.len(), 50);
    assert_eq!(items.first().unwrap().id, "n59");
    assert_eq!(items.last().unwrap().id, "n10");
    assert_eq!(items[0].kind.as_deref(), Some("billing"));
    assert_eq!(feed.unread_count(), 60);
}

#[test]
fn test_notification_unread_count_never_goes_negative() {
    let client = offline_client();
    let feed = NotificationFeed::subscribe(&client, &AdapterSettings::default());

    deliver(&client, "notification.new", notification("a"));
    deliver(&client, "notification.new", notification("b"));
    assert_eq!(feed.unread_count(), 2);

    deliver(&client, "notification.update", json!({ "id": "a", "read": true }));
    // repeated read of the same notification does not count twice
    deliver(&client, "notification.update", json!({ "id": "a", "read": true }));
    assert_eq!(feed.unread_count(), 1);

    feed.mark_read("b");
    assert_eq!(feed.unread_count(), 0);

    // reads for unknown ids stop at zero
    deliver(&client, "notification.update", json!({ "id": "zzz", "read": true }));
    feed.mark_read("yyy");
    assert_eq!(feed.unread_count(), 0);
    assert!(feed.notifications().iter().all(|n| n.read));
}

#[test]
fn test_notification_read_of_evicted_item_counts_once() {
    let client = offline_client();
    let feed = NotificationFeed::subscribe(&client, &AdapterSettings::default());

    for n in 0..51 {
        deliver(&client, "notification.new", notification(&format!("n{n}")));
    }
    assert_eq!(feed.notifications().len(), 50);
    assert_eq!(feed.unread_count(), 51);

    // n0 was evicted; the local mark and the server echo are one read
    feed.mark_read("n0");
    deliver(&client, "notification.update", json!({ "id": "n0", "read": true }));
    deliver(&client, "notification.bulk_read", json!({ "ids": ["n0"] }));
    assert_eq!(feed.unread_count(), 50);

    // retained items still count down normally
    feed.mark_read("n50");
    assert_eq!(feed.unread_count(), 49);
}

#[test]
fn test_notification_bulk_read_and_updates() {
    let client = offline_client();
    let feed = NotificationFeed::subscribe(&client, &AdapterSettings::default());
    for id in ["a", "b", "c"] {
        deliver(&client, "notification.new", notification(id));
    }

    deliver(&client, "notification.bulk_read", json!({ "ids": ["a", "c"] }));
    assert_eq!(feed.unread_count(), 1);

    deliver(
        &client,
        "notification.update",
        json!({ "id": "b", "title": "renamed", "read": false }),
    );
    assert_eq!(feed.unread_count(), 1);
    let b = feed.notifications().into_iter().find(|n| n.id == "b").unwrap();
    assert_eq!(b.title, "renamed");

    deliver(&client, "notification.bulk_read", json!({}));
    assert_eq!(feed.unread_count(), 0);

    deliver(&client, "notification.new", notification("d"));
    assert_eq!(feed.unread_count(), 1);
    feed.mark_all_read();
    assert_eq!(feed.unread_count(), 0);
}

fn health(stream_id: &str, status: &str, fps: f64) -> Value {
    json!({ "streamId": stream_id, "status": status, "fps": fps })
}

fn alert(stream_id: &str, n: usize) -> Value {
    json!({
        "streamId": stream_id,
        "alertId": format!("a{n}"),
        "severity": "warning",
        "message": format!("alert {n}"),
    })
}

#[test]
fn test_stream_health_keeps_latest_snapshot_and_last_10_alerts() {
    let client = offline_client();
    let monitor = StreamHealthMonitor::watch(&client, "s1", &AdapterSettings::default());

    deliver(&client, "stream.health.update", health("s1", "healthy", 60.0));
    deliver(&client, "stream.health.update", health("s1", "critical", 12.5));
    deliver(&client, "stream.health.update", health("other", "healthy", 30.0));

    let snapshot = monitor.snapshot("s1").unwrap();
    assert_eq!(snapshot.status, HealthStatus::Critical);
    assert_eq!(snapshot.fps, Some(12.5));
    assert!(monitor.snapshot("other").is_none());

    for n in 0..15 {
        deliver(&client, "stream.health.alert", alert("s1", n));
    }
    deliver(&client, "stream.health.alert", alert("other", 99));

    let alerts = monitor.alerts("s1");
    assert_eq!(alerts.len(), 10);
    assert_eq!(alerts[0].alert_id.as_deref(), Some("a5"));
    assert_eq!(alerts[9].alert_id.as_deref(), Some("a14"));
    assert_eq!(alerts[9].severity, AlertSeverity::Warning);
    assert!(monitor.alerts("other").is_empty());
}

#[test]
fn test_multi_stream_health_summary() {
    let client = offline_client();
    let monitor =
        StreamHealthMonitor::watch_many(&client, ["s1", "s2", "s3", "s4"], &AdapterSettings::default());

    deliver(&client, "stream.health.update", health("s1", "healthy", 60.0));
    deliver(&client, "stream.health.update", health("s2", "warning", 24.0));
    // eventId is accepted as the stream key too
    deliver(
        &client,
        "stream.health.update",
        json!({ "eventId": "s3", "status": "offline" }),
    );

    assert_eq!(
        monitor.summary(),
        HealthSummary {
            healthy: 1,
            warning: 1,
            critical: 0,
            offline: 1,
            unknown: 1,
        }
    );

    assert!(monitor.remove_stream("s3"));
    assert!(!monitor.remove_stream("s3"));
    assert!(monitor.add_stream("s5"));
    assert!(!monitor.add_stream("s5"));
    assert_eq!(monitor.stream_ids(), vec!["s1", "s2", "s4", "s5"]);
    assert_eq!(monitor.summary().total(), 4);
    assert_eq!(monitor.summary().offline, 0);
}

/// Accepts one websocket and forwards every decoded client frame.
async fn start_frame_server() -> (String, mpsc::UnboundedReceiver<Envelope>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, frames) = mpsc::unbounded_channel::<Envelope>();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let WsMessage::Text(text) = msg {
                    let _ = frames_tx.send(Envelope::decode(text.as_str()).unwrap());
                }
            }
        }
    });
    (format!("ws://{addr}/realtime"), frames)
}

fn client_for(url: String) -> RealtimeClient {
    RealtimeClient::new(&ConnectionSettings {
        url,
        ..ConnectionSettings::default()
    })
    .unwrap()
}

async fn next_frame(frames: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
    timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("server stopped")
}

#[tokio::test]
async fn test_chat_room_joins_on_connect_and_leaves_on_drop() {
    let (url, mut frames) = start_frame_server().await;
    let client = client_for(url);
    let room = ChatRoom::join(&client, "e42", &AdapterSettings::default());
    client.connect();

    let join = next_frame(&mut frames).await;
    assert_eq!(join.topic, "chat.join");
    assert_eq!(join.payload, json!({ "eventId": "e42" }));
    assert_eq!(client.status(), ConnectionStatus::Connected);

    assert!(room.send_message("hello"));
    let sent = next_frame(&mut frames).await;
    assert_eq!(sent.topic, "chat.send");
    assert_eq!(sent.payload["message"], "hello");

    drop(room);
    let leave = next_frame(&mut frames).await;
    assert_eq!(leave.topic, "chat.leave");
    assert_eq!(leave.payload["eventId"], "e42");

    client.disconnect();
}

#[tokio::test]
async fn test_notification_unsubscribe_waits_for_the_last_feed() {
    let (url, mut frames) = start_frame_server().await;
    let client = client_for(url);
    let first = NotificationFeed::subscribe(&client, &AdapterSettings::default());
    let second = NotificationFeed::subscribe(&client, &AdapterSettings::default());
    client.connect();

    assert_eq!(next_frame(&mut frames).await.topic, "notification.subscribe");
    assert_eq!(next_frame(&mut frames).await.topic, "notification.subscribe");

    drop(first);
    assert!(client.send("test.marker", json!({})));
    assert_eq!(next_frame(&mut frames).await.topic, "test.marker");

    drop(second);
    assert_eq!(next_frame(&mut frames).await.topic, "notification.unsubscribe");

    client.disconnect();
}
