use menuflow::application::receiver::{
    ClickAction, MessagingConfig, NotificationReceiver, PushEvent, ROOT_URL,
};
use menuflow::domain::notification::{DEFAULT_TAG, PushPayload};
use menuflow::infrastructure::in_memory::{InMemoryNotificationCenter, InMemoryWindows};
use serde_json::json;
use std::sync::Arc;

struct Device {
    center: InMemoryNotificationCenter,
    windows: InMemoryWindows,
    receiver: Arc<NotificationReceiver>,
}

async fn device(open_windows: &[&str]) -> Device {
    let center = InMemoryNotificationCenter::new();
    let windows = InMemoryWindows::with_open(open_windows).await;
    let receiver = Arc::new(NotificationReceiver::new(
        Arc::new(center.clone()),
        Arc::new(windows.clone()),
    ));
    Device {
        center,
        windows,
        receiver,
    }
}

fn raw(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

fn payload(value: serde_json::Value) -> PushPayload {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_both_payload_shapes_produce_the_same_notification() {
    let d = device(&[]).await;

    let data_only = d
        .receiver
        .on_push(&raw(json!({"data": {"title": "T", "body": "B", "order_id": "42"}})))
        .await
        .unwrap();
    let structured = d
        .receiver
        .on_push(&raw(json!({
            "notification": {"title": "T", "body": "B"},
            "data": {"order_id": "42"}
        })))
        .await
        .unwrap();

    assert_eq!(data_only, structured);
    assert_eq!(structured.tag, "42");
    assert_eq!(structured.title, "T");
    assert_eq!(structured.body, "B");
}

#[tokio::test]
async fn test_redelivery_replaces_instead_of_stacking() {
    let d = device(&[]).await;
    let push = raw(json!({"data": {"title": "New order", "body": "Table 4", "order_id": 42}}));

    d.receiver.on_push(&push).await.unwrap();
    d.receiver.on_push(&push).await.unwrap();
    d.receiver
        .on_push(&raw(json!({"notification": {"title": "Other"}})))
        .await
        .unwrap();

    let displayed = d.center.displayed().await;
    assert_eq!(displayed.len(), 2);
    assert_eq!(displayed[0].tag, "42");
    assert_eq!(displayed[1].tag, DEFAULT_TAG);
    assert_eq!(d.center.show_count().await, 3);
}

#[tokio::test]
async fn test_malformed_and_empty_payloads_are_dropped() {
    let d = device(&[]).await;

    assert!(d.receiver.on_push(b"{not json").await.is_none());
    assert!(
        d.receiver
            .on_push(&raw(json!({"data": {"order_id": "42"}})))
            .await
            .is_none()
    );
    assert!(d.center.displayed().await.is_empty());
}

#[tokio::test]
async fn test_messaging_path_waits_for_configuration() {
    let d = device(&[]).await;
    let message = json!({"notification": {"title": "New order", "body": "Order #7"}, "data": {"order_id": "7"}});

    assert!(!d.receiver.is_configured());
    assert!(d.receiver.on_message(payload(message.clone())).await.is_none());
    assert!(d.receiver.on_push(&raw(message.clone())).await.is_some());

    d.receiver.configure(MessagingConfig {
        credentials: "opaque".to_string(),
    });
    assert!(d.receiver.is_configured());
    let shown = d.receiver.on_message(payload(message)).await.unwrap();
    assert_eq!(shown.tag, "7");
    assert_eq!(d.center.displayed().await.len(), 1);
}

#[tokio::test]
async fn test_click_navigates_to_url() {
    let d = device(&["/dashboard"]).await;
    let notification = d
        .receiver
        .on_push(&raw(json!({"data": {"title": "T", "url": "/orders/42"}})))
        .await
        .unwrap();

    let action = d.receiver.on_click(&notification).await.unwrap();

    assert!(matches!(action, ClickAction::Navigate { ref url, .. } if url == "/orders/42"));
    assert_eq!(d.windows.urls().await, vec!["/dashboard", "/orders/42"]);
}

#[tokio::test]
async fn test_click_focuses_open_window() {
    let d = device(&["/dashboard"]).await;
    let notification = d
        .receiver
        .on_push(&raw(json!({"notification": {"title": "T"}})))
        .await
        .unwrap();

    let action = d.receiver.on_click(&notification).await.unwrap();

    assert_eq!(action, ClickAction::Focus(1));
    assert_eq!(d.windows.focused().await, Some(1));
    assert_eq!(d.windows.urls().await.len(), 1);
}

#[tokio::test]
async fn test_click_opens_root_without_windows() {
    let d = device(&[]).await;
    let notification = d
        .receiver
        .on_push(&raw(json!({"notification": {"body": "B"}})))
        .await
        .unwrap();

    let action = d.receiver.on_click(&notification).await.unwrap();

    assert!(matches!(action, ClickAction::OpenRoot(_)));
    assert_eq!(d.windows.urls().await, vec![ROOT_URL]);
}

#[tokio::test]
async fn test_background_task_handles_events_in_order() {
    let d = device(&[]).await;
    let (handle, join) = d.receiver.clone().spawn(8);
    let message = payload(json!({"notification": {"title": "Queued", "body": "x"}, "data": {"tag": "q"}}));

    handle.deliver(PushEvent::Message(message.clone())).await;
    handle
        .deliver(PushEvent::Configure(MessagingConfig {
            credentials: "opaque".to_string(),
        }))
        .await;
    handle.deliver(PushEvent::Raw(b"garbage".to_vec())).await;
    handle.deliver(PushEvent::Message(message)).await;
    drop(handle);
    join.await.unwrap();

    assert!(d.receiver.is_configured());
    assert_eq!(d.center.show_count().await, 1);
    assert_eq!(d.center.displayed().await[0].tag, "q");
}

#[tokio::test]
async fn test_zero_buffer_still_delivers() {
    let d = device(&[]).await;
    let (handle, join) = d.receiver.clone().spawn(0);

    handle
        .deliver(PushEvent::Raw(raw(json!({"notification": {"title": "T"}, "data": {"order_id": "9"}}))))
        .await;
    drop(handle);
    join.await.unwrap();

    assert_eq!(d.center.displayed().await[0].tag, "9");
}
