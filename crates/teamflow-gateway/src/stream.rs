use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use teamflow_core::{EventKind, ProgressEvent, TaskState};
use teamflow_orchestrator::Subscription;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// `GET /ws/tasks/{id}`: push progress for one task.
///
/// The stream opens with a `snapshot` event holding the task as the registry
/// sees it, then relays live `progress`, `complete` and `error` events and
/// closes after the terminal one. Unknown tasks get a 404 before the upgrade.
pub async fn stream_task(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.status(&task_id)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, task_id)))
}

fn send_json<T: Serialize>(tx: &mpsc::UnboundedSender<Message>, value: &T) {
    match serde_json::to_string(value) {
        Ok(text) => {
            let _ = tx.send(Message::Text(text.into()));
        }
        Err(e) => warn!(error = %e, "Could not serialize stream message"),
    }
}

fn snapshot_event(task: &TaskState) -> serde_json::Value {
    serde_json::json!({
        "type": "snapshot",
        "task_id": task.id,
        "status": task.status,
        "payload": task,
        "timestamp": Utc::now(),
    })
}

fn is_ping(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("ping")
        || serde_json::from_str::<serde_json::Value>(text)
            .is_ok_and(|v| v["type"] == "ping")
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, task_id: String) {
    let connection_id = state.connections.add(&task_id).await;
    // Subscribe before the snapshot read so no step can fall between the two.
    let mut subscription = state.orchestrator.broadcaster().subscribe(&task_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    match state.orchestrator.status(&task_id) {
        Ok(snapshot) => {
            send_json(&tx, &snapshot_event(&snapshot));
            if let Some(terminal) = ProgressEvent::terminal(&snapshot) {
                send_json(&tx, &terminal);
            } else {
                let seen: HashSet<String> = snapshot.progress.iter().cloned().collect();
                relay(&tx, &mut subscription, &mut ws_receiver, &seen).await;
            }
        }
        // evicted between the upgrade and now
        Err(e) => send_json(&tx, &ProgressEvent::error(task_id.clone(), e.to_string())),
    }

    let _ = tx.send(Message::Close(None));
    drop(tx);
    let _ = send_task.await;

    state.orchestrator.broadcaster().unsubscribe(&subscription);
    state.connections.remove(connection_id).await;
    info!(connection_id = %connection_id, task_id = %task_id, "Progress stream finished");
}

/// Forward live events until the terminal one, answering pings on the way.
/// Steps already in the snapshot are not sent twice.
async fn relay(
    tx: &mpsc::UnboundedSender<Message>,
    subscription: &mut Subscription,
    ws_receiver: &mut SplitStream<WebSocket>,
    seen: &HashSet<String>,
) {
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let repeated = event.kind == EventKind::Progress
                    && event.step_name.as_ref().is_some_and(|s| seen.contains(s));
                if repeated {
                    continue;
                }
                debug!(task_id = %event.task_id, kind = ?event.kind, "Relaying event");
                let terminal = event.is_terminal();
                send_json(tx, &event);
                if terminal {
                    break;
                }
            }
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if is_ping(text.as_str()) {
                        send_json(tx, &serde_json::json!({"type": "pong", "timestamp": Utc::now()}));
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_forms() {
        assert!(is_ping(r#"{"type":"ping"}"#));
        assert!(is_ping("ping"));
        assert!(!is_ping(r#"{"type":"subscribe"}"#));
        assert!(!is_ping("hello"));
    }

    #[test]
    fn test_snapshot_shape() {
        let task = TaskState::new("u", "r", "travel_planning", Default::default());
        let event = snapshot_event(&task);
        assert_eq!(event["type"], "snapshot");
        assert_eq!(event["status"], "pending");
        assert_eq!(event["payload"]["id"], task.id.as_str());
    }
}
