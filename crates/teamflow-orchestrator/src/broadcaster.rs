use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use teamflow_core::{ProgressEvent, StepResult, TaskId};
use tokio::sync::mpsc;
use tracing::{debug, info};

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

/// Receiving end of one progress subscription.
///
/// `recv` yields `None` once the task reaches a terminal state and the
/// broadcaster closes it.
pub struct Subscription {
    id: u64,
    task_id: TaskId,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }
}

/// Fans progress events out to every subscriber of a task.
///
/// Delivery is in send order per subscriber. Subscribers get only events
/// sent after they subscribed; earlier steps are read from the registry.
/// A subscriber that went away is dropped on the next send without
/// affecting the others.
pub struct ProgressBroadcaster {
    subscribers: RwLock<HashMap<TaskId, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, task_id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .entry(task_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        info!(task_id = %task_id, subscriber_id = id, "Subscriber added");
        Subscription {
            id,
            task_id: task_id.to_string(),
            rx,
        }
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut subs = self.subscribers.write();
        if let Some(list) = subs.get_mut(&subscription.task_id) {
            list.retain(|s| s.id != subscription.id);
            if list.is_empty() {
                subs.remove(&subscription.task_id);
            }
        }
        info!(task_id = %subscription.task_id, subscriber_id = subscription.id, "Subscriber removed");
    }

    /// Deliver a step result to the task's current subscribers.
    pub fn notify(&self, task_id: &str, result: &StepResult) {
        self.publish(ProgressEvent::step(task_id, result));
    }

    /// Deliver an arbitrary event. Never fails; closed subscribers are pruned.
    pub fn publish(&self, event: ProgressEvent) {
        let mut subs = self.subscribers.write();
        let Some(list) = subs.get_mut(&event.task_id) else {
            return;
        };
        let before = list.len();
        list.retain(|s| s.tx.send(event.clone()).is_ok());
        if list.len() < before {
            debug!(
                task_id = %event.task_id,
                dropped = before - list.len(),
                "Pruned disconnected subscribers"
            );
        }
        if list.is_empty() {
            subs.remove(&event.task_id);
        }
    }

    /// Drop every sender for the task so subscribers see end-of-stream.
    pub fn close(&self, task_id: &str) {
        if let Some(list) = self.subscribers.write().remove(task_id) {
            debug!(task_id = %task_id, subscribers = list.len(), "Closed progress stream");
        }
    }

    pub fn subscriber_count(&self, task_id: &str) -> usize {
        self.subscribers.read().get(task_id).map_or(0, Vec::len)
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
