use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use teamflow_core::TaskId;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An open progress stream.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub id: Uuid,
    pub task_id: TaskId,
    pub opened_at: DateTime<Utc>,
}

/// Tracks the progress streams currently open on this gateway.
#[derive(Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a stream for `task_id` and return its connection id.
    pub async fn add(&self, task_id: &str) -> Uuid {
        let conn = Connection {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            opened_at: Utc::now(),
        };
        let id = conn.id;
        self.connections.write().await.insert(id, conn);
        tracing::info!(connection_id = %id, task_id = %task_id, "Stream opened");
        id
    }

    pub async fn remove(&self, id: Uuid) {
        if let Some(conn) = self.connections.write().await.remove(&id) {
            tracing::info!(connection_id = %id, task_id = %conn.task_id, "Stream closed");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_remove() {
        let manager = ConnectionManager::new();
        let a = manager.add("t-1").await;
        manager.add("t-1").await;
        manager.add("t-2").await;
        assert_eq!(manager.connection_count().await, 3);

        manager.remove(a).await;
        manager.remove(a).await;
        assert_eq!(manager.connection_count().await, 2);
    }
}
