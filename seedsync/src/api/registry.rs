//! Nodes seen by this seed, recorded from their heartbeats.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct NodeSeen {
    pub id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub heartbeats: u64,
}

/// Default upper bound on tracked nodes.
pub const MAX_NODES: usize = 1024;

struct Tracked {
    node: NodeSeen,
    touched: u64,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Tracked>,
    clock: u64,
}

#[derive(Clone)]
pub struct NodeRegistry {
    inner: Arc<RwLock<Inner>>,
    capacity: usize,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_capacity(MAX_NODES)
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            capacity: capacity.max(1),
        }
    }

    /// Record a heartbeat. A new id arriving at capacity evicts the node
    /// seen least recently.
    pub async fn record(&self, id: &str) {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        inner.clock += 1;
        let touched = inner.clock;

        if let Some(tracked) = inner.nodes.get_mut(id) {
            tracked.node.last_seen = now;
            tracked.node.heartbeats += 1;
            tracked.touched = touched;
            return;
        }

        if inner.nodes.len() >= self.capacity {
            let oldest = inner
                .nodes
                .iter()
                .min_by_key(|(_, tracked)| tracked.touched)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                debug!(evicted = %oldest, "Node registry full");
                inner.nodes.remove(&oldest);
            }
        }

        inner.nodes.insert(
            id.to_string(),
            Tracked {
                node: NodeSeen {
                    id: id.to_string(),
                    first_seen: now,
                    last_seen: now,
                    heartbeats: 1,
                },
                touched,
            },
        );
    }

    /// Known nodes ordered by id.
    pub async fn snapshot(&self) -> Vec<NodeSeen> {
        let inner = self.inner.read().await;
        let mut list: Vec<_> = inner.nodes.values().map(|t| t.node.clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_counts_heartbeats() {
        let registry = NodeRegistry::new();
        registry.record("node-b").await;
        registry.record("node-a").await;
        registry.record("node-b").await;

        let nodes = registry.snapshot().await;
        assert_eq!(registry.len().await, 2);
        assert_eq!(nodes[0].id, "node-a");
        assert_eq!(nodes[1].heartbeats, 2);
        assert!(nodes[1].last_seen >= nodes[1].first_seen);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_seen() {
        let registry = NodeRegistry::with_capacity(2);
        registry.record("node-a").await;
        registry.record("node-b").await;
        registry.record("node-a").await;
        registry.record("node-c").await;

        let ids: Vec<_> = registry.snapshot().await.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["node-a", "node-c"]);

        for i in 0..100 {
            registry.record(&format!("spoofed-{i}")).await;
        }
        assert_eq!(registry.len().await, 2);
    }
}
