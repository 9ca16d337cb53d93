//! Indexes every live conversation tree by its root id, and every node id
//! back to the root that owns it (spec component C9).

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::data::MessageTree;
use crate::processor::{Callbacks, TreeHandle};

/// Owns every tree currently tracked by the gateway. Cheap to clone (an
/// `Arc` internally) so it can be shared across the axum router and the
/// periodic persistence task.
#[derive(Clone, Default)]
pub struct TreeRepository {
    inner: Arc<RwLock<Inner>>,
    callbacks: Callbacks,
}

#[derive(Default)]
struct Inner {
    trees: HashMap<String, Arc<TreeHandle>>,
    node_index: HashMap<String, String>,
}

impl TreeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callbacks(callbacks: Callbacks) -> Self {
        Self {
            inner: Arc::default(),
            callbacks,
        }
    }

    /// Look up the tree that owns `root_id`.
    pub async fn get(&self, root_id: &str) -> Option<Arc<TreeHandle>> {
        self.inner.read().await.trees.get(root_id).cloned()
    }

    /// Look up the root id that owns `node_id`, wherever in the tree it is.
    pub async fn root_for_node(&self, node_id: &str) -> Option<String> {
        self.inner.read().await.node_index.get(node_id).cloned()
    }

    /// Create a brand new tree rooted at `root_id` and index it. Errors if
    /// `root_id` is already tracked.
    pub async fn create_root(&self, root_id: String, incoming: serde_json::Value, status_message_id: Option<String>) -> Arc<TreeHandle> {
        let handle = Arc::new(TreeHandle::with_callbacks(
            MessageTree::new_root(root_id.clone(), incoming, status_message_id),
            self.callbacks.clone(),
        ));

        let mut inner = self.inner.write().await;
        inner.node_index.insert(root_id.clone(), root_id.clone());
        inner.trees.insert(root_id, handle.clone());

        handle
    }

    /// Register `node_id` (already added to its tree by the caller) against
    /// `root_id` in the node index.
    pub async fn index_node(&self, root_id: &str, node_id: String) {
        self.inner.write().await.node_index.insert(node_id, root_id.to_string());
    }

    pub async fn unindex_nodes(&self, node_ids: &[String]) {
        let mut inner = self.inner.write().await;
        for id in node_ids {
            inner.node_index.remove(id);
        }
    }

    /// Drop a whole tree and every node-index entry pointing at it.
    pub async fn remove_tree(&self, root_id: &str) {
        let mut inner = self.inner.write().await;
        inner.trees.remove(root_id);
        inner.node_index.retain(|_, root| root != root_id);
    }

    pub async fn root_ids(&self) -> Vec<String> {
        self.inner.read().await.trees.keys().cloned().collect()
    }

    /// Snapshot every tree's data for persistence. Running jobs and task
    /// handles are not part of the snapshot - only the durable node graph.
    pub async fn snapshot(&self) -> HashMap<String, MessageTree> {
        let trees = self.inner.read().await.trees.clone();
        let mut out = HashMap::with_capacity(trees.len());

        for (root_id, handle) in trees {
            out.insert(root_id, handle.tree.lock().await.clone());
        }

        out
    }

    /// Replace all tracked trees with `trees`, rebuilding the node index.
    /// Used when restoring from a persisted snapshot at startup.
    pub async fn restore(&self, trees: HashMap<String, MessageTree>) {
        let mut inner = self.inner.write().await;
        inner.trees.clear();
        inner.node_index.clear();

        for (root_id, tree) in trees {
            for node_id in tree.node_ids() {
                inner.node_index.insert(node_id, root_id.clone());
            }
            inner.trees.insert(root_id, Arc::new(TreeHandle::with_callbacks(tree, self.callbacks.clone())));
        }
    }
}
