//! Public facade over the tree subsystem (spec component C11): the single
//! entry point the messaging front end and the gateway's persistence hooks
//! use. Internally this composes [`TreeRepository`] (C9) and [`TreeHandle`]
//! (C10) so callers never touch locking or indexing details directly.

use std::collections::HashMap;

use crate::data::{MessageNode, MessageTree, NodeState, TreeError};
use crate::processor::{BoxedJob, Callbacks, NodeStartedCallback, QueueUpdateCallback};
use crate::repository::TreeRepository;

/// Errors the manager's public operations can raise.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("no tree found for node '{0}'")]
    UnknownNode(String),
    #[error("no tree found with root '{0}'")]
    UnknownRoot(String),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// The conversation-tree queue manager.
#[derive(Clone, Default)]
pub struct TreeQueueManager {
    repository: TreeRepository,
}

impl TreeQueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manager whose trees invoke `queue_update` whenever a tree's
    /// queue length changes, and `node_started` the instant a node begins
    /// processing. This is the interface a messaging front end (Telegram,
    /// Discord, ...) plugs into to keep its own UI in sync with the queue,
    /// without the tree crate knowing anything about that front end.
    pub fn with_callbacks(queue_update: Option<QueueUpdateCallback>, node_started: Option<NodeStartedCallback>) -> Self {
        Self {
            repository: TreeRepository::with_callbacks(Callbacks { queue_update, node_started }),
        }
    }

    /// Start a brand new conversation: create its root node and immediately
    /// queue `job` to process it.
    pub async fn start_root(
        &self,
        root_id: String,
        incoming: serde_json::Value,
        status_message_id: Option<String>,
        job: BoxedJob,
    ) -> Result<(), ManagerError> {
        let handle = self.repository.create_root(root_id.clone(), incoming, status_message_id).await;
        handle.enqueue_and_start(root_id, job).await?;
        Ok(())
    }

    /// Add a reply to `parent_id` and queue `job` to process it. `parent_id`
    /// may belong to any tree already tracked by the manager.
    pub async fn enqueue_reply(
        &self,
        parent_id: &str,
        node_id: String,
        incoming: serde_json::Value,
        status_message_id: Option<String>,
        job: BoxedJob,
    ) -> Result<(), ManagerError> {
        let root_id = self.repository.root_for_node(parent_id).await.ok_or_else(|| ManagerError::UnknownNode(parent_id.to_string()))?;
        let handle = self.repository.get(&root_id).await.ok_or_else(|| ManagerError::UnknownRoot(root_id.clone()))?;

        {
            let mut tree = handle.tree.lock().await;
            tree.add_node(node_id.clone(), incoming, status_message_id, parent_id.to_string())?;
        }

        self.repository.index_node(&root_id, node_id.clone()).await;
        handle.enqueue_and_start(node_id, job).await?;

        Ok(())
    }

    /// Cancel one node: the running job if it's current, or dequeue it
    /// directly if it's merely waiting.
    pub async fn cancel_node(&self, node_id: &str) -> Result<(), ManagerError> {
        let handle = self.handle_for_node(node_id).await?;
        let mut tree = handle.tree.lock().await;
        tree.cancel_node_in_queue_or_current(node_id, "cancelled");
        Ok(())
    }

    /// Cancel `branch_root_id` and every one of its descendants, without
    /// disturbing unrelated nodes in the same tree.
    pub async fn cancel_branch(&self, branch_root_id: &str) -> Result<(), ManagerError> {
        let handle = self.handle_for_node(branch_root_id).await?;
        let mut tree = handle.tree.lock().await;
        let ids = tree.get_descendants(branch_root_id);
        tree.cancel_nodes(&ids, "branch cancelled");
        Ok(())
    }

    /// Cancel every node in the tree rooted at `root_id`: abort whatever is
    /// running and drain the rest of the queue. Guarantees no `Pending` or
    /// `InProgress` node remains once this returns.
    pub async fn cancel_tree(&self, root_id: &str) -> Result<(), ManagerError> {
        let handle = self.repository.get(root_id).await.ok_or_else(|| ManagerError::UnknownRoot(root_id.to_string()))?;
        let mut tree = handle.tree.lock().await;
        tree.cancel_current_task();
        tree.drain_queue_and_mark_cancelled("tree cancelled");
        Ok(())
    }

    /// Detach and forget a branch entirely (used when a user deletes a
    /// message thread). Cancels anything still running in the branch first.
    pub async fn remove_branch(&self, branch_root_id: &str) -> Result<Vec<MessageNode>, ManagerError> {
        let root_id = self.repository.root_for_node(branch_root_id).await.ok_or_else(|| ManagerError::UnknownNode(branch_root_id.to_string()))?;
        let handle = self.repository.get(&root_id).await.ok_or_else(|| ManagerError::UnknownRoot(root_id.clone()))?;

        let removed = {
            let mut tree = handle.tree.lock().await;
            let ids = tree.get_descendants(branch_root_id);
            tree.cancel_nodes(&ids, "branch removed");
            tree.remove_branch(branch_root_id)?
        };

        let removed_ids: Vec<String> = removed.iter().map(|n| n.node_id.clone()).collect();
        self.repository.unindex_nodes(&removed_ids).await;

        if branch_root_id == root_id {
            self.repository.remove_tree(&root_id).await;
        }

        Ok(removed)
    }

    /// Force a single node into `Error` state, e.g. when the job that was
    /// supposed to process it failed before it could report back itself.
    ///
    /// When `propagate_to_children` is set, every descendant still
    /// `Pending` is cascaded into `Error` too, with a message noting it
    /// failed because its parent did (§4.9) - a descendant already queued
    /// as a reply to a node that can never complete would otherwise hang
    /// in the queue forever.
    pub async fn mark_node_error(&self, node_id: &str, message: impl Into<String>, propagate_to_children: bool) -> Result<(), ManagerError> {
        let handle = self.handle_for_node(node_id).await?;
        let mut tree = handle.tree.lock().await;
        let message = message.into();
        tree.update_state(node_id, NodeState::Error, Some(message.clone()))?;

        if propagate_to_children {
            for descendant_id in tree.get_descendants(node_id) {
                if descendant_id == node_id {
                    continue;
                }

                if tree.get_node(&descendant_id).is_some_and(|node| node.state == NodeState::Pending) {
                    let _ = tree.update_state(&descendant_id, NodeState::Error, Some(format!("Parent failed: {message}")));
                }
            }
        }

        Ok(())
    }

    pub async fn find_node_by_status_message(&self, root_id: &str, status_message_id: &str) -> Result<Option<String>, ManagerError> {
        let handle = self.repository.get(root_id).await.ok_or_else(|| ManagerError::UnknownRoot(root_id.to_string()))?;
        let tree = handle.tree.lock().await;
        Ok(tree.find_node_by_status_message(status_message_id).map(str::to_string))
    }

    /// Mark every node left `Pending`/`InProgress` across every tracked tree
    /// as `Error`, and reset each tree's processing flags. Call once at
    /// startup, right after restoring a persisted snapshot: no job survives
    /// a restart, so any node still mid-flight is unrecoverable.
    pub async fn cleanup_stale_nodes(&self) {
        for root_id in self.repository.root_ids().await {
            let Some(handle) = self.repository.get(&root_id).await else { continue };
            let mut tree = handle.tree.lock().await;

            for node_id in tree.stale_node_ids() {
                let _ = tree.update_state(&node_id, NodeState::Error, Some("lost on restart".to_string()));
            }

            tree.reset_processing_state();
        }
    }

    /// Serialize every tracked tree to a JSON value keyed by root id.
    pub async fn to_dict(&self) -> serde_json::Value {
        let snapshot = self.repository.snapshot().await;
        serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
    }

    /// Restore trees from a value previously produced by `to_dict`. Does
    /// not call `cleanup_stale_nodes` itself - callers should do that right
    /// after, before serving traffic.
    pub async fn from_dict(&self, value: serde_json::Value) -> Result<(), serde_json::Error> {
        let trees: HashMap<String, MessageTree> = serde_json::from_value(value)?;
        self.repository.restore(trees).await;
        Ok(())
    }

    async fn handle_for_node(&self, node_id: &str) -> Result<std::sync::Arc<crate::processor::TreeHandle>, ManagerError> {
        let root_id = self.repository.root_for_node(node_id).await.ok_or_else(|| ManagerError::UnknownNode(node_id.to_string()))?;
        self.repository.get(&root_id).await.ok_or(ManagerError::UnknownRoot(root_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::NodeOutcome;
    use std::time::Duration;

    fn completed_job() -> BoxedJob {
        Box::new(|_ctx| Box::pin(async { NodeOutcome::Completed }))
    }

    #[tokio::test]
    async fn start_root_and_enqueue_reply_run_in_order() {
        let manager = TreeQueueManager::new();
        manager.start_root("root".into(), serde_json::json!({}), None, completed_job()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        manager.enqueue_reply("root", "child".into(), serde_json::json!({}), None, completed_job()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let handle = manager.repository.get("root").await.unwrap();
        let tree = handle.tree.lock().await;
        assert_eq!(tree.get_node("root").unwrap().state, NodeState::Completed);
        assert_eq!(tree.get_node("child").unwrap().state, NodeState::Completed);
    }

    #[tokio::test]
    async fn cancel_tree_leaves_no_pending_nodes() {
        let manager = TreeQueueManager::new();

        let hanging_job: BoxedJob = Box::new(|_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                NodeOutcome::Completed
            })
        });

        manager.start_root("root".into(), serde_json::json!({}), None, hanging_job).await.unwrap();
        manager.enqueue_reply("root", "child".into(), serde_json::json!({}), None, completed_job()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        manager.cancel_tree("root").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let handle = manager.repository.get("root").await.unwrap();
        let tree = handle.tree.lock().await;
        assert!(tree.get_node("root").unwrap().state != NodeState::Pending);
        assert!(tree.get_node("root").unwrap().state != NodeState::InProgress);
        assert_eq!(tree.get_node("child").unwrap().state, NodeState::Error);
    }

    #[tokio::test]
    async fn cleanup_stale_nodes_errors_anything_left_pending() {
        let manager = TreeQueueManager::new();
        let mut tree = MessageTree::new_root("root".into(), serde_json::json!({}), None);
        tree.add_node("child".into(), serde_json::json!({}), None, "root".into()).unwrap();
        tree.enqueue_pending("child".to_string());

        let mut trees = HashMap::new();
        trees.insert("root".to_string(), tree);
        manager.repository.restore(trees).await;

        manager.cleanup_stale_nodes().await;

        let handle = manager.repository.get("root").await.unwrap();
        let tree = handle.tree.lock().await;
        assert_eq!(tree.get_node("root").unwrap().state, NodeState::Error);
        assert_eq!(tree.get_node("child").unwrap().state, NodeState::Error);
        assert!(!tree.is_processing());
    }
}
