//! Node and tree data structures (spec component C8).
//!
//! A [`MessageTree`] owns its nodes outright: every mutation goes through the
//! tree, which is the sole serializer of its own queue. Parent/child links are
//! plain id-to-id references - there are no pointers - so the tree can always
//! be reconstructed from (and serialized back to) a flat node map.

use std::collections::{HashMap, VecDeque};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

/// Lifecycle state of a single node. Transitions are monotone:
/// `Pending -> InProgress -> {Completed, Error}`; `Error` is terminal, and a
/// tree-level cancel can also move `Pending` directly to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl NodeState {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Error)
    }
}

/// A single message in a conversation tree - one reply in a reply-threaded
/// chat surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageNode {
    pub node_id: String,
    /// Opaque platform payload (e.g. the inbound chat message); the tree
    /// never interprets this, only stores and hands it back to the job that
    /// processes the node.
    pub incoming: serde_json::Value,
    /// Id of the placeholder ("working...") message shown to the user while
    /// this node is processed.
    pub status_message_id: Option<String>,
    pub state: NodeState,
    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
}

impl MessageNode {
    fn new(node_id: String, incoming: serde_json::Value, status_message_id: Option<String>, parent_id: Option<String>) -> Self {
        Self {
            node_id,
            incoming,
            status_message_id,
            state: NodeState::Pending,
            parent_id,
            children_ids: Vec::new(),
            created_at: Timestamp::now(),
            completed_at: None,
            error_message: None,
        }
    }
}

/// Errors raised by tree mutation operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("node '{0}' not found")]
    NodeNotFound(String),
    #[error("parent node '{0}' not found")]
    ParentNotFound(String),
}

/// A conversation tree: a root message plus every reply reachable from it,
/// a FIFO queue of nodes waiting to be processed, and the bookkeeping the
/// processor (C10) needs to run exactly one node at a time.
///
/// Every mutating method takes `&mut self`; callers serialize access through
/// a `tokio::sync::Mutex<MessageTree>` (see [`crate::Tree`]) rather than the
/// type providing its own locking, so a caller can batch several mutations
/// under one lock acquisition when needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTree {
    pub root_id: String,
    nodes: HashMap<String, MessageNode>,
    queue: VecDeque<String>,
    current_node_id: Option<String>,
    #[serde(skip)]
    current_task: Option<AbortHandle>,
    is_processing: bool,
}

impl MessageTree {
    /// Create a tree with just its root node (`node_id == root_id`).
    pub fn new_root(root_id: String, incoming: serde_json::Value, status_message_id: Option<String>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), MessageNode::new(root_id.clone(), incoming, status_message_id, None));

        Self {
            root_id,
            nodes,
            queue: VecDeque::new(),
            current_node_id: None,
            current_task: None,
            is_processing: false,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn has_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn get_node(&self, node_id: &str) -> Option<&MessageNode> {
        self.nodes.get(node_id)
    }

    pub fn is_current_node(&self, node_id: &str) -> bool {
        self.current_node_id.as_deref() == Some(node_id)
    }

    pub fn find_node_by_status_message(&self, status_message_id: &str) -> Option<&str> {
        self.nodes
            .values()
            .find(|node| node.status_message_id.as_deref() == Some(status_message_id))
            .map(|node| node.node_id.as_str())
    }

    /// Append `node_id` as a child of `parent_id`, in `Pending` state.
    pub fn add_node(
        &mut self,
        node_id: String,
        incoming: serde_json::Value,
        status_message_id: Option<String>,
        parent_id: String,
    ) -> Result<(), TreeError> {
        if !self.nodes.contains_key(&parent_id) {
            return Err(TreeError::ParentNotFound(parent_id));
        }

        let node = MessageNode::new(node_id.clone(), incoming, status_message_id, Some(parent_id.clone()));
        self.nodes.get_mut(&parent_id).unwrap().children_ids.push(node_id.clone());
        self.nodes.insert(node_id, node);

        Ok(())
    }

    /// Move `node_id` into `state`. No-op if the node is already terminal -
    /// this keeps concurrent cancellation and job-completion races safe
    /// without either side needing to check the other's outcome first.
    pub fn update_state(&mut self, node_id: &str, state: NodeState, error_message: Option<String>) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(node_id).ok_or_else(|| TreeError::NodeNotFound(node_id.to_string()))?;

        if node.state.is_terminal() {
            return Ok(());
        }

        node.state = state;

        if state.is_terminal() {
            node.completed_at = Some(Timestamp::now());
        }

        if let Some(message) = error_message {
            node.error_message = Some(message);
        }

        Ok(())
    }

    pub fn enqueue_pending(&mut self, node_id: String) {
        self.queue.push_back(node_id);
    }

    /// Pop the head of the queue, mark it `InProgress`, and set it as the
    /// current node. Returns `None` when the queue is empty.
    pub fn dequeue_next(&mut self) -> Option<String> {
        let node_id = self.queue.pop_front()?;

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.state = NodeState::InProgress;
        }

        self.current_node_id = Some(node_id.clone());
        Some(node_id)
    }

    pub fn set_processing(&mut self, processing: bool) {
        self.is_processing = processing;
    }

    pub fn set_current_task(&mut self, handle: AbortHandle) {
        self.current_task = Some(handle);
    }

    pub fn clear_current_task(&mut self) {
        self.current_task = None;
    }

    pub fn clear_current_node(&mut self) {
        self.current_node_id = None;
    }

    /// Cancel the in-flight task, if any. Returns whether one existed.
    pub fn cancel_current_task(&mut self) -> bool {
        match self.current_task.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Pop every queued node, marking each `Error` with `message`. Returns
    /// the drained node ids.
    pub fn drain_queue_and_mark_cancelled(&mut self, message: &str) -> Vec<String> {
        let mut drained = Vec::with_capacity(self.queue.len());

        while let Some(node_id) = self.queue.pop_front() {
            let _ = self.update_state(&node_id, NodeState::Error, Some(message.to_string()));
            drained.push(node_id);
        }

        drained
    }

    /// All ids reachable from (and including) `node_id` - DFS order is
    /// topological (a node always precedes its descendants).
    pub fn get_descendants(&self, node_id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut stack = vec![node_id.to_string()];

        while let Some(id) = stack.pop() {
            result.push(id.clone());

            if let Some(node) = self.nodes.get(&id) {
                // Push in reverse so traversal order matches declaration order.
                stack.extend(node.children_ids.iter().rev().cloned());
            }
        }

        result
    }

    /// Detach the subtree rooted at `branch_root_id` from its parent's
    /// children, and return every detached node (branch root first, then
    /// descendants, in topological order).
    pub fn remove_branch(&mut self, branch_root_id: &str) -> Result<Vec<MessageNode>, TreeError> {
        if !self.nodes.contains_key(branch_root_id) {
            return Err(TreeError::NodeNotFound(branch_root_id.to_string()));
        }

        let ids = self.get_descendants(branch_root_id);

        if let Some(parent_id) = self.nodes.get(branch_root_id).and_then(|n| n.parent_id.clone())
            && let Some(parent) = self.nodes.get_mut(&parent_id)
        {
            parent.children_ids.retain(|id| id != branch_root_id);
        }

        let removed = ids
            .iter()
            .filter_map(|id| self.nodes.remove(id))
            .collect::<Vec<_>>();

        self.queue.retain(|id| !ids.contains(id));

        if self.current_node_id.as_deref().is_some_and(|cur| ids.iter().any(|id| id == cur)) {
            self.current_node_id = None;
        }

        Ok(removed)
    }

    /// Cancel `node_id`, wherever it is: if it's the node currently running,
    /// abort its task (the processor loop observes the abort and marks it
    /// `Error`); if it's still waiting in the queue, remove and mark it
    /// `Error` directly. Returns `false` if `node_id` was neither.
    pub fn cancel_node_in_queue_or_current(&mut self, node_id: &str, message: &str) -> bool {
        if self.is_current_node(node_id) {
            return self.cancel_current_task();
        }

        let before = self.queue.len();
        self.queue.retain(|id| id != node_id);

        if self.queue.len() != before {
            let _ = self.update_state(node_id, NodeState::Error, Some(message.to_string()));
            return true;
        }

        false
    }

    /// Cancel every id in `ids` that is either the running node or still
    /// queued, in order.
    pub fn cancel_nodes(&mut self, ids: &[String], message: &str) {
        for id in ids {
            self.cancel_node_in_queue_or_current(id, message);
        }
    }

    /// Every node currently `Pending` or `InProgress` - used by
    /// `cleanup_stale_nodes` after a restart or forced tree cancellation.
    pub fn stale_node_ids(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| matches!(n.state, NodeState::Pending | NodeState::InProgress))
            .map(|n| n.node_id.clone())
            .collect()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn reset_processing_state(&mut self) {
        self.is_processing = false;
        self.current_node_id = None;
        self.current_task = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({"text": "hi"})
    }

    #[test]
    fn add_node_requires_existing_parent() {
        let mut tree = MessageTree::new_root("root".into(), payload(), None);
        let err = tree.add_node("child".into(), payload(), None, "missing".into()).unwrap_err();
        assert!(matches!(err, TreeError::ParentNotFound(_)));
    }

    #[test]
    fn state_transitions_are_monotone() {
        let mut tree = MessageTree::new_root("root".into(), payload(), None);
        tree.update_state("root", NodeState::Error, Some("boom".into())).unwrap();
        assert_eq!(tree.get_node("root").unwrap().state, NodeState::Error);

        // Further transitions on a terminal node are no-ops.
        tree.update_state("root", NodeState::Completed, None).unwrap();
        assert_eq!(tree.get_node("root").unwrap().state, NodeState::Error);
    }

    #[test]
    fn remove_branch_returns_topological_order_and_detaches() {
        let mut tree = MessageTree::new_root("r".into(), payload(), None);
        tree.add_node("a".into(), payload(), None, "r".into()).unwrap();
        tree.add_node("b".into(), payload(), None, "a".into()).unwrap();
        tree.add_node("c".into(), payload(), None, "r".into()).unwrap();

        let removed = tree.remove_branch("a").unwrap();
        let ids: Vec<_> = removed.iter().map(|n| n.node_id.clone()).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        assert!(!tree.has_node("a"));
        assert!(!tree.has_node("b"));
        assert!(tree.has_node("r"));
        assert!(tree.has_node("c"));
        assert!(tree.get_node("r").unwrap().children_ids.contains(&"c".to_string()));
        assert!(!tree.get_node("r").unwrap().children_ids.contains(&"a".to_string()));
    }

    #[test]
    fn descendants_include_self_first() {
        let mut tree = MessageTree::new_root("r".into(), payload(), None);
        tree.add_node("a".into(), payload(), None, "r".into()).unwrap();

        let descendants = tree.get_descendants("r");
        assert_eq!(descendants, vec!["r".to_string(), "a".to_string()]);
    }
}
