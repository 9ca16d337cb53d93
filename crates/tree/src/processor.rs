//! The per-tree serial processor (spec component C10).
//!
//! Each [`TreeHandle`] owns exactly one conversation tree plus the jobs
//! waiting to run against it. `enqueue_and_start` either kicks off a fresh
//! drain loop or, if one is already running, simply adds to the queue it
//! will pick up - there is never more than one drain loop per tree.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use tokio::sync::Mutex as AsyncMutex;

use crate::data::{MessageTree, NodeState, TreeError};

/// What a job reports back once it finishes running a node.
pub enum NodeOutcome {
    Completed,
    Error(String),
}

/// Everything a job needs to process one node.
pub struct ProcessContext {
    pub root_id: String,
    pub node_id: String,
    pub incoming: serde_json::Value,
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub type BoxedJob = Box<dyn FnOnce(ProcessContext) -> BoxFuture<NodeOutcome> + Send>;

/// Called whenever a tree's queue changes shape (a node is added, dequeued,
/// or drained) - lets a messaging front end refresh a "N messages queued"
/// indicator without polling.
pub type QueueUpdateCallback = Arc<dyn Fn(&str, usize) + Send + Sync>;
/// Called the instant a node transitions from `Pending` to `InProgress` -
/// lets a messaging front end replace its "queued" placeholder with a
/// "generating..." one.
pub type NodeStartedCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Callbacks {
    pub queue_update: Option<QueueUpdateCallback>,
    pub node_started: Option<NodeStartedCallback>,
}

/// A single conversation tree plus its pending jobs. `tree` and `jobs` are
/// locked independently: the drain loop only ever holds one of the two at a
/// time, so enqueueing never blocks on a job that's mid-flight.
pub struct TreeHandle {
    pub tree: AsyncMutex<MessageTree>,
    jobs: AsyncMutex<HashMap<String, BoxedJob>>,
    callbacks: Callbacks,
}

impl TreeHandle {
    pub fn new(tree: MessageTree) -> Self {
        Self::with_callbacks(tree, Callbacks::default())
    }

    pub fn with_callbacks(tree: MessageTree, callbacks: Callbacks) -> Self {
        Self {
            tree: AsyncMutex::new(tree),
            jobs: AsyncMutex::new(HashMap::new()),
            callbacks,
        }
    }

    /// Queue `node_id`'s job and ensure a drain loop is running for this
    /// tree. `node_id` must already exist in the tree (the caller adds it
    /// via `MessageTree::add_node` or as the tree's root before calling
    /// this).
    pub async fn enqueue_and_start(self: &Arc<Self>, node_id: String, job: BoxedJob) -> Result<(), TreeError> {
        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(node_id.clone(), job);
        }

        let should_spawn = {
            let mut tree = self.tree.lock().await;

            if !tree.has_node(&node_id) {
                return Err(TreeError::NodeNotFound(node_id));
            }

            tree.enqueue_pending(node_id);
            let queue_len = tree.queue_len();

            if let Some(callback) = &self.callbacks.queue_update {
                callback(&tree.root_id, queue_len);
            }

            if tree.is_processing() {
                false
            } else {
                tree.set_processing(true);
                true
            }
        };

        if should_spawn {
            let handle = self.clone();
            tokio::spawn(async move { handle.run_drain_loop().await });
        }

        Ok(())
    }

    /// Run queued nodes one at a time until the queue is empty. Spawned as
    /// a detached task; never tracked as a cancellable "current task" itself
    /// - only the individual per-node job is.
    async fn run_drain_loop(self: Arc<Self>) {
        loop {
            let (root_id, node_id, incoming) = {
                let mut tree = self.tree.lock().await;

                let Some(node_id) = tree.dequeue_next() else {
                    tree.set_processing(false);
                    return;
                };

                let incoming = tree
                    .get_node(&node_id)
                    .map(|n| n.incoming.clone())
                    .unwrap_or(serde_json::Value::Null);

                (tree.root_id.clone(), node_id, incoming)
            };

            let job = { self.jobs.lock().await.remove(&node_id) };

            let Some(job) = job else {
                log::warn!("tree processor: no job registered for node '{node_id}', marking as error");
                let mut tree = self.tree.lock().await;
                let _ = tree.update_state(&node_id, NodeState::Error, Some("no job registered".to_string()));
                tree.clear_current_node();
                continue;
            };

            if let Some(callback) = &self.callbacks.node_started {
                callback(&root_id, &node_id);
            }

            let ctx = ProcessContext { root_id, node_id: node_id.clone(), incoming };
            let join_handle = tokio::spawn(job(ctx));

            {
                let mut tree = self.tree.lock().await;
                tree.set_current_task(join_handle.abort_handle());
            }

            let result = join_handle.await;

            let mut tree = self.tree.lock().await;
            tree.clear_current_task();
            tree.clear_current_node();

            match result {
                Ok(NodeOutcome::Completed) => {
                    let _ = tree.update_state(&node_id, NodeState::Completed, None);
                }
                Ok(NodeOutcome::Error(message)) => {
                    let _ = tree.update_state(&node_id, NodeState::Error, Some(message));
                }
                Err(join_error) if join_error.is_cancelled() => {
                    let _ = tree.update_state(&node_id, NodeState::Error, Some("cancelled".to_string()));
                }
                Err(join_error) => {
                    let _ = tree.update_state(&node_id, NodeState::Error, Some(join_error.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({})
    }

    fn completed_job() -> BoxedJob {
        Box::new(|_ctx| Box::pin(async { NodeOutcome::Completed }))
    }

    #[tokio::test]
    async fn enqueue_and_start_runs_node_to_completion() {
        let tree = MessageTree::new_root("root".into(), payload(), None);
        let handle = Arc::new(TreeHandle::new(tree));

        handle.enqueue_and_start("root".to_string(), completed_job()).await.unwrap();

        // Give the spawned drain loop a chance to run.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let tree = handle.tree.lock().await;
        assert_eq!(tree.get_node("root").unwrap().state, NodeState::Completed);
        assert!(!tree.is_processing());
    }

    #[tokio::test]
    async fn cancelled_job_marks_node_error_and_continues_queue() {
        let mut seed = MessageTree::new_root("root".into(), payload(), None);
        seed.add_node("child".into(), payload(), None, "root".into()).unwrap();
        let handle = Arc::new(TreeHandle::new(seed));

        let hanging_job: BoxedJob = Box::new(|_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                NodeOutcome::Completed
            })
        });

        handle.enqueue_and_start("root".to_string(), hanging_job).await.unwrap();
        handle.enqueue_and_start("child".to_string(), completed_job()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        {
            let mut tree = handle.tree.lock().await;
            assert!(tree.is_current_node("root"));
            tree.cancel_current_task();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;

        let tree = handle.tree.lock().await;
        assert_eq!(tree.get_node("root").unwrap().state, NodeState::Error);
        assert_eq!(tree.get_node("child").unwrap().state, NodeState::Completed);
        assert!(!tree.is_processing());
    }
}
