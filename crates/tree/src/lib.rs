//! Conversation-tree queue manager.
//!
//! Messaging platforms that support threaded replies let a user branch a
//! conversation: reply to an earlier message instead of the latest one, and
//! get a sibling branch instead of a linear continuation. This crate tracks
//! each root conversation as a tree of [`MessageNode`]s, serializes
//! processing within a tree to one node at a time (so replies are always
//! answered in the order they arrived), and exposes node/branch/tree
//! granularity cancellation so an in-flight reply can be aborted without
//! disturbing unrelated branches.
//!
//! [`TreeQueueManager`] is the only type most callers need; it composes the
//! node/tree data model ([`data`]), the root/node index ([`repository`]),
//! and the per-tree drain loop ([`processor`]).

pub mod data;
pub mod manager;
pub mod processor;
pub mod repository;

pub use data::{MessageNode, MessageTree, NodeState, TreeError};
pub use manager::{ManagerError, TreeQueueManager};
pub use processor::{BoxFuture, BoxedJob, Callbacks, NodeOutcome, NodeStartedCallback, ProcessContext, QueueUpdateCallback, TreeHandle};
pub use repository::TreeRepository;
