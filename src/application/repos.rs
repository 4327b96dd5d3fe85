//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::PageRequest;
use crate::domain::nodes::{Node, NodeId, NodeLabel};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("parent node `{parent_id}` not found")]
    ParentNotFound { parent_id: NodeId },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// One slice of the node table plus the full row count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePage {
    pub rows: Vec<Node>,
    pub total: u64,
}

#[async_trait]
pub trait NodesRepo: Send + Sync {
    /// Insert a node. Fails with `ParentNotFound` when `parent_id` does not resolve.
    async fn create_node(
        &self,
        label: &NodeLabel,
        parent_id: Option<NodeId>,
    ) -> Result<NodeId, RepoError>;

    async fn get_node(&self, id: NodeId) -> Result<Node, RepoError>;

    /// Rows ordered by id ascending, sliced to the requested page.
    async fn list_page(&self, request: PageRequest) -> Result<NodePage, RepoError>;

    /// Replace label and parent. A parent that is the node itself or one of its
    /// descendants is rejected with `InvalidInput`.
    async fn update_node(
        &self,
        id: NodeId,
        label: &NodeLabel,
        parent_id: Option<NodeId>,
    ) -> Result<Node, RepoError>;

    /// Delete the node and every descendant atomically; returns the number of rows removed.
    async fn delete_node(&self, id: NodeId) -> Result<u64, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}
