//! Tree listing and node mutations.
//!
//! Reads are cache-aside: check the cache, otherwise load the page from the
//! store, assemble the forest, remember it and return it. Every successful
//! write empties the whole cache.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::application::pagination::{PageRequest, PaginatedTree, PaginationError, PaginationMeta};
use crate::application::repos::{NodesRepo, RepoError};
use crate::cache::TreeCache;
use crate::domain::error::DomainError;
use crate::domain::nodes::{Node, NodeId, NodeLabel, parse_parent_id};
use crate::domain::tree::{TreeBuildError, build_forest};

pub const METRIC_TREE_BUILD_MS: &str = "canopy_tree_build_ms";

#[derive(Debug, Error)]
pub enum TreeServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Build(TreeBuildError),
}

/// Node write request as received from a client, before validation.
#[derive(Debug, Clone)]
pub struct NodeCommand {
    pub label: String,
    pub parent_id: Option<i64>,
}

#[derive(Clone)]
pub struct TreeService {
    nodes: Arc<dyn NodesRepo>,
    cache: TreeCache,
}

impl TreeService {
    pub fn new(nodes: Arc<dyn NodesRepo>, cache: TreeCache) -> Self {
        Self { nodes, cache }
    }

    pub fn cache(&self) -> &TreeCache {
        &self.cache
    }

    #[instrument(skip(self), fields(page = request.page(), page_size = request.page_size()))]
    pub async fn list_page(&self, request: PageRequest) -> Result<PaginatedTree, TreeServiceError> {
        if let Some(cached) = self.cache.get(request).await {
            debug!(target = "canopy::application::tree", "tree page served from cache");
            return Ok(cached);
        }

        let page = self.nodes.list_page(request).await?;

        let started_at = Instant::now();
        let data = match build_forest(&page.rows) {
            Ok(forest) => forest,
            Err(TreeBuildError::Empty) => Vec::new(),
            Err(err) => return Err(TreeServiceError::Build(err)),
        };
        histogram!(METRIC_TREE_BUILD_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        let result = PaginatedTree {
            data,
            pagination: PaginationMeta::compute(request, page.total),
        };
        self.cache.put(request, &result).await;
        Ok(result)
    }

    pub async fn get_node(&self, id: NodeId) -> Result<Node, TreeServiceError> {
        Ok(self.nodes.get_node(id).await?)
    }

    #[instrument(skip(self, command), fields(parent_id = ?command.parent_id))]
    pub async fn create_node(&self, command: NodeCommand) -> Result<Node, TreeServiceError> {
        let label = NodeLabel::parse(&command.label)?;
        let parent_id = parse_parent_id(command.parent_id)?;

        let id = self.nodes.create_node(&label, parent_id).await?;
        self.cache.invalidate_all().await;

        info!(target = "canopy::application::tree", id, "node created");
        Ok(Node {
            id,
            label: label.into_inner(),
            parent_id,
        })
    }

    #[instrument(skip(self, command), fields(parent_id = ?command.parent_id))]
    pub async fn update_node(
        &self,
        id: NodeId,
        command: NodeCommand,
    ) -> Result<Node, TreeServiceError> {
        let label = NodeLabel::parse(&command.label)?;
        let parent_id = parse_parent_id(command.parent_id)?;

        let node = self.nodes.update_node(id, &label, parent_id).await?;
        self.cache.invalidate_all().await;

        info!(target = "canopy::application::tree", id, "node updated");
        Ok(node)
    }

    #[instrument(skip(self))]
    pub async fn delete_node(&self, id: NodeId) -> Result<u64, TreeServiceError> {
        let removed = self.nodes.delete_node(id).await?;
        self.cache.invalidate_all().await;

        info!(target = "canopy::application::tree", id, removed, "node subtree deleted");
        Ok(removed)
    }

    pub async fn health_check(&self) -> Result<(), TreeServiceError> {
        Ok(self.nodes.health_check().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::MemoryTreeCache;
    use crate::infra::memory::InMemoryNodes;

    fn service() -> (TreeService, TreeCache) {
        let cache = TreeCache::new(Arc::new(MemoryTreeCache::with_ttl(Duration::from_secs(60))));
        let service = TreeService::new(Arc::new(InMemoryNodes::new()), cache.clone());
        (service, cache)
    }

    fn command(label: &str, parent_id: Option<i64>) -> NodeCommand {
        NodeCommand {
            label: label.to_string(),
            parent_id,
        }
    }

    #[tokio::test]
    async fn end_to_end_root_and_child() {
        let (service, _) = service();
        let root = service.create_node(command("root", None)).await.expect("root");
        let child = service
            .create_node(command("child", Some(root.id)))
            .await
            .expect("child");

        let page = service.list_page(PageRequest::default()).await.expect("page");
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, root.id);
        assert_eq!(page.data[0].label, "root");
        assert_eq!(page.data[0].children.len(), 1);
        assert_eq!(page.data[0].children[0].id, child.id);
        assert!(page.data[0].children[0].children.is_empty());
    }

    #[tokio::test]
    async fn listing_is_cached_until_a_write() {
        let (service, cache) = service();
        service.create_node(command("a", None)).await.expect("a");

        let first = service.list_page(PageRequest::default()).await.expect("first");
        assert_eq!(cache.get(PageRequest::default()).await, Some(first.clone()));

        service.create_node(command("b", None)).await.expect("b");
        assert!(cache.get(PageRequest::default()).await.is_none());

        let second = service.list_page(PageRequest::default()).await.expect("second");
        assert_eq!(second.pagination.total, 2);
    }

    #[tokio::test]
    async fn failed_write_keeps_cache() {
        let (service, cache) = service();
        service.create_node(command("a", None)).await.expect("a");
        service.list_page(PageRequest::default()).await.expect("warm");

        let err = service
            .create_node(command("orphan", Some(404)))
            .await
            .expect_err("missing parent");
        assert!(matches!(
            err,
            TreeServiceError::Repo(RepoError::ParentNotFound { parent_id: 404 })
        ));
        assert!(cache.get(PageRequest::default()).await.is_some());
    }

    #[tokio::test]
    async fn empty_store_lists_an_empty_page() {
        let (service, _) = service();
        let page = service.list_page(PageRequest::default()).await.expect("page");
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total, 0);
        assert_eq!(page.pagination.total_pages, 0);
    }

    #[tokio::test]
    async fn invalid_label_is_rejected_before_the_store() {
        let (service, _) = service();
        let err = service
            .create_node(command("   ", None))
            .await
            .expect_err("blank label");
        assert!(matches!(err, TreeServiceError::Domain(DomainError::EmptyLabel)));

        let page = service.list_page(PageRequest::default()).await.expect("page");
        assert_eq!(page.pagination.total, 0);
    }
}
