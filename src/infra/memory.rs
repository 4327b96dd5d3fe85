//! Process-local node store with the same semantics as the Postgres one.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::pagination::PageRequest;
use crate::application::repos::{NodePage, NodesRepo, RepoError};
use crate::domain::nodes::{Node, NodeId, NodeLabel};

#[derive(Debug, Default)]
struct State {
    last_id: NodeId,
    rows: BTreeMap<NodeId, Node>,
}

impl State {
    fn require_parent(&self, parent_id: Option<NodeId>) -> Result<(), RepoError> {
        match parent_id {
            Some(parent_id) if !self.rows.contains_key(&parent_id) => {
                Err(RepoError::ParentNotFound { parent_id })
            }
            _ => Ok(()),
        }
    }

    // Walks up from `parent_id`; reaching `id` means the new edge closes a loop.
    fn would_cycle(&self, id: NodeId, parent_id: NodeId) -> bool {
        let mut current = Some(parent_id);
        let mut steps = 0;
        while let Some(cursor) = current {
            if cursor == id {
                return true;
            }
            steps += 1;
            if steps > self.rows.len() {
                return true;
            }
            current = self.rows.get(&cursor).and_then(|node| node.parent_id);
        }
        false
    }

    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in self.rows.values() {
            if let Some(parent_id) = node.parent_id {
                children.entry(parent_id).or_default().push(node.id);
            }
        }

        let mut collected = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for &child in children.get(&current).into_iter().flatten() {
                if !collected.contains(&child) {
                    collected.push(child);
                    queue.push_back(child);
                }
            }
        }
        collected
    }
}

#[derive(Debug, Default)]
pub struct InMemoryNodes {
    state: RwLock<State>,
}

impl InMemoryNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with rows as-is, bypassing write validation.
    pub fn from_rows(rows: impl IntoIterator<Item = Node>) -> Self {
        let rows: BTreeMap<NodeId, Node> = rows.into_iter().map(|node| (node.id, node)).collect();
        let last_id = rows.keys().next_back().copied().unwrap_or(0);
        Self {
            state: RwLock::new(State { last_id, rows }),
        }
    }
}

#[async_trait]
impl NodesRepo for InMemoryNodes {
    async fn create_node(
        &self,
        label: &NodeLabel,
        parent_id: Option<NodeId>,
    ) -> Result<NodeId, RepoError> {
        let mut state = self.state.write().await;
        state.require_parent(parent_id)?;

        state.last_id += 1;
        let id = state.last_id;
        state.rows.insert(
            id,
            Node {
                id,
                label: label.as_str().to_string(),
                parent_id,
            },
        );
        Ok(id)
    }

    async fn get_node(&self, id: NodeId) -> Result<Node, RepoError> {
        self.state
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn list_page(&self, request: PageRequest) -> Result<NodePage, RepoError> {
        let state = self.state.read().await;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let rows = state
            .rows
            .values()
            .skip(offset)
            .take(request.page_size() as usize)
            .cloned()
            .collect();
        Ok(NodePage {
            rows,
            total: state.rows.len() as u64,
        })
    }

    async fn update_node(
        &self,
        id: NodeId,
        label: &NodeLabel,
        parent_id: Option<NodeId>,
    ) -> Result<Node, RepoError> {
        let mut state = self.state.write().await;
        if !state.rows.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        state.require_parent(parent_id)?;
        if let Some(parent_id) = parent_id
            && state.would_cycle(id, parent_id)
        {
            return Err(RepoError::invalid_input(format!(
                "moving node {id} under {parent_id} would create a cycle"
            )));
        }

        let node = Node {
            id,
            label: label.as_str().to_string(),
            parent_id,
        };
        state.rows.insert(id, node.clone());
        Ok(node)
    }

    async fn delete_node(&self, id: NodeId) -> Result<u64, RepoError> {
        let mut state = self.state.write().await;
        if !state.rows.contains_key(&id) {
            return Err(RepoError::NotFound);
        }

        let doomed = state.subtree(id);
        for node_id in &doomed {
            state.rows.remove(node_id);
        }
        Ok(doomed.len() as u64)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}
