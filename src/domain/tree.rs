//! Assembles one page of flat node rows into a forest.
//!
//! A page is a slice of the full node set ordered by id, so a row's parent may
//! live on another page. Such rows are rendered as top-level entries for this
//! page only; they are not structural roots.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::nodes::{Node, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub label: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(node: &Node) -> Self {
        Self {
            id: node.id,
            label: node.label.clone(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeBuildError {
    #[error("page produced no tree nodes")]
    Empty,
    #[error("duplicate node id `{id}` in page")]
    DuplicateId { id: NodeId },
}

/// Build the forest for a page of rows.
///
/// Top-level entries are rows without a parent and rows whose parent is not on
/// the page, in row order. Children keep row order under their parent. Rows
/// that are only reachable through a parent cycle are appended afterwards in
/// ascending id order so that every row on the page is rendered exactly once.
pub fn build_forest(rows: &[Node]) -> Result<Vec<TreeNode>, TreeBuildError> {
    if rows.is_empty() {
        return Err(TreeBuildError::Empty);
    }

    let mut nodes: HashMap<NodeId, TreeNode> = HashMap::with_capacity(rows.len());
    for row in rows {
        if nodes.insert(row.id, TreeNode::leaf(row)).is_some() {
            return Err(TreeBuildError::DuplicateId { id: row.id });
        }
    }

    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut tops = Vec::new();
    for row in rows {
        match row.parent_id {
            Some(parent_id) if nodes.contains_key(&parent_id) => {
                children.entry(parent_id).or_default().push(row.id);
            }
            _ => tops.push(row.id),
        }
    }

    let mut forest = Vec::with_capacity(tops.len());
    for id in tops {
        if let Some(tree) = assemble(id, &mut nodes, &children) {
            forest.push(tree);
        }
    }

    if !nodes.is_empty() {
        let mut stranded: Vec<NodeId> = nodes.keys().copied().collect();
        stranded.sort_unstable();
        warn!(
            target = "canopy::domain::tree",
            stranded = ?stranded,
            "parent cycle detected in page; rendering stranded nodes as top-level entries"
        );
        for id in stranded {
            if let Some(tree) = assemble(id, &mut nodes, &children) {
                forest.push(tree);
            }
        }
    }

    if forest.is_empty() {
        return Err(TreeBuildError::Empty);
    }

    Ok(forest)
}

// Taking the node out of the map marks it visited; a cycle edge back to an
// already assembled node is skipped.
fn assemble(
    id: NodeId,
    nodes: &mut HashMap<NodeId, TreeNode>,
    children: &HashMap<NodeId, Vec<NodeId>>,
) -> Option<TreeNode> {
    let mut node = nodes.remove(&id)?;

    if let Some(child_ids) = children.get(&id) {
        for &child_id in child_ids {
            if let Some(child) = assemble(child_id, nodes, children) {
                node.children.push(child);
            }
        }
    }

    Some(node)
}
