use serde::{Deserialize, Serialize};

use crate::application::tree::NodeCommand;
use crate::domain::nodes::{Node, NodeId};

/// Body of `POST /tree` and `PUT /tree/{id}`. A missing `parentId` means "no parent".
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRequest {
    pub label: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

impl From<NodeRequest> for NodeCommand {
    fn from(request: NodeRequest) -> Self {
        Self {
            label: request.label,
            parent_id: request.parent_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeResponse {
    pub id: NodeId,
    pub label: String,
    pub parent_id: Option<NodeId>,
}

impl From<Node> for NodeResponse {
    fn from(node: Node) -> Self {
        Self {
            id: node.id,
            label: node.label,
            parent_id: node.parent_id,
        }
    }
}

/// Raw listing query; values are validated by `PageRequest::parse`.
#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
}
