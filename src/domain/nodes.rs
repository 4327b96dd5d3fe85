//! Node rows as persisted by the store, and the write-side validation rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

pub type NodeId = i64;

pub const MAX_LABEL_CHARS: usize = 100;

/// A flat node row. `parent_id` may point at a node outside the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub parent_id: Option<NodeId>,
}

/// A label that is non-empty after trimming and at most [`MAX_LABEL_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeLabel(String);

impl NodeLabel {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyLabel);
        }
        let length = trimmed.chars().count();
        if length > MAX_LABEL_CHARS {
            return Err(DomainError::LabelTooLong {
                length,
                max: MAX_LABEL_CHARS,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate an optional parent reference supplied by a client.
pub fn parse_parent_id(raw: Option<i64>) -> Result<Option<NodeId>, DomainError> {
    match raw {
        None => Ok(None),
        Some(id) if id > 0 => Ok(Some(id)),
        Some(id) => Err(DomainError::InvalidParentId(id)),
    }
}
