//! Drop targets, block positions and slot splicing.

use pagecraft_model::{Node, NodeId, NodeRef};
use serde::{Deserialize, Serialize};

use crate::errors::{EditorError, EditorResult};

/// Drop position relative to the node at `DropTarget::index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Top,
    Bottom,
}

/// Where a block should land
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTarget {
    pub parent: NodeRef,
    pub slot: String,
    /// Index of the node the drop happened on; append when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<Edge>,
    /// Page owning the target parent, stamped on commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<NodeId>,
}

impl DropTarget {
    pub fn append(parent: NodeRef, slot: impl Into<String>) -> Self {
        Self {
            parent,
            slot: slot.into(),
            index: None,
            edge: None,
            page: None,
        }
    }

    pub fn at(parent: NodeRef, slot: impl Into<String>, index: usize, edge: Edge) -> Self {
        Self {
            index: Some(index),
            edge: Some(edge),
            ..Self::append(parent, slot)
        }
    }

    pub fn in_page(mut self, page: NodeId) -> Self {
        self.page = Some(page);
        self
    }

    /// Insertion index into a slot currently holding `len` ids:
    /// `index` for `top` (or no edge), `index + 1` for `bottom`, `len` when no
    /// index was given. Clamped to `len`.
    pub fn insertion_index(&self, len: usize) -> usize {
        let index = match (self.index, self.edge) {
            (Some(index), Some(Edge::Bottom)) => index + 1,
            (Some(index), _) => index,
            (None, _) => len,
        };
        index.min(len)
    }
}

/// Current location of a placed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPosition {
    pub block: NodeId,
    pub parent: NodeRef,
    pub slot: String,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<NodeId>,
}

impl BlockPosition {
    pub fn new(block: NodeId, parent: NodeRef, slot: impl Into<String>, index: usize) -> Self {
        Self {
            block,
            parent,
            slot: slot.into(),
            index,
            page: None,
        }
    }

    pub fn in_page(mut self, page: NodeId) -> Self {
        self.page = Some(page);
        self
    }

    pub fn block_ref(&self) -> NodeRef {
        NodeRef::block(self.block)
    }

    /// Fail unless `parent` holds the block at this position
    pub fn verify(&self, parent: &Node) -> EditorResult<()> {
        let found = parent.slot(&self.slot).and_then(|ids| ids.get(self.index)).copied();
        if found == Some(self.block) {
            Ok(())
        } else {
            Err(self.stale())
        }
    }

    pub(crate) fn stale(&self) -> EditorError {
        EditorError::StalePosition {
            block: self.block,
            parent: self.parent,
            slot: self.slot.clone(),
            index: self.index,
        }
    }
}

/// Insert `id` at `index` (clamped) of `slot`, creating the slot list if
/// the record does not carry it yet
pub(crate) fn splice_in(node: &mut Node, slot: &str, index: usize, id: NodeId) {
    let ids = node.slots_mut().entry(slot.to_string()).or_default();
    let index = index.min(ids.len());
    ids.insert(index, id);
}

/// Remove and return the id at `index` of `slot`
pub(crate) fn splice_out(node: &mut Node, slot: &str, index: usize) -> Option<NodeId> {
    let ids = node.slots_mut().get_mut(slot)?;
    if index < ids.len() {
        Some(ids.remove(index))
    } else {
        None
    }
}

pub(crate) fn slot_len(node: &Node, slot: &str) -> usize {
    node.slot(slot).map_or(0, Vec::len)
}
