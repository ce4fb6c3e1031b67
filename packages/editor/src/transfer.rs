//! JSON export and import of node trees.
//!
//! A document is a JSON array of full node records in post-order, root last:
//!
//! ```json
//! [
//!   { "store": "blocks", "id": 4, "type": "text", ... },
//!   { "store": "pages", "id": 1, "slug": "home", "slots": { "root": [4] }, ... }
//! ]
//! ```
//!
//! Imports never trust the ids in the document: every record is re-keyed
//! through the tree cloner. Before that, the document must be a strict tree:
//!
//! - no record is listed twice
//! - everything but the root is a block
//! - every block is referenced by exactly one slot of a node listed after it
//!
//! A page document is imported standalone with [`Editor::import_tree`]; a
//! block document only exists at a position, through [`Editor::import_into`].

use chrono::Utc;
use pagecraft_model::{Collection, Node, NodeRef};
use std::collections::HashSet;
use tracing::{info, instrument};

use crate::engine::{block_kind, Batch, Editor};
use crate::errors::{EditorError, EditorResult};
use crate::mutations::MutationResult;
use crate::target::{slot_len, splice_in, DropTarget};
use crate::tree::{get_tree, plan_duplicate};

impl Editor {
    /// Serialize `root` and its subtree
    pub async fn export_tree(&self, root: NodeRef) -> EditorResult<String> {
        let tree = get_tree(self.store(), root).await?;
        Ok(serde_json::to_string_pretty(&tree)?)
    }

    /// Store a copy of an exported page tree as a new page
    #[instrument(skip(self, json))]
    pub async fn import_tree(&self, json: &str) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let nodes = parse(json, Collection::Pages)?;
        let plan = plan_duplicate(self.store(), &nodes, &self.config().slug_suffix, now).await?;
        let root = plan.root_ref();

        let mut batch = Batch::new();
        batch.insert_all(plan.into_ops());
        batch.created(root);

        info!(%root, nodes = nodes.len(), "Tree imported");
        self.commit(batch, now).await
    }

    /// Import an exported block tree and place it at `target`
    #[instrument(skip(self, json), fields(parent = %target.parent, slot = %target.slot))]
    pub async fn import_into(&self, json: &str, target: &DropTarget) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let nodes = parse(json, Collection::Blocks)?;
        let root = nodes.last().ok_or(EditorError::EmptyInput)?;

        let parent = self.store().get(target.parent).await?;
        self.validator()
            .check_insert(&parent, &target.slot, block_kind(root)?, 1)?;

        let plan = plan_duplicate(self.store(), &nodes, &self.config().slug_suffix, now).await?;
        let copy = plan.root_ref();

        let index = target.insertion_index(slot_len(&parent, &target.slot));
        let mut updated = parent;
        splice_in(&mut updated, &target.slot, index, copy.id);
        updated.touch(now);

        let mut batch = Batch::new();
        batch.insert_all(plan.into_ops());
        batch.created(copy);
        batch.put(updated);
        batch.touch_page(target.page);

        info!(block = %copy.id, index, "Tree imported into parent");
        self.commit(batch, now).await
    }
}

fn parse(json: &str, root: Collection) -> EditorResult<Vec<Node>> {
    let nodes: Vec<Node> = serde_json::from_str(json)?;
    let last = nodes.last().ok_or(EditorError::EmptyInput)?;
    if last.collection() != root {
        return Err(EditorError::WrongCollection {
            expected: root,
            found: last.node_ref(),
        });
    }
    check_tree(&nodes)?;
    Ok(nodes)
}

/// Require a post-order tree with the root last
fn check_tree(nodes: &[Node]) -> EditorResult<()> {
    let root_index = nodes.len().saturating_sub(1);
    let mut listed = HashSet::with_capacity(nodes.len());
    // Blocks listed so far that no slot has claimed yet
    let mut unclaimed = HashSet::new();
    let mut claimed = HashSet::new();

    for (index, node) in nodes.iter().enumerate() {
        let node_ref = node.node_ref();
        if !listed.insert(node_ref) {
            return Err(EditorError::DuplicateRecord(node_ref));
        }
        if index != root_index && !node_ref.is_block() {
            return Err(EditorError::NestedRoot(node_ref));
        }

        for child in node.child_ids() {
            if claimed.contains(&child) {
                return Err(EditorError::SharedChild { child });
            }
            if !unclaimed.remove(&child) {
                return Err(EditorError::DanglingReference { parent: node_ref, child });
            }
            claimed.insert(child);
        }

        if index != root_index {
            unclaimed.insert(node.id());
        }
    }

    match nodes.iter().find(|node| unclaimed.contains(&node.id())) {
        Some(orphan) => Err(EditorError::UnreachableRecord(orphan.node_ref())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecraft_model::{Block, NodeId, Page, Props, Slots};

    fn block(id: u64, children: &[u64]) -> Node {
        let mut slots = Slots::new();
        if !children.is_empty() {
            slots.insert("body".to_string(), children.iter().copied().map(NodeId).collect());
        }
        let mut block = Block::new("section", "Section", Props::new(), slots, Utc::now());
        block.id = NodeId(id);
        Node::from(block)
    }

    #[test]
    fn test_check_tree_accepts_post_order() {
        let nodes = vec![block(1, &[]), block(2, &[]), block(3, &[1]), block(4, &[3, 2])];
        assert!(check_tree(&nodes).is_ok());
        assert!(check_tree(&[block(1, &[])]).is_ok());
    }

    #[test]
    fn test_check_tree_rejects_shapes_that_are_not_trees() {
        let shared = check_tree(&[block(1, &[]), block(2, &[1, 1])]).unwrap_err();
        assert!(matches!(shared, EditorError::SharedChild { child } if child == NodeId(1)));

        let across = check_tree(&[block(1, &[]), block(2, &[1]), block(3, &[1, 2])]).unwrap_err();
        assert!(matches!(across, EditorError::SharedChild { .. }));

        let orphan = check_tree(&[block(1, &[]), block(2, &[]), block(3, &[2])]).unwrap_err();
        assert!(matches!(orphan, EditorError::UnreachableRecord(r) if r == NodeRef::block(NodeId(1))));

        let listed_twice = check_tree(&[block(1, &[]), block(1, &[]), block(2, &[1])]).unwrap_err();
        assert!(matches!(listed_twice, EditorError::DuplicateRecord(_)));

        let own_child = check_tree(&[block(1, &[1])]).unwrap_err();
        assert!(matches!(own_child, EditorError::DanglingReference { .. }));

        let mut page = Page::new("Inner", "inner", "", Utc::now());
        page.id = NodeId(5);
        let nested = check_tree(&[Node::from(page), block(2, &[])]).unwrap_err();
        assert!(matches!(nested, EditorError::NestedRoot(r) if r == NodeRef::page(NodeId(5))));
        assert_eq!(nested.kind(), crate::errors::ErrorKind::Integrity);
    }
}
