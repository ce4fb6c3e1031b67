//! # Record Store contract
//!
//! Three logical collections (pages, blocks, templates) behind one trait.
//! Every write goes through [`RecordStore::commit`], which applies a list of
//! [`WriteOp`]s as one all-or-nothing transaction across collections.
//!
//! ## Revisions
//!
//! Records carry a `revision` stamp:
//! - `Insert` stores revision 1
//! - `Put` requires the incoming revision to match the stored one and bumps it
//! - `Put` of a record that no longer exists fails unless its revision is 0
//!
//! A writer that read a record, then lost a race against a delete or another
//! write, gets `StoreError::Conflict` instead of overwriting newer state.
//!
//! ## Collection constraints
//!
//! Checked against the staged state, so a racing writer fails at commit:
//! - page slugs are unique (`StoreError::SlugTaken`)
//! - `WriteOp::CheckTemplateOrder` requires dense template orders
//!   (`StoreError::SparseTemplateOrder`)

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use pagecraft_model::{Collection, Node, NodeId, NodeRef};
use std::collections::HashSet;

/// Secondary indexes the store can sort by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    CreatedAt,
    UpdatedAt,
    /// Templates only
    Order,
    /// Pages only
    Slug,
}

impl Index {
    pub fn name(self) -> &'static str {
        match self {
            Index::CreatedAt => "createdAt",
            Index::UpdatedAt => "updatedAt",
            Index::Order => "order",
            Index::Slug => "slug",
        }
    }

    pub fn supports(self, collection: Collection) -> bool {
        match self {
            Index::CreatedAt | Index::UpdatedAt => true,
            Index::Order => collection == Collection::Templates,
            Index::Slug => collection == Collection::Pages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One record-level write inside a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create a record. An id of 0 is allocated at commit time, any other id
    /// must be unused (typically reserved through `reserve_ids`).
    Insert(Node),

    /// Revision-checked upsert
    Put(Node),

    /// Remove a record; fails if it is already gone
    Delete(NodeRef),

    /// Add `delta` to the order of every template with `from <= order < to`
    /// (`to = None` means unbounded)
    ShiftTemplateOrder { from: u32, to: Option<u32>, delta: i64 },

    /// Fail the transaction unless the template orders staged so far are
    /// exactly `0..count`. Writes nothing.
    CheckTemplateOrder,
}

impl WriteOp {
    pub fn target(&self) -> Option<NodeRef> {
        match self {
            WriteOp::Insert(node) | WriteOp::Put(node) => Some(node.node_ref()),
            WriteOp::Delete(node) => Some(*node),
            WriteOp::ShiftTemplateOrder { .. } | WriteOp::CheckTemplateOrder => None,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, node: NodeRef) -> StoreResult<Node>;

    async fn get_many_sorted_by_index(
        &self,
        collection: Collection,
        index: Index,
        direction: Direction,
    ) -> StoreResult<Vec<Node>>;

    /// Allocate ids for records that will be inserted later in one commit
    async fn reserve_ids(&self, count: usize) -> StoreResult<Vec<NodeId>>;

    /// Apply all ops atomically. Returns the ids of inserted and put records,
    /// in op order.
    async fn commit(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<NodeId>>;

    async fn add(&self, node: Node) -> StoreResult<NodeId> {
        let ids = self.add_many(vec![node]).await?;
        single(ids)
    }

    async fn add_many(&self, nodes: Vec<Node>) -> StoreResult<Vec<NodeId>> {
        let ops = nodes
            .into_iter()
            .map(|mut node| {
                node.set_id(NodeId::default());
                WriteOp::Insert(node)
            })
            .collect();
        self.commit(ops).await
    }

    async fn put(&self, node: Node) -> StoreResult<NodeId> {
        let ids = self.put_many(vec![node]).await?;
        single(ids)
    }

    async fn put_many(&self, nodes: Vec<Node>) -> StoreResult<Vec<NodeId>> {
        self.commit(nodes.into_iter().map(WriteOp::Put).collect()).await
    }

    async fn delete(&self, node: NodeRef) -> StoreResult<()> {
        self.delete_many(vec![node]).await
    }

    async fn delete_many(&self, nodes: Vec<NodeRef>) -> StoreResult<()> {
        self.commit(nodes.into_iter().map(WriteOp::Delete).collect()).await?;
        Ok(())
    }

    /// Fetch `root` and every block below it in post-order (children before
    /// the parent that references them, root last).
    ///
    /// The default implementation issues one `get` per node; stores that can
    /// read a whole subtree in one pass should override it.
    async fn get_subtree(&self, root: NodeRef) -> StoreResult<Vec<Node>> {
        let root_node = self.get(root).await?;
        let mut walk = PostOrder::new(root_node)?;
        while let Some(child) = walk.next_child() {
            let node = self.get(child).await?;
            walk.descend(node)?;
        }
        Ok(walk.finish())
    }
}

fn single(ids: Vec<NodeId>) -> StoreResult<NodeId> {
    ids.into_iter()
        .next()
        .ok_or_else(|| StoreError::WriteFailed("commit returned no id".to_string()))
}

/// Iterative post-order walk driven by the caller's fetches.
///
/// Children are visited slot by slot in slot-list order; a node is emitted
/// once all of its children have been emitted.
pub struct PostOrder {
    stack: Vec<(Node, std::vec::IntoIter<NodeId>)>,
    seen: HashSet<NodeRef>,
    out: Vec<Node>,
}

impl PostOrder {
    pub fn new(root: Node) -> StoreResult<Self> {
        let mut walk = Self {
            stack: Vec::new(),
            seen: HashSet::new(),
            out: Vec::new(),
        };
        walk.descend(root)?;
        Ok(walk)
    }

    /// Next block to fetch, or `None` once the walk is complete.
    /// Finished nodes are moved to the output as a side effect.
    pub fn next_child(&mut self) -> Option<NodeRef> {
        loop {
            let next = match self.stack.last_mut() {
                Some((_, children)) => children.next(),
                None => return None,
            };
            match next {
                Some(id) => return Some(NodeRef::block(id)),
                None => {
                    if let Some((node, _)) = self.stack.pop() {
                        self.out.push(node);
                    }
                }
            }
        }
    }

    pub fn descend(&mut self, node: Node) -> StoreResult<()> {
        if !self.seen.insert(node.node_ref()) {
            return Err(StoreError::DuplicateReference(node.node_ref()));
        }
        let children: Vec<NodeId> = node.child_ids().collect();
        self.stack.push((node, children.into_iter()));
        Ok(())
    }

    pub fn finish(self) -> Vec<Node> {
        self.out
    }
}
