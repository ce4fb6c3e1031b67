//! # Tree reading and cloning
//!
//! ## Reader
//!
//! `get_tree` returns a node and all of its descendants in post-order:
//! children before the parent that references them, root last. A missing
//! child aborts the read; broken references are never patched up.
//!
//! ## Cloner
//!
//! `duplicate_tree` walks a post-order list and clones every node under a
//! freshly allocated id, rewriting slot lists through an old-id -> new-id map.
//! Post-order guarantees every child was mapped before its parent is reached.
//!
//! ```text
//! [leaf(3), leaf(4), root(2)]  →  [leaf(10), leaf(11), root(12){slots: [10, 11]}]
//! ```
//!
//! The engine uses the planning half (`plan_duplicate`) so clones and the
//! parent splice commit in one transaction.

use chrono::{DateTime, Utc};
use pagecraft_model::{Collection, Node, NodeId, NodeRef, Slots};
use pagecraft_store::{Direction, Index, RecordStore, WriteOp};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::errors::{EditorError, EditorResult};

/// Fetch `root` and its whole subtree in post-order
pub async fn get_tree(store: &dyn RecordStore, root: NodeRef) -> EditorResult<Vec<Node>> {
    let nodes = store.get_subtree(root).await?;
    debug!(%root, nodes = nodes.len(), "Read tree");
    Ok(nodes)
}

/// Ids of every block strictly below the root of a post-order tree
pub fn descendant_ids(tree: &[Node]) -> HashSet<NodeId> {
    match tree.split_last() {
        Some((_, descendants)) => descendants.iter().map(Node::id).collect(),
        None => HashSet::new(),
    }
}

/// Cloned records ready to be inserted
#[derive(Debug, Clone)]
pub struct ClonedTree {
    /// Clones in post-order, new root last
    records: Vec<Node>,
    /// Source id -> clone id
    id_map: HashMap<NodeId, NodeId>,
    root: NodeRef,
}

impl ClonedTree {
    pub fn root_ref(&self) -> NodeRef {
        self.root
    }

    pub fn records(&self) -> &[Node] {
        &self.records
    }

    pub fn id_map(&self) -> &HashMap<NodeId, NodeId> {
        &self.id_map
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.records.into_iter().map(WriteOp::Insert).collect()
    }
}

/// Clone a post-order tree into records carrying reserved ids, without
/// writing anything.
///
/// A cloned page root gets a fresh unique slug, an unpublished state and a
/// URL derived from the new slug.
pub async fn plan_duplicate(
    store: &dyn RecordStore,
    nodes: &[Node],
    slug_suffix: &str,
    now: DateTime<Utc>,
) -> EditorResult<ClonedTree> {
    if nodes.is_empty() {
        return Err(EditorError::EmptyInput);
    }

    let mut taken_slugs: Option<HashSet<String>> = None;
    let ids = store.reserve_ids(nodes.len()).await?;
    let mut id_map = HashMap::with_capacity(nodes.len());
    let mut records = Vec::with_capacity(nodes.len());

    for (node, new_id) in nodes.iter().zip(ids) {
        let slots = remap_slots(node, &id_map)?;

        let mut clone = match node {
            Node::Block(block) => Node::Block(block.duplicate(slots, now)),
            Node::Page(page) => {
                if taken_slugs.is_none() {
                    taken_slugs = Some(existing_slugs(store).await?);
                }
                let taken = taken_slugs.get_or_insert_with(HashSet::new);
                let slug = unique_slug(&page.slug, slug_suffix, taken);
                taken.insert(slug.clone());
                Node::Page(page.duplicate(slots, slug, now))
            }
            Node::Template(_) => {
                return Err(EditorError::WrongCollection {
                    expected: Collection::Blocks,
                    found: node.node_ref(),
                })
            }
        };

        clone.set_id(new_id);
        id_map.insert(node.id(), new_id);
        records.push(clone);
    }

    let root = records.last().map(Node::node_ref).ok_or(EditorError::EmptyInput)?;
    Ok(ClonedTree { records, id_map, root })
}

/// Clone a post-order tree and insert every clone in one transaction.
/// Returns the new root with its allocated id.
pub async fn duplicate_tree(store: &dyn RecordStore, nodes: &[Node], slug_suffix: &str) -> EditorResult<Node> {
    let plan = plan_duplicate(store, nodes, slug_suffix, Utc::now()).await?;
    let mut root = plan.records.last().cloned().ok_or(EditorError::EmptyInput)?;
    let count = plan.records.len();

    store.commit(plan.into_ops()).await?;
    root.set_revision(1);

    debug!(root = %root.node_ref(), nodes = count, "Duplicated tree");
    Ok(root)
}

fn remap_slots(node: &Node, id_map: &HashMap<NodeId, NodeId>) -> EditorResult<Slots> {
    node.slots()
        .iter()
        .map(|(name, ids)| {
            let remapped = ids
                .iter()
                .map(|child| {
                    id_map.get(child).copied().ok_or(EditorError::DanglingReference {
                        parent: node.node_ref(),
                        child: *child,
                    })
                })
                .collect::<EditorResult<Vec<_>>>()?;
            Ok((name.clone(), remapped))
        })
        .collect()
}

async fn existing_slugs(store: &dyn RecordStore) -> EditorResult<HashSet<String>> {
    let pages = store
        .get_many_sorted_by_index(Collection::Pages, Index::Slug, Direction::Ascending)
        .await?;
    Ok(pages
        .iter()
        .filter_map(|n| n.as_page().map(|p| p.slug.clone()))
        .collect())
}

/// `{base}-{suffix}`, then `{base}-{suffix}-2`, `-3`, ... until unused
pub(crate) fn unique_slug(base: &str, suffix: &str, taken: &HashSet<String>) -> String {
    let first = format!("{}-{}", base, suffix);
    if !taken.contains(&first) {
        return first;
    }
    (2..)
        .map(|n| format!("{}-{}-{}", base, suffix, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(first)
}
