//! # Mutation Engine
//!
//! Block-level operations on the stored forest. Every operation follows the
//! same shape:
//!
//! 1. Read the affected parents (and subtrees when needed)
//! 2. Run the placement gates; a rejection stops here with nothing written
//! 3. Build new parent records and any cloned/instantiated blocks
//! 4. Commit everything as one store transaction
//! 5. Report the stale cache keys
//!
//! ## Move
//! - Same parent record: **reorder**. Insert first, then remove; when both
//!   happen in one slot and the old index is at or after the insertion point,
//!   the removal index shifts by one.
//! - Different parent: **reparent**. Both parents are rewritten in the same
//!   transaction, so the block is never in two parents or in none.
//!
//! ## Copy / Delete of many blocks
//! Entries are grouped per parent and handled by descending index, so earlier
//! splices never shift later ones. Each parent is rewritten once.

use chrono::{DateTime, Utc};
use pagecraft_model::{Collection, ComponentRegistry, Node, NodeId, NodeRef, Props};
use pagecraft_store::{RecordStore, WriteOp};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::cache::{CacheInvalidator, NoopInvalidator};
use crate::config::EditorConfig;
use crate::errors::{EditorError, EditorResult};
use crate::instantiate::instantiate;
use crate::mutations::MutationResult;
use crate::target::{slot_len, splice_in, splice_out, BlockPosition, DropTarget};
use crate::tree::{descendant_ids, duplicate_tree, get_tree, plan_duplicate};
use crate::validator::PlacementValidator;

pub struct Editor {
    store: Arc<dyn RecordStore>,
    registry: Arc<ComponentRegistry>,
    cache: Arc<dyn CacheInvalidator>,
    config: EditorConfig,
}

/// Writes and cache keys collected for one logical operation
#[derive(Debug, Default)]
pub(crate) struct Batch {
    ops: Vec<WriteOp>,
    created: Vec<NodeRef>,
    invalidated: Vec<NodeRef>,
    pages: Vec<NodeId>,
}

impl Batch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_all(&mut self, ops: Vec<WriteOp>) {
        self.ops.extend(ops);
    }

    pub(crate) fn insert(&mut self, node: Node) {
        self.ops.push(WriteOp::Insert(node));
    }

    pub(crate) fn put(&mut self, node: Node) {
        self.invalidated.push(node.node_ref());
        self.ops.push(WriteOp::Put(node));
    }

    pub(crate) fn delete(&mut self, node: NodeRef) {
        self.invalidated.push(node);
        self.ops.push(WriteOp::Delete(node));
    }

    pub(crate) fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub(crate) fn invalidate(&mut self, node: NodeRef) {
        self.invalidated.push(node);
    }

    pub(crate) fn created(&mut self, node: NodeRef) {
        self.created.push(node);
    }

    pub(crate) fn touch_page(&mut self, page: Option<NodeId>) {
        if let Some(page) = page {
            if !self.pages.contains(&page) {
                self.pages.push(page);
            }
        }
    }

    fn writes(&self, node: NodeRef) -> bool {
        self.ops.iter().any(|op| op.target() == Some(node))
    }
}

impl Editor {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            store,
            registry,
            cache: Arc::new(NoopInvalidator),
            config: EditorConfig::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_config(mut self, config: EditorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub(crate) fn validator(&self) -> PlacementValidator<'_> {
        PlacementValidator::new(&self.registry)
    }

    /// Post-order subtree of `root`
    pub async fn get_tree(&self, root: NodeRef) -> EditorResult<Vec<Node>> {
        get_tree(self.store(), root).await
    }

    /// Clone a post-order node list into new records; returns the new root
    pub async fn duplicate_tree(&self, nodes: &[Node]) -> EditorResult<Node> {
        duplicate_tree(self.store(), nodes, &self.config.slug_suffix).await
    }

    /// Instantiate `component` with its defaults and place it at `target`
    #[instrument(skip(self), fields(parent = %target.parent, slot = %target.slot))]
    pub async fn block_add(&self, component: &str, target: &DropTarget) -> EditorResult<MutationResult> {
        let now = Utc::now();
        if !self.registry.contains(component) {
            return Err(EditorError::UnknownComponent(component.to_string()));
        }

        let parent = self.store.get(target.parent).await?;
        self.validator().check_insert(&parent, &target.slot, component, 1)?;

        let records = instantiate(self.store(), &self.registry, component, now).await?;
        let root = records.last().map(Node::node_ref).ok_or(EditorError::EmptyInput)?;

        let index = target.insertion_index(slot_len(&parent, &target.slot));
        let mut updated = parent;
        splice_in(&mut updated, &target.slot, index, root.id);
        updated.touch(now);

        let mut batch = Batch::new();
        for record in records {
            batch.insert(record);
        }
        batch.created(root);
        batch.put(updated);
        batch.touch_page(target.page);

        info!(block = %root.id, index, "Block added");
        self.commit(batch, now).await
    }

    /// Move a block; reorders inside one parent record, reparents otherwise
    #[instrument(skip(self), fields(block = %position.block, from = %position.parent, to = %target.parent))]
    pub async fn block_move(&self, position: &BlockPosition, target: &DropTarget) -> EditorResult<MutationResult> {
        if position.parent == target.parent {
            self.reorder(position, target).await
        } else {
            self.reparent(position, target).await
        }
    }

    async fn reorder(&self, position: &BlockPosition, target: &DropTarget) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let parent = self.store.get(position.parent).await?;
        position.verify(&parent)?;

        if target.slot != position.slot {
            let block = self.store.get(position.block_ref()).await?;
            let kind = block_kind(&block)?;
            self.validator().check_insert(&parent, &target.slot, kind, 1)?;
        }

        let insertion = target.insertion_index(slot_len(&parent, &target.slot));
        let removal = if target.slot == position.slot && position.index >= insertion {
            position.index + 1
        } else {
            position.index
        };

        let mut updated = parent;
        splice_in(&mut updated, &target.slot, insertion, position.block);
        if splice_out(&mut updated, &position.slot, removal) != Some(position.block) {
            return Err(position.stale());
        }
        updated.touch(now);

        let mut batch = Batch::new();
        batch.put(updated);
        batch.touch_page(position.page);
        batch.touch_page(target.page);

        debug!(insertion, removal, "Block reordered");
        self.commit(batch, now).await
    }

    async fn reparent(&self, position: &BlockPosition, target: &DropTarget) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let source = self.store.get(position.parent).await?;
        position.verify(&source)?;
        let block = self.store.get(position.block_ref()).await?;
        let target_parent = self.store.get(target.parent).await?;
        let subtree = if target.parent.is_block() {
            Some(get_tree(self.store(), position.block_ref()).await?)
        } else {
            None
        };

        let validator = self.validator();
        if let Some(subtree) = &subtree {
            validator.check_containment(position.block, &descendant_ids(subtree), target.parent)?;
        }
        validator.check_insert(&target_parent, &target.slot, block_kind(&block)?, 1)?;

        let mut new_source = source;
        if splice_out(&mut new_source, &position.slot, position.index) != Some(position.block) {
            return Err(position.stale());
        }
        new_source.touch(now);

        let index = target.insertion_index(slot_len(&target_parent, &target.slot));
        let mut new_target = target_parent;
        splice_in(&mut new_target, &target.slot, index, position.block);
        new_target.touch(now);

        let mut batch = Batch::new();
        batch.put(new_source);
        batch.put(new_target);
        batch.touch_page(position.page);
        batch.touch_page(target.page);

        debug!(index, "Block reparented");
        self.commit(batch, now).await
    }

    /// Copy a block (and its subtree) right after itself
    pub async fn block_copy(&self, position: &BlockPosition) -> EditorResult<MutationResult> {
        self.block_copy_many(std::slice::from_ref(position)).await
    }

    #[instrument(skip(self, positions), fields(count = positions.len()))]
    pub async fn block_copy_many(&self, positions: &[BlockPosition]) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let groups = group_by_parent(positions.iter());

        let mut reads = Vec::with_capacity(groups.len());
        for (parent_ref, entries) in groups {
            let parent = self.store.get(parent_ref).await?;
            let mut trees = Vec::with_capacity(entries.len());
            for position in &entries {
                position.verify(&parent)?;
                trees.push(get_tree(self.store(), position.block_ref()).await?);
            }
            reads.push((parent, entries, trees));
        }

        let validator = self.validator();
        for (parent, entries, trees) in &reads {
            let mut incoming: BTreeMap<&str, usize> = BTreeMap::new();
            for position in entries {
                *incoming.entry(position.slot.as_str()).or_default() += 1;
            }
            for (position, tree) in entries.iter().zip(trees) {
                let root = tree.last().ok_or_else(|| position.stale())?;
                validator.check_insert(parent, &position.slot, block_kind(root)?, incoming[position.slot.as_str()])?;
            }
        }

        let mut batch = Batch::new();
        for (parent, entries, trees) in reads {
            let mut updated = parent;
            for (position, tree) in entries.iter().zip(trees) {
                let plan = plan_duplicate(self.store(), &tree, &self.config.slug_suffix, now).await?;
                let copy = plan.root_ref();
                splice_in(&mut updated, &position.slot, position.index + 1, copy.id);
                batch.created(copy);
                batch.insert_all(plan.into_ops());
                batch.touch_page(position.page);
                debug!(source = %position.block, copy = %copy.id, "Block copied");
            }
            updated.touch(now);
            batch.put(updated);
        }

        self.commit(batch, now).await
    }

    /// Delete a block and its whole subtree
    pub async fn block_delete(&self, position: &BlockPosition) -> EditorResult<MutationResult> {
        self.block_delete_many(std::slice::from_ref(position)).await
    }

    /// Delete several blocks. Blocks nested under another selected block go
    /// with that block's subtree.
    #[instrument(skip(self, positions), fields(count = positions.len()))]
    pub async fn block_delete_many(&self, positions: &[BlockPosition]) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let mut seen = HashSet::new();
        let groups = group_by_parent(positions.iter().filter(|p| seen.insert(p.block)));

        let mut reads = Vec::with_capacity(groups.len());
        for (parent_ref, entries) in groups {
            let parent = self.store.get(parent_ref).await?;
            let mut trees = Vec::with_capacity(entries.len());
            for position in &entries {
                position.verify(&parent)?;
                trees.push(get_tree(self.store(), position.block_ref()).await?);
            }
            reads.push((parent, entries, trees));
        }

        let nested: HashSet<NodeId> = reads
            .iter()
            .flat_map(|(_, _, trees)| trees.iter().flat_map(|tree| descendant_ids(tree)))
            .collect();

        let mut batch = Batch::new();
        for (parent, entries, trees) in reads {
            let mut updated = parent;
            let mut spliced = false;
            for (position, tree) in entries.iter().zip(trees) {
                if nested.contains(&position.block) {
                    continue;
                }
                if splice_out(&mut updated, &position.slot, position.index) != Some(position.block) {
                    return Err(position.stale());
                }
                for node in &tree {
                    batch.delete(node.node_ref());
                }
                batch.touch_page(position.page);
                spliced = true;
                debug!(block = %position.block, nodes = tree.len(), "Block deleted");
            }
            if spliced {
                updated.touch(now);
                batch.put(updated);
            }
        }

        self.commit(batch, now).await
    }

    /// Merge `patch` into a block's props; `null` values remove the prop
    #[instrument(skip(self, patch))]
    pub async fn block_update_props(&self, block: NodeId, patch: Props) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let mut updated = match self.store.get(NodeRef::block(block)).await? {
            Node::Block(block) => block,
            other => {
                return Err(EditorError::WrongCollection {
                    expected: Collection::Blocks,
                    found: other.node_ref(),
                })
            }
        };

        for (key, value) in patch {
            if value.is_null() {
                updated.props.remove(&key);
            } else {
                updated.props.insert(key, value);
            }
        }
        updated.updated_at = now;

        let mut batch = Batch::new();
        batch.put(Node::Block(updated));
        self.commit(batch, now).await
    }

    /// Stamp owning pages, commit, then report stale cache keys
    pub(crate) async fn commit(&self, mut batch: Batch, now: DateTime<Utc>) -> EditorResult<MutationResult> {
        if self.config.touch_owning_page {
            for page in std::mem::take(&mut batch.pages) {
                let page_ref = NodeRef::page(page);
                if batch.writes(page_ref) {
                    continue;
                }
                let mut node = self.store.get(page_ref).await?;
                node.touch(now);
                batch.put(node);
            }
        }

        let Batch {
            ops,
            created,
            invalidated,
            ..
        } = batch;
        let writes = ops.len();
        self.store.commit(ops).await?;

        let mut unique = HashSet::new();
        let invalidated: Vec<NodeRef> = invalidated.into_iter().filter(|r| unique.insert(*r)).collect();
        for node in &invalidated {
            self.cache.invalidate(*node);
        }

        debug!(writes, invalidated = invalidated.len(), "Mutation committed");
        Ok(MutationResult { created, invalidated })
    }
}

pub(crate) fn block_kind(node: &Node) -> EditorResult<&str> {
    node.block_type().ok_or(EditorError::WrongCollection {
        expected: Collection::Blocks,
        found: node.node_ref(),
    })
}

/// Group positions per parent, each group sorted by descending index
fn group_by_parent<'a>(positions: impl Iterator<Item = &'a BlockPosition>) -> BTreeMap<NodeRef, Vec<&'a BlockPosition>> {
    let mut groups: BTreeMap<NodeRef, Vec<&BlockPosition>> = BTreeMap::new();
    for position in positions {
        groups.entry(position.parent).or_default().push(position);
    }
    for entries in groups.values_mut() {
        entries.sort_by(|a, b| b.index.cmp(&a.index));
    }
    groups
}
