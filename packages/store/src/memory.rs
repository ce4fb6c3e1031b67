//! # In-memory transactional store
//!
//! Reference [`RecordStore`] implementation. All three collections live behind
//! one async `RwLock`; a commit stages its ops in an overlay and only merges the
//! overlay once every op has succeeded, so a failing op leaves nothing behind.
//!
//! With a snapshot path configured, the merged state is written to disk
//! (temp file + rename) before it becomes visible in memory.
//!
//! Tests can inject write failures with [`MemoryStore::inject_fault`].

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::{Direction, Index, PostOrder, RecordStore, WriteOp};
use async_trait::async_trait;
use pagecraft_model::{Collection, Node, NodeId, NodeRef};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

type Records = BTreeMap<Collection, BTreeMap<NodeId, Node>>;

/// Deliberate failure for exercising atomicity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail the nth record write (1-based) counted from injection.
    /// Inserts, puts, deletes and each shifted template count as one write,
    /// including writes of transactions that later rolled back.
    FailOnWrite(usize),
}

#[derive(Debug, Default)]
struct Tables {
    records: Records,
    next_id: u64,
    /// Writes left before the injected fault fires
    fault: Option<usize>,
}

impl Tables {
    fn get(&self, node: NodeRef) -> Option<&Node> {
        self.records.get(&node.collection).and_then(|c| c.get(&node.id))
    }

    fn iter(&self, collection: Collection) -> impl Iterator<Item = &Node> {
        self.records.get(&collection).into_iter().flat_map(|c| c.values())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    next_id: u64,
    records: Vec<Node>,
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    config: StoreConfig,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_id: 1,
                ..Tables::default()
            }),
            config: StoreConfig::in_memory(),
        }
    }

    /// Open a store, loading the configured snapshot if one exists
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let mut tables = Tables {
            next_id: 1,
            ..Tables::default()
        };

        if let Some(path) = &config.snapshot_path {
            if tokio::fs::try_exists(path).await? {
                let content = tokio::fs::read_to_string(path).await?;
                let snapshot: Snapshot = serde_json::from_str(&content)?;
                let mut max_id = 0;
                for node in snapshot.records {
                    max_id = max_id.max(node.id().get());
                    tables
                        .records
                        .entry(node.collection())
                        .or_default()
                        .insert(node.id(), node);
                }
                tables.next_id = snapshot.next_id.max(max_id + 1);
                info!(path = %path.display(), next_id = tables.next_id, "Loaded store snapshot");
            }
        }

        Ok(Self {
            tables: RwLock::new(tables),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn inject_fault(&self, fault: Fault) {
        let mut tables = self.tables.write().await;
        match fault {
            Fault::FailOnWrite(nth) => tables.fault = Some(nth.max(1)),
        }
    }

    pub async fn clear_faults(&self) {
        self.tables.write().await.fault = None;
    }

    pub async fn count(&self, collection: Collection) -> usize {
        self.tables.read().await.iter(collection).count()
    }

    pub async fn contains(&self, node: NodeRef) -> bool {
        self.tables.read().await.get(node).is_some()
    }

    /// Every record of a collection in id order
    pub async fn all(&self, collection: Collection) -> Vec<Node> {
        self.tables.read().await.iter(collection).cloned().collect()
    }

    async fn write_snapshot(&self, path: &Path, records: &Records, next_id: u64) -> StoreResult<()> {
        let snapshot = Snapshot {
            next_id,
            records: records.values().flat_map(|c| c.values().cloned()).collect(),
        };
        let json = if self.config.pretty_snapshot {
            serde_json::to_string_pretty(&snapshot)?
        } else {
            serde_json::to_string(&snapshot)?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Staged state of one transaction
struct Txn<'a> {
    base: &'a Tables,
    overlay: BTreeMap<NodeRef, Option<Node>>,
    next_id: u64,
    writes: usize,
    fault_at: Option<usize>,
}

impl<'a> Txn<'a> {
    fn new(base: &'a Tables) -> Self {
        Self {
            base,
            overlay: BTreeMap::new(),
            next_id: base.next_id,
            writes: 0,
            fault_at: base.fault,
        }
    }

    fn lookup(&self, node: NodeRef) -> Option<&Node> {
        match self.overlay.get(&node) {
            Some(staged) => staged.as_ref(),
            None => self.base.get(node),
        }
    }

    fn record_write(&mut self, target: NodeRef) -> StoreResult<()> {
        self.writes += 1;
        if self.fault_at == Some(self.writes) {
            warn!(%target, write = self.writes, "Injected write failure");
            return Err(StoreError::WriteFailed(format!("injected failure writing {}", target)));
        }
        Ok(())
    }

    fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn claim(&mut self, id: NodeId) {
        if id.get() >= self.next_id {
            self.next_id = id.get() + 1;
        }
    }

    fn apply(&mut self, op: WriteOp) -> StoreResult<Option<NodeId>> {
        match op {
            WriteOp::Insert(mut node) => {
                if node.id() == NodeId::default() {
                    let id = self.allocate();
                    node.set_id(id);
                } else if self.lookup(node.node_ref()).is_some() {
                    return Err(StoreError::DuplicateId(node.node_ref()));
                } else {
                    self.claim(node.id());
                }
                node.set_revision(1);
                self.check_slug(&node)?;
                self.record_write(node.node_ref())?;
                let id = node.id();
                self.overlay.insert(node.node_ref(), Some(node));
                Ok(Some(id))
            }

            WriteOp::Put(mut node) => {
                if node.id() == NodeId::default() {
                    let id = self.allocate();
                    node.set_id(id);
                    node.set_revision(1);
                } else {
                    let target = node.node_ref();
                    let stored = self.lookup(target).map(Node::revision);
                    match stored {
                        Some(revision) if revision == node.revision() => {
                            node.set_revision(revision + 1);
                        }
                        None if node.revision() == 0 => {
                            self.claim(node.id());
                            node.set_revision(1);
                        }
                        found => {
                            warn!(%target, expected = node.revision(), ?found, "Revision conflict");
                            return Err(StoreError::Conflict {
                                node: target,
                                expected: node.revision(),
                                found,
                            });
                        }
                    }
                }
                self.check_slug(&node)?;
                self.record_write(node.node_ref())?;
                let id = node.id();
                self.overlay.insert(node.node_ref(), Some(node));
                Ok(Some(id))
            }

            WriteOp::Delete(target) => {
                if self.lookup(target).is_none() {
                    return Err(StoreError::NotFound(target));
                }
                self.record_write(target)?;
                self.overlay.insert(target, None);
                Ok(None)
            }

            WriteOp::ShiftTemplateOrder { from, to, delta } => {
                let mut shifted: Vec<Node> = self
                    .staged(Collection::Templates)
                    .into_iter()
                    .filter(|t| {
                        t.as_template()
                            .map(|t| t.order >= from && to.map_or(true, |to| t.order < to))
                            .unwrap_or(false)
                    })
                    .collect();
                shifted.sort_by_key(|n| n.as_template().map(|t| t.order));

                for mut node in shifted {
                    if let Node::Template(template) = &mut node {
                        let order = i64::from(template.order) + delta;
                        template.order = u32::try_from(order).map_err(|_| StoreError::InvalidOrder)?;
                        template.revision += 1;
                    }
                    self.record_write(node.node_ref())?;
                    self.overlay.insert(node.node_ref(), Some(node));
                }
                Ok(None)
            }

            WriteOp::CheckTemplateOrder => {
                let mut orders: Vec<u32> = self
                    .staged(Collection::Templates)
                    .iter()
                    .filter_map(|n| n.as_template().map(|t| t.order))
                    .collect();
                orders.sort_unstable();
                if orders.iter().zip(0u32..).any(|(order, expected)| *order != expected) {
                    warn!(?orders, "Template orders are not contiguous");
                    return Err(StoreError::SparseTemplateOrder(orders));
                }
                Ok(None)
            }
        }
    }

    /// A page slug may only be held by one page
    fn check_slug(&self, node: &Node) -> StoreResult<()> {
        let Some(page) = node.as_page() else {
            return Ok(());
        };
        let taken = self
            .staged(Collection::Pages)
            .iter()
            .any(|other| other.id() != page.id && other.as_page().is_some_and(|p| p.slug == page.slug));
        if taken {
            warn!(slug = %page.slug, "Slug already in use");
            return Err(StoreError::SlugTaken(page.slug.clone()));
        }
        Ok(())
    }

    /// Records of a collection as seen from inside the transaction
    fn staged(&self, collection: Collection) -> Vec<Node> {
        let mut merged: BTreeMap<NodeId, Node> = self
            .base
            .iter(collection)
            .map(|n| (n.id(), n.clone()))
            .collect();
        for (node_ref, staged) in &self.overlay {
            if node_ref.collection != collection {
                continue;
            }
            match staged {
                Some(node) => {
                    merged.insert(node_ref.id, node.clone());
                }
                None => {
                    merged.remove(&node_ref.id);
                }
            }
        }
        merged.into_values().collect()
    }
}

fn merge(records: &mut Records, overlay: BTreeMap<NodeRef, Option<Node>>) {
    for (node_ref, staged) in overlay {
        let collection = records.entry(node_ref.collection).or_default();
        match staged {
            Some(node) => {
                collection.insert(node_ref.id, node);
            }
            None => {
                collection.remove(&node_ref.id);
            }
        }
    }
}

fn compare(index: Index, a: &Node, b: &Node) -> Ordering {
    match index {
        Index::CreatedAt => a.created_at().cmp(&b.created_at()),
        Index::UpdatedAt => a.updated_at().cmp(&b.updated_at()),
        Index::Order => a
            .as_template()
            .map(|t| t.order)
            .cmp(&b.as_template().map(|t| t.order)),
        Index::Slug => a
            .as_page()
            .map(|p| p.slug.as_str())
            .cmp(&b.as_page().map(|p| p.slug.as_str())),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, node: NodeRef) -> StoreResult<Node> {
        self.tables
            .read()
            .await
            .get(node)
            .cloned()
            .ok_or(StoreError::NotFound(node))
    }

    async fn get_many_sorted_by_index(
        &self,
        collection: Collection,
        index: Index,
        direction: Direction,
    ) -> StoreResult<Vec<Node>> {
        if !index.supports(collection) {
            return Err(StoreError::UnsupportedIndex {
                collection,
                index: index.name(),
            });
        }

        let mut nodes: Vec<Node> = self.tables.read().await.iter(collection).cloned().collect();
        nodes.sort_by(|a, b| compare(index, a, b).then_with(|| a.id().cmp(&b.id())));
        if direction == Direction::Descending {
            nodes.reverse();
        }
        Ok(nodes)
    }

    async fn reserve_ids(&self, count: usize) -> StoreResult<Vec<NodeId>> {
        let mut tables = self.tables.write().await;
        let start = tables.next_id;
        tables.next_id += count as u64;
        Ok((start..start + count as u64).map(NodeId).collect())
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<NodeId>> {
        let op_count = ops.len();
        let mut tables = self.tables.write().await;

        let staged = {
            let mut txn = Txn::new(&tables);
            let mut ids = Vec::new();
            let mut failure = None;
            for op in ops {
                match txn.apply(op) {
                    Ok(Some(id)) => ids.push(id),
                    Ok(None) => {}
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            match failure {
                Some(err) => Err((err, txn.writes, txn.fault_at)),
                None => Ok((txn.overlay, txn.next_id, txn.writes, ids)),
            }
        };

        let (overlay, next_id, writes, ids) = match staged {
            Ok(staged) => staged,
            Err((err, writes, fault_at)) => {
                tables.fault = fault_at.and_then(|remaining| remaining.checked_sub(writes)).filter(|n| *n > 0);
                debug!(ops = op_count, error = %err, "Transaction rolled back");
                return Err(err);
            }
        };

        if let Some(path) = self.config.snapshot_path.clone() {
            let mut next = tables.records.clone();
            merge(&mut next, overlay);
            self.write_snapshot(&path, &next, next_id).await?;
            tables.records = next;
        } else {
            merge(&mut tables.records, overlay);
        }
        tables.next_id = next_id;
        tables.fault = tables.fault.and_then(|remaining| remaining.checked_sub(writes)).filter(|n| *n > 0);

        debug!(ops = op_count, writes, "Transaction committed");
        Ok(ids)
    }

    async fn get_subtree(&self, root: NodeRef) -> StoreResult<Vec<Node>> {
        let tables = self.tables.read().await;
        let root_node = tables.get(root).cloned().ok_or(StoreError::NotFound(root))?;
        let mut walk = PostOrder::new(root_node)?;
        while let Some(child) = walk.next_child() {
            let node = tables.get(child).cloned().ok_or(StoreError::NotFound(child))?;
            walk.descend(node)?;
        }
        Ok(walk.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pagecraft_model::{Block, Page, Props, Slots, Template};

    fn block(kind: &str) -> Node {
        Node::from(Block::new(kind, kind, Props::new(), Slots::new(), Utc::now()))
    }

    fn parent(kind: &str, children: Vec<NodeId>) -> Node {
        let mut slots = Slots::new();
        slots.insert("children".to_string(), children);
        Node::from(Block::new(kind, kind, Props::new(), slots, Utc::now()))
    }

    #[tokio::test]
    async fn test_add_allocates_ids() {
        let store = MemoryStore::new();
        let a = store.add(block("text")).await.unwrap();
        let b = store.add(block("text")).await.unwrap();

        assert_ne!(a, b);
        let stored = store.get(NodeRef::block(a)).await.unwrap();
        assert_eq!(stored.id(), a);
        assert_eq!(stored.revision(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(NodeRef::block(NodeId(42))).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_put_bumps_revision_and_detects_stale_writes() {
        let store = MemoryStore::new();
        let id = store.add(block("text")).await.unwrap();

        let first = store.get(NodeRef::block(id)).await.unwrap();
        let stale = first.clone();
        store.put(first).await.unwrap();

        let err = store.put(stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, found: Some(2), .. }));
    }

    #[tokio::test]
    async fn test_put_does_not_resurrect_deleted_record() {
        let store = MemoryStore::new();
        let id = store.add(block("text")).await.unwrap();
        let read = store.get(NodeRef::block(id)).await.unwrap();

        store.delete(NodeRef::block(id)).await.unwrap();

        let err = store.put(read).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { found: None, .. }));
        assert!(!store.contains(NodeRef::block(id)).await);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        let keep = store.add(block("text")).await.unwrap();

        let result = store
            .commit(vec![
                WriteOp::Delete(NodeRef::block(keep)),
                WriteOp::Insert(block("image")),
                WriteOp::Delete(NodeRef::block(NodeId(999))),
            ])
            .await;

        assert!(result.is_err());
        assert!(store.contains(NodeRef::block(keep)).await);
        assert_eq!(store.count(Collection::Blocks).await, 1);
    }

    #[tokio::test]
    async fn test_injected_fault_rolls_back() {
        let store = MemoryStore::new();
        let a = store.add(block("a")).await.unwrap();
        let b = store.add(block("b")).await.unwrap();
        let node_a = store.get(NodeRef::block(a)).await.unwrap();
        let node_b = store.get(NodeRef::block(b)).await.unwrap();

        store.inject_fault(Fault::FailOnWrite(2)).await;
        let err = store.put_many(vec![node_a.clone(), node_b]).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed(_)));
        assert_eq!(store.get(NodeRef::block(a)).await.unwrap().revision(), 1);

        // Fault fired once and is gone
        store.put(node_a).await.unwrap();
    }

    #[tokio::test]
    async fn test_rolled_back_writes_count_toward_fault() {
        let store = MemoryStore::new();
        store.inject_fault(Fault::FailOnWrite(3)).await;

        // One staged write, then an unrelated failure
        let err = store
            .commit(vec![
                WriteOp::Insert(block("a")),
                WriteOp::Delete(NodeRef::block(NodeId(999))),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store
            .add_many(vec![block("b"), block("c")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed(_)));
        assert_eq!(store.count(Collection::Blocks).await, 0);

        store.add_many(vec![block("b"), block("c")]).await.unwrap();
    }

    #[tokio::test]
    async fn test_page_slugs_are_unique() {
        let store = MemoryStore::new();
        let home = store.add(Node::from(Page::new("Home", "home", "", Utc::now()))).await.unwrap();
        let about = store.add(Node::from(Page::new("About", "about", "", Utc::now()))).await.unwrap();

        let err = store
            .add(Node::from(Page::new("Again", "home", "", Utc::now())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SlugTaken(ref slug) if slug == "home"));

        // Rewriting a page under its own slug is fine, taking another is not
        let node = store.get(NodeRef::page(home)).await.unwrap();
        store.put(node).await.unwrap();

        let mut node = store.get(NodeRef::page(about)).await.unwrap();
        if let Node::Page(page) = &mut node {
            page.slug = "home".to_string();
        }
        let err = store.put(node).await.unwrap_err();
        assert!(matches!(err, StoreError::SlugTaken(_)));
        assert_eq!(store.count(Collection::Pages).await, 2);
    }

    #[tokio::test]
    async fn test_check_template_order() {
        let store = MemoryStore::new();
        let first = Template::new("a", 0, NodeId(100), Utc::now());
        store.add(Node::from(first)).await.unwrap();
        store.commit(vec![WriteOp::CheckTemplateOrder]).await.unwrap();

        let clash = Template::new("b", 0, NodeId(101), Utc::now());
        let err = store
            .commit(vec![WriteOp::Insert(Node::from(clash)), WriteOp::CheckTemplateOrder])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SparseTemplateOrder(ref orders) if orders == &vec![0, 0]));
        assert_eq!(store.count(Collection::Templates).await, 1);

        let next = Template::new("b", 1, NodeId(101), Utc::now());
        store
            .commit(vec![WriteOp::Insert(Node::from(next)), WriteOp::CheckTemplateOrder])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_subtree_is_post_order() {
        let store = MemoryStore::new();
        let leaf_a = store.add(block("a")).await.unwrap();
        let leaf_b = store.add(block("b")).await.unwrap();
        let mid = store.add(parent("mid", vec![leaf_b])).await.unwrap();
        let root = store.add(parent("root", vec![leaf_a, mid])).await.unwrap();

        let tree = store.get_subtree(NodeRef::block(root)).await.unwrap();
        let ids: Vec<_> = tree.iter().map(Node::id).collect();
        assert_eq!(ids, vec![leaf_a, leaf_b, mid, root]);
    }

    #[tokio::test]
    async fn test_subtree_broken_reference_is_fatal() {
        let store = MemoryStore::new();
        let root = store.add(parent("root", vec![NodeId(77)])).await.unwrap();

        let err = store.get_subtree(NodeRef::block(root)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(r) if r == NodeRef::block(NodeId(77))));
    }

    #[tokio::test]
    async fn test_shift_template_order() {
        let store = MemoryStore::new();
        for order in 0..4 {
            let template = Template::new(format!("t{}", order), order, NodeId(100 + order as u64), Utc::now());
            store.add(Node::from(template)).await.unwrap();
        }

        store
            .commit(vec![WriteOp::ShiftTemplateOrder { from: 1, to: Some(3), delta: 1 }])
            .await
            .unwrap();

        let sorted = store
            .get_many_sorted_by_index(Collection::Templates, Index::Order, Direction::Ascending)
            .await
            .unwrap();
        let orders: Vec<_> = sorted
            .iter()
            .map(|n| (n.as_template().unwrap().name.clone(), n.as_template().unwrap().order))
            .collect();
        assert_eq!(
            orders,
            vec![
                ("t0".to_string(), 0),
                ("t1".to_string(), 2),
                ("t2".to_string(), 3),
                ("t3".to_string(), 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_negative_order_rejected() {
        let store = MemoryStore::new();
        let template = Template::new("t", 0, NodeId(5), Utc::now());
        store.add(Node::from(template)).await.unwrap();

        let err = store
            .commit(vec![WriteOp::ShiftTemplateOrder { from: 0, to: None, delta: -1 }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOrder));
    }

    #[tokio::test]
    async fn test_unsupported_index() {
        let store = MemoryStore::new();
        let err = store
            .get_many_sorted_by_index(Collection::Blocks, Index::Order, Direction::Ascending)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedIndex { .. }));
    }

    #[tokio::test]
    async fn test_reserved_ids_can_be_inserted() {
        let store = MemoryStore::new();
        let ids = store.reserve_ids(2).await.unwrap();
        let mut node = block("text");
        node.set_id(ids[1]);

        let inserted = store.commit(vec![WriteOp::Insert(node)]).await.unwrap();
        assert_eq!(inserted, vec![ids[1]]);

        let next = store.add(block("text")).await.unwrap();
        assert!(next > ids[1]);
    }
}
