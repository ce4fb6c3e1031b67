//! Shared fixture for the editor integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use pagecraft_editor::{
    BlockPosition, Collection, DropTarget, Editor, MutationResult, Node, NodeId, NodeRef, RecordingInvalidator,
};
use pagecraft_model::{ComponentRegistry, ROOT_SLOT};
use pagecraft_store::{Direction, Index, MemoryStore, RecordStore, StoreResult, WriteOp};
use serde_json::json;
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Components used across the tests:
///
/// - `text`, `image`: leaves
/// - `section`: one unbounded `body` slot
/// - `columns`: `left` holds two blocks and refuses nested columns, `right` is open
/// - `card`: `body` starts with one text block
pub fn registry() -> ComponentRegistry {
    let json = json!({
        "components": [
            { "type": "text", "defaultProps": { "content": "Hello" } },
            { "type": "image", "defaultProps": { "src": "" } },
            { "type": "section", "slots": { "body": {} } },
            {
                "type": "columns",
                "slots": {
                    "left": { "maxItems": 2, "disabledComponents": ["columns"] },
                    "right": {}
                }
            },
            {
                "type": "card",
                "label": "Card",
                "slots": { "body": {} },
                "defaultSlots": { "body": [{ "type": "text", "props": { "content": "Card text" } }] }
            }
        ]
    });
    match ComponentRegistry::from_json(&json.to_string()) {
        Ok(registry) => registry,
        Err(err) => panic!("test registry is invalid: {}", err),
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<RecordingInvalidator>,
    pub editor: Editor,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(RecordingInvalidator::new());
        let editor = Editor::new(store.clone(), Arc::new(registry())).with_cache(cache.clone());
        Self { store, cache, editor }
    }

    pub async fn page(&self, slug: &str) -> NodeId {
        let result = self.editor.page_create("Page", slug, "").await.unwrap();
        result.created_root().unwrap().id
    }

    /// Append a new `component` to `slot` of `parent`; returns the new block id
    pub async fn add(&self, component: &str, parent: NodeRef, slot: &str) -> NodeId {
        let result = self
            .editor
            .block_add(component, &DropTarget::append(parent, slot))
            .await
            .unwrap();
        created(&result)
    }

    /// Page with `count` text blocks in its root slot
    pub async fn page_with_texts(&self, slug: &str, count: usize) -> (NodeId, Vec<NodeId>) {
        let page = self.page(slug).await;
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            blocks.push(self.add("text", NodeRef::page(page), ROOT_SLOT).await);
        }
        (page, blocks)
    }

    pub async fn node(&self, node: NodeRef) -> Node {
        self.store.get(node).await.unwrap()
    }

    pub async fn slot(&self, parent: NodeRef, slot: &str) -> Vec<NodeId> {
        self.node(parent).await.slot(slot).cloned().unwrap_or_default()
    }

    /// Position of `block` in `slot` of `parent`, read from the store
    pub async fn position(&self, block: NodeId, parent: NodeRef, slot: &str) -> BlockPosition {
        let ids = self.slot(parent, slot).await;
        let index = ids.iter().position(|id| *id == block).unwrap();
        BlockPosition::new(block, parent, slot, index)
    }

    pub async fn block_count(&self) -> usize {
        self.store.count(Collection::Blocks).await
    }

    /// Editor over the same store that yields before every store call
    pub fn yielding_editor(&self) -> Editor {
        Editor::new(Arc::new(YieldingStore(self.store.clone())), Arc::new(registry()))
    }
}

/// Hands control back to the runtime before each call, so operations
/// joined on one task interleave at every store access
pub struct YieldingStore(pub Arc<MemoryStore>);

#[async_trait]
impl RecordStore for YieldingStore {
    async fn get(&self, node: NodeRef) -> StoreResult<Node> {
        tokio::task::yield_now().await;
        self.0.get(node).await
    }

    async fn get_many_sorted_by_index(
        &self,
        collection: Collection,
        index: Index,
        direction: Direction,
    ) -> StoreResult<Vec<Node>> {
        tokio::task::yield_now().await;
        self.0.get_many_sorted_by_index(collection, index, direction).await
    }

    async fn reserve_ids(&self, count: usize) -> StoreResult<Vec<NodeId>> {
        tokio::task::yield_now().await;
        self.0.reserve_ids(count).await
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<NodeId>> {
        tokio::task::yield_now().await;
        self.0.commit(ops).await
    }

    async fn get_subtree(&self, root: NodeRef) -> StoreResult<Vec<Node>> {
        tokio::task::yield_now().await;
        self.0.get_subtree(root).await
    }
}

pub fn created(result: &MutationResult) -> NodeId {
    result.created_root().unwrap().id
}
