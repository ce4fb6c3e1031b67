//! # Pagecraft Editor
//!
//! Tree mutation engine for pages, blocks and templates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Mutation intent (add / move / copy / ...)   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor                                      │
//! │  - Read parents and subtrees (post-order)   │
//! │  - Placement gates (slot, cardinality,      │
//! │    allow/deny, containment)                 │
//! │  - Build new parents, clone subtrees        │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ store: one atomic commit per operation      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//!        cache invalidation by {collection, id}
//! ```
//!
//! ## Core Principles
//!
//! 1. **Slots own their children**: a block lives in exactly one slot list
//! 2. **Validate, then write**: a rejected operation never touches the store
//! 3. **One transaction per operation**: no partially applied moves or copies
//! 4. **Never repair**: a dangling reference aborts the read
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pagecraft_editor::{DropTarget, Editor};
//! use pagecraft_store::MemoryStore;
//!
//! let editor = Editor::new(Arc::new(MemoryStore::new()), Arc::new(registry));
//!
//! let page = editor.page_create("Home", "home", "").await?.created_root()?;
//! editor.block_add("hero", &DropTarget::append(page, "root")).await?;
//! ```

mod cache;
mod config;
mod engine;
mod errors;
mod instantiate;
mod mutations;
mod pages;
mod target;
mod templates;
mod transfer;
mod tree;
mod validator;

pub use cache::{CacheInvalidator, NoopInvalidator, RecordingInvalidator};
pub use config::{EditorConfig, DEFAULT_CONFIG_NAME};
pub use engine::Editor;
pub use errors::{EditorError, EditorResult, ErrorKind};
pub use instantiate::instantiate;
pub use mutations::{Mutation, MutationResult};
pub use target::{BlockPosition, DropTarget, Edge};
pub use tree::{descendant_ids, duplicate_tree, get_tree, plan_duplicate, ClonedTree};
pub use validator::{PlacementError, PlacementValidator};

// Re-export common types for convenience
pub use pagecraft_model::{Collection, ComponentRegistry, Node, NodeId, NodeRef};
pub use pagecraft_store::{MemoryStore, RecordStore};
