//! # Pagecraft Store
//!
//! Record store collaborator for the editor: a keyed store with three
//! collections (pages, blocks, templates) and atomic multi-record commits.
//!
//! ```text
//! editor ──WriteOp[]──▶ RecordStore::commit ──▶ all ops applied, or none
//! ```
//!
//! [`MemoryStore`] is the reference implementation. It keeps everything in
//! memory and can persist a JSON snapshot after each commit.

mod config;
mod error;
mod memory;
mod store;

pub use config::{StoreConfig, DEFAULT_CONFIG_NAME};
pub use error::{StoreError, StoreResult};
pub use memory::{Fault, MemoryStore};
pub use store::{Direction, Index, PostOrder, RecordStore, WriteOp};
