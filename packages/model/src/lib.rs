//! # Pagecraft Model
//!
//! Entity model shared by the store and the editor.
//!
//! ```text
//! Page ──root──▶ Block ──slot──▶ Block ...
//! Template ──root──▶ Block (exactly one)
//! ```
//!
//! A block id inside a slot list is the only parent pointer in the system, so
//! the documents form a strict forest.

pub mod component;
pub mod error;
pub mod ids;
pub mod node;

pub use component::{BlockDraft, ComponentDefinition, ComponentRegistry, SlotDefinition};
pub use error::{ModelError, ModelResult};
pub use ids::{Collection, NodeId, NodeRef};
pub use node::{page_url, root_slots, Block, Node, Page, PageStatus, Props, Slots, Template, ROOT_SLOT};
