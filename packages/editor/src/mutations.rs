//! # Mutations
//!
//! Serializable editing intents, as they arrive from a client.
//!
//! ## Mutation Semantics
//!
//! ### Move
//! - Same parent record: reorder in place
//! - Other parent: detach and attach in one transaction
//! - Fails if the target is the block itself or one of its descendants
//!
//! ### Copy
//! - The copy lands right after the original
//! - Many copies: one parent write per parent
//!
//! ### Delete
//! - Removes the block and every descendant
//! - Nested selections are absorbed by the outermost selected block
//!
//! ### UpdateProps
//! - Shallow merge; `null` removes the prop

use pagecraft_model::{NodeId, NodeRef, Props};
use serde::{Deserialize, Serialize};

use crate::engine::Editor;
use crate::errors::EditorResult;
use crate::target::{BlockPosition, DropTarget};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    /// Place a new instance of a component
    #[serde(rename_all = "camelCase")]
    BlockAdd { component: String, target: DropTarget },

    #[serde(rename_all = "camelCase")]
    BlockMove { position: BlockPosition, target: DropTarget },

    #[serde(rename_all = "camelCase")]
    BlockCopy { position: BlockPosition },

    #[serde(rename_all = "camelCase")]
    BlockCopyMany { positions: Vec<BlockPosition> },

    #[serde(rename_all = "camelCase")]
    BlockDelete { position: BlockPosition },

    #[serde(rename_all = "camelCase")]
    BlockDeleteMany { positions: Vec<BlockPosition> },

    #[serde(rename_all = "camelCase")]
    BlockUpdateProps { block: NodeId, patch: Props },

    /// Save a block subtree to the template library
    #[serde(rename_all = "camelCase")]
    TemplateCreate {
        name: String,
        source: NodeRef,
        #[serde(default)]
        order: Option<u32>,
    },

    #[serde(rename_all = "camelCase")]
    TemplateApply { template: NodeId, target: DropTarget },

    #[serde(rename_all = "camelCase")]
    TemplateDelete { template: NodeId },

    #[serde(rename_all = "camelCase")]
    TemplateReorder { template: NodeId, order: u32 },

    #[serde(rename_all = "camelCase")]
    TemplateRename { template: NodeId, name: String },
}

/// Outcome of a committed mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    /// Roots of newly created trees
    pub created: Vec<NodeRef>,

    /// Records whose cached views are stale, deduplicated
    pub invalidated: Vec<NodeRef>,
}

impl MutationResult {
    /// First created root, if the mutation created one
    pub fn created_root(&self) -> Option<NodeRef> {
        self.created.first().copied()
    }
}

impl Editor {
    /// Dispatch a mutation to the matching operation
    pub async fn apply(&self, mutation: &Mutation) -> EditorResult<MutationResult> {
        match mutation {
            Mutation::BlockAdd { component, target } => self.block_add(component, target).await,
            Mutation::BlockMove { position, target } => self.block_move(position, target).await,
            Mutation::BlockCopy { position } => self.block_copy(position).await,
            Mutation::BlockCopyMany { positions } => self.block_copy_many(positions).await,
            Mutation::BlockDelete { position } => self.block_delete(position).await,
            Mutation::BlockDeleteMany { positions } => self.block_delete_many(positions).await,
            Mutation::BlockUpdateProps { block, patch } => self.block_update_props(*block, patch.clone()).await,
            Mutation::TemplateCreate { name, source, order } => self.template_create(name, *source, *order).await,
            Mutation::TemplateApply { template, target } => self.template_apply(*template, target).await,
            Mutation::TemplateDelete { template } => self.template_delete(*template).await,
            Mutation::TemplateReorder { template, order } => self.template_reorder(*template, *order).await,
            Mutation::TemplateRename { template, name } => self.template_rename(*template, name).await,
        }
    }
}
