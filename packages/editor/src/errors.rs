//! Error types for the editor

use pagecraft_model::{Collection, ModelError, NodeId, NodeRef};
use pagecraft_store::StoreError;
use thiserror::Error;

use crate::validator::PlacementError;

/// How the caller should treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Broken or stale references; the operation aborted, nothing was repaired
    Integrity,
    /// Rejected input; nothing was written and the user may retry
    Validation,
    /// The store refused the commit; nothing was written
    Transaction,
    /// Caller bug
    Programmer,
}

#[derive(Error, Debug)]
pub enum EditorError {
    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Block {block} is not at {slot}[{index}] of {parent}")]
    StalePosition {
        block: NodeId,
        parent: NodeRef,
        slot: String,
        index: usize,
    },

    #[error("{parent} references {child}, which is not part of the tree")]
    DanglingReference { parent: NodeRef, child: NodeId },

    #[error("{0} is listed more than once in the document")]
    DuplicateRecord(NodeRef),

    #[error("Block {child} is referenced by more than one slot")]
    SharedChild { child: NodeId },

    #[error("{0} is not reachable from the document root")]
    UnreachableRecord(NodeRef),

    #[error("{0} can only appear as the document root")]
    NestedRoot(NodeRef),

    #[error("Template {0} has no root block")]
    EmptyTemplate(NodeId),

    #[error("Cannot duplicate an empty tree")]
    EmptyInput,

    #[error("Unknown component type: {0}")]
    UnknownComponent(String),

    #[error("Expected a record from {expected}, got {found}")]
    WrongCollection { expected: Collection, found: NodeRef },

    #[error("Slug already in use: {0}")]
    SlugTaken(String),

    #[error("Slug must not be empty")]
    EmptySlug,

    #[error("Template order {order} is outside 0..={max}")]
    OrderOutOfRange { order: u32, max: u32 },

    #[error("Invalid document: {0}")]
    Import(#[from] serde_json::Error),

    #[error("Component registry error: {0}")]
    Registry(#[from] ModelError),
}

impl EditorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EditorError::Placement(_)
            | EditorError::SlugTaken(_)
            | EditorError::EmptySlug
            | EditorError::OrderOutOfRange { .. }
            | EditorError::Import(_) => ErrorKind::Validation,

            EditorError::StalePosition { .. }
            | EditorError::DanglingReference { .. }
            | EditorError::DuplicateRecord(_)
            | EditorError::SharedChild { .. }
            | EditorError::UnreachableRecord(_)
            | EditorError::NestedRoot(_)
            | EditorError::EmptyTemplate(_) => ErrorKind::Integrity,

            EditorError::Store(err) => match err {
                StoreError::NotFound(_) | StoreError::DuplicateReference(_) => ErrorKind::Integrity,
                StoreError::UnsupportedIndex { .. } => ErrorKind::Programmer,
                StoreError::SlugTaken(_) => ErrorKind::Validation,
                StoreError::Conflict { .. }
                | StoreError::DuplicateId(_)
                | StoreError::InvalidOrder
                | StoreError::SparseTemplateOrder(_)
                | StoreError::WriteFailed(_)
                | StoreError::Io(_)
                | StoreError::Json(_) => ErrorKind::Transaction,
            },

            EditorError::EmptyInput
            | EditorError::UnknownComponent(_)
            | EditorError::WrongCollection { .. }
            | EditorError::Registry(_) => ErrorKind::Programmer,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EditorError::Store(StoreError::NotFound(_)))
    }
}

pub type EditorResult<T> = Result<T, EditorError>;
