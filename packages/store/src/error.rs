use pagecraft_model::{Collection, NodeRef};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(NodeRef),

    #[error("Revision conflict on {node}: expected {expected}, found {found:?}")]
    Conflict {
        node: NodeRef,
        expected: u64,
        found: Option<u64>,
    },

    #[error("Record already exists: {0}")]
    DuplicateId(NodeRef),

    #[error("Record {0} is referenced more than once in the tree")]
    DuplicateReference(NodeRef),

    #[error("Collection {collection} has no index {index}")]
    UnsupportedIndex { collection: Collection, index: &'static str },

    #[error("Template order would become negative")]
    InvalidOrder,

    #[error("Template orders are not contiguous: {0:?}")]
    SparseTemplateOrder(Vec<u32>),

    #[error("Slug already in use: {0}")]
    SlugTaken(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
