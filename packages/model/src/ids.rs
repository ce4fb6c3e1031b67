//! Identifiers and collection tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-allocated record id, unique across all collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// The three logical collections of the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Pages,
    Blocks,
    Templates,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Pages, Collection::Blocks, Collection::Templates];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Pages => "pages",
            Collection::Blocks => "blocks",
            Collection::Templates => "templates",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `{collection, id}` pair addressing one record.
///
/// This is also the cache key used for invalidation after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub collection: Collection,
    pub id: NodeId,
}

impl NodeRef {
    pub fn new(collection: Collection, id: NodeId) -> Self {
        Self { collection, id }
    }

    pub fn page(id: NodeId) -> Self {
        Self::new(Collection::Pages, id)
    }

    pub fn block(id: NodeId) -> Self {
        Self::new(Collection::Blocks, id)
    }

    pub fn template(id: NodeId) -> Self {
        Self::new(Collection::Templates, id)
    }

    pub fn is_block(&self) -> bool {
        self.collection == Collection::Blocks
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
