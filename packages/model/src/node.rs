//! # Records
//!
//! Typed shape of the three persisted entities and the `Node` sum type that
//! tags them by collection.
//!
//! Slot lists are ownership references: a block id inside a slot is the only
//! parent pointer that block has. Copies of a record are made through the
//! per-entity `duplicate` constructors, which take the new slot map by value so
//! an original and its clone never share a slot list.

use crate::ids::{Collection, NodeId, NodeRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the single slot every page and template owns
pub const ROOT_SLOT: &str = "root";

/// Named, ordered child lists
pub type Slots = BTreeMap<String, Vec<NodeId>>;

/// Component props
pub type Props = BTreeMap<String, Value>;

/// Slot map holding one empty `root` list
pub fn root_slots() -> Slots {
    let mut slots = Slots::new();
    slots.insert(ROOT_SLOT.to_string(), Vec::new());
    slots
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PageStatus {
    Published,
    #[default]
    Unpublished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub slug: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: PageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub slots: Slots,
}

impl Page {
    pub fn new(title: impl Into<String>, slug: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        let slug = slug.into();
        Self {
            id: NodeId::default(),
            revision: 0,
            created_at: now,
            updated_at: now,
            title: title.into(),
            url: page_url(&slug),
            slug,
            description: description.into(),
            status: PageStatus::Unpublished,
            published_at: None,
            slots: root_slots(),
        }
    }

    /// Copy for a cloned page tree: identity fields are regenerated, publish
    /// state is cleared.
    pub fn duplicate(&self, slots: Slots, slug: String, now: DateTime<Utc>) -> Self {
        Self {
            id: NodeId::default(),
            revision: 0,
            created_at: now,
            updated_at: now,
            title: self.title.clone(),
            url: page_url(&slug),
            slug,
            description: self.description.clone(),
            status: PageStatus::Unpublished,
            published_at: None,
            slots,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == PageStatus::Published
    }
}

pub fn page_url(slug: &str) -> String {
    format!("/{}", slug)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Component type, resolved against the component registry
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub props: Props,
    #[serde(default)]
    pub slots: Slots,
}

impl Block {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, props: Props, slots: Slots, now: DateTime<Utc>) -> Self {
        Self {
            id: NodeId::default(),
            revision: 0,
            created_at: now,
            updated_at: now,
            kind: kind.into(),
            name: name.into(),
            props,
            slots,
        }
    }

    pub fn duplicate(&self, slots: Slots, now: DateTime<Utc>) -> Self {
        Self {
            id: NodeId::default(),
            revision: 0,
            created_at: now,
            updated_at: now,
            kind: self.kind.clone(),
            name: self.name.clone(),
            props: self.props.clone(),
            slots,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub order: u32,
    pub slots: Slots,
}

impl Template {
    pub fn new(name: impl Into<String>, order: u32, root: NodeId, now: DateTime<Utc>) -> Self {
        let mut slots = Slots::new();
        slots.insert(ROOT_SLOT.to_string(), vec![root]);
        Self {
            id: NodeId::default(),
            revision: 0,
            created_at: now,
            updated_at: now,
            name: name.into(),
            order,
            slots,
        }
    }

    /// The single block the template instantiates
    pub fn root(&self) -> Option<NodeId> {
        self.slots.get(ROOT_SLOT).and_then(|ids| ids.first().copied())
    }
}

/// A record from any collection.
///
/// The `store` field carries the collection tag in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "store")]
pub enum Node {
    #[serde(rename = "pages")]
    Page(Page),
    #[serde(rename = "blocks")]
    Block(Block),
    #[serde(rename = "templates")]
    Template(Template),
}

impl Node {
    pub fn collection(&self) -> Collection {
        match self {
            Node::Page(_) => Collection::Pages,
            Node::Block(_) => Collection::Blocks,
            Node::Template(_) => Collection::Templates,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Node::Page(p) => p.id,
            Node::Block(b) => b.id,
            Node::Template(t) => t.id,
        }
    }

    pub fn set_id(&mut self, id: NodeId) {
        match self {
            Node::Page(p) => p.id = id,
            Node::Block(b) => b.id = id,
            Node::Template(t) => t.id = id,
        }
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.collection(), self.id())
    }

    pub fn revision(&self) -> u64 {
        match self {
            Node::Page(p) => p.revision,
            Node::Block(b) => b.revision,
            Node::Template(t) => t.revision,
        }
    }

    pub fn set_revision(&mut self, revision: u64) {
        match self {
            Node::Page(p) => p.revision = revision,
            Node::Block(b) => b.revision = revision,
            Node::Template(t) => t.revision = revision,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Node::Page(p) => p.created_at,
            Node::Block(b) => b.created_at,
            Node::Template(t) => t.created_at,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Node::Page(p) => p.updated_at,
            Node::Block(b) => b.updated_at,
            Node::Template(t) => t.updated_at,
        }
    }

    /// Stamp `updated_at`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        match self {
            Node::Page(p) => p.updated_at = now,
            Node::Block(b) => b.updated_at = now,
            Node::Template(t) => t.updated_at = now,
        }
    }

    pub fn slots(&self) -> &Slots {
        match self {
            Node::Page(p) => &p.slots,
            Node::Block(b) => &b.slots,
            Node::Template(t) => &t.slots,
        }
    }

    pub fn slots_mut(&mut self) -> &mut Slots {
        match self {
            Node::Page(p) => &mut p.slots,
            Node::Block(b) => &mut b.slots,
            Node::Template(t) => &mut t.slots,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&Vec<NodeId>> {
        self.slots().get(name)
    }

    /// Every child id, slot by slot, in slot order
    pub fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots().values().flat_map(|ids| ids.iter().copied())
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_page(&self) -> Option<&Page> {
        match self {
            Node::Page(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_template(&self) -> Option<&Template> {
        match self {
            Node::Template(t) => Some(t),
            _ => None,
        }
    }

    /// Component type of a block node
    pub fn block_type(&self) -> Option<&str> {
        self.as_block().map(|b| b.kind.as_str())
    }
}

impl From<Page> for Node {
    fn from(page: Page) -> Self {
        Node::Page(page)
    }
}

impl From<Block> for Node {
    fn from(block: Block) -> Self {
        Node::Block(block)
    }
}

impl From<Template> for Node {
    fn from(template: Template) -> Self {
        Node::Template(template)
    }
}
