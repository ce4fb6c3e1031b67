//! Build new block records from a component type's declared defaults.

use chrono::{DateTime, Utc};
use pagecraft_model::{Block, BlockDraft, ComponentRegistry, ModelError, Node, NodeId, Props, Slots};
use pagecraft_store::RecordStore;
use std::collections::BTreeMap;

use crate::errors::{EditorError, EditorResult};

const MAX_DEPTH: usize = 64;

/// Block with its default children, not yet flattened
struct Pending {
    kind: String,
    name: String,
    props: Props,
    slots: BTreeMap<String, Vec<Pending>>,
}

impl Pending {
    fn size(&self) -> usize {
        1 + self.slots.values().flatten().map(Pending::size).sum::<usize>()
    }
}

/// Instantiate `kind` and its default slot contents.
///
/// Returns the new records in post-order (root last) with ids reserved from
/// the store; nothing is written.
pub async fn instantiate(
    store: &dyn RecordStore,
    registry: &ComponentRegistry,
    kind: &str,
    now: DateTime<Utc>,
) -> EditorResult<Vec<Node>> {
    let pending = expand(registry, &BlockDraft::of(kind), 0)?;
    let ids = store.reserve_ids(pending.size()).await?;

    let mut ids = ids.into_iter();
    let mut out = Vec::new();
    flatten(pending, &mut ids, now, &mut out)?;
    Ok(out)
}

fn expand(registry: &ComponentRegistry, draft: &BlockDraft, depth: usize) -> EditorResult<Pending> {
    if depth > MAX_DEPTH {
        return Err(ModelError::RecursiveDefaults(draft.kind.clone()).into());
    }
    let component = registry
        .get(&draft.kind)
        .ok_or_else(|| EditorError::UnknownComponent(draft.kind.clone()))?;

    let mut props = component.default_props.clone();
    if let Some(overrides) = &draft.props {
        props.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let drafts = draft.slots.as_ref().unwrap_or(&component.default_slots);
    let mut slots: BTreeMap<String, Vec<Pending>> = component
        .slots
        .keys()
        .map(|name| (name.clone(), Vec::new()))
        .collect();
    for (name, children) in drafts {
        let expanded = children
            .iter()
            .map(|child| expand(registry, child, depth + 1))
            .collect::<EditorResult<Vec<_>>>()?;
        slots.insert(name.clone(), expanded);
    }

    Ok(Pending {
        kind: draft.kind.clone(),
        name: draft.name.clone().unwrap_or_else(|| component.label().to_string()),
        props,
        slots,
    })
}

fn flatten(
    pending: Pending,
    ids: &mut impl Iterator<Item = NodeId>,
    now: DateTime<Utc>,
    out: &mut Vec<Node>,
) -> EditorResult<NodeId> {
    let mut slots = Slots::new();
    for (name, children) in pending.slots {
        let mut child_ids = Vec::with_capacity(children.len());
        for child in children {
            child_ids.push(flatten(child, &mut *ids, now, &mut *out)?);
        }
        slots.insert(name, child_ids);
    }

    let id = ids.next().ok_or(EditorError::EmptyInput)?;
    let mut block = Block::new(pending.kind, pending.name, pending.props, slots, now);
    block.id = id;
    out.push(Node::Block(block));
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecraft_model::{ComponentDefinition, SlotDefinition};
    use pagecraft_store::MemoryStore;
    use serde_json::json;

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new()
            .with(ComponentDefinition::new("text").with_prop("content", json!("Hello")))
            .unwrap()
            .with(
                ComponentDefinition::new("card")
                    .with_slot("body", SlotDefinition::unbounded())
                    .with_slot("footer", SlotDefinition::unbounded())
                    .with_default_children(
                        "body",
                        vec![
                            BlockDraft::of("text"),
                            BlockDraft {
                                props: Some([("content".to_string(), json!("World"))].into_iter().collect()),
                                ..BlockDraft::of("text")
                            },
                        ],
                    ),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_instantiate_with_default_children() {
        let store = MemoryStore::new();
        let nodes = instantiate(&store, &registry(), "card", Utc::now()).await.unwrap();

        assert_eq!(nodes.len(), 3);
        let root = nodes.last().unwrap().as_block().unwrap();
        assert_eq!(root.kind, "card");
        assert_eq!(root.slots["body"], vec![nodes[0].id(), nodes[1].id()]);
        assert!(root.slots["footer"].is_empty());

        let first = nodes[0].as_block().unwrap();
        let second = nodes[1].as_block().unwrap();
        assert_eq!(first.props["content"], json!("Hello"));
        assert_eq!(second.props["content"], json!("World"));
    }

    #[tokio::test]
    async fn test_unknown_component() {
        let store = MemoryStore::new();
        let err = instantiate(&store, &registry(), "video", Utc::now()).await.unwrap_err();
        assert!(matches!(err, EditorError::UnknownComponent(kind) if kind == "video"));
    }

    #[tokio::test]
    async fn test_recursive_defaults_stop() {
        // Registered without `validate()`, so the loop is only caught here
        let registry = ComponentRegistry::new()
            .with(
                ComponentDefinition::new("box")
                    .with_slot("body", SlotDefinition::unbounded())
                    .with_default_children("body", vec![BlockDraft::of("box")]),
            )
            .unwrap();

        let store = MemoryStore::new();
        let err = instantiate(&store, &registry, "box", Utc::now()).await.unwrap_err();
        assert!(matches!(err, EditorError::Registry(ModelError::RecursiveDefaults(_))));
    }
}
