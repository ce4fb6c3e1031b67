//! # Placement Validator
//!
//! Pure checks consulted before any write that puts a block into a slot.
//!
//! - **Slot gate**: the slot must exist on the parent
//! - **Cardinality gate**: `max_items` counts net new occupancy only
//! - **Allow/deny gate**: the block's effective type must not be disabled
//! - **Containment gate**: a block never moves into its own subtree
//!
//! Callers gather the records first (async), then run the gates here. A
//! rejection never has side effects.

use pagecraft_model::{ComponentRegistry, Node, NodeId, NodeRef, SlotDefinition, ROOT_SLOT};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    #[error("Slot {slot} of {parent} is full ({max_items} items max)")]
    SlotFull {
        parent: NodeRef,
        slot: String,
        max_items: usize,
    },

    #[error("Component {component} is not allowed in slot {slot} of {parent}")]
    ComponentDisallowed {
        component: String,
        parent: NodeRef,
        slot: String,
    },

    #[error("Cannot move block {block} into itself or its descendant {target}")]
    CyclicMove { block: NodeId, target: NodeRef },

    #[error("{parent} has no slot named {slot}")]
    UnknownSlot { parent: NodeRef, slot: String },
}

pub struct PlacementValidator<'a> {
    registry: &'a ComponentRegistry,
}

impl<'a> PlacementValidator<'a> {
    pub fn new(registry: &'a ComponentRegistry) -> Self {
        Self { registry }
    }

    /// Rules for `slot` on `parent`.
    ///
    /// Pages and templates own only `root`; a template root holds one block.
    /// Blocks of a type missing from the registry are unconstrained.
    pub fn slot_rules(&self, parent: &Node, slot: &str) -> Result<SlotDefinition, PlacementError> {
        let unknown = || PlacementError::UnknownSlot {
            parent: parent.node_ref(),
            slot: slot.to_string(),
        };

        match parent {
            Node::Page(_) => {
                if slot == ROOT_SLOT {
                    Ok(SlotDefinition::unbounded())
                } else {
                    Err(unknown())
                }
            }
            Node::Template(_) => {
                if slot == ROOT_SLOT {
                    Ok(SlotDefinition::unbounded().with_max_items(1))
                } else {
                    Err(unknown())
                }
            }
            Node::Block(block) => match self.registry.get(&block.kind) {
                Some(component) => component.slots.get(slot).cloned().ok_or_else(unknown),
                None => {
                    warn!(component = %block.kind, block = %block.id, "Parent component is not registered, slot is unconstrained");
                    Ok(SlotDefinition::unbounded())
                }
            },
        }
    }

    /// Check that `incoming` new blocks of type `component` fit into `slot`.
    ///
    /// Reorders within one slot must not call this: they do not change
    /// occupancy.
    pub fn check_insert(
        &self,
        parent: &Node,
        slot: &str,
        component: &str,
        incoming: usize,
    ) -> Result<(), PlacementError> {
        let rules = self.slot_rules(parent, slot)?;

        if let Some(max_items) = rules.max_items {
            let occupied = parent.slot(slot).map_or(0, Vec::len);
            if occupied + incoming > max_items {
                return Err(PlacementError::SlotFull {
                    parent: parent.node_ref(),
                    slot: slot.to_string(),
                    max_items,
                });
            }
        }

        if rules.is_disabled(component) {
            return Err(PlacementError::ComponentDisallowed {
                component: component.to_string(),
                parent: parent.node_ref(),
                slot: slot.to_string(),
            });
        }

        Ok(())
    }

    /// Reject moving `block` under `target` when the target is the block
    /// itself or any node of its subtree (`subtree` holds every descendant id).
    pub fn check_containment(
        &self,
        block: NodeId,
        subtree: &HashSet<NodeId>,
        target: NodeRef,
    ) -> Result<(), PlacementError> {
        if target.is_block() && (target.id == block || subtree.contains(&target.id)) {
            return Err(PlacementError::CyclicMove { block, target });
        }
        Ok(())
    }
}
