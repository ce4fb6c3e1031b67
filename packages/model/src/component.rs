//! # Component Registry
//!
//! Declares, per component type, the slots a block of that type may own,
//! its default props, its default slot contents and per-slot placement rules.
//!
//! Registries are usually loaded from a JSON file:
//!
//! ```json
//! {
//!   "components": [
//!     {
//!       "type": "columns",
//!       "defaultProps": { "gap": 8 },
//!       "slots": { "left": { "maxItems": 2, "disabledComponents": ["columns"] } },
//!       "defaultSlots": { "left": [{ "type": "text" }] }
//!     }
//!   ]
//! }
//! ```

use crate::error::{ModelError, ModelResult};
use crate::node::Props;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placement rules for one named slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_components: Vec<String>,
}

impl SlotDefinition {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn disable(mut self, component: impl Into<String>) -> Self {
        self.disabled_components.push(component.into());
        self
    }

    pub fn is_disabled(&self, component: &str) -> bool {
        self.disabled_components.iter().any(|c| c == component)
    }
}

/// A block literal used as default slot content.
///
/// Missing props and slots fall back to the draft's own component defaults
/// when it is instantiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDraft {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Props>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<BTreeMap<String, Vec<BlockDraft>>>,
}

impl BlockDraft {
    pub fn of(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            props: None,
            slots: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    #[serde(rename = "type")]
    pub kind: String,

    /// Display name given to new blocks, defaults to the type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub default_props: Props,

    #[serde(default)]
    pub slots: BTreeMap<String, SlotDefinition>,

    #[serde(default)]
    pub default_slots: BTreeMap<String, Vec<BlockDraft>>,
}

impl ComponentDefinition {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: None,
            default_props: Props::new(),
            slots: BTreeMap::new(),
            default_slots: BTreeMap::new(),
        }
    }

    pub fn with_slot(mut self, name: impl Into<String>, slot: SlotDefinition) -> Self {
        self.slots.insert(name.into(), slot);
        self
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.default_props.insert(name.into(), value);
        self
    }

    pub fn with_default_children(mut self, slot: impl Into<String>, children: Vec<BlockDraft>) -> Self {
        self.default_slots.insert(slot.into(), children);
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.kind)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    components: Vec<ComponentDefinition>,
}

/// Lookup table of component definitions keyed by type
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, ComponentDefinition>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> ModelResult<Self> {
        let file: RegistryFile = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for component in file.components {
            registry.register(component)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn load(path: &std::path::Path) -> ModelResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn register(&mut self, component: ComponentDefinition) -> ModelResult<()> {
        for slot in component.default_slots.keys() {
            if !component.slots.contains_key(slot) {
                return Err(ModelError::UndeclaredDefaultSlot {
                    component: component.kind.clone(),
                    slot: slot.clone(),
                });
            }
        }
        if self.components.contains_key(&component.kind) {
            return Err(ModelError::DuplicateComponent(component.kind));
        }
        self.components.insert(component.kind.clone(), component);
        Ok(())
    }

    /// Builder-style registration for tests and static setups
    pub fn with(mut self, component: ComponentDefinition) -> ModelResult<Self> {
        self.register(component)?;
        Ok(self)
    }

    pub fn get(&self, kind: &str) -> Option<&ComponentDefinition> {
        self.components.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.components.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Default drafts must name registered types, fill only slots their type
    /// declares, and must not nest their own type, otherwise instantiation
    /// would never terminate.
    pub fn validate(&self) -> ModelResult<()> {
        for component in self.components.values() {
            let mut stack = vec![component.kind.clone()];
            for drafts in component.default_slots.values() {
                self.check_drafts(drafts, &mut stack)?;
            }
        }
        Ok(())
    }

    fn check_drafts(&self, drafts: &[BlockDraft], stack: &mut Vec<String>) -> ModelResult<()> {
        for draft in drafts {
            let child = self
                .get(&draft.kind)
                .ok_or_else(|| ModelError::UnknownComponent(draft.kind.clone()))?;
            if stack.contains(&draft.kind) {
                return Err(ModelError::RecursiveDefaults(draft.kind.clone()));
            }
            stack.push(draft.kind.clone());
            match &draft.slots {
                Some(slots) => {
                    for (slot, nested) in slots {
                        if !child.slots.contains_key(slot) {
                            return Err(ModelError::UndeclaredDefaultSlot {
                                component: draft.kind.clone(),
                                slot: slot.clone(),
                            });
                        }
                        self.check_drafts(nested, stack)?;
                    }
                }
                None => {
                    for nested in child.default_slots.values() {
                        self.check_drafts(nested, stack)?;
                    }
                }
            }
            stack.pop();
        }
        Ok(())
    }
}
