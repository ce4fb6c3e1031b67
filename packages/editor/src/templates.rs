//! Template library operations.
//!
//! Template `order` values always form `0..count`. Every operation that adds,
//! removes or moves a template shifts the neighbouring orders inside the same
//! transaction as the template write itself, and ends that transaction with
//! `WriteOp::CheckTemplateOrder`. Orders are computed from a list read before
//! the commit; if another writer changed the library in between, the check
//! fails the commit and nothing is written.

use chrono::Utc;
use pagecraft_model::{Collection, Node, NodeId, NodeRef, Template};
use pagecraft_store::{Direction, Index, WriteOp};
use tracing::{debug, info, instrument};

use crate::engine::{block_kind, Batch, Editor};
use crate::errors::{EditorError, EditorResult};
use crate::mutations::MutationResult;
use crate::target::{slot_len, splice_in, DropTarget};
use crate::tree::{get_tree, plan_duplicate};

impl Editor {
    /// Every template, by ascending order
    pub async fn templates_list(&self) -> EditorResult<Vec<Template>> {
        let nodes = self
            .store()
            .get_many_sorted_by_index(Collection::Templates, Index::Order, Direction::Ascending)
            .await?;
        Ok(nodes
            .into_iter()
            .filter_map(|node| match node {
                Node::Template(template) => Some(template),
                _ => None,
            })
            .collect())
    }

    /// Save a copy of the block subtree at `source` as a new template.
    ///
    /// The template lands at `order` (appended when `None`); templates at or
    /// after that order move down by one.
    #[instrument(skip(self))]
    pub async fn template_create(&self, name: &str, source: NodeRef, order: Option<u32>) -> EditorResult<MutationResult> {
        let now = Utc::now();
        if !source.is_block() {
            return Err(EditorError::WrongCollection {
                expected: Collection::Blocks,
                found: source,
            });
        }

        let templates = self.templates_list().await?;
        let count = template_count(&templates);
        let order = order.unwrap_or(count);
        if order > count {
            return Err(EditorError::OrderOutOfRange { order, max: count });
        }

        let tree = get_tree(self.store(), source).await?;
        let plan = plan_duplicate(self.store(), &tree, &self.config().slug_suffix, now).await?;
        let root = plan.root_ref();
        let id = self.reserve_one().await?;

        let mut template = Template::new(name, order, root.id, now);
        template.id = id;

        let mut batch = Batch::new();
        if order < count {
            shift(&mut batch, &templates, order, None, 1);
        }
        batch.insert_all(plan.into_ops());
        batch.insert(Node::Template(template));
        batch.push(WriteOp::CheckTemplateOrder);
        batch.created(NodeRef::template(id));

        info!(template = %id, order, "Template created");
        self.commit(batch, now).await
    }

    /// Delete a template with its block subtree; later templates move up
    #[instrument(skip(self))]
    pub async fn template_delete(&self, id: NodeId) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let template_ref = NodeRef::template(id);
        let order = template_of(&self.store().get(template_ref).await?)?.order;
        let tree = get_tree(self.store(), template_ref).await?;
        let templates = self.templates_list().await?;

        let mut batch = Batch::new();
        for node in &tree {
            batch.delete(node.node_ref());
        }
        shift(&mut batch, &templates, order + 1, None, -1);
        batch.push(WriteOp::CheckTemplateOrder);

        info!(template = %id, nodes = tree.len(), "Template deleted");
        self.commit(batch, now).await
    }

    /// Move a template to `new_order`, shifting the templates in between
    #[instrument(skip(self))]
    pub async fn template_reorder(&self, id: NodeId, new_order: u32) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let templates = self.templates_list().await?;
        let max = template_count(&templates).saturating_sub(1);
        if new_order > max {
            return Err(EditorError::OrderOutOfRange { order: new_order, max });
        }

        let node = self.store().get(NodeRef::template(id)).await?;
        let old_order = template_of(&node)?.order;
        if old_order == new_order {
            return Ok(MutationResult::default());
        }

        let mut batch = Batch::new();
        if new_order < old_order {
            shift(&mut batch, &templates, new_order, Some(old_order), 1);
        } else {
            shift(&mut batch, &templates, old_order + 1, Some(new_order + 1), -1);
        }

        let mut updated = node;
        if let Node::Template(template) = &mut updated {
            template.order = new_order;
        }
        updated.touch(now);
        batch.put(updated);
        batch.push(WriteOp::CheckTemplateOrder);

        debug!(old_order, new_order, "Template reordered");
        self.commit(batch, now).await
    }

    pub async fn template_rename(&self, id: NodeId, name: &str) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let mut node = self.store().get(NodeRef::template(id)).await?;
        template_of(&node)?;
        if let Node::Template(template) = &mut node {
            template.name = name.to_string();
        }
        node.touch(now);

        let mut batch = Batch::new();
        batch.put(node);
        self.commit(batch, now).await
    }

    /// Place a copy of the template's root subtree at `target`
    #[instrument(skip(self), fields(parent = %target.parent, slot = %target.slot))]
    pub async fn template_apply(&self, id: NodeId, target: &DropTarget) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let template = self.store().get(NodeRef::template(id)).await?;
        let root = template_of(&template)?.root().ok_or(EditorError::EmptyTemplate(id))?;

        let tree = get_tree(self.store(), NodeRef::block(root)).await?;
        let parent = self.store().get(target.parent).await?;
        let root_node = tree.last().ok_or(EditorError::EmptyTemplate(id))?;
        self.validator()
            .check_insert(&parent, &target.slot, block_kind(root_node)?, 1)?;

        let plan = plan_duplicate(self.store(), &tree, &self.config().slug_suffix, now).await?;
        let copy = plan.root_ref();

        let index = target.insertion_index(slot_len(&parent, &target.slot));
        let mut updated = parent;
        splice_in(&mut updated, &target.slot, index, copy.id);
        updated.touch(now);

        let mut batch = Batch::new();
        batch.insert_all(plan.into_ops());
        batch.created(copy);
        batch.put(updated);
        batch.touch_page(target.page);

        info!(template = %id, block = %copy.id, index, "Template applied");
        self.commit(batch, now).await
    }

    pub(crate) async fn reserve_one(&self) -> EditorResult<NodeId> {
        let ids = self.store().reserve_ids(1).await?;
        ids.into_iter().next().ok_or(EditorError::EmptyInput)
    }
}

fn template_count(templates: &[Template]) -> u32 {
    u32::try_from(templates.len()).unwrap_or(u32::MAX)
}

/// Queue an order shift and invalidate every template it rewrites
fn shift(batch: &mut Batch, templates: &[Template], from: u32, to: Option<u32>, delta: i64) {
    for template in templates
        .iter()
        .filter(|t| t.order >= from && to.map_or(true, |to| t.order < to))
    {
        batch.invalidate(NodeRef::template(template.id));
    }
    batch.push(WriteOp::ShiftTemplateOrder { from, to, delta });
}

fn template_of(node: &Node) -> EditorResult<&Template> {
    node.as_template().ok_or(EditorError::WrongCollection {
        expected: Collection::Templates,
        found: node.node_ref(),
    })
}
