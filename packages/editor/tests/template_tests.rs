//! Template library tests

mod common;

use chrono::Utc;
use common::{created, Fixture};
use pagecraft_editor::{Collection, DropTarget, EditorError, ErrorKind, NodeId, NodeRef, PlacementError};
use pagecraft_model::{Node, Template, ROOT_SLOT};
use pagecraft_store::{RecordStore, StoreError};

async fn library(fx: &Fixture) -> Vec<(String, u32)> {
    fx.editor
        .templates_list()
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.name, t.order))
        .collect()
}

fn names(library: &[(String, u32)]) -> Vec<&str> {
    library.iter().map(|(name, _)| name.as_str()).collect()
}

fn assert_dense(library: &[(String, u32)]) {
    let orders: Vec<u32> = library.iter().map(|(_, order)| *order).collect();
    let expected: Vec<u32> = (0..library.len() as u32).collect();
    assert_eq!(orders, expected);
}

/// Page with one card, and `count` templates saved from it
async fn with_templates(count: usize) -> (Fixture, NodeId, Vec<NodeId>) {
    let fx = Fixture::new();
    let page = fx.page("home").await;
    let card = fx.add("card", NodeRef::page(page), ROOT_SLOT).await;

    let mut templates = Vec::with_capacity(count);
    for i in 0..count {
        let result = fx
            .editor
            .template_create(&format!("t{}", i), NodeRef::block(card), None)
            .await
            .unwrap();
        templates.push(created(&result));
    }
    (fx, page, templates)
}

#[tokio::test]
async fn test_create_appends_and_clones_source() {
    let (fx, _, templates) = with_templates(2).await;

    assert_eq!(library(&fx).await, vec![("t0".to_string(), 0), ("t1".to_string(), 1)]);

    // card + text on the page, plus a copy of both per template
    assert_eq!(fx.block_count().await, 6);

    let tree = fx.editor.get_tree(NodeRef::template(templates[0])).await.unwrap();
    assert_eq!(tree.len(), 3);
    assert_eq!(tree[2].collection(), Collection::Templates);
    assert_eq!(tree[1].block_type(), Some("card"));
}

#[tokio::test]
async fn test_create_at_order_shifts_later_templates() {
    let (fx, page, _) = with_templates(3).await;
    let text = fx.add("text", NodeRef::page(page), ROOT_SLOT).await;

    fx.editor
        .template_create("inserted", NodeRef::block(text), Some(1))
        .await
        .unwrap();

    let lib = library(&fx).await;
    assert_eq!(names(&lib), vec!["t0", "inserted", "t1", "t2"]);
    assert_dense(&lib);

    let err = fx
        .editor
        .template_create("far", NodeRef::block(text), Some(9))
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::OrderOutOfRange { order: 9, max: 4 }));
}

#[tokio::test]
async fn test_delete_keeps_orders_dense() {
    let (fx, _, templates) = with_templates(5).await;
    let blocks_before = fx.block_count().await;

    fx.editor.template_delete(templates[2]).await.unwrap();

    let lib = library(&fx).await;
    assert_eq!(names(&lib), vec!["t0", "t1", "t3", "t4"]);
    assert_dense(&lib);
    assert_eq!(fx.block_count().await, blocks_before - 2);
    assert!(!fx.store.contains(NodeRef::template(templates[2])).await);
}

#[tokio::test]
async fn test_reorder_shifts_the_range_between() {
    let (fx, _, templates) = with_templates(4).await;

    fx.editor.template_reorder(templates[0], 3).await.unwrap();
    let lib = library(&fx).await;
    assert_eq!(names(&lib), vec!["t1", "t2", "t3", "t0"]);
    assert_dense(&lib);

    fx.editor.template_reorder(templates[3], 1).await.unwrap();
    let lib = library(&fx).await;
    assert_eq!(names(&lib), vec!["t1", "t3", "t2", "t0"]);
    assert_dense(&lib);

    let unchanged = fx.editor.template_reorder(templates[3], 1).await.unwrap();
    assert!(unchanged.invalidated.is_empty());

    let err = fx.editor.template_reorder(templates[3], 4).await.unwrap_err();
    assert!(matches!(err, EditorError::OrderOutOfRange { order: 4, max: 3 }));
}

#[tokio::test]
async fn test_rename() {
    let (fx, _, templates) = with_templates(1).await;
    fx.editor.template_rename(templates[0], "Hero").await.unwrap();
    assert_eq!(names(&library(&fx).await), vec!["Hero"]);
}

#[tokio::test]
async fn test_apply_places_a_fresh_copy() {
    let (fx, page, templates) = with_templates(1).await;
    let page_ref = NodeRef::page(page);
    let template_root = fx.editor.templates_list().await.unwrap()[0].root().unwrap();

    let result = fx
        .editor
        .template_apply(templates[0], &DropTarget::append(page_ref, ROOT_SLOT))
        .await
        .unwrap();
    let copy = created(&result);

    assert_ne!(copy, template_root);
    assert_eq!(fx.slot(page_ref, ROOT_SLOT).await.last(), Some(&copy));

    let tree = fx.editor.get_tree(NodeRef::block(copy)).await.unwrap();
    assert_eq!(tree.len(), 2);

    // Template itself is untouched
    let template_tree = fx.editor.get_tree(NodeRef::template(templates[0])).await.unwrap();
    assert_eq!(template_tree.len(), 3);
}

#[tokio::test]
async fn test_apply_checks_root_type_against_slot_rules() {
    let fx = Fixture::new();
    let page = fx.page("home").await;
    let page_ref = NodeRef::page(page);
    let columns = NodeRef::block(fx.add("columns", page_ref, ROOT_SLOT).await);
    let nested = fx.add("columns", columns, "right").await;

    let template = created(
        &fx.editor
            .template_create("Grid", NodeRef::block(nested), None)
            .await
            .unwrap(),
    );

    let err = fx
        .editor
        .template_apply(template, &DropTarget::append(columns, "left"))
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::Placement(PlacementError::ComponentDisallowed { .. })));
}

#[tokio::test]
async fn test_apply_empty_template() {
    let fx = Fixture::new();
    let page = fx.page("home").await;

    let mut template = Template::new("Empty", 0, NodeId(1), Utc::now());
    template.slots.insert(ROOT_SLOT.to_string(), Vec::new());
    let id = fx.store.add(Node::from(template)).await.unwrap();

    let err = fx
        .editor
        .template_apply(id, &DropTarget::append(NodeRef::page(page), ROOT_SLOT))
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::EmptyTemplate(t) if t == id));
}

#[tokio::test]
async fn test_template_source_must_be_a_block() {
    let fx = Fixture::new();
    let page = fx.page("home").await;

    let err = fx
        .editor
        .template_create("Page", NodeRef::page(page), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::WrongCollection { .. }));
    assert!(library(&fx).await.is_empty());
}

#[tokio::test]
async fn test_concurrent_creates_keep_orders_dense() {
    let (fx, page, _) = with_templates(1).await;
    let text = fx.add("text", NodeRef::page(page), ROOT_SLOT).await;
    let a = fx.yielding_editor();
    let b = fx.yielding_editor();

    // Both read the library before either commits
    let (first, second) = tokio::join!(
        a.template_create("a", NodeRef::block(text), None),
        b.template_create("b", NodeRef::block(text), None),
    );

    assert!(first.is_ok());
    let err = second.unwrap_err();
    assert!(matches!(err, EditorError::Store(StoreError::SparseTemplateOrder(_))));
    assert_eq!(err.kind(), ErrorKind::Transaction);

    let lib = library(&fx).await;
    assert_eq!(names(&lib), vec!["t0", "a"]);
    assert_dense(&lib);
    assert_eq!(fx.store.count(Collection::Templates).await, 2);

    // The losing writer retries against the current library
    b.template_create("b", NodeRef::block(text), None).await.unwrap();
    let lib = library(&fx).await;
    assert_eq!(names(&lib), vec!["t0", "a", "b"]);
    assert_dense(&lib);
}
