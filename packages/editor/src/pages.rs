//! Page lifecycle: create, duplicate, delete, publish.

use chrono::Utc;
use pagecraft_model::{Collection, Node, NodeId, NodeRef, Page, PageStatus};
use pagecraft_store::{Direction, Index, StoreError};
use tracing::{info, instrument};

use crate::engine::{Batch, Editor};
use crate::errors::{EditorError, EditorResult};
use crate::mutations::MutationResult;
use crate::tree::{get_tree, plan_duplicate};

impl Editor {
    /// Every page, most recently updated first
    pub async fn pages_list(&self) -> EditorResult<Vec<Page>> {
        let nodes = self
            .store()
            .get_many_sorted_by_index(Collection::Pages, Index::UpdatedAt, Direction::Descending)
            .await?;
        Ok(nodes
            .into_iter()
            .filter_map(|node| match node {
                Node::Page(page) => Some(page),
                _ => None,
            })
            .collect())
    }

    /// Create an unpublished page with an empty root slot
    #[instrument(skip(self, description))]
    pub async fn page_create(&self, title: &str, slug: &str, description: &str) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(EditorError::EmptySlug);
        }
        if self.pages_list().await?.iter().any(|page| page.slug == slug) {
            return Err(EditorError::SlugTaken(slug.to_string()));
        }

        let id = self.reserve_one().await?;
        let mut page = Page::new(title, slug, description, now);
        page.id = id;

        let mut batch = Batch::new();
        batch.insert(Node::Page(page));
        batch.created(NodeRef::page(id));

        info!(page = %id, "Page created");
        self.commit(batch, now).await.map_err(|err| match err {
            // Another writer took the slug after the check above
            EditorError::Store(StoreError::SlugTaken(slug)) => EditorError::SlugTaken(slug),
            err => err,
        })
    }

    /// Clone a page with its whole tree under a fresh slug
    #[instrument(skip(self))]
    pub async fn page_duplicate(&self, id: NodeId) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let tree = get_tree(self.store(), NodeRef::page(id)).await?;
        let plan = plan_duplicate(self.store(), &tree, &self.config().slug_suffix, now).await?;
        let copy = plan.root_ref();

        let mut batch = Batch::new();
        batch.insert_all(plan.into_ops());
        batch.created(copy);

        info!(source = %id, page = %copy.id, "Page duplicated");
        self.commit(batch, now).await
    }

    /// Delete a page and every block below it
    #[instrument(skip(self))]
    pub async fn page_delete(&self, id: NodeId) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let tree = get_tree(self.store(), NodeRef::page(id)).await?;

        let mut batch = Batch::new();
        for node in &tree {
            batch.delete(node.node_ref());
        }

        info!(page = %id, nodes = tree.len(), "Page deleted");
        self.commit(batch, now).await
    }

    pub async fn page_publish(&self, id: NodeId) -> EditorResult<MutationResult> {
        self.set_page_status(id, PageStatus::Published).await
    }

    pub async fn page_unpublish(&self, id: NodeId) -> EditorResult<MutationResult> {
        self.set_page_status(id, PageStatus::Unpublished).await
    }

    async fn set_page_status(&self, id: NodeId, status: PageStatus) -> EditorResult<MutationResult> {
        let now = Utc::now();
        let mut page = match self.store().get(NodeRef::page(id)).await? {
            Node::Page(page) => page,
            other => {
                return Err(EditorError::WrongCollection {
                    expected: Collection::Pages,
                    found: other.node_ref(),
                })
            }
        };

        page.published_at = match status {
            PageStatus::Published => Some(now),
            PageStatus::Unpublished => None,
        };
        page.status = status;
        page.updated_at = now;

        let mut batch = Batch::new();
        batch.put(Node::Page(page));
        info!(page = %id, ?status, "Page status changed");
        self.commit(batch, now).await
    }
}
