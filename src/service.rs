//! Permission-gated page operations.
//!
//! `PageService` is the only place that combines ability checks with
//! repository writes. Every operation resolves the target first (so a
//! missing page is `NotFound` rather than `Forbidden`), then checks the
//! caller's ability, then opens a transaction for the mutation. The page's
//! space and any structural checks that depend on the tree shape are
//! re-read inside the transaction so they see the same state the write does.

use crate::ability::{self, AbilityProvider, Action, Subject};
use crate::breadcrumbs;
use crate::clock::{new_id, MonotonicClock};
use crate::db::PageError;
use crate::history;
use crate::models::{
    normalize_tags, Breadcrumb, HistorySummary, NewPage, Page, PageFilter, PageHistory,
    PageUpdate, Paginated, Pagination, RecentScope, RequestContext, SidebarPage,
};
use crate::repo;
use crate::tree;
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};

pub struct PageService<'a, A: AbilityProvider + ?Sized> {
    conn: &'a Connection,
    abilities: &'a A,
    clock: MonotonicClock,
}

impl<'a, A: AbilityProvider + ?Sized> PageService<'a, A> {
    pub fn new(conn: &'a Connection, abilities: &'a A) -> Self {
        Self {
            conn,
            abilities,
            clock: MonotonicClock::new(),
        }
    }

    fn authorize(&self, ctx: &RequestContext, space_id: &str, action: Action) -> Result<(), PageError> {
        ability::authorize(self.abilities, ctx, space_id, action, Subject::Page)
    }

    /// Creates a page as the last root of its space, or as the last child of
    /// `parent_page_id`.
    pub fn create(&self, ctx: &RequestContext, new: NewPage) -> Result<Page, PageError> {
        self.authorize(ctx, &new.space_id, Action::Create)?;

        let now = self.clock.now_rfc3339();
        let tx = self.conn.unchecked_transaction()?;

        if let Some(ref parent_id) = new.parent_page_id {
            let parent = repo::find_page(&tx, parent_id)?;
            if parent.space_id != new.space_id {
                return Err(PageError::BadRequest(format!(
                    "Parent page '{}' belongs to another space",
                    parent_id
                )));
            }
        }

        let position = repo::next_position(&tx, &new.space_id, new.parent_page_id.as_deref())?;
        let page = Page {
            id: new_id(),
            space_id: new.space_id,
            parent_page_id: new.parent_page_id,
            workspace_id: ctx.workspace_id.clone(),
            title: new.title,
            icon: new.icon,
            cover_photo: new.cover_photo,
            position,
            content: new.content,
            tags: normalize_tags(&new.tags),
            creator_id: ctx.user_id.clone(),
            last_updated_by_id: ctx.user_id.clone(),
            contributor_ids: BTreeSet::from([ctx.user_id.clone()]),
            created_at: now.clone(),
            updated_at: now,
            deleted_at: None,
        };
        repo::insert_page(&tx, &page)?;
        tx.commit()?;

        tracing::info!(page = %page.id, space = %page.space_id, user = %ctx.user_id, "created page");
        Ok(page)
    }

    pub fn get(&self, ctx: &RequestContext, page_id: &str) -> Result<Page, PageError> {
        let page = repo::find_page(self.conn, page_id)?;
        self.authorize(ctx, &page.space_id, Action::Read)?;
        Ok(page)
    }

    /// Applies a field-level update.
    ///
    /// Writes nothing when every supplied field already matches, the caller
    /// is already a contributor and was the last to update the page. A
    /// history snapshot is appended only when title, icon or content change.
    pub fn update(&self, ctx: &RequestContext, page_id: &str, update: PageUpdate) -> Result<Page, PageError> {
        let page = repo::find_page(self.conn, page_id)?;
        self.authorize(ctx, &page.space_id, Action::Edit)?;

        let now = self.clock.now_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        let mut page = find_in_space(&tx, page_id, &page.space_id)?;

        let mut snapshot = false;
        let mut fields = false;

        if let Some(title) = update.title {
            if page.title.as_deref() != Some(title.as_str()) {
                page.title = Some(title);
                snapshot = true;
            }
        }
        if let Some(icon) = update.icon {
            if page.icon.as_deref() != Some(icon.as_str()) {
                page.icon = Some(icon);
                snapshot = true;
            }
        }
        if let Some(content) = update.content {
            if page.content != content {
                page.content = content;
                snapshot = true;
            }
        }
        if let Some(cover) = update.cover_photo {
            if page.cover_photo.as_deref() != Some(cover.as_str()) {
                page.cover_photo = Some(cover);
                fields = true;
            }
        }
        if let Some(tags) = update.tags {
            let tags = normalize_tags(&tags);
            if tags != page.tags {
                repo::set_tags(&tx, &page.id, &tags)?;
                page.tags = tags;
                fields = true;
            }
        }
        if let Some(parent_id) = update.parent_page_id {
            if page.parent_page_id.as_deref() != Some(parent_id.as_str()) {
                reparent_in_tx(&tx, &page, Some(parent_id.as_str()), &now)?;
                fields = true;
            }
        }
        if page.contributor_ids.insert(ctx.user_id.clone()) {
            repo::add_contributor(&tx, &page.id, &ctx.user_id)?;
            fields = true;
        }
        if page.last_updated_by_id != ctx.user_id {
            fields = true;
        }

        if !(snapshot || fields) {
            tracing::debug!(page = %page_id, "update changed nothing");
            return Ok(page);
        }

        page.last_updated_by_id = ctx.user_id.clone();
        page.updated_at = now.clone();
        repo::update_page_fields(&tx, &page)?;
        if snapshot {
            history::append_snapshot(&tx, &page, &ctx.user_id, &now)?;
        }
        tx.commit()?;

        tracing::info!(page = %page_id, user = %ctx.user_id, snapshot, "updated page");
        repo::find_page(self.conn, page_id)
    }

    /// Pages matching `filter`, limited to spaces the caller can read.
    pub fn filter_pages(&self, ctx: &RequestContext, filter: &PageFilter) -> Result<Vec<Page>, PageError> {
        let candidates = repo::filter_pages(self.conn, filter)?;

        let mut readable: HashMap<String, bool> = HashMap::new();
        let mut pages = Vec::with_capacity(candidates.len());
        for page in candidates {
            let allowed = match readable.get(&page.space_id) {
                Some(&allowed) => allowed,
                None => {
                    let allowed = self
                        .abilities
                        .evaluate(ctx, &page.space_id)?
                        .can(Action::Read, Subject::Page);
                    readable.insert(page.space_id.clone(), allowed);
                    allowed
                }
            };
            if allowed {
                pages.push(page);
            }
        }
        Ok(pages)
    }

    /// Reparents a page within its space, appending it as the last sibling.
    /// `None` makes it a root.
    pub fn move_page(
        &self,
        ctx: &RequestContext,
        page_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Page, PageError> {
        let page = repo::find_page(self.conn, page_id)?;
        self.authorize(ctx, &page.space_id, Action::Edit)?;

        let now = self.clock.now_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        let page = find_in_space(&tx, page_id, &page.space_id)?;
        reparent_in_tx(&tx, &page, new_parent_id, &now)?;
        tx.commit()?;

        tracing::info!(page = %page_id, parent = ?new_parent_id, user = %ctx.user_id, "moved page");
        repo::find_page(self.conn, page_id)
    }

    /// Moves a page and its whole subtree into another space. The page
    /// becomes the last root of the target space; everything below it keeps
    /// its parent links, positions and history.
    pub fn move_to_space(
        &self,
        ctx: &RequestContext,
        page_id: &str,
        target_space_id: &str,
    ) -> Result<Page, PageError> {
        let page = repo::find_page(self.conn, page_id)?;
        self.check_cross_space(ctx, &page, target_space_id)?;

        let now = self.clock.now_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        find_in_space(&tx, page_id, &page.space_id)?;

        let ids = tree::subtree_ids(&tx, page_id)?;
        let position = repo::next_position(&tx, target_space_id, None)?;
        repo::reparent(&tx, page_id, None, position, &now)?;
        tree::rewrite_subtree_space(&tx, &ids, target_space_id, &now)?;
        tx.commit()?;

        tracing::info!(
            page = %page_id,
            from = %page.space_id,
            to = %target_space_id,
            pages = ids.len(),
            "moved subtree to space"
        );
        repo::find_page(self.conn, page_id)
    }

    /// Clones a page and its subtree into another space with fresh ids.
    /// The clone's root is appended as the last root of the target space;
    /// the source is left untouched. Returns the new root.
    pub fn copy_to_space(
        &self,
        ctx: &RequestContext,
        page_id: &str,
        target_space_id: &str,
    ) -> Result<Page, PageError> {
        let page = repo::find_page(self.conn, page_id)?;
        self.check_cross_space(ctx, &page, target_space_id)?;

        let now = self.clock.now_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        find_in_space(&tx, page_id, &page.space_id)?;
        let sources = tree::subtree_pages(&tx, page_id)?;
        let root_position = repo::next_position(&tx, target_space_id, None)?;

        let mut new_ids: HashMap<&str, String> = HashMap::with_capacity(sources.len());
        for (i, source) in sources.iter().enumerate() {
            let (parent_page_id, position) = if i == 0 {
                (None, root_position)
            } else {
                let parent = source
                    .parent_page_id
                    .as_deref()
                    .and_then(|p| new_ids.get(p))
                    .cloned()
                    .ok_or_else(|| {
                        PageError::DataIntegrity(format!(
                            "Page '{}' was reached before its parent while copying",
                            source.id
                        ))
                    })?;
                (Some(parent), source.position)
            };

            let copy = Page {
                id: new_id(),
                space_id: target_space_id.to_string(),
                parent_page_id,
                workspace_id: source.workspace_id.clone(),
                title: source.title.clone(),
                icon: source.icon.clone(),
                cover_photo: source.cover_photo.clone(),
                position,
                content: source.content.clone(),
                tags: source.tags.clone(),
                creator_id: ctx.user_id.clone(),
                last_updated_by_id: ctx.user_id.clone(),
                contributor_ids: BTreeSet::from([ctx.user_id.clone()]),
                created_at: now.clone(),
                updated_at: now.clone(),
                deleted_at: None,
            };
            repo::insert_page(&tx, &copy)?;
            new_ids.insert(source.id.as_str(), copy.id);
        }
        tx.commit()?;

        let root_id = new_ids
            .get(page_id)
            .cloned()
            .ok_or_else(|| PageError::DataIntegrity(format!("Copy of '{}' produced no root", page_id)))?;
        tracing::info!(
            page = %page_id,
            copy = %root_id,
            to = %target_space_id,
            pages = sources.len(),
            "copied subtree to space"
        );
        repo::find_page(self.conn, &root_id)
    }

    /// Shared guard for moves and copies across spaces: the target must be
    /// a different space and the caller needs Edit on both. Both abilities
    /// are evaluated concurrently and joined before any write.
    fn check_cross_space(&self, ctx: &RequestContext, page: &Page, target_space_id: &str) -> Result<(), PageError> {
        if page.space_id == target_space_id {
            return Err(PageError::BadRequest(format!(
                "Page '{}' is already in space '{}'",
                page.id, target_space_id
            )));
        }
        let (source, target) = ability::evaluate_pair(self.abilities, ctx, &page.space_id, target_space_id)?;
        if source.cannot(Action::Edit, Subject::Page) || target.cannot(Action::Edit, Subject::Page) {
            tracing::warn!(
                user = %ctx.user_id,
                from = %page.space_id,
                to = %target_space_id,
                "cross-space edit denied"
            );
            return Err(PageError::Forbidden);
        }
        Ok(())
    }

    /// Permanently deletes a page and its subtree. Returns how many pages
    /// were removed.
    pub fn force_delete(&self, ctx: &RequestContext, page_id: &str) -> Result<usize, PageError> {
        let page = repo::find_page(self.conn, page_id)?;
        self.authorize(ctx, &page.space_id, Action::Manage)?;

        let tx = self.conn.unchecked_transaction()?;
        find_in_space(&tx, page_id, &page.space_id)?;
        let ids = tree::subtree_ids(&tx, page_id)?;
        let deleted = tree::delete_subtree(&tx, &ids)?;
        tx.commit()?;

        tracing::info!(page = %page_id, space = %page.space_id, deleted, "deleted subtree");
        Ok(deleted)
    }

    /// Deleted pages are gone for good; there is nothing to restore.
    pub fn restore(&self, _ctx: &RequestContext, _page_id: &str) -> Result<Page, PageError> {
        Err(PageError::NotImplemented("page restore"))
    }

    pub fn breadcrumbs(&self, ctx: &RequestContext, page_id: &str) -> Result<Vec<Breadcrumb>, PageError> {
        let page = repo::find_page(self.conn, page_id)?;
        self.authorize(ctx, &page.space_id, Action::Read)?;

        // Read transaction so the walk sees one snapshot of the tree.
        let tx = self.conn.unchecked_transaction()?;
        let chain = tree::ancestor_chain(&tx, page_id)?;
        drop(tx);
        breadcrumbs::resolve(&chain)
    }

    /// Children of `page_id`, or the roots of the space when `None`.
    pub fn sidebar_pages(
        &self,
        ctx: &RequestContext,
        space_id: &str,
        page_id: Option<&str>,
        pagination: Pagination,
    ) -> Result<Paginated<SidebarPage>, PageError> {
        self.authorize(ctx, space_id, Action::Read)?;

        if let Some(page_id) = page_id {
            let page = repo::find_page(self.conn, page_id)?;
            if page.space_id != space_id {
                tracing::warn!(page = %page_id, space = %space_id, "sidebar page outside requested space");
                return Err(PageError::Forbidden);
            }
        }

        let rows = repo::sidebar_children(self.conn, space_id, page_id, pagination)?;
        Ok(Paginated::from_overfetch(rows, pagination))
    }

    pub fn recent_pages(
        &self,
        ctx: &RequestContext,
        scope: &RecentScope,
        pagination: Pagination,
    ) -> Result<Paginated<Page>, PageError> {
        let space_ids = match scope {
            RecentScope::Space(space_id) => {
                self.authorize(ctx, space_id, Action::Read)?;
                vec![space_id.clone()]
            }
            RecentScope::Member => {
                let mut ids = Vec::new();
                for space in repo::list_spaces(self.conn, &ctx.workspace_id)? {
                    if self.abilities.evaluate(ctx, &space.id)?.can(Action::Read, Subject::Page) {
                        ids.push(space.id);
                    }
                }
                ids
            }
        };

        let rows = repo::recent_pages(self.conn, &space_ids, pagination)?;
        Ok(Paginated::from_overfetch(rows, pagination))
    }

    pub fn history(
        &self,
        ctx: &RequestContext,
        page_id: &str,
        pagination: Pagination,
    ) -> Result<Paginated<HistorySummary>, PageError> {
        let page = repo::find_page(self.conn, page_id)?;
        self.authorize(ctx, &page.space_id, Action::Read)?;
        history::find_history_by_page_id(self.conn, page_id, pagination)
    }

    pub fn history_detail(&self, ctx: &RequestContext, history_id: &str) -> Result<PageHistory, PageError> {
        let entry = history::find_by_id(self.conn, history_id)?;
        self.authorize(ctx, &entry.space_id, Action::Read)?;
        Ok(entry)
    }
}

/// Re-reads a page inside the mutation's transaction. The ability check ran
/// against `space_id`; a page that has since moved to another space is
/// rejected rather than written under the old verdict.
fn find_in_space(conn: &Connection, page_id: &str, space_id: &str) -> Result<Page, PageError> {
    let page = repo::find_page(conn, page_id)?;
    if page.space_id != space_id {
        tracing::warn!(
            page = %page_id,
            checked = %space_id,
            now_in = %page.space_id,
            "page changed space after ability check"
        );
        return Err(PageError::BadRequest(format!(
            "Page '{}' changed space while the request was in flight",
            page_id
        )));
    }
    Ok(page)
}

/// Reparents `page` inside an open transaction after checking that the new
/// parent exists, lives in the same space and is not the page itself or one
/// of its descendants.
fn reparent_in_tx(conn: &Connection, page: &Page, new_parent_id: Option<&str>, now: &str) -> Result<(), PageError> {
    if let Some(parent_id) = new_parent_id {
        let parent = repo::find_page(conn, parent_id)?;
        if parent.space_id != page.space_id {
            return Err(PageError::BadRequest(format!(
                "Parent page '{}' belongs to another space",
                parent_id
            )));
        }
        if tree::is_in_subtree(conn, parent_id, &page.id)? {
            return Err(PageError::BadRequest(format!(
                "Cannot move page '{}' under itself or one of its descendants",
                page.id
            )));
        }
    }
    let position = repo::next_position(conn, &page.space_id, new_parent_id)?;
    repo::reparent(conn, &page.id, new_parent_id, position, now)
}
