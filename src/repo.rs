//! Repository layer: all SQL queries for spaces, membership and pages.
//!
//! Plain functions that take a `rusqlite::Connection` (or a transaction,
//! which derefs to one) as their first parameter and return
//! `Result<T, PageError>`. Callers own transaction boundaries; nothing in
//! here opens one.
//!
//! Subtree-wide walks live in `tree.rs`.

use crate::db::PageError;
use crate::models::{
    Page, PageFilter, Pagination, SidebarPage, Space, SpaceMember, SpaceRole,
};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;

const PAGE_COLUMNS: &str = "id, space_id, parent_page_id, workspace_id, title, icon, cover_photo, \
     position, content, creator_id, last_updated_by_id, created_at, updated_at, deleted_at";

/// Map a row selected with `PAGE_COLUMNS` to a Page without its sets.
fn row_to_page(row: &rusqlite::Row) -> Result<Page, rusqlite::Error> {
    Ok(Page {
        id: row.get(0)?,
        space_id: row.get(1)?,
        parent_page_id: row.get(2)?,
        workspace_id: row.get(3)?,
        title: row.get(4)?,
        icon: row.get(5)?,
        cover_photo: row.get(6)?,
        position: row.get(7)?,
        content: row.get(8)?,
        creator_id: row.get(9)?,
        last_updated_by_id: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        deleted_at: row.get(13)?,
        tags: BTreeSet::new(),
        contributor_ids: BTreeSet::new(),
    })
}

fn row_to_space(row: &rusqlite::Row) -> Result<Space, rusqlite::Error> {
    Ok(Space {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        slug: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn parse_role(value: String, column: usize) -> Result<SpaceRole, rusqlite::Error> {
    SpaceRole::from_str(&value).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(column, "role".to_string(), rusqlite::types::Type::Text)
    })
}

/// Fill in tags and contributors for pages loaded by `row_to_page`.
fn with_sets(conn: &Connection, pages: Vec<Page>) -> Result<Vec<Page>, PageError> {
    let mut out = Vec::with_capacity(pages.len());
    for page in pages {
        let tags = get_tags(conn, &page.id)?;
        let contributor_ids = get_contributors(conn, &page.id)?;
        out.push(Page {
            tags,
            contributor_ids,
            ..page
        });
    }
    Ok(out)
}

fn page_not_found(id: &str) -> PageError {
    PageError::NotFound(format!("Page with ID '{}' not found", id))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// =============================================================================
// Spaces
// =============================================================================

/// Creates a new space in a workspace.
///
/// # Errors
/// Returns `PageError::Db` if the slug is already taken in the workspace.
pub fn create_space(
    conn: &Connection,
    workspace_id: &str,
    slug: &str,
    name: &str,
    description: &str,
    now: &str,
) -> Result<Space, PageError> {
    let id = crate::clock::new_id();

    conn.execute(
        "INSERT INTO spaces (id, workspace_id, slug, name, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        rusqlite::params![id, workspace_id, slug, name, description, now],
    )?;

    Ok(Space {
        id,
        workspace_id: workspace_id.to_string(),
        slug: slug.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        created_at: now.to_string(),
        updated_at: now.to_string(),
    })
}

/// Retrieves a space by its ID.
pub fn get_space(conn: &Connection, id: &str) -> Result<Space, PageError> {
    conn.query_row(
        "SELECT id, workspace_id, slug, name, description, created_at, updated_at
         FROM spaces WHERE id = ?1",
        [id],
        row_to_space,
    )
    .optional()?
    .ok_or_else(|| PageError::NotFound(format!("Space with ID '{}' not found", id)))
}

/// Retrieves a space by its slug within a workspace.
pub fn get_space_by_slug(conn: &Connection, workspace_id: &str, slug: &str) -> Result<Space, PageError> {
    conn.query_row(
        "SELECT id, workspace_id, slug, name, description, created_at, updated_at
         FROM spaces WHERE workspace_id = ?1 AND slug = ?2",
        [workspace_id, slug],
        row_to_space,
    )
    .optional()?
    .ok_or_else(|| PageError::NotFound(format!("Space with slug '{}' not found", slug)))
}

/// Lists the spaces of a workspace, newest first.
pub fn list_spaces(conn: &Connection, workspace_id: &str) -> Result<Vec<Space>, PageError> {
    let mut stmt = conn.prepare(
        "SELECT id, workspace_id, slug, name, description, created_at, updated_at
         FROM spaces WHERE workspace_id = ?1 ORDER BY created_at DESC",
    )?;
    let spaces = stmt
        .query_map([workspace_id], row_to_space)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(spaces)
}

/// Deletes an empty space and its memberships.
///
/// # Errors
/// Returns `PageError::BadRequest` if the space still has pages,
/// `PageError::NotFound` if it does not exist.
pub fn delete_space(conn: &Connection, space_id: &str) -> Result<(), PageError> {
    let tx = conn.unchecked_transaction()?;
    let pages: i64 = tx.query_row(
        "SELECT COUNT(*) FROM pages WHERE space_id = ?1",
        [space_id],
        |row| row.get(0),
    )?;
    if pages > 0 {
        return Err(PageError::BadRequest(format!(
            "Space '{}' still has {} page(s); delete or move them first",
            space_id, pages
        )));
    }
    let rows = tx.execute("DELETE FROM spaces WHERE id = ?1", [space_id])?;
    if rows == 0 {
        return Err(PageError::NotFound(format!("Space with ID '{}' not found", space_id)));
    }
    tx.commit()?;
    Ok(())
}

// =============================================================================
// Membership
// =============================================================================

/// Gives a user a role in a space, replacing any previous direct role.
pub fn grant_role(
    conn: &Connection,
    space_id: &str,
    user_id: &str,
    role: SpaceRole,
    now: &str,
) -> Result<(), PageError> {
    conn.execute(
        "INSERT INTO space_members (space_id, user_id, role, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (space_id, user_id) DO UPDATE SET role = excluded.role",
        rusqlite::params![space_id, user_id, role.as_str(), now],
    )?;
    Ok(())
}

/// Gives every member of a group a role in a space.
pub fn grant_group_role(
    conn: &Connection,
    space_id: &str,
    group_id: &str,
    role: SpaceRole,
    now: &str,
) -> Result<(), PageError> {
    conn.execute(
        "INSERT INTO space_members (space_id, group_id, role, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (space_id, group_id) DO UPDATE SET role = excluded.role",
        rusqlite::params![space_id, group_id, role.as_str(), now],
    )?;
    Ok(())
}

/// Removes a user's direct role in a space. Group roles are untouched.
pub fn revoke_role(conn: &Connection, space_id: &str, user_id: &str) -> Result<(), PageError> {
    let rows = conn.execute(
        "DELETE FROM space_members WHERE space_id = ?1 AND user_id = ?2",
        [space_id, user_id],
    )?;
    if rows == 0 {
        return Err(PageError::NotFound(format!(
            "User '{}' has no direct membership in space '{}'",
            user_id, space_id
        )));
    }
    Ok(())
}

/// Adds a user to a group, ignoring duplicates.
pub fn add_group_user(conn: &Connection, group_id: &str, user_id: &str) -> Result<(), PageError> {
    conn.execute(
        "INSERT OR IGNORE INTO group_users (group_id, user_id) VALUES (?1, ?2)",
        [group_id, user_id],
    )?;
    Ok(())
}

/// Lists membership rows for a space.
pub fn list_members(conn: &Connection, space_id: &str) -> Result<Vec<SpaceMember>, PageError> {
    let mut stmt = conn.prepare(
        "SELECT space_id, user_id, group_id, role FROM space_members
         WHERE space_id = ?1 ORDER BY created_at, user_id, group_id",
    )?;
    let members = stmt
        .query_map([space_id], |row| {
            Ok(SpaceMember {
                space_id: row.get(0)?,
                user_id: row.get(1)?,
                group_id: row.get(2)?,
                role: parse_role(row.get(3)?, 3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

/// The highest role a user holds in a space, directly or through groups.
///
/// Returns `None` when the user has no membership or the space is not part
/// of `workspace_id`.
pub fn find_user_space_role(
    conn: &Connection,
    workspace_id: &str,
    space_id: &str,
    user_id: &str,
) -> Result<Option<SpaceRole>, PageError> {
    let mut stmt = conn.prepare(
        "SELECT m.role FROM space_members m
         JOIN spaces s ON s.id = m.space_id
         WHERE m.space_id = ?1
           AND s.workspace_id = ?2
           AND (m.user_id = ?3
                OR m.group_id IN (SELECT group_id FROM group_users WHERE user_id = ?3))",
    )?;
    let roles = stmt
        .query_map([space_id, workspace_id, user_id], |row| parse_role(row.get(0)?, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(roles.into_iter().max())
}

// =============================================================================
// Pages
// =============================================================================

/// Inserts a page row together with its tags and contributors.
pub fn insert_page(conn: &Connection, page: &Page) -> Result<(), PageError> {
    conn.execute(
        "INSERT INTO pages (id, space_id, parent_page_id, workspace_id, title, icon, cover_photo,
                            position, content, creator_id, last_updated_by_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            page.id,
            page.space_id,
            page.parent_page_id,
            page.workspace_id,
            page.title,
            page.icon,
            page.cover_photo,
            page.position,
            page.content,
            page.creator_id,
            page.last_updated_by_id,
            page.created_at,
            page.updated_at,
        ],
    )?;

    for tag in &page.tags {
        conn.execute(
            "INSERT INTO page_tags (page_id, tag) VALUES (?1, ?2)",
            [&page.id, tag],
        )?;
    }
    for user_id in &page.contributor_ids {
        add_contributor(conn, &page.id, user_id)?;
    }
    Ok(())
}

/// Retrieves a page by its ID, with tags and contributors populated.
///
/// # Errors
/// Returns `PageError::NotFound` if no page with the given ID exists.
pub fn find_page(conn: &Connection, id: &str) -> Result<Page, PageError> {
    let page = conn
        .query_row(
            &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
            [id],
            row_to_page,
        )
        .optional()?
        .ok_or_else(|| page_not_found(id))?;

    let mut pages = with_sets(conn, vec![page])?;
    pages.pop().ok_or_else(|| page_not_found(id))
}

/// The parent id of a page (`None` for a root).
///
/// # Errors
/// Returns `PageError::NotFound` if the page itself does not exist.
pub fn find_parent_id(conn: &Connection, id: &str) -> Result<Option<String>, PageError> {
    conn.query_row(
        "SELECT parent_page_id FROM pages WHERE id = ?1",
        [id],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()?
    .ok_or_else(|| page_not_found(id))
}

/// Position that places a new child last under `parent_id` (or last among
/// the space's roots when `None`).
pub fn next_position(conn: &Connection, space_id: &str, parent_id: Option<&str>) -> Result<i64, PageError> {
    let position: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position), 0) + 1 FROM pages
         WHERE space_id = ?1 AND parent_page_id IS ?2",
        rusqlite::params![space_id, parent_id],
        |row| row.get(0),
    )?;
    Ok(position)
}

/// Writes the editable scalar fields of a page.
pub fn update_page_fields(conn: &Connection, page: &Page) -> Result<(), PageError> {
    let rows = conn.execute(
        "UPDATE pages
         SET title = ?1, icon = ?2, cover_photo = ?3, content = ?4,
             last_updated_by_id = ?5, updated_at = ?6
         WHERE id = ?7",
        rusqlite::params![
            page.title,
            page.icon,
            page.cover_photo,
            page.content,
            page.last_updated_by_id,
            page.updated_at,
            page.id,
        ],
    )?;
    if rows == 0 {
        return Err(page_not_found(&page.id));
    }
    Ok(())
}

/// Moves a page under a new parent (or to the root) at `position`.
pub fn reparent(
    conn: &Connection,
    id: &str,
    parent_id: Option<&str>,
    position: i64,
    now: &str,
) -> Result<(), PageError> {
    let rows = conn.execute(
        "UPDATE pages SET parent_page_id = ?1, position = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![parent_id, position, now, id],
    )?;
    if rows == 0 {
        return Err(page_not_found(id));
    }
    Ok(())
}

/// Rewrites the space of a single page. Only called for whole subtrees, see
/// `tree::rewrite_subtree_space`.
pub fn set_space(conn: &Connection, id: &str, space_id: &str, now: &str) -> Result<(), PageError> {
    let rows = conn.execute(
        "UPDATE pages SET space_id = ?1, updated_at = ?2 WHERE id = ?3",
        [space_id, now, id],
    )?;
    if rows == 0 {
        return Err(page_not_found(id));
    }
    Ok(())
}

/// Deletes one page row; tags, contributors and history go with it.
pub fn delete_page_row(conn: &Connection, id: &str) -> Result<(), PageError> {
    let rows = conn.execute("DELETE FROM pages WHERE id = ?1", [id])?;
    if rows == 0 {
        return Err(page_not_found(id));
    }
    Ok(())
}

/// Direct children of a page, in sibling order.
pub fn child_ids(conn: &Connection, parent_id: &str) -> Result<Vec<String>, PageError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM pages WHERE parent_page_id = ?1 ORDER BY position, id",
    )?;
    let ids = stmt
        .query_map([parent_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// One page of the children of `parent_id` (or of the space's roots), in
/// sibling order. Fetches `limit + 1` rows for `Paginated::from_overfetch`.
pub fn sidebar_children(
    conn: &Connection,
    space_id: &str,
    parent_id: Option<&str>,
    pagination: Pagination,
) -> Result<Vec<SidebarPage>, PageError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.space_id, p.parent_page_id, p.title, p.icon, p.position,
                EXISTS (SELECT 1 FROM pages c WHERE c.parent_page_id = p.id)
         FROM pages p
         WHERE p.space_id = ?1 AND p.parent_page_id IS ?2
         ORDER BY p.position, p.id
         LIMIT ?3 OFFSET ?4",
    )?;
    let rows = stmt
        .query_map(
            rusqlite::params![
                space_id,
                parent_id,
                i64::from(pagination.limit) + 1,
                pagination.offset()
            ],
            |row| {
                Ok(SidebarPage {
                    id: row.get(0)?,
                    space_id: row.get(1)?,
                    parent_page_id: row.get(2)?,
                    title: row.get(3)?,
                    icon: row.get(4)?,
                    position: row.get(5)?,
                    has_children: row.get(6)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Pages whose tag set contains every requested tag, optionally restricted
/// to a creator, most recently updated first.
///
/// Performs no authorization; `PageService::filter_pages` scopes the result.
pub fn filter_pages(conn: &Connection, filter: &PageFilter) -> Result<Vec<Page>, PageError> {
    let tags = crate::models::normalize_tags(&filter.tags);

    let mut sql = format!("SELECT {} FROM pages", PAGE_COLUMNS);
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if !tags.is_empty() {
        conditions.push(format!(
            "id IN (SELECT page_id FROM page_tags WHERE tag IN ({})
                    GROUP BY page_id HAVING COUNT(*) = ?)",
            placeholders(tags.len())
        ));
        for tag in &tags {
            params.push(Box::new(tag.clone()));
        }
        params.push(Box::new(tags.len() as i64));
    }

    if let Some(ref creator) = filter.creator_id {
        conditions.push("creator_id = ?".to_string());
        params.push(Box::new(creator.clone()));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY updated_at DESC, id");

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let pages = stmt
        .query_map(&param_refs[..], row_to_page)?
        .collect::<Result<Vec<_>, _>>()?;

    with_sets(conn, pages)
}

/// Most recently updated pages across the given spaces. Fetches
/// `limit + 1` rows for `Paginated::from_overfetch`.
pub fn recent_pages(
    conn: &Connection,
    space_ids: &[String],
    pagination: Pagination,
) -> Result<Vec<Page>, PageError> {
    if space_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM pages WHERE space_id IN ({})
         ORDER BY updated_at DESC, id LIMIT ? OFFSET ?",
        PAGE_COLUMNS,
        placeholders(space_ids.len())
    );
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = space_ids
        .iter()
        .map(|id| Box::new(id.clone()) as Box<dyn rusqlite::ToSql>)
        .collect();
    params.push(Box::new(i64::from(pagination.limit) + 1));
    params.push(Box::new(pagination.offset()));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let pages = stmt
        .query_map(&param_refs[..], row_to_page)?
        .collect::<Result<Vec<_>, _>>()?;

    with_sets(conn, pages)
}

// =============================================================================
// Tags and contributors
// =============================================================================

/// Replaces the tag set of a page.
pub fn set_tags(conn: &Connection, page_id: &str, tags: &BTreeSet<String>) -> Result<(), PageError> {
    conn.execute("DELETE FROM page_tags WHERE page_id = ?1", [page_id])?;
    for tag in tags {
        conn.execute(
            "INSERT INTO page_tags (page_id, tag) VALUES (?1, ?2)",
            [page_id, tag.as_str()],
        )?;
    }
    Ok(())
}

/// Tags of a page, sorted.
pub fn get_tags(conn: &Connection, page_id: &str) -> Result<BTreeSet<String>, PageError> {
    let mut stmt = conn.prepare("SELECT tag FROM page_tags WHERE page_id = ?1")?;
    let tags = stmt
        .query_map([page_id], |row| row.get(0))?
        .collect::<Result<BTreeSet<String>, _>>()?;
    Ok(tags)
}

/// Records a user as contributor, ignoring duplicates.
pub fn add_contributor(conn: &Connection, page_id: &str, user_id: &str) -> Result<(), PageError> {
    conn.execute(
        "INSERT OR IGNORE INTO page_contributors (page_id, user_id) VALUES (?1, ?2)",
        [page_id, user_id],
    )?;
    Ok(())
}

pub fn get_contributors(conn: &Connection, page_id: &str) -> Result<BTreeSet<String>, PageError> {
    let mut stmt = conn.prepare("SELECT user_id FROM page_contributors WHERE page_id = ?1")?;
    let users = stmt
        .query_map([page_id], |row| row.get(0))?
        .collect::<Result<BTreeSet<String>, _>>()?;
    Ok(users)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::open_test_db;

    /// A page ready for `insert_page`; timestamps sort by `position`.
    pub(crate) fn sample_page(space_id: &str, parent: Option<&str>, position: i64, title: &str) -> Page {
        let stamp = format!("2024-01-15T10:00:00.{:06}Z", position);
        Page {
            id: crate::clock::new_id(),
            space_id: space_id.to_string(),
            parent_page_id: parent.map(str::to_string),
            workspace_id: "ws".to_string(),
            title: Some(title.to_string()),
            icon: None,
            cover_photo: None,
            position,
            content: format!("{} body", title),
            tags: BTreeSet::new(),
            creator_id: "alice".to_string(),
            last_updated_by_id: "alice".to_string(),
            contributor_ids: BTreeSet::new(),
            created_at: stamp.clone(),
            updated_at: stamp,
            deleted_at: None,
        }
    }

    fn tagged(page: Page, tags: &[&str]) -> Page {
        Page {
            tags: crate::models::normalize_tags(tags),
            ..page
        }
    }

    #[test]
    fn test_create_and_get_space() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "eng", "Engineering", "Team docs", "t0").unwrap();

        let by_slug = get_space_by_slug(&conn, "ws", "eng").expect("Failed to get space");
        assert_eq!(by_slug.id, space.id);
        assert_eq!(by_slug.name, "Engineering");

        let by_id = get_space(&conn, &space.id).expect("Failed to get space by id");
        assert_eq!(by_id.slug, "eng");
    }

    #[test]
    fn test_space_slug_unique_per_workspace() {
        let conn = open_test_db();
        create_space(&conn, "ws", "eng", "Engineering", "", "t0").unwrap();
        assert!(matches!(
            create_space(&conn, "ws", "eng", "Again", "", "t1"),
            Err(PageError::Db(_))
        ));
        create_space(&conn, "other", "eng", "Elsewhere", "", "t2").expect("other workspace is fine");
    }

    #[test]
    fn test_get_space_not_found() {
        let conn = open_test_db();
        assert!(matches!(get_space_by_slug(&conn, "ws", "nope"), Err(PageError::NotFound(_))));
    }

    #[test]
    fn test_list_spaces_scoped_to_workspace() {
        let conn = open_test_db();
        create_space(&conn, "ws", "a", "A", "", "t0").unwrap();
        create_space(&conn, "ws", "b", "B", "", "t1").unwrap();
        create_space(&conn, "other", "c", "C", "", "t2").unwrap();

        let spaces = list_spaces(&conn, "ws").unwrap();
        assert_eq!(spaces.len(), 2);
        assert_eq!(spaces[0].slug, "b");
    }

    #[test]
    fn test_delete_space_requires_no_pages() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        let page = sample_page(&space.id, None, 1, "Root");
        insert_page(&conn, &page).unwrap();

        assert!(matches!(delete_space(&conn, &space.id), Err(PageError::BadRequest(_))));
        assert!(get_space(&conn, &space.id).is_ok());

        delete_page_row(&conn, &page.id).unwrap();
        delete_space(&conn, &space.id).unwrap();
        assert!(matches!(delete_space(&conn, &space.id), Err(PageError::NotFound(_))));
    }

    #[test]
    fn test_grant_role_upserts() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        grant_role(&conn, &space.id, "alice", SpaceRole::Reader, "t1").unwrap();
        grant_role(&conn, &space.id, "alice", SpaceRole::Admin, "t2").unwrap();

        let members = list_members(&conn, &space.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, SpaceRole::Admin);
        assert_eq!(
            find_user_space_role(&conn, "ws", &space.id, "alice").unwrap(),
            Some(SpaceRole::Admin)
        );
    }

    #[test]
    fn test_revoke_missing_role_is_not_found() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        assert!(matches!(revoke_role(&conn, &space.id, "ghost"), Err(PageError::NotFound(_))));
    }

    #[test]
    fn test_insert_and_find_page_with_sets() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        let mut page = tagged(sample_page(&space.id, None, 1, "Root"), &["rust", "db"]);
        page.contributor_ids.insert("alice".to_string());
        insert_page(&conn, &page).unwrap();

        let found = find_page(&conn, &page.id).unwrap();
        assert_eq!(found.title.as_deref(), Some("Root"));
        assert_eq!(found.tags.iter().collect::<Vec<_>>(), vec!["db", "rust"]);
        assert!(found.contributor_ids.contains("alice"));
        assert!(found.deleted_at.is_none());
    }

    #[test]
    fn test_find_page_not_found() {
        let conn = open_test_db();
        assert!(matches!(find_page(&conn, "missing"), Err(PageError::NotFound(_))));
        assert!(matches!(find_parent_id(&conn, "missing"), Err(PageError::NotFound(_))));
    }

    #[test]
    fn test_next_position_per_parent() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        assert_eq!(next_position(&conn, &space.id, None).unwrap(), 1);

        let root = sample_page(&space.id, None, 1, "Root");
        insert_page(&conn, &root).unwrap();
        assert_eq!(next_position(&conn, &space.id, None).unwrap(), 2);
        assert_eq!(next_position(&conn, &space.id, Some(&root.id)).unwrap(), 1);

        insert_page(&conn, &sample_page(&space.id, Some(&root.id), 7, "Child")).unwrap();
        assert_eq!(next_position(&conn, &space.id, Some(&root.id)).unwrap(), 8);
    }

    #[test]
    fn test_set_tags_replaces_and_contributors_dedupe() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        let page = tagged(sample_page(&space.id, None, 1, "Root"), &["old"]);
        insert_page(&conn, &page).unwrap();

        set_tags(&conn, &page.id, &crate::models::normalize_tags(["new", "fresh"])).unwrap();
        add_contributor(&conn, &page.id, "bob").unwrap();
        add_contributor(&conn, &page.id, "bob").unwrap();

        let found = find_page(&conn, &page.id).unwrap();
        assert_eq!(found.tags.iter().collect::<Vec<_>>(), vec!["fresh", "new"]);
        assert_eq!(found.contributor_ids.len(), 1);
    }

    #[test]
    fn test_filter_pages_is_superset_match() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        let only_x = tagged(sample_page(&space.id, None, 1, "only x"), &["x"]);
        let x_and_y = tagged(sample_page(&space.id, None, 2, "x and y"), &["x", "y"]);
        let only_y = tagged(sample_page(&space.id, None, 3, "only y"), &["y"]);
        let untagged = sample_page(&space.id, None, 4, "none");
        for page in [&only_x, &x_and_y, &only_y, &untagged] {
            insert_page(&conn, page).unwrap();
        }

        let x = filter_pages(&conn, &PageFilter { tags: vec!["x".into()], creator_id: None }).unwrap();
        let ids: BTreeSet<_> = x.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, BTreeSet::from([only_x.id.clone(), x_and_y.id.clone()]));

        let xy = filter_pages(
            &conn,
            &PageFilter {
                tags: vec!["y".into(), "x".into(), "x".into()],
                creator_id: None,
            },
        )
        .unwrap();
        assert_eq!(xy.len(), 1);
        assert_eq!(xy[0].id, x_and_y.id);

        let all = filter_pages(&conn, &PageFilter::default()).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].id, untagged.id, "newest update first");
    }

    #[test]
    fn test_filter_pages_by_creator() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        let mine = tagged(sample_page(&space.id, None, 1, "mine"), &["x"]);
        let theirs = Page {
            creator_id: "bob".to_string(),
            ..tagged(sample_page(&space.id, None, 2, "theirs"), &["x"])
        };
        insert_page(&conn, &mine).unwrap();
        insert_page(&conn, &theirs).unwrap();

        let pages = filter_pages(
            &conn,
            &PageFilter {
                tags: vec!["x".into()],
                creator_id: Some("bob".into()),
            },
        )
        .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, theirs.id);
    }

    #[test]
    fn test_sidebar_children_order_and_flags() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        let second = sample_page(&space.id, None, 2, "Second");
        let first = sample_page(&space.id, None, 1, "First");
        insert_page(&conn, &second).unwrap();
        insert_page(&conn, &first).unwrap();
        insert_page(&conn, &sample_page(&space.id, Some(&second.id), 1, "Nested")).unwrap();

        let roots = sidebar_children(&conn, &space.id, None, Pagination::new(1, 10)).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].id, first.id);
        assert!(!roots[0].has_children);
        assert_eq!(roots[1].id, second.id);
        assert!(roots[1].has_children);

        let nested = sidebar_children(&conn, &space.id, Some(&second.id), Pagination::new(1, 10)).unwrap();
        assert_eq!(nested.len(), 1);
    }

    #[test]
    fn test_sidebar_children_overfetches_one() {
        let conn = open_test_db();
        let space = create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        for i in 1..=5 {
            insert_page(&conn, &sample_page(&space.id, None, i, &format!("P{}", i))).unwrap();
        }
        let rows = sidebar_children(&conn, &space.id, None, Pagination::new(1, 2)).unwrap();
        assert_eq!(rows.len(), 3);
        let rows = sidebar_children(&conn, &space.id, None, Pagination::new(3, 2)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title.as_deref(), Some("P5"));
    }

    #[test]
    fn test_recent_pages_orders_and_scopes() {
        let conn = open_test_db();
        let a = create_space(&conn, "ws", "a", "A", "", "t0").unwrap();
        let b = create_space(&conn, "ws", "b", "B", "", "t1").unwrap();
        let old = sample_page(&a.id, None, 1, "old");
        let new = sample_page(&a.id, None, 2, "new");
        let other = sample_page(&b.id, None, 3, "other");
        for page in [&old, &new, &other] {
            insert_page(&conn, page).unwrap();
        }

        let recent = recent_pages(&conn, &[a.id.clone()], Pagination::new(1, 10)).unwrap();
        let titles: Vec<_> = recent.iter().filter_map(|p| p.title.as_deref()).collect();
        assert_eq!(titles, vec!["new", "old"]);

        let both = recent_pages(&conn, &[a.id.clone(), b.id.clone()], Pagination::new(1, 10)).unwrap();
        assert_eq!(both[0].id, other.id);

        assert!(recent_pages(&conn, &[], Pagination::default()).unwrap().is_empty());
    }
}
