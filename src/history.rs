//! Append-only page history.
//!
//! Snapshots are written inside the transaction of the update that produced
//! them. Version numbers are `max + 1` per page, computed in that same
//! transaction, and `UNIQUE(page_id, version)` rejects any second writer
//! that raced to the same number. A trigger rejects updates to stored rows.

use crate::db::PageError;
use crate::models::{HistorySummary, Page, PageHistory, Paginated, Pagination};
use rusqlite::{Connection, OptionalExtension};

/// Records the current title, icon and content of `page` as its next version.
pub fn append_snapshot(
    conn: &Connection,
    page: &Page,
    author_id: &str,
    now: &str,
) -> Result<PageHistory, PageError> {
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM page_history WHERE page_id = ?1",
        [&page.id],
        |row| row.get(0),
    )?;

    let entry = PageHistory {
        id: crate::clock::new_id(),
        page_id: page.id.clone(),
        space_id: page.space_id.clone(),
        version,
        title: page.title.clone(),
        icon: page.icon.clone(),
        content: page.content.clone(),
        author_id: author_id.to_string(),
        created_at: now.to_string(),
    };

    conn.execute(
        "INSERT INTO page_history (id, page_id, space_id, version, title, icon, content, author_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            entry.id,
            entry.page_id,
            entry.space_id,
            entry.version,
            entry.title,
            entry.icon,
            entry.content,
            entry.author_id,
            entry.created_at,
        ],
    )?;

    tracing::debug!(page = %page.id, version, "appended history snapshot");
    Ok(entry)
}

/// Version summaries for a page, newest first.
pub fn find_history_by_page_id(
    conn: &Connection,
    page_id: &str,
    pagination: Pagination,
) -> Result<Paginated<HistorySummary>, PageError> {
    let mut stmt = conn.prepare(
        "SELECT id, page_id, version, title, author_id, created_at
         FROM page_history WHERE page_id = ?1
         ORDER BY version DESC LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt
        .query_map(
            rusqlite::params![page_id, i64::from(pagination.limit) + 1, pagination.offset()],
            |row| {
                Ok(HistorySummary {
                    id: row.get(0)?,
                    page_id: row.get(1)?,
                    version: row.get(2)?,
                    title: row.get(3)?,
                    author_id: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Paginated::from_overfetch(rows, pagination))
}

/// One snapshot by id.
///
/// # Errors
/// Returns `PageError::NotFound` if no snapshot has this id.
pub fn find_by_id(conn: &Connection, history_id: &str) -> Result<PageHistory, PageError> {
    conn.query_row(
        "SELECT id, page_id, space_id, version, title, icon, content, author_id, created_at
         FROM page_history WHERE id = ?1",
        [history_id],
        |row| {
            Ok(PageHistory {
                id: row.get(0)?,
                page_id: row.get(1)?,
                space_id: row.get(2)?,
                version: row.get(3)?,
                title: row.get(4)?,
                icon: row.get(5)?,
                content: row.get(6)?,
                author_id: row.get(7)?,
                created_at: row.get(8)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| PageError::NotFound(format!("Page history '{}' not found", history_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_test_db;
    use crate::repo;
    use crate::repo::tests::sample_page;

    fn seeded() -> (Connection, Page, Page) {
        let conn = open_test_db();
        let space = repo::create_space(&conn, "ws", "docs", "Docs", "", "t0").unwrap();
        let a = sample_page(&space.id, None, 1, "A");
        let b = sample_page(&space.id, None, 2, "B");
        repo::insert_page(&conn, &a).unwrap();
        repo::insert_page(&conn, &b).unwrap();
        (conn, a, b)
    }

    #[test]
    fn versions_are_gapless_per_page() {
        let (conn, a, b) = seeded();
        for i in 0..4 {
            append_snapshot(&conn, &a, "alice", &format!("t{}", i)).unwrap();
            if i % 2 == 0 {
                append_snapshot(&conn, &b, "bob", &format!("t{}", i)).unwrap();
            }
        }

        let history = find_history_by_page_id(&conn, &a.id, Pagination::new(1, 50)).unwrap();
        let versions: Vec<i64> = history.items.iter().map(|h| h.version).collect();
        assert_eq!(versions, vec![4, 3, 2, 1]);

        let history = find_history_by_page_id(&conn, &b.id, Pagination::new(1, 50)).unwrap();
        let versions: Vec<i64> = history.items.iter().map(|h| h.version).collect();
        assert_eq!(versions, vec![2, 1]);
    }

    #[test]
    fn snapshot_captures_page_fields() {
        let (conn, mut a, _) = seeded();
        a.icon = Some("📝".to_string());
        let entry = append_snapshot(&conn, &a, "alice", "t1").unwrap();

        let stored = find_by_id(&conn, &entry.id).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.title.as_deref(), Some("A"));
        assert_eq!(stored.icon.as_deref(), Some("📝"));
        assert_eq!(stored.content, "A body");
        assert_eq!(stored.space_id, a.space_id);
    }

    #[test]
    fn history_paginates_newest_first() {
        let (conn, a, _) = seeded();
        for i in 0..5 {
            append_snapshot(&conn, &a, "alice", &format!("t{}", i)).unwrap();
        }

        let first = find_history_by_page_id(&conn, &a.id, Pagination::new(1, 2)).unwrap();
        assert_eq!(first.items.iter().map(|h| h.version).collect::<Vec<_>>(), vec![5, 4]);
        assert!(first.meta.has_next_page);

        let last = find_history_by_page_id(&conn, &a.id, Pagination::new(3, 2)).unwrap();
        assert_eq!(last.items.iter().map(|h| h.version).collect::<Vec<_>>(), vec![1]);
        assert!(!last.meta.has_next_page);
        assert!(last.meta.has_prev_page);
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let (conn, a, _) = seeded();
        append_snapshot(&conn, &a, "alice", "t1").unwrap();
        let dup = conn.execute(
            "INSERT INTO page_history (id, page_id, space_id, version, content, author_id, created_at)
             VALUES ('dup', ?1, ?2, 1, '', 'mallory', 't2')",
            [&a.id, &a.space_id],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn find_by_id_not_found() {
        let (conn, _, _) = seeded();
        assert!(matches!(find_by_id(&conn, "missing"), Err(PageError::NotFound(_))));
    }
}
