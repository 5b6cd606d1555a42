//! Walks over the page tree and subtree-wide writes.
//!
//! Every walk carries a visited set, so corrupt data (a parent cycle or a
//! parent id pointing nowhere) surfaces as `DataIntegrity` instead of an
//! endless loop. Callers run these inside the transaction of the mutation
//! they guard.

use crate::db::PageError;
use crate::models::Page;
use crate::repo;
use rusqlite::Connection;
use std::collections::{HashSet, VecDeque};

/// Loads a page and all of its ancestors, target first, root last.
///
/// # Errors
/// `NotFound` if the page itself is missing; `DataIntegrity` if a parent id
/// points at a missing page or the chain revisits a page.
pub fn ancestor_chain(conn: &Connection, page_id: &str) -> Result<Vec<Page>, PageError> {
    let mut chain = vec![repo::find_page(conn, page_id)?];
    let mut visited = HashSet::from([page_id.to_string()]);

    while let Some(parent_id) = chain.last().and_then(|p| p.parent_page_id.clone()) {
        if !visited.insert(parent_id.clone()) {
            tracing::warn!(page = %page_id, at = %parent_id, "ancestor cycle detected");
            return Err(PageError::DataIntegrity(format!(
                "Ancestor cycle through page '{}'",
                parent_id
            )));
        }
        let parent = match repo::find_page(conn, &parent_id) {
            Ok(parent) => parent,
            Err(PageError::NotFound(_)) => {
                tracing::warn!(page = %page_id, missing = %parent_id, "dangling parent");
                return Err(PageError::DataIntegrity(format!(
                    "Parent page '{}' does not exist",
                    parent_id
                )));
            }
            Err(e) => return Err(e),
        };
        chain.push(parent);
    }

    tracing::debug!(page = %page_id, depth = chain.len() - 1, "walked ancestors");
    Ok(chain)
}

/// True if `node_id` is `root_id` or one of its descendants.
///
/// Walks upward from `node_id` using parent ids only.
pub fn is_in_subtree(conn: &Connection, node_id: &str, root_id: &str) -> Result<bool, PageError> {
    let mut visited = HashSet::new();
    let mut current = Some(node_id.to_string());

    while let Some(id) = current {
        if id == root_id {
            return Ok(true);
        }
        if !visited.insert(id.clone()) {
            return Err(PageError::DataIntegrity(format!("Ancestor cycle through page '{}'", id)));
        }
        current = match repo::find_parent_id(conn, &id) {
            Ok(parent) => parent,
            Err(PageError::NotFound(_)) if id != node_id => {
                return Err(PageError::DataIntegrity(format!("Parent page '{}' does not exist", id)));
            }
            Err(e) => return Err(e),
        };
    }
    Ok(false)
}

/// Ids of a page and all its descendants, breadth-first, root first and
/// siblings in order. Parents always precede their children.
pub fn subtree_ids(conn: &Connection, root_id: &str) -> Result<Vec<String>, PageError> {
    // Existence check; a missing root is NotFound, not an empty subtree.
    repo::find_parent_id(conn, root_id)?;

    let mut ids = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([root_id.to_string()]);

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            return Err(PageError::DataIntegrity(format!(
                "Page '{}' reached twice while walking descendants",
                id
            )));
        }
        queue.extend(repo::child_ids(conn, &id)?);
        ids.push(id);
    }
    Ok(ids)
}

/// Full pages of a subtree, in `subtree_ids` order.
pub fn subtree_pages(conn: &Connection, root_id: &str) -> Result<Vec<Page>, PageError> {
    subtree_ids(conn, root_id)?
        .iter()
        .map(|id| repo::find_page(conn, id))
        .collect()
}

/// Points every page in `ids` at `space_id`. Parent links are untouched.
pub fn rewrite_subtree_space(
    conn: &Connection,
    ids: &[String],
    space_id: &str,
    now: &str,
) -> Result<(), PageError> {
    for id in ids {
        repo::set_space(conn, id, space_id, now)?;
    }
    Ok(())
}

/// Deletes the pages in `ids` (as returned by `subtree_ids`), children
/// before parents so the parent foreign key holds after every statement.
pub fn delete_subtree(conn: &Connection, ids: &[String]) -> Result<usize, PageError> {
    for id in ids.iter().rev() {
        repo::delete_page_row(conn, id)?;
    }
    Ok(ids.len())
}
