//! Root-to-page paths from a loaded ancestor chain.

use crate::db::PageError;
use crate::models::{Breadcrumb, Page};

/// Turns a chain loaded by `tree::ancestor_chain` (target first, root last)
/// into breadcrumbs ordered root first, ending with the target.
///
/// The chain must link up: each page's parent is the next page, every page
/// shares the target's space, and the last page is a root.
pub fn resolve(chain: &[Page]) -> Result<Vec<Breadcrumb>, PageError> {
    let target = chain
        .first()
        .ok_or_else(|| PageError::DataIntegrity("Empty ancestor chain".to_string()))?;

    for pair in chain.windows(2) {
        let (child, parent) = (&pair[0], &pair[1]);
        if child.parent_page_id.as_deref() != Some(parent.id.as_str()) {
            return Err(PageError::DataIntegrity(format!(
                "Page '{}' is not the parent of '{}'",
                parent.id, child.id
            )));
        }
        if parent.space_id != target.space_id {
            return Err(PageError::DataIntegrity(format!(
                "Ancestor '{}' lives in space '{}', not '{}'",
                parent.id, parent.space_id, target.space_id
            )));
        }
    }

    if let Some(last) = chain.last() {
        if let Some(ref dangling) = last.parent_page_id {
            return Err(PageError::DataIntegrity(format!(
                "Ancestor chain of '{}' stops before reaching a root (next parent '{}')",
                target.id, dangling
            )));
        }
    }

    Ok(chain
        .iter()
        .rev()
        .map(|page| Breadcrumb {
            id: page.id.clone(),
            title: page.title.clone(),
            icon: page.icon.clone(),
        })
        .collect())
}
