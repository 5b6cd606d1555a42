//! Core data structures for page trees.
//!
//! These structs are the shared language between the repository layer (SQL),
//! the service layer, the CLI layer (clap), and the output layer (serde_json).
//! They are plain data with no business logic beyond parsing helpers.

use serde::Serialize;
use std::collections::BTreeSet;

/// A permission-scoped container for a tree of pages, owned by a workspace.
#[derive(Debug, Clone, Serialize)]
pub struct Space {
    pub id: String,
    pub workspace_id: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Role a user holds in a space, directly or through a group.
///
/// Ordered by privilege so that the highest of several roles can be taken
/// with `max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceRole {
    Reader,
    Writer,
    Admin,
}

impl SpaceRole {
    /// Parse from the stored/CLI string. Returns None for unrecognized roles.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reader" => Some(Self::Reader),
            "writer" => Some(Self::Writer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Writer => "writer",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for SpaceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A membership row as stored, used for listing and seeding.
#[derive(Debug, Clone, Serialize)]
pub struct SpaceMember {
    pub space_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub role: SpaceRole,
}

/// A node in a space's page tree.
///
/// `tags` and `contributor_ids` are sets: the repository never stores
/// duplicates and they serialize as sorted arrays (empty, never null).
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub id: String,
    pub space_id: String,
    pub parent_page_id: Option<String>,
    pub workspace_id: String,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub cover_photo: Option<String>,
    /// Sibling order key; siblings are listed by ascending position.
    pub position: i64,
    pub content: String,
    pub tags: BTreeSet<String>,
    pub creator_id: String,
    pub last_updated_by_id: String,
    pub contributor_ids: BTreeSet<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Never written; see `PageService::restore`.
    pub deleted_at: Option<String>,
}

/// Compact page entry for sidebar trees.
#[derive(Debug, Clone, Serialize)]
pub struct SidebarPage {
    pub id: String,
    pub space_id: String,
    pub parent_page_id: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub position: i64,
    pub has_children: bool,
}

/// One step of a root-to-page path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub id: String,
    pub title: Option<String>,
    pub icon: Option<String>,
}

/// An immutable snapshot of a page's title, icon and content.
#[derive(Debug, Clone, Serialize)]
pub struct PageHistory {
    pub id: String,
    pub page_id: String,
    /// Space the page lived in when the snapshot was taken.
    pub space_id: String,
    pub version: i64,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub content: String,
    pub author_id: String,
    pub created_at: String,
}

/// History listing entry without the content body.
#[derive(Debug, Clone, Serialize)]
pub struct HistorySummary {
    pub id: String,
    pub page_id: String,
    pub version: i64,
    pub title: Option<String>,
    pub author_id: String,
    pub created_at: String,
}

/// Identity of the caller, passed explicitly into every service call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: String,
    pub workspace_id: String,
}

/// Fields for a new page.
#[derive(Debug, Clone, Default)]
pub struct NewPage {
    pub space_id: String,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub cover_photo: Option<String>,
    pub parent_page_id: Option<String>,
    pub tags: Vec<String>,
    pub content: String,
}

/// Field-level page update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct PageUpdate {
    pub title: Option<String>,
    pub icon: Option<String>,
    pub cover_photo: Option<String>,
    /// Replaces the whole tag set.
    pub tags: Option<Vec<String>>,
    pub content: Option<String>,
    /// Reparent under this page, which must be in the same space.
    pub parent_page_id: Option<String>,
}

/// Criteria for `filter_pages`.
#[derive(Debug, Clone, Default)]
pub struct PageFilter {
    /// Pages must carry every one of these tags (superset match).
    pub tags: Vec<String>,
    pub creator_id: Option<String>,
}

/// Scope for recent-page listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecentScope {
    /// Every space the caller can read.
    Member,
    /// A single space.
    Space(String),
}

/// Page-number pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> Paginated<T> {
    /// Builds a result page from rows fetched with `LIMIT limit + 1`.
    pub fn from_overfetch(mut rows: Vec<T>, pagination: Pagination) -> Self {
        let limit = pagination.limit as usize;
        let has_next_page = rows.len() > limit;
        rows.truncate(limit);
        Self {
            items: rows,
            meta: PaginationMeta {
                page: pagination.page,
                limit: pagination.limit,
                has_next_page,
                has_prev_page: pagination.page > 1,
            },
        }
    }
}

/// Trim, drop empties and deduplicate a list of tags.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
