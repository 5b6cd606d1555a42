//! pagetree: permission-scoped page trees from the command line.
//!
//! This binary provides the `pagetree` command with subcommands for managing
//! spaces, their members, pages and page history. All output is JSON by
//! default with an optional `--pretty` flag for human readability. Errors go
//! to stderr as `{"error": ..., "kind": ...}` with a kind-specific exit code.

mod ability;
mod breadcrumbs;
mod clock;
mod db;
mod history;
mod models;
mod output;
mod repo;
mod service;
mod tree;

use ability::{Action, AbilityProvider, MembershipAbilities, Subject};
use clap::{Parser, Subcommand};
use db::PageError;
use models::{NewPage, PageFilter, PageUpdate, Pagination, RecentScope, RequestContext, SpaceRole};
use output::OutputMode;
use rusqlite::Connection;
use service::PageService;
use std::io::{self, Read as _};
use std::path::PathBuf;
use std::process;

/// Input validation, run before anything touches the database.
mod validation {
    use crate::db::PageError;
    use crate::models::Pagination;

    pub const MAX_SLUG_LEN: usize = 128;
    pub const MAX_TITLE_LEN: usize = 500;
    pub const MAX_BODY_LEN: usize = 10_000_000; // 10 MB
    pub const MAX_ICON_LEN: usize = 64;
    pub const MAX_COVER_LEN: usize = 2048;
    pub const MAX_TAG_LEN: usize = 100;
    pub const MAX_TAGS_COUNT: usize = 50;
    pub const MAX_NAME_LEN: usize = 256;
    pub const MAX_DESCRIPTION_LEN: usize = 2000;
    pub const MAX_ID_LEN: usize = 128;

    pub fn validate_slug(slug: &str) -> Result<(), PageError> {
        if slug.is_empty() {
            return Err(PageError::InvalidInput("Slug must not be empty".to_string()));
        }
        if slug.len() > MAX_SLUG_LEN {
            return Err(PageError::InvalidInput(format!("Slug too long (max {} characters)", MAX_SLUG_LEN)));
        }
        if !slug.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(PageError::InvalidInput("Slug must start with a lowercase letter".to_string()));
        }
        if !slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
            return Err(PageError::InvalidInput(
                "Slug must contain only lowercase letters, digits, hyphens, and underscores".to_string(),
            ));
        }
        Ok(())
    }

    /// User, group, page and history ids all share these rules.
    pub fn validate_id(kind: &str, id: &str) -> Result<(), PageError> {
        if id.trim().is_empty() {
            return Err(PageError::InvalidInput(format!("{} must not be empty", kind)));
        }
        if id.len() > MAX_ID_LEN {
            return Err(PageError::InvalidInput(format!("{} too long (max {} characters)", kind, MAX_ID_LEN)));
        }
        Ok(())
    }

    pub fn validate_title(title: &str) -> Result<(), PageError> {
        if title.is_empty() {
            return Err(PageError::InvalidInput("Title must not be empty".to_string()));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(PageError::InvalidInput(format!("Title too long (max {} characters)", MAX_TITLE_LEN)));
        }
        Ok(())
    }

    pub fn validate_icon(icon: &str) -> Result<(), PageError> {
        if icon.len() > MAX_ICON_LEN {
            return Err(PageError::InvalidInput(format!("Icon too long (max {} bytes)", MAX_ICON_LEN)));
        }
        Ok(())
    }

    pub fn validate_cover_photo(cover: &str) -> Result<(), PageError> {
        if cover.len() > MAX_COVER_LEN {
            return Err(PageError::InvalidInput(format!("Cover photo too long (max {} characters)", MAX_COVER_LEN)));
        }
        Ok(())
    }

    pub fn validate_body(body: &str) -> Result<(), PageError> {
        if body.len() > MAX_BODY_LEN {
            return Err(PageError::InvalidInput(format!("Body too long (max {} bytes)", MAX_BODY_LEN)));
        }
        Ok(())
    }

    pub fn validate_tags(tags: &[String]) -> Result<(), PageError> {
        if tags.len() > MAX_TAGS_COUNT {
            return Err(PageError::InvalidInput(format!("Too many tags (max {})", MAX_TAGS_COUNT)));
        }
        for tag in tags {
            if tag.len() > MAX_TAG_LEN {
                return Err(PageError::InvalidInput(format!(
                    "Tag '{}' too long (max {} characters)",
                    tag, MAX_TAG_LEN
                )));
            }
        }
        Ok(())
    }

    pub fn validate_name(name: &str) -> Result<(), PageError> {
        if name.len() > MAX_NAME_LEN {
            return Err(PageError::InvalidInput(format!("Name too long (max {} characters)", MAX_NAME_LEN)));
        }
        Ok(())
    }

    pub fn validate_description(desc: &str) -> Result<(), PageError> {
        if desc.len() > MAX_DESCRIPTION_LEN {
            return Err(PageError::InvalidInput(format!(
                "Description too long (max {} characters)",
                MAX_DESCRIPTION_LEN
            )));
        }
        Ok(())
    }

    pub fn validate_pagination(page: u32, limit: u32) -> Result<Pagination, PageError> {
        if page == 0 {
            return Err(PageError::InvalidInput("Page number starts at 1".to_string()));
        }
        if limit == 0 || limit > Pagination::MAX_LIMIT {
            return Err(PageError::InvalidInput(format!(
                "Limit must be between 1 and {}",
                Pagination::MAX_LIMIT
            )));
        }
        Ok(Pagination::new(page, limit))
    }
}

/// Permission-scoped page trees.
///
/// Spaces hold trees of pages; what a user may do in a space follows from
/// the role they hold there. All output is JSON by default; use --pretty
/// for human-readable format.
#[derive(Parser)]
#[command(name = "pagetree", version, about)]
struct Cli {
    /// Output in human-readable format instead of JSON.
    #[arg(long, global = true)]
    pretty: bool,

    /// Act as this user (default: $PAGETREE_USER or $USER).
    #[arg(long, global = true)]
    user: Option<String>,

    /// Workspace to operate in (default: $PAGETREE_WORKSPACE or "default").
    #[arg(long, global = true)]
    workspace: Option<String>,

    /// Database file (default: $PAGETREE_DB or ~/.pagetree/pagetree.db).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage spaces and their members.
    Space {
        #[command(subcommand)]
        action: SpaceAction,
    },
    /// Manage groups used in space memberships.
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// Manage pages.
    Page {
        #[command(subcommand)]
        action: PageAction,
    },
    /// Browse page history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

/// Pagination flags shared by listing commands.
#[derive(clap::Args)]
struct PageArgs {
    /// Result page, starting at 1.
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Results per page (1-100).
    #[arg(long, default_value_t = Pagination::DEFAULT_LIMIT)]
    limit: u32,
}

impl PageArgs {
    fn pagination(&self) -> Result<Pagination, PageError> {
        validation::validate_pagination(self.page, self.limit)
    }
}

#[derive(Subcommand)]
enum SpaceAction {
    /// Create a new space. The creator becomes its admin.
    Create {
        /// URL-friendly slug identifier (e.g., "eng-docs").
        slug: String,
        /// Display name for the space.
        #[arg(long)]
        name: Option<String>,
        /// Description of the space.
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List the spaces you can see in the workspace.
    List,
    /// Get a space by slug.
    Get {
        /// The space slug.
        slug: String,
    },
    /// Delete a space (must have no pages).
    Delete {
        /// The space slug.
        slug: String,
    },
    /// List the members of a space.
    Members {
        /// The space slug.
        slug: String,
    },
    /// Give a user (or, with --group, a group) a role in a space.
    Grant {
        /// The space slug.
        slug: String,
        /// User id, or group id with --group.
        principal: String,
        /// Role to grant (reader, writer, admin).
        #[arg(long)]
        role: String,
        /// Treat the principal as a group id.
        #[arg(long)]
        group: bool,
    },
    /// Remove a user's direct role in a space.
    Revoke {
        /// The space slug.
        slug: String,
        /// User id.
        user: String,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// Add a user to a group.
    AddUser {
        /// Group id.
        group: String,
        /// User id.
        user: String,
    },
}

#[derive(Subcommand)]
enum PageAction {
    /// Create a new page.
    Create {
        /// Space slug this page belongs to.
        #[arg(long)]
        space: String,
        /// Page title.
        #[arg(long)]
        title: Option<String>,
        /// Icon (usually an emoji).
        #[arg(long)]
        icon: Option<String>,
        /// Cover photo URL.
        #[arg(long)]
        cover: Option<String>,
        /// Parent page ID for hierarchical nesting.
        #[arg(long)]
        parent: Option<String>,
        /// Comma-separated tags.
        #[arg(long)]
        tags: Option<String>,
        /// Page content (markdown).
        #[arg(long)]
        body: Option<String>,
        /// Read body from stdin.
        #[arg(long)]
        stdin: bool,
    },
    /// Get a page by ID.
    Get {
        /// The page ID.
        id: String,
    },
    /// Update fields of a page. Omitted fields are left unchanged.
    Update {
        /// The page ID.
        id: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New icon.
        #[arg(long)]
        icon: Option<String>,
        /// New cover photo URL.
        #[arg(long)]
        cover: Option<String>,
        /// Comma-separated tags. Replaces all existing tags.
        #[arg(long)]
        tags: Option<String>,
        /// New content.
        #[arg(long)]
        body: Option<String>,
        /// Read new content from stdin.
        #[arg(long)]
        stdin: bool,
        /// New parent page ID (same space).
        #[arg(long)]
        parent: Option<String>,
    },
    /// Find pages carrying all of the given tags.
    Filter {
        /// Comma-separated tags; a page must carry every one.
        #[arg(long)]
        tags: Option<String>,
        /// Only pages created by this user.
        #[arg(long)]
        creator: Option<String>,
    },
    /// Move a page under another page in the same space.
    Move {
        /// The page ID.
        id: String,
        /// New parent page ID. Omit to make the page a root.
        #[arg(long)]
        parent: Option<String>,
    },
    /// Move a page and its subtree to another space.
    MoveToSpace {
        /// The page ID.
        id: String,
        /// Target space slug.
        space: String,
    },
    /// Copy a page and its subtree into another space.
    CopyToSpace {
        /// The page ID.
        id: String,
        /// Target space slug.
        space: String,
    },
    /// Permanently delete a page and its subtree.
    Delete {
        /// The page ID.
        id: String,
    },
    /// Restore a deleted page (not supported).
    Restore {
        /// The page ID.
        id: String,
    },
    /// Show the root-to-page path.
    Breadcrumbs {
        /// The page ID.
        id: String,
    },
    /// List the children of a page, or the roots of a space.
    Sidebar {
        /// Space slug.
        #[arg(long)]
        space: String,
        /// Parent page ID. Omit for the space's roots.
        #[arg(long)]
        parent: Option<String>,
        #[command(flatten)]
        paging: PageArgs,
    },
    /// Recently updated pages in one space, or in every space you can read.
    Recent {
        /// Space slug. Omit for all readable spaces.
        #[arg(long)]
        space: Option<String>,
        #[command(flatten)]
        paging: PageArgs,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List the versions of a page, newest first.
    List {
        /// The page ID.
        page_id: String,
        #[command(flatten)]
        paging: PageArgs,
    },
    /// Get one history entry.
    Get {
        /// The history entry ID.
        id: String,
    },
}

/// Resolve the request context from CLI flags, env vars, and defaults.
fn resolve_context(cli: &Cli) -> RequestContext {
    let user_id = cli
        .user
        .clone()
        .or_else(|| std::env::var("PAGETREE_USER").ok())
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string());

    let workspace_id = cli
        .workspace
        .clone()
        .or_else(|| std::env::var("PAGETREE_WORKSPACE").ok())
        .unwrap_or_else(|| "default".to_string());

    RequestContext { user_id, workspace_id }
}

fn resolve_db_path(cli: &Cli) -> Result<PathBuf, PageError> {
    match cli.db {
        Some(ref path) => {
            db::ensure_parent_dir(path)?;
            Ok(path.clone())
        }
        None => db::db_path(),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("PAGETREE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Read body content from --body flag or --stdin.
fn read_body(body: &Option<String>, stdin: bool) -> Result<Option<String>, PageError> {
    if stdin {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(Some(buf))
    } else {
        Ok(body.clone())
    }
}

/// Split a comma-separated tag list and validate it.
fn parse_tags(tags: &str) -> Result<Vec<String>, PageError> {
    let tags: Vec<String> = tags
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    validation::validate_tags(&tags)?;
    Ok(tags)
}

fn parse_role(s: &str) -> Result<SpaceRole, PageError> {
    SpaceRole::from_str(s).ok_or_else(|| {
        PageError::InvalidInput(format!("Unknown role '{}'. Valid roles: reader, writer, admin", s))
    })
}

/// Resolve a space slug within the caller's workspace to its ID.
fn resolve_space_id(conn: &Connection, ctx: &RequestContext, slug: &str) -> Result<String, PageError> {
    validation::validate_slug(slug)?;
    Ok(repo::get_space_by_slug(conn, &ctx.workspace_id, slug)?.id)
}

fn run() -> Result<(), PageError> {
    let cli = Cli::parse();
    init_tracing();

    let mode = if cli.pretty {
        OutputMode::Pretty
    } else {
        OutputMode::Json
    };
    let ctx = resolve_context(&cli);
    validation::validate_id("User", &ctx.user_id)?;
    validation::validate_id("Workspace", &ctx.workspace_id)?;

    // Open database and run migrations. Abilities read through two
    // connections of their own so evaluations never see an open write
    // transaction and a cross-space pair can run side by side.
    let path = resolve_db_path(&cli)?;
    let mut conn = db::open_connection_at(&path)?;
    db::run_migrations(&mut conn)?;
    let abilities = MembershipAbilities::new(db::open_connection_at(&path)?)
        .with_connection(db::open_connection_at(&path)?);
    let clock = clock::MonotonicClock::new();

    match &cli.command {
        // =====================================================================
        // Space commands
        // =====================================================================
        Commands::Space { action } => match action {
            SpaceAction::Create {
                slug,
                name,
                description,
            } => {
                validation::validate_slug(slug)?;
                if let Some(ref n) = name {
                    validation::validate_name(n)?;
                }
                validation::validate_description(description)?;
                let display_name = name.as_deref().unwrap_or(slug);
                let now = clock.now_rfc3339();

                let tx = conn.unchecked_transaction()?;
                let space = repo::create_space(&tx, &ctx.workspace_id, slug, display_name, description, &now)?;
                repo::grant_role(&tx, &space.id, &ctx.user_id, SpaceRole::Admin, &now)?;
                tx.commit()?;

                tracing::info!(space = %space.id, slug = %slug, user = %ctx.user_id, "created space");
                output::print(mode, &space, || output::print_pretty_space(&space));
            }
            SpaceAction::List => {
                let mut spaces = Vec::new();
                for space in repo::list_spaces(&conn, &ctx.workspace_id)? {
                    if abilities.evaluate(&ctx, &space.id)?.can(Action::Read, Subject::Settings) {
                        spaces.push(space);
                    }
                }
                output::print(mode, &spaces, || output::print_pretty_spaces(&spaces));
            }
            SpaceAction::Get { slug } => {
                let space_id = resolve_space_id(&conn, &ctx, slug)?;
                ability::authorize(&abilities, &ctx, &space_id, Action::Read, Subject::Settings)?;
                let space = repo::get_space(&conn, &space_id)?;
                output::print(mode, &space, || output::print_pretty_space(&space));
            }
            SpaceAction::Delete { slug } => {
                let space_id = resolve_space_id(&conn, &ctx, slug)?;
                ability::authorize(&abilities, &ctx, &space_id, Action::Manage, Subject::Settings)?;
                repo::delete_space(&conn, &space_id)?;
                tracing::info!(space = %space_id, user = %ctx.user_id, "deleted space");
                let msg = serde_json::json!({"deleted": slug});
                output::print(mode, &msg, || println!("Deleted space '{}'", slug));
            }
            SpaceAction::Members { slug } => {
                let space_id = resolve_space_id(&conn, &ctx, slug)?;
                ability::authorize(&abilities, &ctx, &space_id, Action::Read, Subject::Member)?;
                let members = repo::list_members(&conn, &space_id)?;
                output::print(mode, &members, || output::print_pretty_members(&members));
            }
            SpaceAction::Grant {
                slug,
                principal,
                role,
                group,
            } => {
                validation::validate_id(if *group { "Group" } else { "User" }, principal)?;
                let role = parse_role(role)?;
                let space_id = resolve_space_id(&conn, &ctx, slug)?;
                ability::authorize(&abilities, &ctx, &space_id, Action::Manage, Subject::Member)?;

                let now = clock.now_rfc3339();
                if *group {
                    repo::grant_group_role(&conn, &space_id, principal, role, &now)?;
                } else {
                    repo::grant_role(&conn, &space_id, principal, role, &now)?;
                }
                tracing::info!(space = %space_id, principal = %principal, %role, group = *group, "granted role");

                let principal_type = if *group { "group" } else { "user" };
                let msg = serde_json::json!({
                    "space": slug,
                    "principal": principal,
                    "principal_type": principal_type,
                    "role": role,
                });
                output::print(mode, &msg, || {
                    println!("Granted {} to {} '{}' in '{}'", role, principal_type, principal, slug)
                });
            }
            SpaceAction::Revoke { slug, user } => {
                validation::validate_id("User", user)?;
                let space_id = resolve_space_id(&conn, &ctx, slug)?;
                ability::authorize(&abilities, &ctx, &space_id, Action::Manage, Subject::Member)?;
                repo::revoke_role(&conn, &space_id, user)?;
                tracing::info!(space = %space_id, user = %user, "revoked role");
                let msg = serde_json::json!({"space": slug, "revoked": user});
                output::print(mode, &msg, || println!("Revoked '{}' from '{}'", user, slug));
            }
        },

        // =====================================================================
        // Group commands
        // =====================================================================
        Commands::Group { action } => match action {
            GroupAction::AddUser { group, user } => {
                validation::validate_id("Group", group)?;
                validation::validate_id("User", user)?;
                repo::add_group_user(&conn, group, user)?;
                let msg = serde_json::json!({"group": group, "user": user});
                output::print(mode, &msg, || println!("Added '{}' to group '{}'", user, group));
            }
        },

        // =====================================================================
        // Page commands
        // =====================================================================
        Commands::Page { action } => {
            let pages = PageService::new(&conn, &abilities);
            match action {
                PageAction::Create {
                    space,
                    title,
                    icon,
                    cover,
                    parent,
                    tags,
                    body,
                    stdin,
                } => {
                    if let Some(ref t) = title {
                        validation::validate_title(t)?;
                    }
                    if let Some(ref i) = icon {
                        validation::validate_icon(i)?;
                    }
                    if let Some(ref c) = cover {
                        validation::validate_cover_photo(c)?;
                    }
                    if let Some(ref p) = parent {
                        validation::validate_id("Parent page ID", p)?;
                    }
                    let tags = match tags {
                        Some(t) => parse_tags(t)?,
                        None => Vec::new(),
                    };
                    let content = read_body(body, *stdin)?.unwrap_or_default();
                    validation::validate_body(&content)?;
                    let space_id = resolve_space_id(&conn, &ctx, space)?;

                    let page = pages.create(
                        &ctx,
                        NewPage {
                            space_id,
                            title: title.clone(),
                            icon: icon.clone(),
                            cover_photo: cover.clone(),
                            parent_page_id: parent.clone(),
                            tags,
                            content,
                        },
                    )?;
                    output::print(mode, &page, || output::print_pretty_page(&page));
                }
                PageAction::Get { id } => {
                    validation::validate_id("Page ID", id)?;
                    let page = pages.get(&ctx, id)?;
                    output::print(mode, &page, || output::print_pretty_page(&page));
                }
                PageAction::Update {
                    id,
                    title,
                    icon,
                    cover,
                    tags,
                    body,
                    stdin,
                    parent,
                } => {
                    validation::validate_id("Page ID", id)?;
                    if let Some(ref t) = title {
                        validation::validate_title(t)?;
                    }
                    if let Some(ref i) = icon {
                        validation::validate_icon(i)?;
                    }
                    if let Some(ref c) = cover {
                        validation::validate_cover_photo(c)?;
                    }
                    if let Some(ref p) = parent {
                        validation::validate_id("Parent page ID", p)?;
                    }
                    let tags = match tags {
                        Some(t) => Some(parse_tags(t)?),
                        None => None,
                    };
                    let content = read_body(body, *stdin)?;
                    if let Some(ref c) = content {
                        validation::validate_body(c)?;
                    }

                    let page = pages.update(
                        &ctx,
                        id,
                        PageUpdate {
                            title: title.clone(),
                            icon: icon.clone(),
                            cover_photo: cover.clone(),
                            tags,
                            content,
                            parent_page_id: parent.clone(),
                        },
                    )?;
                    output::print(mode, &page, || output::print_pretty_page(&page));
                }
                PageAction::Filter { tags, creator } => {
                    let tags = match tags {
                        Some(t) => parse_tags(t)?,
                        None => Vec::new(),
                    };
                    if let Some(ref c) = creator {
                        validation::validate_id("Creator", c)?;
                    }
                    let found = pages.filter_pages(
                        &ctx,
                        &PageFilter {
                            tags,
                            creator_id: creator.clone(),
                        },
                    )?;
                    output::print(mode, &found, || output::print_pretty_pages(&found));
                }
                PageAction::Move { id, parent } => {
                    validation::validate_id("Page ID", id)?;
                    if let Some(ref p) = parent {
                        validation::validate_id("Parent page ID", p)?;
                    }
                    let page = pages.move_page(&ctx, id, parent.as_deref())?;
                    output::print(mode, &page, || output::print_pretty_page(&page));
                }
                PageAction::MoveToSpace { id, space } => {
                    validation::validate_id("Page ID", id)?;
                    let space_id = resolve_space_id(&conn, &ctx, space)?;
                    let page = pages.move_to_space(&ctx, id, &space_id)?;
                    output::print(mode, &page, || output::print_pretty_page(&page));
                }
                PageAction::CopyToSpace { id, space } => {
                    validation::validate_id("Page ID", id)?;
                    let space_id = resolve_space_id(&conn, &ctx, space)?;
                    let page = pages.copy_to_space(&ctx, id, &space_id)?;
                    output::print(mode, &page, || output::print_pretty_page(&page));
                }
                PageAction::Delete { id } => {
                    validation::validate_id("Page ID", id)?;
                    let count = pages.force_delete(&ctx, id)?;
                    let msg = serde_json::json!({"deleted": id, "count": count});
                    output::print(mode, &msg, || println!("Deleted page '{}' ({} pages removed)", id, count));
                }
                PageAction::Restore { id } => {
                    validation::validate_id("Page ID", id)?;
                    let page = pages.restore(&ctx, id)?;
                    output::print(mode, &page, || output::print_pretty_page(&page));
                }
                PageAction::Breadcrumbs { id } => {
                    validation::validate_id("Page ID", id)?;
                    let crumbs = pages.breadcrumbs(&ctx, id)?;
                    output::print(mode, &crumbs, || output::print_pretty_breadcrumbs(&crumbs));
                }
                PageAction::Sidebar { space, parent, paging } => {
                    let pagination = paging.pagination()?;
                    if let Some(ref p) = parent {
                        validation::validate_id("Parent page ID", p)?;
                    }
                    let space_id = resolve_space_id(&conn, &ctx, space)?;
                    let entries = pages.sidebar_pages(&ctx, &space_id, parent.as_deref(), pagination)?;
                    output::print(mode, &entries, || output::print_pretty_sidebar(&entries));
                }
                PageAction::Recent { space, paging } => {
                    let pagination = paging.pagination()?;
                    let scope = match space {
                        Some(slug) => RecentScope::Space(resolve_space_id(&conn, &ctx, slug)?),
                        None => RecentScope::Member,
                    };
                    let recent = pages.recent_pages(&ctx, &scope, pagination)?;
                    output::print(mode, &recent, || output::print_pretty_page_list(&recent));
                }
            }
        }

        // =====================================================================
        // History commands
        // =====================================================================
        Commands::History { action } => {
            let pages = PageService::new(&conn, &abilities);
            match action {
                HistoryAction::List { page_id, paging } => {
                    validation::validate_id("Page ID", page_id)?;
                    let pagination = paging.pagination()?;
                    let history = pages.history(&ctx, page_id, pagination)?;
                    output::print(mode, &history, || output::print_pretty_history(&history));
                }
                HistoryAction::Get { id } => {
                    validation::validate_id("History ID", id)?;
                    let entry = pages.history_detail(&ctx, id)?;
                    output::print(mode, &entry, || output::print_pretty_history_entry(&entry));
                }
            }
        }
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        let error_json = serde_json::json!({
            "error": e.to_string(),
            "kind": e.kind(),
        });
        eprintln!("{}", error_json);
        process::exit(e.exit_code());
    }
}
