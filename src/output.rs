//! Output formatting for the pagetree CLI.
//!
//! Two output modes:
//! - **JSON**: Compact machine-readable output (default)
//! - **Pretty**: Human-readable formatted output (enabled via `--pretty`)
//!
//! JSON output serializes the models directly so scripts get stable field
//! names. Pretty output favors labeled fields and one-line list entries.

use crate::models::{
    Breadcrumb, HistorySummary, Page, PageHistory, Paginated, PaginationMeta, SidebarPage, Space,
    SpaceMember,
};
use serde::Serialize;

/// Output mode for CLI results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Compact JSON output (default).
    Json,
    /// Human-readable formatted output.
    Pretty,
}

/// Serialize a value to compact JSON and print it to stdout.
///
/// A serialization failure is reported on stderr in the same
/// `{"error": ...}` shape the CLI uses for every other failure.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize output");
            eprintln!("{}", serde_json::json!({ "error": e.to_string(), "kind": "internal" }));
        }
    }
}

/// Cut `text` to at most `max` bytes on a char boundary, adding `...` when
/// anything was dropped.
pub fn preview(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn or_none(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("(none)")
}

fn print_meta(meta: &PaginationMeta) {
    let mut line = format!("-- page {} (limit {})", meta.page, meta.limit);
    if meta.has_prev_page {
        line.push_str(", has previous");
    }
    if meta.has_next_page {
        line.push_str(", has next");
    }
    println!("{}", line);
}

/// Print a space in human-readable format.
///
/// Format:
/// ```text
/// Space: eng
/// Name:  Engineering
/// ID:    <uuid>
/// Desc:  Team docs
/// ```
pub fn print_pretty_space(space: &Space) {
    println!("Space: {}", space.slug);
    println!("Name:  {}", space.name);
    println!("ID:    {}", space.id);
    println!("Desc:  {}", space.description);
    println!("Created: {}", space.created_at);
    println!("Updated: {}", space.updated_at);
}

pub fn print_pretty_spaces(spaces: &[Space]) {
    if spaces.is_empty() {
        println!("(no spaces)");
        return;
    }
    for space in spaces {
        println!("{} | {} | {}", space.id, space.slug, space.name);
    }
}

/// One line per membership: `user:<id> admin` or `group:<id> reader`.
pub fn print_pretty_members(members: &[SpaceMember]) {
    if members.is_empty() {
        println!("(no members)");
        return;
    }
    for member in members {
        match (&member.user_id, &member.group_id) {
            (Some(user), _) => println!("user:{} {}", user, member.role),
            (None, Some(group)) => println!("group:{} {}", group, member.role),
            (None, None) => println!("(unknown) {}", member.role),
        }
    }
}

/// Print a page in human-readable format.
///
/// Format:
/// ```text
/// Title:    Onboarding
/// ID:       <uuid>
/// Space:    <space_id>
/// Parent:   (none)
/// Tags:     guide, hr
/// Creator:  alice
/// Updated:  2024-01-15T11:00:00.000000Z by bob
///
/// <content>
/// ```
pub fn print_pretty_page(page: &Page) {
    println!("Title:    {}", or_none(&page.title));
    println!("ID:       {}", page.id);
    println!("Space:    {}", page.space_id);
    println!("Parent:   {}", or_none(&page.parent_page_id));
    if let Some(ref icon) = page.icon {
        println!("Icon:     {}", icon);
    }
    if let Some(ref cover) = page.cover_photo {
        println!("Cover:    {}", cover);
    }

    if page.tags.is_empty() {
        println!("Tags:     (none)");
    } else {
        println!("Tags:     {}", page.tags.iter().cloned().collect::<Vec<_>>().join(", "));
    }

    println!("Creator:  {}", page.creator_id);
    println!(
        "Contrib:  {}",
        page.contributor_ids.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    println!("Created:  {}", page.created_at);
    println!("Updated:  {} by {}", page.updated_at, page.last_updated_by_id);
    println!();
    println!("{}", page.content);
}

/// One line per page: `<id> | <title> | <preview>`.
pub fn print_pretty_pages(pages: &[Page]) {
    if pages.is_empty() {
        println!("(no pages)");
        return;
    }
    for page in pages {
        println!(
            "{} | {} | {}",
            page.id,
            or_none(&page.title),
            preview(&page.content.replace('\n', " "), 80)
        );
    }
}

pub fn print_pretty_page_list(pages: &Paginated<Page>) {
    print_pretty_pages(&pages.items);
    print_meta(&pages.meta);
}

/// Sidebar entries, with `+` marking pages that have children.
pub fn print_pretty_sidebar(entries: &Paginated<SidebarPage>) {
    if entries.items.is_empty() {
        println!("(no pages)");
    }
    for entry in &entries.items {
        let marker = if entry.has_children { "+" } else { " " };
        let icon = entry.icon.as_deref().map(|i| format!("{} ", i)).unwrap_or_default();
        println!("{} {}{}  [{}]", marker, icon, or_none(&entry.title), entry.id);
    }
    print_meta(&entries.meta);
}

/// Root-first path joined with ` / `.
pub fn print_pretty_breadcrumbs(crumbs: &[Breadcrumb]) {
    let path: Vec<String> = crumbs
        .iter()
        .map(|c| match c.icon {
            Some(ref icon) => format!("{} {}", icon, or_none(&c.title)),
            None => or_none(&c.title).to_string(),
        })
        .collect();
    println!("{}", path.join(" / "));
}

/// Format: `v<version> | <id> | <author> | <created_at> | <title>`
pub fn print_pretty_history(history: &Paginated<HistorySummary>) {
    if history.items.is_empty() {
        println!("(no history)");
    }
    for entry in &history.items {
        println!(
            "v{} | {} | {} | {} | {}",
            entry.version,
            entry.id,
            entry.author_id,
            entry.created_at,
            or_none(&entry.title)
        );
    }
    print_meta(&history.meta);
}

pub fn print_pretty_history_entry(entry: &PageHistory) {
    println!("Page:     {}", entry.page_id);
    println!("Version:  {}", entry.version);
    println!("Title:    {}", or_none(&entry.title));
    if let Some(ref icon) = entry.icon {
        println!("Icon:     {}", icon);
    }
    println!("Author:   {}", entry.author_id);
    println!("Created:  {}", entry.created_at);
    println!();
    println!("{}", entry.content);
}

/// Generic output dispatcher that handles both JSON and Pretty modes.
///
/// ```ignore
/// print(mode, &space, || print_pretty_space(&space));
/// ```
pub fn print<T: Serialize>(mode: OutputMode, value: &T, pretty_fn: impl FnOnce()) {
    match mode {
        OutputMode::Json => print_json(value),
        OutputMode::Pretty => pretty_fn(),
    }
}
