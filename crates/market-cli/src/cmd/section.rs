//! `mkt section`: manage the section tree.
//!
//! Reads are open to everyone; changes require the moderator role.

use anyhow::Result;
use clap::{Args, Subcommand};
use market_core::counters::section_counts;
use market_core::error::MarketError;
use market_core::model::actor::Role;
use market_core::model::item::ItemKind;
use market_core::model::section::{Section, SectionCounts};
use market_core::sections::{self, SectionTree};
use serde::Serialize;
use std::io::Write;

use crate::context::MarketContext;
use crate::output::{pretty_kv, pretty_section, render, render_mode};

#[derive(Args, Debug)]
pub struct SectionArgs {
    #[command(subcommand)]
    pub command: SectionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SectionCommand {
    /// Create a section.
    Add(SectionFields),
    /// List every section.
    List,
    /// Print the tree, including linked sections.
    Tree {
        /// Start below this section instead of the top level.
        #[arg(long)]
        root: Option<String>,
        /// Maximum depth to descend.
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Show one section with its path and listing counts.
    Show { id: String },
    /// Change a section. Omitted fields are kept.
    Edit(SectionFields),
    /// Delete an empty leaf section.
    Rm { id: String },
}

#[derive(Args, Debug, Clone)]
pub struct SectionFields {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    /// Parent section; `-` moves the section to the top level.
    #[arg(long)]
    pub parent: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub order: Option<i64>,

    /// Container only; listings go into its children.
    #[arg(long)]
    pub category: Option<bool>,

    #[arg(long)]
    pub allow_offers: Option<bool>,

    #[arg(long)]
    pub allow_wishes: Option<bool>,

    /// Section to show as an extra child (repeatable).
    #[arg(long = "link", value_name = "SECTION")]
    pub links: Vec<String>,
}

impl SectionFields {
    fn apply(&self, section: &mut Section) {
        if let Some(ref title) = self.title {
            section.title.clone_from(title);
        }
        if let Some(ref parent) = self.parent {
            section.parent = (parent != "-").then(|| parent.clone());
        }
        if let Some(ref description) = self.description {
            section.description.clone_from(description);
        }
        if let Some(order) = self.order {
            section.display_order = order;
        }
        if let Some(category) = self.category {
            section.is_category = category;
        }
        if let Some(allow) = self.allow_offers {
            section.allow_offers = allow;
        }
        if let Some(allow) = self.allow_wishes {
            section.allow_wishes = allow;
        }
        if !self.links.is_empty() {
            section.links.clone_from(&self.links);
        }
    }
}

#[derive(Debug, Serialize)]
struct TreeRow {
    id: String,
    title: String,
    level: usize,
    is_category: bool,
    is_linked: bool,
}

#[derive(Debug, Serialize)]
struct SectionDetail {
    #[serde(flatten)]
    section: Section,
    path: String,
    offers: SectionCounts,
    wishes: SectionCounts,
}

fn require_moderator(ctx: &MarketContext) -> Result<()> {
    ctx.require_user()?;
    if ctx.actor.role != Role::Moderator {
        return Err(MarketError::Forbidden("managing sections requires the moderator role".into()).into());
    }
    Ok(())
}

/// Counts as `viewer` may see them: hellbanned listings only for moderators.
fn visible_counts(counts: SectionCounts, see_hellbanned: bool) -> SectionCounts {
    if see_hellbanned {
        SectionCounts {
            active: counts.active_hb,
            archived: counts.archived_hb,
            ..counts
        }
    } else {
        counts
    }
}

/// Execute `mkt section`.
///
/// # Errors
///
/// Returns permission, validation and store errors from the section layer.
pub fn run_section(args: &SectionArgs, ctx: &MarketContext) -> Result<()> {
    match &args.command {
        SectionCommand::Add(fields) => {
            require_moderator(ctx)?;
            let mut section = Section {
                id: fields.id.clone(),
                parent: None,
                title: String::new(),
                description: String::new(),
                display_order: 0,
                is_category: false,
                allow_offers: true,
                allow_wishes: true,
                links: Vec::new(),
            };
            fields.apply(&mut section);
            sections::create_section(&ctx.conn, &section, ctx.now)?;
            ctx.invalidate_sections();
            render(ctx.output, &section, |s, w| {
                pretty_kv(w, "Created", &s.id)
            })
        }
        SectionCommand::Edit(fields) => {
            require_moderator(ctx)?;
            let Some(mut section) = sections::get_section(&ctx.conn, &fields.id)? else {
                return Err(MarketError::not_found("section", fields.id.clone()).into());
            };
            fields.apply(&mut section);
            sections::update_section(&ctx.conn, &section)?;
            ctx.invalidate_sections();
            tracing::info!(section_id = %section.id, "section updated");
            render(ctx.output, &section, |s, w| pretty_kv(w, "Updated", &s.id))
        }
        SectionCommand::Rm { id } => {
            require_moderator(ctx)?;
            sections::delete_section(&ctx.conn, id)?;
            ctx.invalidate_sections();
            tracing::info!(section_id = %id, "section deleted");
            render(ctx.output, &serde_json::json!({ "deleted": id }), |_, w| {
                pretty_kv(w, "Deleted", id)
            })
        }
        SectionCommand::List => {
            let all = sections::list_sections(&ctx.conn)?;
            render(ctx.output, &all, |all, w| {
                for s in all {
                    let parent = s.parent.as_deref().unwrap_or("-");
                    writeln!(w, "{}\t{}\t{}", s.id, parent, s.title)?;
                }
                Ok(())
            })
        }
        SectionCommand::Tree { root, depth } => {
            let tree = ctx.tree()?;
            if let Some(ref root) = *root {
                if tree.get(root).is_none() {
                    return Err(MarketError::not_found("section", root.clone()).into());
                }
            }
            let rows = tree_rows(&tree, root.as_deref(), *depth);
            render(ctx.output, &rows, |rows, w| {
                for row in rows {
                    let indent = "  ".repeat(row.level.saturating_sub(1));
                    let marker = if row.is_linked { " ->" } else { "" };
                    let category = if row.is_category { "/" } else { "" };
                    writeln!(w, "{indent}{}{category}{marker}  {}", row.id, row.title)?;
                }
                Ok(())
            })
        }
        SectionCommand::Show { id } => {
            let tree = ctx.tree()?;
            let Some(section) = tree.get(id).cloned() else {
                return Err(MarketError::not_found("section", id.clone()).into());
            };
            let see_hb = ctx.actor.permissions.see_hellbanned;
            let detail = SectionDetail {
                path: tree.path(id),
                offers: visible_counts(section_counts(&ctx.conn, id, ItemKind::Offer)?, see_hb),
                wishes: visible_counts(section_counts(&ctx.conn, id, ItemKind::Wish)?, see_hb),
                section,
            };
            render_mode(
                ctx.output,
                &detail,
                |d, w| {
                    writeln!(
                        w,
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        d.section.id,
                        d.path,
                        d.offers.active,
                        d.offers.archived,
                        d.wishes.active,
                        d.wishes.archived
                    )
                },
                |d, w| {
                    pretty_section(w, &format!("{} [{}]", d.section.title, d.section.id))?;
                    pretty_kv(w, "Path", &d.path)?;
                    if !d.section.description.is_empty() {
                        pretty_kv(w, "About", &d.section.description)?;
                    }
                    if d.section.is_category {
                        pretty_kv(w, "Type", "category")?;
                    }
                    pretty_kv(
                        w,
                        "Offers",
                        format!("{} open, {} archived", d.offers.active, d.offers.archived),
                    )?;
                    pretty_kv(
                        w,
                        "Wishes",
                        format!("{} open, {} archived", d.wishes.active, d.wishes.archived),
                    )?;
                    if !d.section.links.is_empty() {
                        pretty_kv(w, "Links", d.section.links.join(", "))?;
                    }
                    Ok(())
                },
            )
        }
    }
}

fn tree_rows(tree: &SectionTree, root: Option<&str>, depth: Option<usize>) -> Vec<TreeRow> {
    tree.children(root, depth)
        .into_iter()
        .map(|node| TreeRow {
            id: node.section.id.clone(),
            title: node.section.title.clone(),
            level: node.level,
            is_category: node.section.is_category,
            is_linked: node.is_linked,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare(id: &str) -> Section {
        Section {
            id: id.to_string(),
            parent: Some("old".to_string()),
            title: "Old".to_string(),
            description: String::new(),
            display_order: 3,
            is_category: false,
            allow_offers: true,
            allow_wishes: true,
            links: vec!["x".to_string()],
        }
    }

    fn fields(id: &str) -> SectionFields {
        SectionFields {
            id: id.to_string(),
            title: None,
            parent: None,
            description: None,
            order: None,
            category: None,
            allow_offers: None,
            allow_wishes: None,
            links: Vec::new(),
        }
    }

    #[test]
    fn omitted_fields_are_kept() {
        let mut section = bare("bikes");
        fields("bikes").apply(&mut section);
        assert_eq!(section, bare("bikes"));
    }

    #[test]
    fn dash_parent_moves_to_top_level() {
        let mut section = bare("bikes");
        let mut change = fields("bikes");
        change.parent = Some("-".to_string());
        change.allow_wishes = Some(false);
        change.apply(&mut section);
        assert_eq!(section.parent, None);
        assert!(!section.allow_wishes);
        assert_eq!(section.links, vec!["x".to_string()]);
    }

    #[test]
    fn moderators_see_hellbanned_counts() {
        let counts = SectionCounts {
            active: 1,
            archived: 2,
            active_hb: 3,
            archived_hb: 5,
        };
        assert_eq!(visible_counts(counts, false).active, 1);
        let modview = visible_counts(counts, true);
        assert_eq!((modview.active, modview.archived), (3, 5));
    }

    #[test]
    fn tree_rows_flag_links() {
        let mut vehicles = bare("vehicles");
        vehicles.parent = None;
        vehicles.links = vec!["books".to_string()];
        let mut bikes = bare("bikes");
        bikes.parent = Some("vehicles".to_string());
        bikes.links.clear();
        let mut books = bare("books");
        books.parent = None;
        books.links.clear();
        let tree = SectionTree::build(vec![vehicles, bikes, books]);

        let rows = tree_rows(&tree, Some("vehicles"), None);
        let ids: Vec<(&str, bool)> = rows.iter().map(|r| (r.id.as_str(), r.is_linked)).collect();
        assert!(ids.contains(&("bikes", false)));
        assert!(ids.contains(&("books", true)));
    }
}
