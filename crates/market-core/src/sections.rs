//! Section tree: storage, in-memory adjacency and a TTL cache.
//!
//! - **Tree edges** come from `parent_id`; they define ancestry, inherited
//!   `allow_offers`/`allow_wishes` and subtree ranges.
//! - **Links** are extra edges to sections elsewhere in the tree. They are
//!   rendered as children of the linking section, once and without
//!   recursion, so link cycles cannot loop.
//!
//! [`SectionTreeCache`] memoizes the built tree for a configurable TTL.
//! Mutating commands call [`SectionTreeCache::invalidate`].

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{MarketError, MarketResult};
use crate::model::item::ItemKind;
use crate::model::section::Section;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

const SECTION_COLUMNS: &str = "section_id, parent_id, title, description, display_order, \
     is_category, allow_offers, allow_wishes, links_json";

fn row_to_section(row: &rusqlite::Row<'_>) -> rusqlite::Result<Section> {
    let links_raw: String = row.get(8)?;
    let links: Vec<String> = serde_json::from_str(&links_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Section {
        id: row.get(0)?,
        parent: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        display_order: row.get(4)?,
        is_category: row.get::<_, i64>(5)? != 0,
        allow_offers: row.get::<_, i64>(6)? != 0,
        allow_wishes: row.get::<_, i64>(7)? != 0,
        links,
    })
}

/// All sections ordered by `display_order`, then id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_sections(conn: &Connection) -> Result<Vec<Section>> {
    let sql = format!("SELECT {SECTION_COLUMNS} FROM sections ORDER BY display_order, section_id");
    let mut stmt = conn.prepare(&sql).context("prepare list_sections")?;
    let rows = stmt
        .query_map([], row_to_section)
        .context("execute list_sections")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read section row")?);
    }
    Ok(out)
}

/// Fetch one section.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_section(conn: &Connection, id: &str) -> Result<Option<Section>> {
    let sql = format!("SELECT {SECTION_COLUMNS} FROM sections WHERE section_id = ?1");
    conn.query_row(&sql, [id], row_to_section)
        .optional()
        .with_context(|| format!("get_section '{id}'"))
}

fn check_references(conn: &Connection, section: &Section) -> MarketResult<()> {
    if let Some(parent) = section.parent.as_deref() {
        if parent == section.id {
            return Err(MarketError::BadRequest(format!(
                "section '{parent}' cannot be its own parent"
            )));
        }
        if get_section(conn, parent)?.is_none() {
            return Err(MarketError::not_found("section", parent));
        }
    }
    for link in &section.links {
        if get_section(conn, link)?.is_none() {
            return Err(MarketError::not_found("section", link.clone()));
        }
    }
    Ok(())
}

/// Insert a new section.
///
/// # Errors
///
/// - [`MarketError::Client`] if the id is taken or the title is empty.
/// - [`MarketError::NotFound`] if the parent or a linked section is missing.
pub fn create_section(conn: &Connection, section: &Section, now: i64) -> MarketResult<()> {
    if section.id.trim().is_empty() || section.title.trim().is_empty() {
        return Err(MarketError::Client("Section id and title are required".into()));
    }
    if get_section(conn, &section.id)?.is_some() {
        return Err(MarketError::Client(format!(
            "Section '{}' already exists",
            section.id
        )));
    }
    check_references(conn, section)?;

    let links = serde_json::to_string(&section.links).context("serialize section links")?;
    conn.execute(
        "INSERT INTO sections (section_id, parent_id, title, description, display_order,
             is_category, allow_offers, allow_wishes, links_json, created_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            section.id,
            section.parent,
            section.title,
            section.description,
            section.display_order,
            i64::from(section.is_category),
            i64::from(section.allow_offers),
            i64::from(section.allow_wishes),
            links,
            now,
        ],
    )?;
    tracing::info!(section_id = %section.id, parent = ?section.parent, "section created");
    Ok(())
}

/// Replace an existing section's attributes.
///
/// Reparenting under one of the section's own descendants is rejected.
///
/// # Errors
///
/// - [`MarketError::NotFound`] for unknown ids.
/// - [`MarketError::BadRequest`] for reparent cycles, or for turning a
///   section that holds listings into a category.
pub fn update_section(conn: &Connection, section: &Section) -> MarketResult<()> {
    if get_section(conn, &section.id)?.is_none() {
        return Err(MarketError::not_found("section", section.id.clone()));
    }
    check_references(conn, section)?;

    if let Some(parent) = section.parent.as_deref() {
        let tree = SectionTree::load(conn)?;
        if tree.subtree_ids(&section.id).iter().any(|id| id == parent) {
            return Err(MarketError::BadRequest(format!(
                "section '{}' cannot move under its own descendant '{parent}'",
                section.id
            )));
        }
    }
    if section.is_category && section_has_items(conn, &section.id)? {
        return Err(MarketError::BadRequest(format!(
            "section '{}' holds listings and cannot become a category",
            section.id
        )));
    }

    let links = serde_json::to_string(&section.links).context("serialize section links")?;
    conn.execute(
        "UPDATE sections SET parent_id = ?2, title = ?3, description = ?4, display_order = ?5,
             is_category = ?6, allow_offers = ?7, allow_wishes = ?8, links_json = ?9
         WHERE section_id = ?1",
        params![
            section.id,
            section.parent,
            section.title,
            section.description,
            section.display_order,
            i64::from(section.is_category),
            i64::from(section.allow_offers),
            i64::from(section.allow_wishes),
            links,
        ],
    )?;
    Ok(())
}

/// Delete an empty leaf section.
///
/// # Errors
///
/// - [`MarketError::NotFound`] for unknown ids.
/// - [`MarketError::BadRequest`] if it has children or listings.
pub fn delete_section(conn: &Connection, id: &str) -> MarketResult<()> {
    if get_section(conn, id)?.is_none() {
        return Err(MarketError::not_found("section", id));
    }
    let children: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sections WHERE parent_id = ?1",
        [id],
        |row| row.get(0),
    )?;
    if children > 0 || section_has_items(conn, id)? {
        return Err(MarketError::BadRequest(format!(
            "section '{id}' is not empty"
        )));
    }
    conn.execute("DELETE FROM sections WHERE section_id = ?1", [id])?;
    Ok(())
}

fn section_has_items(conn: &Connection, id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM items_active WHERE section_id = ?1)
             OR EXISTS(SELECT 1 FROM items_archived WHERE section_id = ?1)",
        [id],
        |row| row.get(0),
    )
    .with_context(|| format!("check items in section '{id}'"))
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// One node in a [`SectionTree::children`] walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode<'a> {
    pub section: &'a Section,
    /// 1 for direct children.
    pub level: usize,
    /// Attached through a link, not a tree edge.
    pub is_linked: bool,
}

/// In-memory adjacency built from the flat `sections` table.
#[derive(Debug, Clone, Default)]
pub struct SectionTree {
    by_id: HashMap<String, Section>,
    children: HashMap<Option<String>, Vec<String>>,
}

impl SectionTree {
    #[must_use]
    pub fn build(sections: Vec<Section>) -> Self {
        let mut children: HashMap<Option<String>, Vec<String>> = HashMap::new();
        for section in &sections {
            children
                .entry(section.parent.clone())
                .or_default()
                .push(section.id.clone());
        }
        let by_id: HashMap<String, Section> =
            sections.into_iter().map(|s| (s.id.clone(), s)).collect();
        for ids in children.values_mut() {
            ids.sort_by(|a, b| {
                let (sa, sb) = (&by_id[a], &by_id[b]);
                sa.display_order
                    .cmp(&sb.display_order)
                    .then_with(|| sa.id.cmp(&sb.id))
            });
        }
        Self { by_id, children }
    }

    /// Load every section and build the tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load(conn: &Connection) -> Result<Self> {
        Ok(Self::build(list_sections(conn)?))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Section> {
        self.by_id.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Ancestor chain of `id`, root first, excluding `id` itself.
    #[must_use]
    pub fn parents(&self, id: &str) -> Vec<&Section> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.get(id).and_then(|s| s.parent.as_deref());
        while let Some(parent_id) = cursor {
            if !seen.insert(parent_id) {
                tracing::warn!(section_id = %id, "parent cycle in section table");
                break;
            }
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            chain.push(parent);
            cursor = parent.parent.as_deref();
        }
        chain.reverse();
        chain
    }

    /// Pre-order walk below `root` (`None` for the top level), down to
    /// `depth` levels (`None` for unbounded).
    ///
    /// Linked sections are attached once per linking node, flagged
    /// `is_linked`, and never expanded.
    #[must_use]
    pub fn children(&self, root: Option<&str>, depth: Option<usize>) -> Vec<SectionNode<'_>> {
        let mut out = Vec::new();
        let mut visiting = HashSet::new();
        self.walk(root, 1, depth, &mut visiting, &mut out);
        out
    }

    fn walk<'a>(
        &'a self,
        parent: Option<&str>,
        level: usize,
        depth: Option<usize>,
        visiting: &mut HashSet<String>,
        out: &mut Vec<SectionNode<'a>>,
    ) {
        if depth.is_some_and(|d| level > d) {
            return;
        }

        let mut entries: Vec<(&'a Section, bool)> = self
            .children
            .get(&parent.map(str::to_string))
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
            .map(|s| (s, false))
            .collect();

        if let Some(linking) = parent.and_then(|p| self.get(p)) {
            for link in &linking.links {
                let Some(target) = self.get(link) else {
                    continue;
                };
                if entries.iter().any(|(s, _)| s.id == target.id) {
                    continue;
                }
                entries.push((target, true));
            }
            entries.sort_by(|(a, _), (b, _)| {
                a.display_order
                    .cmp(&b.display_order)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        for (section, is_linked) in entries {
            out.push(SectionNode {
                section,
                level,
                is_linked,
            });
            if !is_linked && visiting.insert(section.id.clone()) {
                self.walk(Some(&section.id), level + 1, depth, visiting, out);
                visiting.remove(&section.id);
            }
        }
    }

    /// Whether `kind` may be posted in `id`: the flag must hold on the
    /// section and on every ancestor. Unknown sections allow nothing.
    #[must_use]
    pub fn allows(&self, id: &str, kind: ItemKind) -> bool {
        let Some(section) = self.get(id) else {
            return false;
        };
        section.allows_locally(kind) && self.parents(id).iter().all(|p| p.allows_locally(kind))
    }

    /// `id` plus every tree descendant (links excluded).
    #[must_use]
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        if self.get(id).is_none() {
            return Vec::new();
        }
        let mut out = vec![id.to_string()];
        let mut seen: HashSet<String> = HashSet::from([id.to_string()]);
        let mut idx = 0;
        while idx < out.len() {
            let current = Some(out[idx].clone());
            if let Some(kids) = self.children.get(&current) {
                for kid in kids {
                    if seen.insert(kid.clone()) {
                        out.push(kid.clone());
                    }
                }
            }
            idx += 1;
        }
        out
    }

    /// Slash-joined ancestor path including `id`, as used in canonical URLs.
    #[must_use]
    pub fn path(&self, id: &str) -> String {
        let mut parts: Vec<&str> = self.parents(id).iter().map(|s| s.id.as_str()).collect();
        parts.push(id);
        parts.join("/")
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Memoizes a [`SectionTree`] for `ttl`.
#[derive(Debug)]
pub struct SectionTreeCache {
    ttl: Duration,
    slot: Mutex<Option<(Instant, Arc<SectionTree>)>>,
}

impl SectionTreeCache {
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Cached tree, rebuilt from `conn` when stale.
    ///
    /// # Errors
    ///
    /// Returns an error if a rebuild is needed and the query fails.
    pub fn get(&self, conn: &Connection) -> Result<Arc<SectionTree>> {
        self.get_at(conn, Instant::now())
    }

    /// [`get`](Self::get) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns an error if a rebuild is needed and the query fails.
    pub fn get_at(&self, conn: &Connection, now: Instant) -> Result<Arc<SectionTree>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((built_at, tree)) = slot.as_ref() {
            if now.saturating_duration_since(*built_at) < self.ttl {
                return Ok(Arc::clone(tree));
            }
        }
        let tree = Arc::new(SectionTree::load(conn)?);
        tracing::trace!(sections = tree.len(), "section tree rebuilt");
        *slot = Some((now, Arc::clone(&tree)));
        Ok(tree)
    }

    /// Drop the cached tree so the next read rebuilds it.
    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
