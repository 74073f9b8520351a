//! Creating, editing, moving and reading listings.
//!
//! Every mutating operation validates first, then writes the item rows,
//! history and job fan-out in one transaction.

use anyhow::anyhow;
use rusqlite::Connection;
use serde::Serialize;

use crate::config::MarketConfig;
use crate::currency;
use crate::db;
use crate::db::items::{find_item, insert_item, item_exists, load_items, store_item};
use crate::db::query::{ItemFilter, SortOrder, count_items, list_items};
use crate::drafts::Draft;
use crate::error::{MarketError, MarketResult};
use crate::history::{self, ItemChange};
use crate::jobs::{self, Fanout};
use crate::lifecycle::{BatchOutcome, NO_ITEMS_CHANGED};
use crate::markup;
use crate::model::actor::Actor;
use crate::model::item::{Collection, Item, ItemKind, Location, Price, Status, item_id};
use crate::sections::SectionTree;

const MAX_ID_ATTEMPTS: u32 = 16;

/// Input for [`create_item`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub kind: ItemKind,
    pub section: String,
    pub title: String,
    pub md: String,
    pub price: Option<Price>,
    pub location: Option<Location>,
    pub files: Vec<String>,
    pub barter_info: Option<String>,
    /// Offers only.
    pub delivery: bool,
    /// Offers only.
    pub is_new: bool,
}

impl TryFrom<Draft> for NewItem {
    type Error = MarketError;

    fn try_from(draft: Draft) -> MarketResult<Self> {
        let Some(section) = draft.section else {
            return Err(MarketError::Client("Draft has no section".to_string()));
        };
        Ok(Self {
            kind: draft.kind,
            section,
            title: draft.title,
            md: draft.md,
            price: draft.price,
            location: draft.location,
            files: draft.files,
            barter_info: draft.barter_info,
            delivery: draft.delivery,
            is_new: draft.is_new,
        })
    }
}

/// Partial update for [`edit_item`]. `None` leaves a field alone; the
/// nested `Option` of clearable fields distinguishes "clear" from "keep".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub md: Option<String>,
    pub price: Option<Option<Price>>,
    pub location: Option<Option<Location>>,
    pub files: Option<Vec<String>>,
    pub barter_info: Option<Option<String>>,
    pub delivery: Option<bool>,
    pub is_new: Option<bool>,
}

impl ItemPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.md.is_none()
            && self.price.is_none()
            && self.location.is_none()
            && self.files.is_none()
            && self.barter_info.is_none()
            && self.delivery.is_none()
            && self.is_new.is_none()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn check_section(tree: &SectionTree, section: &str, kind: ItemKind) -> MarketResult<()> {
    let Some(found) = tree.get(section) else {
        return Err(MarketError::not_found("section", section));
    };
    if found.is_category {
        return Err(MarketError::BadRequest(format!(
            "section '{section}' is a category and cannot hold listings"
        )));
    }
    if !tree.allows(section, kind) {
        return Err(MarketError::Forbidden(format!(
            "section '{section}' does not accept {kind}s"
        )));
    }
    Ok(())
}

/// Check title, price and location; returns the price in the reference
/// currency.
fn check_fields(conn: &Connection, config: &MarketConfig, item: &Item) -> MarketResult<Option<f64>> {
    let limits = &config.items;
    let title_len = item.title.trim().chars().count();
    if title_len < limits.title_min_length {
        return Err(MarketError::Client(format!(
            "Title is too short (minimum {} characters)",
            limits.title_min_length
        )));
    }
    if title_len > limits.title_max_length {
        return Err(MarketError::Client(format!(
            "Title is too long (maximum {} characters)",
            limits.title_max_length
        )));
    }

    if let Some(location) = item.location {
        if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lon) {
            return Err(MarketError::Client("Location is out of range".to_string()));
        }
    }

    let Some(price) = &item.price else {
        if item.kind == ItemKind::Offer {
            return Err(MarketError::Client("Offers must have a price".to_string()));
        }
        return Ok(None);
    };
    if !price.value.is_finite() || price.value < 0.0 {
        return Err(MarketError::Client("Price must be a non-negative number".to_string()));
    }
    if item.kind == ItemKind::Offer && price.value < limits.price_min {
        return Err(MarketError::Client(format!(
            "Price must be at least {}",
            limits.price_min
        )));
    }
    currency::convert(conn, price.value, &price.currency, &config.currency.reference).map(Some)
}

fn normalize(item: &mut Item) {
    item.title = item.title.trim().to_string();
    if let Some(price) = item.price.as_mut() {
        price.currency = price.currency.trim().to_ascii_uppercase();
    }
    if item.kind == ItemKind::Wish {
        item.delivery = false;
        item.is_new = false;
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// Validate and store a new listing.
///
/// Listings by hellbanned authors are stored as `HB` with `ste = OPEN`.
///
/// # Errors
///
/// - [`MarketError::NotFound`] if the section does not exist.
/// - [`MarketError::BadRequest`] if the section is a category.
/// - [`MarketError::Forbidden`] if the section does not accept the kind.
/// - [`MarketError::Client`] for invalid title, price, currency or location.
pub fn create_item(
    conn: &mut Connection,
    config: &MarketConfig,
    tree: &SectionTree,
    actor: &Actor,
    new: NewItem,
    now: i64,
) -> MarketResult<Item> {
    check_section(tree, &new.section, new.kind)?;

    let (st, ste) = if actor.hellbanned {
        (Status::Hb, Some(Status::Open))
    } else {
        (Status::Open, None)
    };
    let mut item = Item {
        id: String::new(),
        kind: new.kind,
        html: markup::render(&new.md, &config.roles.markup(actor.role)),
        title: new.title,
        md: new.md,
        price: new.price,
        price_base: None,
        location: new.location,
        st,
        ste,
        prev_st: None,
        del_reason: None,
        del_by: None,
        edit_count: 0,
        last_edit_ts: None,
        files: new.files,
        user: actor.user.clone(),
        section: new.section,
        ts: now,
        autoclose_at: now + config.items.expire_us(),
        ip: actor.ip.clone(),
        barter_info: new.barter_info,
        delivery: new.delivery,
        is_new: new.is_new,
    };
    normalize(&mut item);

    let tx = db::write_tx(conn)?;
    item.price_base = check_fields(&tx, config, &item)?;
    item.id = allocate_id(&tx, &item.user, &item.title, now)?;
    insert_item(&tx, item.collection(), &item)?;

    let mut fanout = Fanout::default();
    fanout.touch(&item);
    jobs::enqueue_fanout(&tx, &fanout, now)?;
    tx.commit()?;

    tracing::info!(
        item_id = %item.id,
        kind = %item.kind,
        section = %item.section,
        user = %item.user,
        hb = item.is_hellbanned(),
        "listing created"
    );
    Ok(item)
}

fn allocate_id(conn: &Connection, user: &str, title: &str, now: i64) -> MarketResult<String> {
    for nonce in 0..MAX_ID_ATTEMPTS {
        let id = item_id(user, title, now, nonce);
        if !item_exists(conn, &id)? {
            return Ok(id);
        }
    }
    Err(anyhow!("could not allocate an id for '{title}' after {MAX_ID_ATTEMPTS} attempts").into())
}

/// Apply `patch` to a listing, re-render its body and record history.
///
/// # Errors
///
/// - [`MarketError::NotFound`] if the item is missing or invisible to `actor`.
/// - [`MarketError::Forbidden`] if `actor` may not edit it.
/// - [`MarketError::Client`] for deleted items and invalid fields.
pub fn edit_item(
    conn: &mut Connection,
    config: &MarketConfig,
    actor: &Actor,
    id: &str,
    patch: ItemPatch,
    now: i64,
) -> MarketResult<Item> {
    let tx = db::write_tx(conn)?;
    let (old, from) = match find_item(&tx, id)? {
        Some((item, from)) if actor.can_see(&item) => (item, from),
        _ => return Err(MarketError::not_found("item", id)),
    };
    if !actor.can_edit(&old) {
        return Err(MarketError::Forbidden(format!("cannot edit listing {id}")));
    }
    if old.st.is_deleted() {
        return Err(MarketError::Client("Deleted listings cannot be edited".to_string()));
    }

    let mut new = old.clone();
    let ItemPatch {
        title,
        md,
        price,
        location,
        files,
        barter_info,
        delivery,
        is_new,
    } = patch;
    if let Some(title) = title {
        new.title = title;
    }
    if let Some(md) = md {
        new.html = markup::render(&md, &config.roles.markup(actor.role));
        new.md = md;
    }
    if let Some(price) = price {
        new.price = price;
    }
    if let Some(location) = location {
        new.location = location;
    }
    if let Some(files) = files {
        new.files = files;
    }
    if let Some(barter_info) = barter_info {
        new.barter_info = barter_info;
    }
    if let Some(delivery) = delivery {
        new.delivery = delivery;
    }
    if let Some(is_new) = is_new {
        new.is_new = is_new;
    }
    normalize(&mut new);
    new.price_base = check_fields(&tx, config, &new)?;

    store_item(&tx, &new, from)?;
    let outcome = history::append(
        &tx,
        &[ItemChange::new(old, new.clone())],
        actor,
        now,
        config.history.grace_us(),
    )?;
    let mut fanout = Fanout::default();
    fanout.touch(&new);
    jobs::enqueue_fanout(&tx, &fanout, now)?;
    tx.commit()?;

    // Re-read so the edit counters written by history are included.
    let edited = find_item(conn, id)?.map_or(new, |(item, _)| item);
    tracing::info!(
        item_id = %edited.id,
        user = %actor.user,
        role = %actor.role,
        inserted = outcome.inserted,
        merged = outcome.merged,
        reverted = outcome.reverted,
        "listing edited"
    );
    Ok(edited)
}

/// Move listings to `section_to`. Items keep their table.
///
/// Items already in the target, invisible to `actor`, or deleted are skipped.
///
/// # Errors
///
/// - [`MarketError::Forbidden`] without the `move_items` permission.
/// - [`MarketError::NotFound`] if the target section is missing.
/// - [`MarketError::BadRequest`] if the target is a category or does not
///   accept the kind of a selected item.
/// - [`MarketError::Client`] when nothing is left to move.
pub fn move_many(
    conn: &mut Connection,
    config: &MarketConfig,
    tree: &SectionTree,
    actor: &Actor,
    ids: &[String],
    section_to: &str,
    now: i64,
) -> MarketResult<BatchOutcome> {
    if !actor.permissions.move_items {
        return Err(MarketError::Forbidden("moving listings requires moderator rights".to_string()));
    }
    let Some(target) = tree.get(section_to) else {
        return Err(MarketError::not_found("section", section_to));
    };
    if target.is_category {
        return Err(MarketError::BadRequest(format!(
            "section '{section_to}' is a category and cannot hold listings"
        )));
    }

    let tx = db::write_tx(conn)?;
    let mut pending = Vec::new();
    for (item, from) in load_items(&tx, ids)? {
        if !actor.can_see(&item) || item.st.is_deleted() || item.section == section_to {
            continue;
        }
        if !tree.allows(section_to, item.kind) {
            return Err(MarketError::BadRequest(format!(
                "section '{section_to}' does not accept {}s",
                item.kind
            )));
        }
        let mut moved = item.clone();
        moved.section = section_to.to_string();
        pending.push((ItemChange::new(item, moved), from));
    }
    if pending.is_empty() {
        return Err(MarketError::Client(NO_ITEMS_CHANGED.to_string()));
    }

    let mut outcome = BatchOutcome::default();
    let mut changes = Vec::with_capacity(pending.len());
    for (change, from) in pending {
        store_item(&tx, &change.new, from)?;
        outcome.fanout.sections.insert(change.old.section.clone());
        outcome.fanout.touch(&change.new);
        outcome.changed.push(change.new.id.clone());
        changes.push(change);
    }
    outcome.skipped = ids.len().saturating_sub(outcome.changed.len());
    outcome.history = history::append(&tx, &changes, actor, now, config.history.grace_us())?;
    jobs::enqueue_fanout(&tx, &outcome.fanout, now)?;
    tx.commit()?;

    tracing::info!(
        section_to = %section_to,
        user = %actor.user,
        moved = outcome.changed.len(),
        "listings moved"
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Canonical address of a listing: `/market/{kind}/{section path}/{id}`.
#[must_use]
pub fn canonical_path(tree: &SectionTree, item: &Item) -> String {
    format!("/market/{}/{}/{}", item.kind, tree.path(&item.section), item.id)
}

/// Fetch one listing as `actor` sees it.
///
/// When `section_hint` (the section the caller addressed the item under)
/// does not match, the canonical path is returned as a redirect.
///
/// # Errors
///
/// - [`MarketError::NotFound`] if the item is missing or invisible.
/// - [`MarketError::Redirect`] on a section mismatch.
pub fn get_visible(
    conn: &Connection,
    tree: &SectionTree,
    actor: &Actor,
    id: &str,
    section_hint: Option<&str>,
) -> MarketResult<Item> {
    let item = match find_item(conn, id)? {
        Some((item, _)) if actor.can_see(&item) => item,
        _ => return Err(MarketError::not_found("item", id)),
    };
    if section_hint.is_some_and(|hint| hint != item.section) {
        return Err(MarketError::Redirect(canonical_path(tree, &item)));
    }
    Ok(item)
}

/// One page of a listing query.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<Item>,
    /// Matches before pagination.
    pub total: u64,
}

/// Options for [`list_section`].
#[derive(Debug, Clone, Default)]
pub struct SectionListing {
    pub kind: Option<ItemKind>,
    pub collection: Option<Collection>,
    pub sort: SortOrder,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Listings in `section` and its descendants that `viewer` may see.
///
/// # Errors
///
/// - [`MarketError::NotFound`] if the section does not exist.
/// - Database failures.
pub fn list_section(
    conn: &Connection,
    tree: &SectionTree,
    viewer: &Actor,
    section: &str,
    listing: &SectionListing,
) -> MarketResult<Page> {
    let sections = tree.subtree_ids(section);
    if sections.is_empty() {
        return Err(MarketError::not_found("section", section));
    }
    let filter = ItemFilter {
        sections,
        kind: listing.kind,
        collection: listing.collection,
        user: None,
        limit: listing.limit,
        offset: listing.offset,
        sort: listing.sort,
    };
    Ok(Page {
        items: list_items(conn, &filter, viewer)?,
        total: count_items(conn, &filter, viewer)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::jobs::list_jobs;
    use crate::model::actor::{Permissions, Role};
    use crate::model::section::Section;
    use crate::sections::create_section;

    fn section(id: &str, parent: Option<&str>) -> Section {
        Section {
            id: id.to_string(),
            parent: parent.map(str::to_string),
            title: id.to_string(),
            description: String::new(),
            display_order: 0,
            is_category: false,
            allow_offers: true,
            allow_wishes: true,
            links: Vec::new(),
        }
    }

    fn setup() -> (Connection, SectionTree) {
        let conn = open_in_memory().expect("store");
        let mut vehicles = section("vehicles", None);
        vehicles.is_category = true;
        create_section(&conn, &vehicles, 0).expect("section");
        create_section(&conn, &section("bikes", Some("vehicles")), 0).expect("section");
        let mut cars = section("cars", Some("vehicles"));
        cars.allow_wishes = false;
        create_section(&conn, &cars, 0).expect("section");
        let tree = SectionTree::load(&conn).expect("tree");
        (conn, tree)
    }

    fn offer(section: &str) -> NewItem {
        NewItem {
            kind: ItemKind::Offer,
            section: section.to_string(),
            title: "Vintage road bike".to_string(),
            md: "Steel **frame**".to_string(),
            price: Some(Price {
                value: 120.0,
                currency: "usd".to_string(),
            }),
            location: None,
            files: Vec::new(),
            barter_info: None,
            delivery: true,
            is_new: false,
        }
    }

    fn alice() -> Actor {
        Actor::new("alice", Role::User, Permissions::default())
    }

    fn moderator() -> Actor {
        Actor::new("mod", Role::Moderator, Permissions::all())
    }

    #[test]
    fn create_validates_section_before_fields() {
        let (mut conn, tree) = setup();
        let config = MarketConfig::default();

        let mut bad = offer("nowhere");
        bad.title = "short".to_string();
        assert!(matches!(
            create_item(&mut conn, &config, &tree, &alice(), bad, 1),
            Err(MarketError::NotFound { .. })
        ));
        assert!(matches!(
            create_item(&mut conn, &config, &tree, &alice(), offer("vehicles"), 1),
            Err(MarketError::BadRequest(_))
        ));
        let mut wish = offer("cars");
        wish.kind = ItemKind::Wish;
        assert!(matches!(
            create_item(&mut conn, &config, &tree, &alice(), wish, 1),
            Err(MarketError::Forbidden(_))
        ));
    }

    #[test]
    fn create_validates_fields() {
        let (mut conn, tree) = setup();
        let config = MarketConfig::default();

        let mut short = offer("bikes");
        short.title = "Bike".to_string();
        let mut cheap = offer("bikes");
        cheap.price = Some(Price {
            value: 0.5,
            currency: "USD".to_string(),
        });
        let mut unpriced = offer("bikes");
        unpriced.price = None;
        let mut exotic = offer("bikes");
        exotic.price = Some(Price {
            value: 10.0,
            currency: "XYZ".to_string(),
        });
        for input in [short, cheap, unpriced, exotic] {
            assert!(matches!(
                create_item(&mut conn, &config, &tree, &alice(), input, 1),
                Err(MarketError::Client(_))
            ));
        }

        let mut wish = offer("bikes");
        wish.kind = ItemKind::Wish;
        wish.price = None;
        let created = create_item(&mut conn, &config, &tree, &alice(), wish, 1).expect("wish");
        assert!(!created.delivery);
    }

    #[test]
    fn create_stores_open_item_and_schedules_jobs() {
        let (mut conn, tree) = setup();
        let config = MarketConfig::default();
        let item = create_item(&mut conn, &config, &tree, &alice(), offer("bikes"), 1_000).expect("create");

        assert!(item.id.starts_with("mk-"));
        assert_eq!(item.st, Status::Open);
        assert_eq!(item.autoclose_at, 1_000 + config.items.expire_us());
        assert_eq!(item.price_base, Some(120.0));
        assert_eq!(item.price.as_ref().map(|p| p.currency.as_str()), Some("USD"));
        assert!(item.html.contains("<strong>frame</strong>"));

        let (_, collection) = find_item(&conn, &item.id).expect("query").expect("present");
        assert_eq!(collection, Collection::Active);
        assert_eq!(list_jobs(&conn).expect("jobs").len(), 3);
    }

    #[test]
    fn hellbanned_authors_post_hidden_items() {
        let (mut conn, tree) = setup();
        let mut author = alice();
        author.hellbanned = true;
        let item = create_item(&mut conn, &MarketConfig::default(), &tree, &author, offer("bikes"), 1)
            .expect("create");
        assert_eq!((item.st, item.ste), (Status::Hb, Some(Status::Open)));

        let bob = Actor::new("bob", Role::User, Permissions::default());
        assert!(matches!(
            get_visible(&conn, &tree, &bob, &item.id, None),
            Err(MarketError::NotFound { .. })
        ));
        assert!(get_visible(&conn, &tree, &author, &item.id, None).is_ok());
    }

    #[test]
    fn edit_checks_permissions_and_records_history() {
        let (mut conn, tree) = setup();
        let config = MarketConfig::default();
        let item = create_item(&mut conn, &config, &tree, &alice(), offer("bikes"), 0).expect("create");

        let bob = Actor::new("bob", Role::User, Permissions::default());
        let patch = ItemPatch {
            title: Some("Vintage road bike, barely used".to_string()),
            ..ItemPatch::default()
        };
        assert!(matches!(
            edit_item(&mut conn, &config, &bob, &item.id, patch.clone(), 10),
            Err(MarketError::Forbidden(_))
        ));
        assert!(matches!(
            edit_item(&mut conn, &config, &alice(), "mk-0000000000", patch.clone(), 10),
            Err(MarketError::NotFound { .. })
        ));

        let late = config.history.grace_us() + 10;
        let edited = edit_item(&mut conn, &config, &alice(), &item.id, patch, late).expect("edit");
        assert_eq!(edited.title, "Vintage road bike, barely used");
        assert_eq!(edited.edit_count, 1);
        assert_eq!(edited.last_edit_ts, Some(late));

        let revisions = history::list_history(&conn, &item.id).expect("history");
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].entry.snapshot.title, "Vintage road bike");
    }

    #[test]
    fn edit_rejects_invalid_price() {
        let (mut conn, tree) = setup();
        let config = MarketConfig::default();
        let item = create_item(&mut conn, &config, &tree, &alice(), offer("bikes"), 0).expect("create");
        let patch = ItemPatch {
            price: Some(None),
            ..ItemPatch::default()
        };
        assert!(matches!(
            edit_item(&mut conn, &config, &alice(), &item.id, patch, 10),
            Err(MarketError::Client(_))
        ));
    }

    #[test]
    fn price_minimum_only_binds_offers() {
        let (mut conn, tree) = setup();
        let config = MarketConfig::default();

        let mut cheap_offer = offer("bikes");
        cheap_offer.price = Some(Price {
            value: 0.5,
            currency: "usd".to_string(),
        });
        assert!(matches!(
            create_item(&mut conn, &config, &tree, &alice(), cheap_offer, 0),
            Err(MarketError::Client(msg)) if msg.contains("at least")
        ));

        let mut wish = offer("bikes");
        wish.kind = ItemKind::Wish;
        wish.price = Some(Price {
            value: 0.5,
            currency: "usd".to_string(),
        });
        let wish = create_item(&mut conn, &config, &tree, &alice(), wish, 1).expect("cheap wish");
        assert_eq!(wish.price.map(|p| p.value), Some(0.5));

        let mut negative = offer("bikes");
        negative.kind = ItemKind::Wish;
        negative.price = Some(Price {
            value: -1.0,
            currency: "usd".to_string(),
        });
        assert!(create_item(&mut conn, &config, &tree, &alice(), negative, 2).is_err());
    }

    #[test]
    fn move_many_checks_target_and_permission() {
        let (mut conn, tree) = setup();
        let config = MarketConfig::default();
        let mut wish = offer("bikes");
        wish.kind = ItemKind::Wish;
        let wish = create_item(&mut conn, &config, &tree, &alice(), wish, 0).expect("create");
        let bike = create_item(&mut conn, &config, &tree, &alice(), offer("bikes"), 1).expect("create");
        let ids = vec![bike.id.clone()];

        assert!(matches!(
            move_many(&mut conn, &config, &tree, &alice(), &ids, "cars", 5),
            Err(MarketError::Forbidden(_))
        ));
        assert!(matches!(
            move_many(&mut conn, &config, &tree, &moderator(), &ids, "boats", 5),
            Err(MarketError::NotFound { .. })
        ));
        assert!(matches!(
            move_many(&mut conn, &config, &tree, &moderator(), &ids, "vehicles", 5),
            Err(MarketError::BadRequest(_))
        ));
        assert!(matches!(
            move_many(&mut conn, &config, &tree, &moderator(), &[wish.id.clone()], "cars", 5),
            Err(MarketError::BadRequest(_))
        ));
        assert!(matches!(
            move_many(&mut conn, &config, &tree, &moderator(), &ids, "bikes", 5),
            Err(MarketError::Client(_))
        ));

        let outcome = move_many(&mut conn, &config, &tree, &moderator(), &ids, "cars", 5).expect("move");
        assert_eq!(outcome.changed, ids);
        assert!(outcome.fanout.sections.contains("bikes"));
        assert!(outcome.fanout.sections.contains("cars"));
        let (moved, collection) = find_item(&conn, &bike.id).expect("query").expect("present");
        assert_eq!(moved.section, "cars");
        assert_eq!(collection, Collection::Active);
    }

    #[test]
    fn section_hint_mismatch_redirects() {
        let (mut conn, tree) = setup();
        let item = create_item(&mut conn, &MarketConfig::default(), &tree, &alice(), offer("bikes"), 0)
            .expect("create");
        assert!(get_visible(&conn, &tree, &alice(), &item.id, Some("bikes")).is_ok());
        match get_visible(&conn, &tree, &alice(), &item.id, Some("cars")) {
            Err(MarketError::Redirect(target)) => {
                assert_eq!(target, format!("/market/offer/vehicles/bikes/{}", item.id));
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn list_section_covers_subtree() {
        let (mut conn, tree) = setup();
        let config = MarketConfig::default();
        create_item(&mut conn, &config, &tree, &alice(), offer("bikes"), 0).expect("create");
        create_item(&mut conn, &config, &tree, &alice(), offer("cars"), 1).expect("create");

        let page = list_section(&conn, &tree, &alice(), "vehicles", &SectionListing::default())
            .expect("list");
        assert_eq!(page.total, 2);
        let limited = SectionListing {
            limit: Some(1),
            ..SectionListing::default()
        };
        let page = list_section(&conn, &tree, &alice(), "vehicles", &limited).expect("list");
        assert_eq!((page.items.len(), page.total), (1, 2));
        assert!(matches!(
            list_section(&conn, &tree, &alice(), "boats", &SectionListing::default()),
            Err(MarketError::NotFound { .. })
        ));
    }

    #[test]
    fn drafts_convert_only_with_a_section() {
        let draft = Draft {
            title: "Vintage road bike".to_string(),
            ..Draft::default()
        };
        assert!(matches!(NewItem::try_from(draft.clone()), Err(MarketError::Client(_))));
        let with_section = Draft {
            section: Some("bikes".to_string()),
            ..draft
        };
        assert_eq!(NewItem::try_from(with_section).expect("convert").section, "bikes");
    }
}
