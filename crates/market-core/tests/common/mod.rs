//! Shared fixtures for market-core integration tests.

#![allow(dead_code)]

use market_core::config::MarketConfig;
use market_core::db::open_in_memory;
use market_core::items::{NewItem, create_item};
use market_core::model::actor::{Actor, Permissions, Role};
use market_core::model::item::{Item, ItemKind, Location, Price};
use market_core::model::section::Section;
use market_core::sections::{SectionTree, create_section};
use rusqlite::Connection;

pub const BERLIN: Location = Location {
    lat: 52.52,
    lon: 13.405,
};
pub const PARIS: Location = Location {
    lat: 48.8566,
    lon: 2.3522,
};

pub fn section(id: &str, parent: Option<&str>) -> Section {
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

/// `vehicles` (category) with `bikes` and `cars` beneath it, plus `books`.
pub fn store() -> (Connection, SectionTree) {
    let conn = open_in_memory().expect("store");
    let mut vehicles = section("vehicles", None);
    vehicles.is_category = true;
    create_section(&conn, &vehicles, 0).expect("vehicles");
    create_section(&conn, &section("bikes", Some("vehicles")), 0).expect("bikes");
    create_section(&conn, &section("cars", Some("vehicles")), 0).expect("cars");
    create_section(&conn, &section("books", None), 0).expect("books");
    let tree = SectionTree::load(&conn).expect("tree");
    (conn, tree)
}

pub fn user(name: &str) -> Actor {
    Actor::new(name, Role::User, Permissions::default())
}

pub fn moderator() -> Actor {
    Actor::new("mod", Role::Moderator, Permissions::all())
}

pub fn offer(section: &str, title: &str, price: f64) -> NewItem {
    NewItem {
        kind: ItemKind::Offer,
        section: section.to_string(),
        title: title.to_string(),
        md: format!("{title}, collect in person"),
        price: Some(Price {
            value: price,
            currency: "USD".to_string(),
        }),
        location: Some(BERLIN),
        files: Vec::new(),
        barter_info: None,
        delivery: false,
        is_new: false,
    }
}

pub fn post(conn: &mut Connection, tree: &SectionTree, author: &Actor, new: NewItem, now: i64) -> Item {
    create_item(conn, &MarketConfig::default(), tree, author, new, now).expect("create item")
}

/// Number of rows holding `id` in (active, archived).
pub fn placement(conn: &Connection, id: &str) -> (i64, i64) {
    let count = |table: &str| -> i64 {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE item_id = ?1"),
            [id],
            |row| row.get(0),
        )
        .expect("count")
    };
    (count("items_active"), count("items_archived"))
}
