//! Search over the FTS index maintained by the job queue.

#[path = "common/mod.rs"]
mod common;
use common::*;

use market_core::config::MarketConfig;
use market_core::jobs::run_pending;
use market_core::lifecycle::close_many;
use market_core::model::item::ItemKind;
use market_core::search::{SearchQuery, indexed_hb_count, rebuild, search};

fn text(query: &str) -> SearchQuery {
    SearchQuery {
        text: Some(query.to_string()),
        ..SearchQuery::default()
    }
}

fn titles(hits: &[market_core::search::SearchHit]) -> Vec<String> {
    hits.iter().map(|h| h.item.title.clone()).collect()
}

#[test]
fn index_follows_jobs() {
    let (mut conn, tree) = store();
    let config = MarketConfig::default();
    let alice = user("alice");
    let item = post(&mut conn, &tree, &alice, offer("bikes", "Vintage road bike", 120.0), 0);

    assert!(search(&conn, &text("road"), &alice).expect("search").is_empty());
    run_pending(&mut conn, &config, 1).expect("jobs");
    assert_eq!(titles(&search(&conn, &text("roads"), &alice).expect("search")), vec!["Vintage road bike"]);

    close_many(&mut conn, &config, &alice, &[item.id], 2).expect("close");
    run_pending(&mut conn, &config, 2).expect("jobs");
    assert!(search(&conn, &text("road"), &alice).expect("search").is_empty());
}

#[test]
fn title_matches_outrank_body_matches() {
    let (mut conn, tree) = store();
    let config = MarketConfig::default();
    let alice = user("alice");
    let mut body_only = offer("books", "Collected short stories", 15.0);
    body_only.md = "Includes a story about a bicycle".to_string();
    post(&mut conn, &tree, &alice, body_only, 0);
    post(&mut conn, &tree, &alice, offer("bikes", "Bicycle with basket", 60.0), 1);
    run_pending(&mut conn, &config, 5).expect("jobs");

    let hits = search(&conn, &text("bicycle"), &alice).expect("search");
    assert_eq!(titles(&hits), vec!["Bicycle with basket", "Collected short stories"]);
    assert!(hits[0].rank <= hits[1].rank);
}

#[test]
fn hellbanned_listings_are_found_only_by_their_author() {
    let (mut conn, tree) = store();
    let config = MarketConfig::default();
    let mut troll = user("troll");
    troll.hellbanned = true;
    post(&mut conn, &tree, &troll, offer("bikes", "Suspiciously cheap bike", 5.0), 0);
    run_pending(&mut conn, &config, 1).expect("jobs");
    assert_eq!(indexed_hb_count(&conn).expect("count"), 1);

    assert!(search(&conn, &text("bike"), &user("bob")).expect("search").is_empty());
    assert_eq!(search(&conn, &text("bike"), &troll).expect("search").len(), 1);
    assert_eq!(search(&conn, &text("bike"), &moderator()).expect("search").len(), 1);
    assert!(search(&conn, &SearchQuery::default(), &user("bob")).expect("search").is_empty());
}

#[test]
fn structured_filters_narrow_results() {
    let (mut conn, tree) = store();
    let config = MarketConfig::default();
    let alice = user("alice");
    post(&mut conn, &tree, &alice, offer("bikes", "Vintage road bike", 120.0), 0);
    let mut paris = offer("cars", "Small city car", 3000.0);
    paris.location = Some(PARIS);
    post(&mut conn, &tree, &alice, paris, 1);
    let mut wish = offer("books", "Looking for atlases", 20.0);
    wish.kind = ItemKind::Wish;
    post(&mut conn, &tree, &alice, wish, 2);
    run_pending(&mut conn, &config, 5).expect("jobs");

    let cheap = SearchQuery {
        price_max: Some(500.0),
        ..SearchQuery::default()
    };
    assert_eq!(search(&conn, &cheap, &alice).expect("search").len(), 2);

    let vehicles = SearchQuery {
        sections: tree.subtree_ids("vehicles"),
        ..SearchQuery::default()
    };
    assert_eq!(search(&conn, &vehicles, &alice).expect("search").len(), 2);

    let wishes = SearchQuery {
        kind: Some(ItemKind::Wish),
        ..SearchQuery::default()
    };
    assert_eq!(titles(&search(&conn, &wishes, &alice).expect("search")), vec!["Looking for atlases"]);

    let near_paris = SearchQuery {
        near: Some((PARIS, 50.0)),
        ..SearchQuery::default()
    };
    let hits = search(&conn, &near_paris, &alice).expect("search");
    assert_eq!(titles(&hits), vec!["Small city car"]);
    assert!(hits[0].distance_km.expect("distance") < 1.0);
}

#[test]
fn rebuild_matches_incremental_index() {
    let (mut conn, tree) = store();
    let config = MarketConfig::default();
    let alice = user("alice");
    post(&mut conn, &tree, &alice, offer("bikes", "Vintage road bike", 120.0), 0);
    post(&mut conn, &tree, &alice, offer("bikes", "Folding city bike", 80.0), 1);
    run_pending(&mut conn, &config, 5).expect("jobs");
    let before = search(&conn, &text("bike"), &alice).expect("search").len();

    assert_eq!(rebuild(&conn).expect("rebuild"), 2);
    assert_eq!(search(&conn, &text("bike"), &alice).expect("search").len(), before);
}
