//! E2E CLI tests for the listing lifecycle:
//! - `mkt init` and the not-initialized error contract
//! - section setup by a moderator
//! - create, show, list, close, open, delete, undelete
//! - search after the post-command job drain
//! - hellbanned listings stay hidden from other users
//!
//! Each test runs `mkt` as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// 2001-09-09, far enough back that reopening from today is refused.
const LONG_AGO_US: &str = "1000000000000000";
const A_DAY_LATER_US: &str = "1000086400000000";

fn mkt_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("mkt"));
    cmd.current_dir(dir);
    cmd.env("MARKET_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join(".xdg"));
    cmd.env_remove("MARKET_USER");
    cmd.env_remove("MARKET_ROLE");
    cmd.env_remove("MARKET_NOW_US");
    cmd.env_remove("MARKET_DEFER_JOBS");
    cmd
}

fn as_user(dir: &Path, user: &str) -> Command {
    let mut cmd = mkt_cmd(dir);
    cmd.env("MARKET_USER", user);
    cmd
}

fn as_moderator(dir: &Path) -> Command {
    let mut cmd = as_user(dir, "mod");
    cmd.env("MARKET_ROLE", "moderator");
    cmd
}

fn json_of(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().expect("mkt should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

fn error_of(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().expect("mkt should not crash");
    assert!(!output.status.success(), "command unexpectedly succeeded");
    let json: Value = serde_json::from_slice(&output.stderr).expect("valid JSON error on stderr");
    json["error"].clone()
}

/// `init` plus a `vehicles` category holding a `bikes` section.
fn setup() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    mkt_cmd(dir.path()).arg("init").assert().success();
    as_moderator(dir.path())
        .args(["section", "add", "vehicles", "--title", "Vehicles", "--category", "true"])
        .assert()
        .success();
    as_moderator(dir.path())
        .args(["section", "add", "bikes", "--title", "Bikes", "--parent", "vehicles"])
        .assert()
        .success();
    dir
}

fn create_offer(dir: &Path, user: &str, title: &str, price: &str) -> String {
    let json = json_of(as_user(dir, user).args([
        "create", "offer", "-s", "bikes", "-t", title, "--price", price,
    ]));
    json["id"].as_str().expect("id field").to_string()
}

fn show(dir: &Path, user: &str, id: &str) -> Value {
    json_of(as_user(dir, user).args(["show", id]))
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[test]
fn commands_before_init_report_not_initialized() {
    let dir = TempDir::new().expect("temp dir");
    let err = error_of(mkt_cmd(dir.path()).arg("list"));
    assert_eq!(err["error_code"], "E1001");
    assert!(err["suggestion"].as_str().is_some_and(|s| s.contains("mkt init")));
}

#[test]
fn init_twice_needs_force() {
    let dir = TempDir::new().expect("temp dir");
    mkt_cmd(dir.path()).arg("init").assert().success();
    assert!(dir.path().join(".market/market.db").exists());
    assert!(dir.path().join(".market/config.toml").exists());

    mkt_cmd(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    mkt_cmd(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn sections_need_a_moderator() {
    let dir = setup();
    let err = error_of(as_user(dir.path(), "alice").args(["section", "add", "cars", "--title", "Cars"]));
    assert_eq!(err["status"], "FORBIDDEN");

    as_user(dir.path(), "alice")
        .args(["section", "tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bikes"));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn create_show_and_list() {
    let dir = setup();
    let id = create_offer(dir.path(), "alice", "Red city bike, 28 inch", "120");

    let item = show(dir.path(), "alice", &id);
    assert_eq!(item["kind"], "offer");
    assert_eq!(item["st"], "OPEN");
    assert_eq!(item["user"], "alice");
    assert_eq!(item["section"], "bikes");

    let page = json_of(as_user(dir.path(), "bob").args(["list", "-s", "vehicles"]));
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], id.as_str());
}

#[test]
fn short_title_is_rejected() {
    let dir = setup();
    let err = error_of(as_user(dir.path(), "alice").args(["create", "wish", "-s", "bikes", "-t", "Bike"]));
    assert_eq!(err["status"], "CLIENT_ERROR");
    assert!(err["message"].as_str().is_some_and(|m| m.contains("too short")));
}

#[test]
fn offer_without_price_is_rejected() {
    let dir = setup();
    let err = error_of(as_user(dir.path(), "alice").args([
        "create", "offer", "-s", "bikes", "-t", "Free stuff, come get it",
    ]));
    assert_eq!(err["status"], "CLIENT_ERROR");
    assert!(err["message"].as_str().is_some_and(|m| m.contains("price")));
}

#[test]
fn listings_cannot_go_into_categories() {
    let dir = setup();
    let err = error_of(as_user(dir.path(), "alice").args([
        "create", "offer", "-s", "vehicles", "-t", "Car roof rack for bikes", "--price", "70",
    ]));
    assert_eq!(err["status"], "BAD_REQUEST");
}

#[test]
fn show_unknown_listing_is_not_found() {
    let dir = setup();
    let err = error_of(as_user(dir.path(), "alice").args(["show", "mk-doesnotexist"]));
    assert_eq!(err["error_code"], "E2001");
    assert_eq!(err["status"], "NOT_FOUND");
}

#[test]
fn close_then_open_round_trip() {
    let dir = setup();
    let id = create_offer(dir.path(), "alice", "Touring bike with racks", "300");

    as_user(dir.path(), "alice").args(["close", &id]).assert().success();
    assert_eq!(show(dir.path(), "alice", &id)["st"], "CLOSED");

    let open = json_of(as_user(dir.path(), "bob").args(["list", "--state", "open"]));
    assert_eq!(open["total"], 0);

    as_user(dir.path(), "alice").args(["open", &id]).assert().success();
    assert_eq!(show(dir.path(), "alice", &id)["st"], "OPEN");
}

#[test]
fn other_users_cannot_close() {
    let dir = setup();
    let id = create_offer(dir.path(), "alice", "Folding bike, barely used", "210");
    as_user(dir.path(), "bob").args(["close", &id]).assert().failure();
    assert_eq!(show(dir.path(), "alice", &id)["st"], "OPEN");
}

#[test]
fn old_listings_stay_closed() {
    let dir = setup();
    let id = json_of(
        as_user(dir.path(), "alice")
            .env("MARKET_NOW_US", LONG_AGO_US)
            .args(["create", "offer", "-s", "bikes", "-t", "Vintage racer frame", "--price", "80"]),
    )["id"]
        .as_str()
        .expect("id")
        .to_string();
    as_user(dir.path(), "alice")
        .env("MARKET_NOW_US", LONG_AGO_US)
        .args(["close", &id])
        .assert()
        .success();

    let err = error_of(as_user(dir.path(), "alice").args(["open", &id]));
    assert!(err["message"].as_str().is_some_and(|m| m.contains("too old")));
}

#[test]
fn moderator_delete_and_undelete() {
    let dir = setup();
    let id = create_offer(dir.path(), "alice", "Kids bike with training wheels", "45");

    as_moderator(dir.path())
        .args(["delete", &id, "--reason", "duplicate"])
        .assert()
        .success();
    let err = error_of(as_user(dir.path(), "bob").args(["show", &id]));
    assert_eq!(err["status"], "NOT_FOUND");

    let seen = json_of(as_moderator(dir.path()).args(["show", &id]));
    assert_eq!(seen["st"], "DELETED");
    assert_eq!(seen["del_reason"], "duplicate");

    as_moderator(dir.path()).args(["undelete", &id]).assert().success();
    assert_eq!(show(dir.path(), "bob", &id)["st"], "OPEN");
}

#[test]
fn edits_are_kept_in_history() {
    let dir = setup();
    let id = json_of(
        as_user(dir.path(), "alice")
            .env("MARKET_NOW_US", LONG_AGO_US)
            .args(["create", "offer", "-s", "bikes", "-t", "Mountain bike, 21 gears", "--price", "400"]),
    )["id"]
        .as_str()
        .expect("id")
        .to_string();

    // A day later, outside the grace period that swallows quick fixes.
    as_user(dir.path(), "alice")
        .env("MARKET_NOW_US", A_DAY_LATER_US)
        .args(["edit", &id, "--price", "350"])
        .assert()
        .success();

    let item = show(dir.path(), "alice", &id);
    assert_eq!(item["edit_count"], 1);

    let history = json_of(as_user(dir.path(), "alice").args(["history", &id]));
    assert_eq!(history.as_array().map(Vec::len), Some(1));

    let err = error_of(as_user(dir.path(), "bob").args(["history", &id]));
    assert_eq!(err["status"], "FORBIDDEN");
}

// ---------------------------------------------------------------------------
// Search and visibility
// ---------------------------------------------------------------------------

#[test]
fn search_finds_listing_after_jobs_drain() {
    let dir = setup();
    let id = create_offer(dir.path(), "alice", "Cargo bike for two kids", "1500");
    create_offer(dir.path(), "alice", "Road bike helmet", "30");

    let hits = json_of(as_user(dir.path(), "bob").args(["search", "cargo"]));
    let hits = hits.as_array().expect("hit array");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["item"]["id"], id.as_str());

    let cheap = json_of(as_user(dir.path(), "bob").args(["search", "bike", "--max-price", "100"]));
    assert_eq!(cheap.as_array().map(Vec::len), Some(1));
}

#[test]
fn deferred_jobs_stay_queued() {
    let dir = setup();
    create_offer(dir.path(), "alice", "Unicycle, good condition", "60");
    as_user(dir.path(), "alice")
        .args(["--defer-jobs", "create", "offer", "-s", "bikes", "-t", "Tandem, needs work", "--price", "90"])
        .assert()
        .success();

    let queue = json_of(mkt_cmd(dir.path()).args(["jobs", "list", "--defer-jobs"]));
    assert!(queue.as_array().is_some_and(|q| !q.is_empty()));

    let hits = json_of(mkt_cmd(dir.path()).args(["search", "tandem", "--defer-jobs"]));
    assert_eq!(hits.as_array().map(Vec::len), Some(0));

    mkt_cmd(dir.path()).args(["jobs", "run"]).assert().success();
    let hits = json_of(mkt_cmd(dir.path()).args(["search", "tandem"]));
    assert_eq!(hits.as_array().map(Vec::len), Some(1));
}

#[test]
fn hellbanned_listings_are_hidden_from_others() {
    let dir = setup();
    let id = json_of(as_user(dir.path(), "troll").args([
        "--hellbanned", "create", "offer", "-s", "bikes", "-t", "Totally real bike deal", "--price", "1",
    ]))["id"]
        .as_str()
        .expect("id")
        .to_string();

    assert_eq!(
        json_of(as_user(dir.path(), "troll").args(["--hellbanned", "show", &id]))["st"],
        "OPEN"
    );

    let err = error_of(as_user(dir.path(), "bob").args(["show", &id]));
    assert_eq!(err["status"], "NOT_FOUND");
    let page = json_of(as_user(dir.path(), "bob").args(["list", "-s", "bikes"]));
    assert_eq!(page["total"], 0);

    let seen = json_of(as_moderator(dir.path()).args(["show", &id]));
    assert_eq!(seen["st"], "HB");
    assert_eq!(seen["ste"], "OPEN");
}
