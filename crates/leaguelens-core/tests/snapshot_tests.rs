// Integration tests for snapshot import and the SQLite store.
//
// Loads the CSV fixture league, writes it to an in-memory database and reads
// it back through the `LeagueStore` trait the metrics engine uses.

use std::path::PathBuf;

use leaguelens_core::db::Database;
use leaguelens_core::import::load_snapshot_dir;
use leaguelens_core::store::LeagueStore;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/league")
}

fn imported() -> Database {
    let snapshot = load_snapshot_dir(&fixture_dir()).expect("fixture league should load");
    let db = Database::open(":memory:").unwrap();
    db.import_snapshot(&snapshot).unwrap();
    db
}

#[test]
fn fixture_round_trips_through_the_store() {
    let snapshot = load_snapshot_dir(&fixture_dir()).unwrap();
    let db = imported();

    assert_eq!(db.managers().unwrap().len(), snapshot.managers.len());
    assert_eq!(db.roster_weeks().unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(db.matchups().unwrap().len(), snapshot.matchups.len());
    assert_eq!(db.schedule().unwrap().len(), 4);
    assert_eq!(db.draft_picks().unwrap().len(), 12);
}

#[test]
fn unplayed_matchups_survive_import_as_incomplete() {
    let db = imported();
    let matchups = db.matchups().unwrap();
    let completed = matchups.iter().filter(|m| m.is_completed()).count();
    assert_eq!(completed, 8);
    assert!(matchups
        .iter()
        .filter(|m| m.week >= 5)
        .all(|m| m.score_a.is_none() && m.score_b.is_none()));
}

#[test]
fn faab_adds_only_include_paid_adds() {
    let db = imported();
    let adds = db.faab_adds().unwrap();
    let ids: Vec<&str> = adds.iter().map(|t| t.tx_id.as_str()).collect();
    assert_eq!(ids, vec!["tx-101", "tx-102"]);
}

#[test]
fn waiver_pickup_history_starts_after_the_add() {
    let db = imported();
    let history = db.roster_history("m1", "p13").unwrap();
    let weeks: Vec<u32> = history.iter().map(|r| r.week).collect();
    assert_eq!(weeks, vec![2, 3, 4]);
    assert!(!history[0].started);
    assert!(history[1].started);

    let points = db.player_points("p13", &weeks).unwrap();
    assert_eq!(points.len(), 3);
}

#[test]
fn players_keep_flex_eligibility() {
    let db = imported();
    let players = db.players_by_id(&["p2".to_string()]).unwrap();
    assert_eq!(players.len(), 1);
    assert!(players[0].eligible_positions.contains("RB"));
    assert!(players[0].eligible_positions.contains("W/R/T"));
}

#[test]
fn reimporting_the_same_snapshot_is_idempotent() {
    let snapshot = load_snapshot_dir(&fixture_dir()).unwrap();
    let db = imported();
    db.import_snapshot(&snapshot).unwrap();

    assert_eq!(db.managers().unwrap().len(), 4);
    assert_eq!(db.roster_for(1, "m1").unwrap().len(), 3);
    assert_eq!(db.roster_for(3, "m1").unwrap().len(), 4);
}
