// CSV snapshot loading.
//
// A snapshot directory holds one CSV per input table (managers.csv,
// players.csv, rosters.csv, player_stats.csv, matchups.csv,
// transactions.csv, draft_picks.csv and optionally schedule.csv).

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::{
    DraftPick, Manager, Matchup, Player, PlayerStatLine, RosterEntry, ScheduledMatchup, Snapshot,
    Transaction, TransactionType, Week,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawManager {
    manager_id: String,
    team_name: String,
}

/// `eligible_positions` is a `|`-separated list, e.g. `WR|W/R/T|Q/W/R/T`.
#[derive(Debug, Deserialize)]
struct RawPlayer {
    player_id: String,
    name: String,
    #[serde(default)]
    position_type: String,
    #[serde(default)]
    eligible_positions: String,
}

#[derive(Debug, Deserialize)]
struct RawRoster {
    week: Week,
    manager_id: String,
    player_id: String,
    slot: String,
    started: String,
}

#[derive(Debug, Deserialize)]
struct RawStatLine {
    week: Week,
    player_id: String,
    total_points: f64,
}

#[derive(Debug, Deserialize)]
struct RawMatchup {
    week: Week,
    team_a: String,
    team_b: String,
    score_a: Option<f64>,
    score_b: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    tx_id: String,
    manager_id: String,
    player_id: String,
    #[serde(rename = "type")]
    tx_type: String,
    faab_spent: Option<i64>,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct RawDraftPick {
    manager_id: String,
    player_id: String,
    cost: i64,
}

#[derive(Debug, Deserialize)]
struct RawScheduled {
    week: Week,
    team_a: String,
    team_b: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

/// RFC 3339, or Unix epoch seconds as some providers report them.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    s.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn split_positions(s: &str) -> BTreeSet<String> {
    s.split('|')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

fn score_ok(score: Option<f64>) -> bool {
    score.map_or(true, f64::is_finite)
}

// ---------------------------------------------------------------------------
// Reader-based loaders (private, enable testing without temp files)
// ---------------------------------------------------------------------------

fn load_managers_from_reader<R: Read>(rdr: R) -> Result<Vec<Manager>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut managers = Vec::new();
    for result in reader.deserialize::<RawManager>() {
        match result {
            Ok(raw) => managers.push(Manager {
                manager_id: raw.manager_id.trim().to_string(),
                team_name: raw.team_name.trim().to_string(),
            }),
            Err(e) => warn!("skipping malformed manager row: {}", e),
        }
    }
    Ok(managers)
}

fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<Player>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawPlayer>() {
        match result {
            Ok(raw) => players.push(Player {
                player_id: raw.player_id.trim().to_string(),
                name: raw.name.trim().to_string(),
                position_type: raw.position_type.trim().to_string(),
                eligible_positions: split_positions(&raw.eligible_positions),
            }),
            Err(e) => warn!("skipping malformed player row: {}", e),
        }
    }
    Ok(players)
}

fn load_rosters_from_reader<R: Read>(rdr: R) -> Result<Vec<RosterEntry>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawRoster>() {
        match result {
            Ok(raw) => {
                let Some(started) = parse_bool(&raw.started) else {
                    warn!(
                        "skipping roster row for '{}' week {}: bad started flag '{}'",
                        raw.player_id.trim(),
                        raw.week,
                        raw.started
                    );
                    continue;
                };
                rows.push(RosterEntry {
                    week: raw.week,
                    manager_id: raw.manager_id.trim().to_string(),
                    player_id: raw.player_id.trim().to_string(),
                    slot: raw.slot.trim().to_string(),
                    started,
                });
            }
            Err(e) => warn!("skipping malformed roster row: {}", e),
        }
    }
    Ok(rows)
}

fn load_stats_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerStatLine>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawStatLine>() {
        match result {
            Ok(raw) => {
                if !raw.total_points.is_finite() {
                    warn!(
                        "skipping stat line for '{}' week {}: non-finite total_points",
                        raw.player_id.trim(),
                        raw.week
                    );
                    continue;
                }
                rows.push(PlayerStatLine {
                    week: raw.week,
                    player_id: raw.player_id.trim().to_string(),
                    total_points: raw.total_points,
                });
            }
            Err(e) => warn!("skipping malformed stat row: {}", e),
        }
    }
    Ok(rows)
}

fn load_matchups_from_reader<R: Read>(rdr: R) -> Result<Vec<Matchup>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawMatchup>() {
        match result {
            Ok(raw) => {
                if !score_ok(raw.score_a) || !score_ok(raw.score_b) {
                    warn!(
                        "skipping matchup {} vs {} week {}: non-finite score",
                        raw.team_a.trim(),
                        raw.team_b.trim(),
                        raw.week
                    );
                    continue;
                }
                rows.push(Matchup {
                    week: raw.week,
                    team_a: raw.team_a.trim().to_string(),
                    team_b: raw.team_b.trim().to_string(),
                    score_a: raw.score_a,
                    score_b: raw.score_b,
                });
            }
            Err(e) => warn!("skipping malformed matchup row: {}", e),
        }
    }
    Ok(rows)
}

fn load_transactions_from_reader<R: Read>(rdr: R) -> Result<Vec<Transaction>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawTransaction>() {
        match result {
            Ok(raw) => {
                let Some(tx_type) = TransactionType::from_str_type(&raw.tx_type) else {
                    warn!("skipping transaction '{}': unknown type '{}'", raw.tx_id, raw.tx_type);
                    continue;
                };
                let Some(timestamp) = parse_timestamp(&raw.timestamp) else {
                    warn!(
                        "skipping transaction '{}': bad timestamp '{}'",
                        raw.tx_id, raw.timestamp
                    );
                    continue;
                };
                rows.push(Transaction {
                    tx_id: raw.tx_id.trim().to_string(),
                    manager_id: raw.manager_id.trim().to_string(),
                    player_id: raw.player_id.trim().to_string(),
                    tx_type,
                    faab_spent: raw.faab_spent,
                    timestamp,
                });
            }
            Err(e) => warn!("skipping malformed transaction row: {}", e),
        }
    }
    Ok(rows)
}

fn load_draft_from_reader<R: Read>(rdr: R) -> Result<Vec<DraftPick>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawDraftPick>() {
        match result {
            Ok(raw) => rows.push(DraftPick {
                manager_id: raw.manager_id.trim().to_string(),
                player_id: raw.player_id.trim().to_string(),
                cost: raw.cost,
            }),
            Err(e) => warn!("skipping malformed draft pick row: {}", e),
        }
    }
    Ok(rows)
}

fn load_schedule_from_reader<R: Read>(rdr: R) -> Result<Vec<ScheduledMatchup>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawScheduled>() {
        match result {
            Ok(raw) => rows.push(ScheduledMatchup {
                week: raw.week,
                team_a: raw.team_a.trim().to_string(),
                team_b: raw.team_b.trim().to_string(),
            }),
            Err(e) => warn!("skipping malformed schedule row: {}", e),
        }
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Public path-based loading
// ---------------------------------------------------------------------------

/// Open `dir/name` and hand it to `load`, attaching the path to any error.
fn load_file<T>(
    dir: &Path,
    name: &str,
    load: fn(std::fs::File) -> Result<Vec<T>, csv::Error>,
) -> Result<Vec<T>, ImportError> {
    let path = dir.join(name);
    let file = std::fs::File::open(&path).map_err(|e| ImportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load(file).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Like `load_file`, but a missing file yields an empty table.
fn load_optional_file<T>(
    dir: &Path,
    name: &str,
    load: fn(std::fs::File) -> Result<Vec<T>, csv::Error>,
) -> Result<Vec<T>, ImportError> {
    if dir.join(name).exists() {
        load_file(dir, name, load)
    } else {
        Ok(Vec::new())
    }
}

/// Load every snapshot table from `dir`.
///
/// All files except `schedule.csv` are required. Malformed rows are
/// skipped with a warning; a snapshot without managers is rejected.
pub fn load_snapshot_dir(dir: &Path) -> Result<Snapshot, ImportError> {
    let snapshot = Snapshot {
        managers: load_file(dir, "managers.csv", load_managers_from_reader)?,
        players: load_file(dir, "players.csv", load_players_from_reader)?,
        rosters: load_file(dir, "rosters.csv", load_rosters_from_reader)?,
        player_stats: load_file(dir, "player_stats.csv", load_stats_from_reader)?,
        matchups: load_file(dir, "matchups.csv", load_matchups_from_reader)?,
        transactions: load_file(dir, "transactions.csv", load_transactions_from_reader)?,
        draft_picks: load_file(dir, "draft_picks.csv", load_draft_from_reader)?,
        schedule: load_optional_file(dir, "schedule.csv", load_schedule_from_reader)?,
    };

    if snapshot.managers.is_empty() {
        return Err(ImportError::Validation(
            "managers CSV produced zero valid rows".into(),
        ));
    }

    info!(
        "loaded snapshot from {}: {} managers, {} players, {} roster rows, {} matchups, {} scheduled",
        dir.display(),
        snapshot.managers.len(),
        snapshot.players.len(),
        snapshot.rosters.len(),
        snapshot.matchups.len(),
        snapshot.schedule.len()
    );
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
