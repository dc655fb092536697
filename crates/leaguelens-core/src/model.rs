// League snapshot records (inputs) and derived metric records (outputs).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fantasy team owner's identifier (provider-assigned, e.g. `"461.l.1.t.3"`).
pub type ManagerId = String;
/// A player's identifier (provider-assigned, e.g. `"461.p.33389"`).
pub type PlayerId = String;
/// Scoring period number, starting at 1.
pub type Week = u32;

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// The slot a player occupied on a manager's roster for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub week: Week,
    pub manager_id: ManagerId,
    pub player_id: PlayerId,
    /// Literal roster position label, including bench/IR designations.
    pub slot: String,
    pub started: bool,
}

/// A player's fantasy output for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatLine {
    pub week: Week,
    pub player_id: PlayerId,
    pub total_points: f64,
}

/// A head-to-head matchup. Scores are `None` until the provider reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub week: Week,
    pub team_a: ManagerId,
    pub team_b: ManagerId,
    pub score_a: Option<f64>,
    pub score_b: Option<f64>,
}

impl Matchup {
    /// Both scores reported and at least one of them nonzero.
    pub fn is_completed(&self) -> bool {
        match (self.score_a, self.score_b) {
            (Some(a), Some(b)) => a != 0.0 || b != 0.0,
            _ => false,
        }
    }

    /// `(score_a, score_b)` for a completed matchup.
    pub fn scores(&self) -> Option<(f64, f64)> {
        if self.is_completed() {
            Some((self.score_a?, self.score_b?))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manager {
    pub manager_id: ManagerId,
    pub team_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: PlayerId,
    pub name: String,
    pub position_type: String,
    pub eligible_positions: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Add,
    Drop,
    Trade,
    Commish,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Add => "add",
            TransactionType::Drop => "drop",
            TransactionType::Trade => "trade",
            TransactionType::Commish => "commish",
        }
    }

    pub fn from_str_type(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "add" => Some(TransactionType::Add),
            "drop" => Some(TransactionType::Drop),
            "trade" => Some(TransactionType::Trade),
            "commish" => Some(TransactionType::Commish),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: String,
    pub manager_id: ManagerId,
    pub player_id: PlayerId,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub faab_spent: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Draft cost: auction dollars or pick number, whichever the league uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPick {
    pub manager_id: ManagerId,
    pub player_id: PlayerId,
    pub cost: i64,
}

/// A matchup that has not been played yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMatchup {
    pub week: Week,
    pub team_a: ManagerId,
    pub team_b: ManagerId,
}

/// Every input table of a league season, as loaded by the snapshot importer.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub managers: Vec<Manager>,
    pub players: Vec<Player>,
    pub rosters: Vec<RosterEntry>,
    pub player_stats: Vec<PlayerStatLine>,
    pub matchups: Vec<Matchup>,
    pub transactions: Vec<Transaction>,
    pub draft_picks: Vec<DraftPick>,
    pub schedule: Vec<ScheduledMatchup>,
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupEfficiency {
    pub week: Week,
    pub manager_id: ManagerId,
    pub actual_pts: f64,
    pub optimal_pts: f64,
    pub regret: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedWin {
    pub week: Week,
    pub manager_id: ManagerId,
    pub p_win: f64,
    pub cum_xw: f64,
}

/// Where an acquisition's cost comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostSource {
    Faab,
    Draft,
}

impl CostSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostSource::Faab => "faab",
            CostSource::Draft => "draft",
        }
    }

    pub fn from_str_source(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "faab" => Some(CostSource::Faab),
            "draft" => Some(CostSource::Draft),
            _ => None,
        }
    }
}

/// Points produced per unit of acquisition cost over the ownership window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRoi {
    pub source: CostSource,
    /// Transaction id for FAAB adds; `None` for draft picks.
    pub tx_id: Option<String>,
    pub manager_id: ManagerId,
    pub player_id: PlayerId,
    pub cost: i64,
    pub pts_all: f64,
    pub pts_starting: f64,
    pub pts_per_cost_all: f64,
    pub pts_per_cost_starting: f64,
    pub window_start: Week,
    pub window_end: Week,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayoffOdds {
    pub manager_id: ManagerId,
    pub p_playoff: f64,
    pub p_bye: f64,
}

/// Cumulative record for one manager through one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingsRow {
    pub week: Week,
    pub manager_id: ManagerId,
    pub cum_wins: f64,
    pub cum_losses: f64,
    pub cum_pf: f64,
    pub rank: u32,
}
