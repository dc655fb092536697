// Data-access seams between the metrics engine and whatever holds the league.
//
// The engine only ever reads through `LeagueStore` and writes through
// `MetricsSink`; `db::Database` implements both over SQLite.

use std::collections::HashMap;

use anyhow::Result;

use crate::model::{
    AcquisitionRoi, CostSource, DraftPick, ExpectedWin, LineupEfficiency, Manager, Matchup,
    Player, PlayerId, PlayoffOdds, RosterEntry, ScheduledMatchup, StandingsRow, Transaction,
    Week,
};

/// Read access to the immutable league snapshot.
pub trait LeagueStore {
    fn managers(&self) -> Result<Vec<Manager>>;

    /// Players whose id is in `ids`. Unknown ids are silently absent.
    fn players_by_id(&self, ids: &[PlayerId]) -> Result<Vec<Player>>;

    /// Distinct weeks with at least one roster row, ascending.
    fn roster_weeks(&self) -> Result<Vec<Week>>;

    fn roster_for(&self, week: Week, manager_id: &str) -> Result<Vec<RosterEntry>>;

    /// Every week a manager rostered a player, ascending by week.
    fn roster_history(&self, manager_id: &str, player_id: &str) -> Result<Vec<RosterEntry>>;

    /// `total_points` of every player with a stat line in `week`.
    fn week_points(&self, week: Week) -> Result<HashMap<PlayerId, f64>>;

    /// One player's `total_points` for each of `weeks` that has a stat line.
    fn player_points(&self, player_id: &str, weeks: &[Week]) -> Result<HashMap<Week, f64>>;

    /// All matchups, ascending by week.
    fn matchups(&self) -> Result<Vec<Matchup>>;

    /// `add` transactions that carry a FAAB amount, ordered by timestamp.
    fn faab_adds(&self) -> Result<Vec<Transaction>>;

    fn draft_picks(&self) -> Result<Vec<DraftPick>>;

    /// Remaining (unplayed) schedule, ascending by week.
    fn schedule(&self) -> Result<Vec<ScheduledMatchup>>;
}

/// Write access to the derived-metric tables. Each method replaces one
/// computation's whole output in a single transaction, so a rerun leaves
/// exactly what a fresh computation produces.
pub trait MetricsSink {
    fn replace_lineup_efficiency(&self, records: &[LineupEfficiency]) -> Result<()>;

    fn replace_expected_wins(&self, records: &[ExpectedWin]) -> Result<()>;

    /// Replace the FAAB or draft table. Every record must carry `source`.
    fn replace_acquisition_roi(&self, source: CostSource, records: &[AcquisitionRoi])
        -> Result<()>;

    fn replace_standings(&self, rows: &[StandingsRow]) -> Result<()>;

    /// Replace the whole playoff odds table with `odds`.
    fn replace_playoff_odds(&self, odds: &[PlayoffOdds]) -> Result<()>;

    /// Persist an arbitrary JSON document under `key`.
    fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()>;
}
