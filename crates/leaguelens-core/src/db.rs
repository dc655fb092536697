// SQLite persistence layer for league snapshots and derived metrics.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::model::{
    AcquisitionRoi, CostSource, DraftPick, ExpectedWin, LineupEfficiency, Manager, Matchup,
    Player, PlayerId, PlayoffOdds, RosterEntry, ScheduledMatchup, Snapshot, StandingsRow,
    Transaction, TransactionType, Week,
};
use crate::store::{LeagueStore, MetricsSink};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS managers (
        manager_id TEXT PRIMARY KEY,
        team_name  TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS players (
        player_id          TEXT PRIMARY KEY,
        name               TEXT NOT NULL,
        position_type      TEXT NOT NULL,
        eligible_positions TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS rosters (
        week       INTEGER NOT NULL,
        manager_id TEXT NOT NULL,
        player_id  TEXT NOT NULL,
        slot       TEXT NOT NULL,
        started    INTEGER NOT NULL,
        PRIMARY KEY (week, manager_id, player_id)
    );

    CREATE INDEX IF NOT EXISTS idx_rosters_manager_player
        ON rosters(manager_id, player_id, week);

    CREATE TABLE IF NOT EXISTS player_stats (
        week         INTEGER NOT NULL,
        player_id    TEXT NOT NULL,
        total_points REAL NOT NULL,
        PRIMARY KEY (week, player_id)
    );

    CREATE INDEX IF NOT EXISTS idx_player_stats_player
        ON player_stats(player_id, week);

    CREATE TABLE IF NOT EXISTS matchups (
        week    INTEGER NOT NULL,
        team_a  TEXT NOT NULL,
        team_b  TEXT NOT NULL,
        score_a REAL,
        score_b REAL,
        PRIMARY KEY (week, team_a, team_b)
    );

    CREATE TABLE IF NOT EXISTS transactions (
        tx_id      TEXT NOT NULL,
        manager_id TEXT NOT NULL,
        player_id  TEXT NOT NULL,
        type       TEXT NOT NULL,
        faab_spent INTEGER,
        timestamp  TEXT NOT NULL,
        PRIMARY KEY (tx_id, player_id)
    );

    CREATE TABLE IF NOT EXISTS draft_picks (
        manager_id TEXT NOT NULL,
        player_id  TEXT NOT NULL,
        cost       INTEGER NOT NULL,
        PRIMARY KEY (manager_id, player_id)
    );

    CREATE TABLE IF NOT EXISTS schedule (
        week   INTEGER NOT NULL,
        team_a TEXT NOT NULL,
        team_b TEXT NOT NULL,
        PRIMARY KEY (week, team_a, team_b)
    );

    CREATE TABLE IF NOT EXISTS lineup_efficiency (
        week        INTEGER NOT NULL,
        manager_id  TEXT NOT NULL,
        actual_pts  REAL NOT NULL,
        optimal_pts REAL NOT NULL,
        regret      REAL NOT NULL,
        efficiency  REAL NOT NULL,
        PRIMARY KEY (week, manager_id)
    );

    CREATE TABLE IF NOT EXISTS expected_wins (
        week       INTEGER NOT NULL,
        manager_id TEXT NOT NULL,
        p_win      REAL NOT NULL,
        cum_xw     REAL NOT NULL,
        PRIMARY KEY (week, manager_id)
    );

    CREATE TABLE IF NOT EXISTS faab_roi (
        tx_id                   TEXT NOT NULL,
        manager_id              TEXT NOT NULL,
        player_id               TEXT NOT NULL,
        faab_spent              INTEGER NOT NULL,
        pts_all                 REAL NOT NULL,
        pts_starting            REAL NOT NULL,
        pts_per_dollar_all      REAL NOT NULL,
        pts_per_dollar_starting REAL NOT NULL,
        start_week              INTEGER NOT NULL,
        end_week                INTEGER NOT NULL,
        PRIMARY KEY (tx_id, player_id)
    );

    CREATE TABLE IF NOT EXISTS draft_roi (
        manager_id              TEXT NOT NULL,
        player_id               TEXT NOT NULL,
        draft_cost              INTEGER NOT NULL,
        pts_all                 REAL NOT NULL,
        pts_starting            REAL NOT NULL,
        pts_per_dollar_all      REAL NOT NULL,
        pts_per_dollar_starting REAL NOT NULL,
        start_week              INTEGER NOT NULL,
        end_week                INTEGER NOT NULL,
        PRIMARY KEY (manager_id, player_id)
    );

    CREATE TABLE IF NOT EXISTS standings (
        week       INTEGER NOT NULL,
        manager_id TEXT NOT NULL,
        cum_wins   REAL NOT NULL,
        cum_losses REAL NOT NULL,
        cum_pf     REAL NOT NULL,
        rank       INTEGER NOT NULL,
        PRIMARY KEY (week, manager_id)
    );

    CREATE TABLE IF NOT EXISTS playoff_odds (
        manager_id TEXT PRIMARY KEY,
        p_playoff  REAL NOT NULL,
        p_bye      REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS app_state (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// SQLite-backed store for the league snapshot (inputs) and the derived
/// metric tables (outputs).
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(SCHEMA)
            .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Load every input table of `snapshot` in a single transaction.
    /// Rows are upserted by their natural key, so re-importing a newer
    /// snapshot of the same season overwrites in place.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin import transaction")?;

        for m in &snapshot.managers {
            tx.execute(
                "INSERT INTO managers (manager_id, team_name) VALUES (?1, ?2)
                 ON CONFLICT(manager_id) DO UPDATE SET team_name = excluded.team_name",
                params![m.manager_id, m.team_name],
            )
            .context("failed to upsert manager")?;
        }

        for p in &snapshot.players {
            let eligible_json = serde_json::to_string(&p.eligible_positions)
                .context("failed to serialize eligible_positions")?;
            tx.execute(
                "INSERT INTO players (player_id, name, position_type, eligible_positions)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(player_id) DO UPDATE SET
                    name               = excluded.name,
                    position_type      = excluded.position_type,
                    eligible_positions = excluded.eligible_positions",
                params![p.player_id, p.name, p.position_type, eligible_json],
            )
            .context("failed to upsert player")?;
        }

        for r in &snapshot.rosters {
            tx.execute(
                "INSERT OR REPLACE INTO rosters (week, manager_id, player_id, slot, started)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![r.week, r.manager_id, r.player_id, r.slot, r.started],
            )
            .context("failed to insert roster row")?;
        }

        for s in &snapshot.player_stats {
            tx.execute(
                "INSERT OR REPLACE INTO player_stats (week, player_id, total_points)
                 VALUES (?1, ?2, ?3)",
                params![s.week, s.player_id, s.total_points],
            )
            .context("failed to insert player stat line")?;
        }

        for m in &snapshot.matchups {
            tx.execute(
                "INSERT OR REPLACE INTO matchups (week, team_a, team_b, score_a, score_b)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![m.week, m.team_a, m.team_b, m.score_a, m.score_b],
            )
            .context("failed to insert matchup")?;
        }

        for t in &snapshot.transactions {
            tx.execute(
                "INSERT OR REPLACE INTO transactions
                    (tx_id, manager_id, player_id, type, faab_spent, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    t.tx_id,
                    t.manager_id,
                    t.player_id,
                    t.tx_type.as_str(),
                    t.faab_spent,
                    t.timestamp.to_rfc3339(),
                ],
            )
            .context("failed to insert transaction")?;
        }

        for d in &snapshot.draft_picks {
            tx.execute(
                "INSERT OR REPLACE INTO draft_picks (manager_id, player_id, cost)
                 VALUES (?1, ?2, ?3)",
                params![d.manager_id, d.player_id, d.cost],
            )
            .context("failed to insert draft pick")?;
        }

        for s in &snapshot.schedule {
            tx.execute(
                "INSERT OR REPLACE INTO schedule (week, team_a, team_b) VALUES (?1, ?2, ?3)",
                params![s.week, s.team_a, s.team_b],
            )
            .context("failed to insert schedule row")?;
        }

        tx.commit().context("failed to commit snapshot import")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`. Returns `None` if the key
    /// does not exist.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let json_str: Option<String> = conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query app state")?;

        match json_str {
            Some(s) => {
                let value =
                    serde_json::from_str(&s).context("failed to deserialize state value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Derived-table readers (reporting side)
    // ------------------------------------------------------------------

    pub fn load_lineup_efficiency(&self) -> Result<Vec<LineupEfficiency>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT week, manager_id, actual_pts, optimal_pts, regret, efficiency
                 FROM lineup_efficiency ORDER BY week, manager_id",
            )
            .context("failed to prepare lineup_efficiency query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LineupEfficiency {
                    week: row.get(0)?,
                    manager_id: row.get(1)?,
                    actual_pts: row.get(2)?,
                    optimal_pts: row.get(3)?,
                    regret: row.get(4)?,
                    efficiency: row.get(5)?,
                })
            })
            .context("failed to query lineup_efficiency")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map lineup_efficiency rows")?;
        Ok(rows)
    }

    pub fn load_expected_wins(&self) -> Result<Vec<ExpectedWin>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT week, manager_id, p_win, cum_xw
                 FROM expected_wins ORDER BY week, manager_id",
            )
            .context("failed to prepare expected_wins query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ExpectedWin {
                    week: row.get(0)?,
                    manager_id: row.get(1)?,
                    p_win: row.get(2)?,
                    cum_xw: row.get(3)?,
                })
            })
            .context("failed to query expected_wins")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map expected_wins rows")?;
        Ok(rows)
    }

    pub fn load_acquisition_roi(&self, source: CostSource) -> Result<Vec<AcquisitionRoi>> {
        let conn = self.conn();
        let sql = match source {
            CostSource::Faab => {
                "SELECT tx_id, manager_id, player_id, faab_spent, pts_all, pts_starting,
                        pts_per_dollar_all, pts_per_dollar_starting, start_week, end_week
                 FROM faab_roi ORDER BY manager_id, player_id, tx_id"
            }
            CostSource::Draft => {
                "SELECT NULL, manager_id, player_id, draft_cost, pts_all, pts_starting,
                        pts_per_dollar_all, pts_per_dollar_starting, start_week, end_week
                 FROM draft_roi ORDER BY manager_id, player_id"
            }
        };
        let mut stmt = conn.prepare(sql).context("failed to prepare roi query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AcquisitionRoi {
                    source,
                    tx_id: row.get(0)?,
                    manager_id: row.get(1)?,
                    player_id: row.get(2)?,
                    cost: row.get(3)?,
                    pts_all: row.get(4)?,
                    pts_starting: row.get(5)?,
                    pts_per_cost_all: row.get(6)?,
                    pts_per_cost_starting: row.get(7)?,
                    window_start: row.get(8)?,
                    window_end: row.get(9)?,
                })
            })
            .context("failed to query roi table")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map roi rows")?;
        Ok(rows)
    }

    pub fn load_playoff_odds(&self) -> Result<Vec<PlayoffOdds>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT manager_id, p_playoff, p_bye FROM playoff_odds
                 ORDER BY p_playoff DESC, manager_id",
            )
            .context("failed to prepare playoff_odds query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PlayoffOdds {
                    manager_id: row.get(0)?,
                    p_playoff: row.get(1)?,
                    p_bye: row.get(2)?,
                })
            })
            .context("failed to query playoff_odds")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map playoff_odds rows")?;
        Ok(rows)
    }

    pub fn load_standings(&self) -> Result<Vec<StandingsRow>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT week, manager_id, cum_wins, cum_losses, cum_pf, rank
                 FROM standings ORDER BY week, rank",
            )
            .context("failed to prepare standings query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StandingsRow {
                    week: row.get(0)?,
                    manager_id: row.get(1)?,
                    cum_wins: row.get(2)?,
                    cum_losses: row.get(3)?,
                    cum_pf: row.get(4)?,
                    rank: row.get(5)?,
                })
            })
            .context("failed to query standings")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map standings rows")?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn roster_from_row(row: &Row<'_>) -> rusqlite::Result<RosterEntry> {
    Ok(RosterEntry {
        week: row.get(0)?,
        manager_id: row.get(1)?,
        player_id: row.get(2)?,
        slot: row.get(3)?,
        started: row.get(4)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let type_str: String = row.get(3)?;
    let tx_type = TransactionType::from_str_type(&type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown transaction type `{type_str}`").into(),
        )
    })?;
    let ts_str: String = row.get(5)?;
    let timestamp = DateTime::parse_from_rfc3339(&ts_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    Ok(Transaction {
        tx_id: row.get(0)?,
        manager_id: row.get(1)?,
        player_id: row.get(2)?,
        tx_type,
        faab_spent: row.get(4)?,
        timestamp,
    })
}

/// `?1, ?2, ..., ?n`
fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// LeagueStore
// ---------------------------------------------------------------------------

impl LeagueStore for Database {
    fn managers(&self) -> Result<Vec<Manager>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT manager_id, team_name FROM managers ORDER BY manager_id")
            .context("failed to prepare managers query")?;
        let managers = stmt
            .query_map([], |row| {
                Ok(Manager {
                    manager_id: row.get(0)?,
                    team_name: row.get(1)?,
                })
            })
            .context("failed to query managers")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map manager rows")?;
        Ok(managers)
    }

    fn players_by_id(&self, ids: &[PlayerId]) -> Result<Vec<Player>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let sql = format!(
            "SELECT player_id, name, position_type, eligible_positions
             FROM players WHERE player_id IN ({}) ORDER BY player_id",
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql).context("failed to prepare players query")?;
        let players = stmt
            .query_map(params_from_iter(ids.iter()), |row| {
                let eligible_json: String = row.get(3)?;
                let eligible_positions: BTreeSet<String> = serde_json::from_str(&eligible_json)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?;
                Ok(Player {
                    player_id: row.get(0)?,
                    name: row.get(1)?,
                    position_type: row.get(2)?,
                    eligible_positions,
                })
            })
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;
        Ok(players)
    }

    fn roster_weeks(&self) -> Result<Vec<Week>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT DISTINCT week FROM rosters ORDER BY week")
            .context("failed to prepare roster weeks query")?;
        let weeks = stmt
            .query_map([], |row| row.get(0))
            .context("failed to query roster weeks")?
            .collect::<std::result::Result<Vec<Week>, _>>()
            .context("failed to map roster weeks")?;
        Ok(weeks)
    }

    fn roster_for(&self, week: Week, manager_id: &str) -> Result<Vec<RosterEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT week, manager_id, player_id, slot, started FROM rosters
                 WHERE week = ?1 AND manager_id = ?2 ORDER BY player_id",
            )
            .context("failed to prepare roster query")?;
        let rows = stmt
            .query_map(params![week, manager_id], roster_from_row)
            .context("failed to query roster")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map roster rows")?;
        Ok(rows)
    }

    fn roster_history(&self, manager_id: &str, player_id: &str) -> Result<Vec<RosterEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT week, manager_id, player_id, slot, started FROM rosters
                 WHERE manager_id = ?1 AND player_id = ?2 ORDER BY week",
            )
            .context("failed to prepare roster history query")?;
        let rows = stmt
            .query_map(params![manager_id, player_id], roster_from_row)
            .context("failed to query roster history")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map roster history rows")?;
        Ok(rows)
    }

    fn week_points(&self, week: Week) -> Result<HashMap<PlayerId, f64>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT player_id, total_points FROM player_stats WHERE week = ?1")
            .context("failed to prepare week points query")?;
        let points = stmt
            .query_map(params![week], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("failed to query week points")?
            .collect::<std::result::Result<HashMap<PlayerId, f64>, _>>()
            .context("failed to map week points")?;
        Ok(points)
    }

    fn player_points(&self, player_id: &str, weeks: &[Week]) -> Result<HashMap<Week, f64>> {
        if weeks.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn();
        let sql = format!(
            "SELECT week, total_points FROM player_stats
             WHERE player_id = ?1 AND week IN ({})",
            (2..weeks.len() + 2)
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(weeks.len() + 1);
        values.push(player_id.to_string().into());
        values.extend(weeks.iter().map(|&w| rusqlite::types::Value::from(w as i64)));

        let mut stmt = conn.prepare(&sql).context("failed to prepare player points query")?;
        let points = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .context("failed to query player points")?
            .collect::<std::result::Result<HashMap<Week, f64>, _>>()
            .context("failed to map player points")?;
        Ok(points)
    }

    fn matchups(&self) -> Result<Vec<Matchup>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT week, team_a, team_b, score_a, score_b FROM matchups
                 ORDER BY week, team_a, team_b",
            )
            .context("failed to prepare matchups query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Matchup {
                    week: row.get(0)?,
                    team_a: row.get(1)?,
                    team_b: row.get(2)?,
                    score_a: row.get(3)?,
                    score_b: row.get(4)?,
                })
            })
            .context("failed to query matchups")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map matchup rows")?;
        Ok(rows)
    }

    fn faab_adds(&self) -> Result<Vec<Transaction>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT tx_id, manager_id, player_id, type, faab_spent, timestamp
                 FROM transactions
                 WHERE type = 'add' AND faab_spent IS NOT NULL
                 ORDER BY timestamp, tx_id",
            )
            .context("failed to prepare faab adds query")?;
        let rows = stmt
            .query_map([], transaction_from_row)
            .context("failed to query faab adds")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map transaction rows")?;
        Ok(rows)
    }

    fn draft_picks(&self) -> Result<Vec<DraftPick>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT manager_id, player_id, cost FROM draft_picks
                 ORDER BY manager_id, player_id",
            )
            .context("failed to prepare draft picks query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DraftPick {
                    manager_id: row.get(0)?,
                    player_id: row.get(1)?,
                    cost: row.get(2)?,
                })
            })
            .context("failed to query draft picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft pick rows")?;
        Ok(rows)
    }

    fn schedule(&self) -> Result<Vec<ScheduledMatchup>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT week, team_a, team_b FROM schedule ORDER BY week, team_a")
            .context("failed to prepare schedule query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ScheduledMatchup {
                    week: row.get(0)?,
                    team_a: row.get(1)?,
                    team_b: row.get(2)?,
                })
            })
            .context("failed to query schedule")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map schedule rows")?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// MetricsSink
// ---------------------------------------------------------------------------

impl Database {
    /// Clear `table` and insert `records` inside one transaction, so readers
    /// see either the previous output or the new one in full.
    fn replace_table<T>(
        &self,
        table: &str,
        records: &[T],
        insert: impl Fn(&Connection, &T) -> Result<()>,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute(&format!("DELETE FROM {table}"), [])
            .with_context(|| format!("failed to clear {table}"))?;
        for record in records {
            insert(&*tx, record)?;
        }
        tx.commit().with_context(|| format!("failed to commit {table}"))?;
        Ok(())
    }
}

fn insert_lineup_efficiency(conn: &Connection, r: &LineupEfficiency) -> Result<()> {
    conn.execute(
        "INSERT INTO lineup_efficiency
            (week, manager_id, actual_pts, optimal_pts, regret, efficiency)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(week, manager_id) DO UPDATE SET
            actual_pts  = excluded.actual_pts,
            optimal_pts = excluded.optimal_pts,
            regret      = excluded.regret,
            efficiency  = excluded.efficiency",
        params![
            r.week,
            r.manager_id,
            r.actual_pts,
            r.optimal_pts,
            r.regret,
            r.efficiency
        ],
    )
    .context("failed to upsert lineup efficiency")?;
    Ok(())
}

fn insert_expected_win(conn: &Connection, r: &ExpectedWin) -> Result<()> {
    conn.execute(
        "INSERT INTO expected_wins (week, manager_id, p_win, cum_xw)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(week, manager_id) DO UPDATE SET
            p_win  = excluded.p_win,
            cum_xw = excluded.cum_xw",
        params![r.week, r.manager_id, r.p_win, r.cum_xw],
    )
    .context("failed to upsert expected win")?;
    Ok(())
}

fn insert_faab_roi(conn: &Connection, r: &AcquisitionRoi) -> Result<()> {
    let tx_id = r
        .tx_id
        .as_deref()
        .context("FAAB ROI record is missing its transaction id")?;
    conn.execute(
        "INSERT INTO faab_roi
            (tx_id, manager_id, player_id, faab_spent, pts_all, pts_starting,
             pts_per_dollar_all, pts_per_dollar_starting, start_week, end_week)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(tx_id, player_id) DO UPDATE SET
            manager_id              = excluded.manager_id,
            faab_spent              = excluded.faab_spent,
            pts_all                 = excluded.pts_all,
            pts_starting            = excluded.pts_starting,
            pts_per_dollar_all      = excluded.pts_per_dollar_all,
            pts_per_dollar_starting = excluded.pts_per_dollar_starting,
            start_week              = excluded.start_week,
            end_week                = excluded.end_week",
        params![
            tx_id,
            r.manager_id,
            r.player_id,
            r.cost,
            r.pts_all,
            r.pts_starting,
            r.pts_per_cost_all,
            r.pts_per_cost_starting,
            r.window_start,
            r.window_end,
        ],
    )
    .context("failed to upsert faab roi")?;
    Ok(())
}

fn insert_draft_roi(conn: &Connection, r: &AcquisitionRoi) -> Result<()> {
    conn.execute(
        "INSERT INTO draft_roi
            (manager_id, player_id, draft_cost, pts_all, pts_starting,
             pts_per_dollar_all, pts_per_dollar_starting, start_week, end_week)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(manager_id, player_id) DO UPDATE SET
            draft_cost              = excluded.draft_cost,
            pts_all                 = excluded.pts_all,
            pts_starting            = excluded.pts_starting,
            pts_per_dollar_all      = excluded.pts_per_dollar_all,
            pts_per_dollar_starting = excluded.pts_per_dollar_starting,
            start_week              = excluded.start_week,
            end_week                = excluded.end_week",
        params![
            r.manager_id,
            r.player_id,
            r.cost,
            r.pts_all,
            r.pts_starting,
            r.pts_per_cost_all,
            r.pts_per_cost_starting,
            r.window_start,
            r.window_end,
        ],
    )
    .context("failed to upsert draft roi")?;
    Ok(())
}

fn insert_standings(conn: &Connection, r: &StandingsRow) -> Result<()> {
    conn.execute(
        "INSERT INTO standings (week, manager_id, cum_wins, cum_losses, cum_pf, rank)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(week, manager_id) DO UPDATE SET
            cum_wins   = excluded.cum_wins,
            cum_losses = excluded.cum_losses,
            cum_pf     = excluded.cum_pf,
            rank       = excluded.rank",
        params![r.week, r.manager_id, r.cum_wins, r.cum_losses, r.cum_pf, r.rank],
    )
    .context("failed to upsert standings row")?;
    Ok(())
}

impl MetricsSink for Database {
    fn replace_lineup_efficiency(&self, records: &[LineupEfficiency]) -> Result<()> {
        self.replace_table("lineup_efficiency", records, insert_lineup_efficiency)
    }

    fn replace_expected_wins(&self, records: &[ExpectedWin]) -> Result<()> {
        self.replace_table("expected_wins", records, insert_expected_win)
    }

    fn replace_acquisition_roi(
        &self,
        source: CostSource,
        records: &[AcquisitionRoi],
    ) -> Result<()> {
        if let Some(r) = records.iter().find(|r| r.source != source) {
            bail!(
                "{} ROI record for {}/{} passed to the {} table",
                r.source.as_str(),
                r.manager_id,
                r.player_id,
                source.as_str()
            );
        }
        match source {
            CostSource::Faab => self.replace_table("faab_roi", records, insert_faab_roi),
            CostSource::Draft => self.replace_table("draft_roi", records, insert_draft_roi),
        }
    }

    fn replace_standings(&self, rows: &[StandingsRow]) -> Result<()> {
        self.replace_table("standings", rows, insert_standings)
    }

    fn replace_playoff_odds(&self, odds: &[PlayoffOdds]) -> Result<()> {
        self.replace_table("playoff_odds", odds, |conn, o| {
            conn.execute(
                "INSERT INTO playoff_odds (manager_id, p_playoff, p_bye) VALUES (?1, ?2, ?3)",
                params![o.manager_id, o.p_playoff, o.p_bye],
            )
            .context("failed to insert playoff odds")?;
            Ok(())
        })
    }

    /// Uses INSERT OR REPLACE so repeated saves overwrite the previous value.
    fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO app_state (key, value) VALUES (?1, ?2)",
                params![key, json_str],
            )
            .context("failed to save state")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayerStatLine;
    use chrono::TimeZone;
    use serde_json::json;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn roster(week: Week, manager: &str, player: &str, slot: &str, started: bool) -> RosterEntry {
        RosterEntry {
            week,
            manager_id: manager.into(),
            player_id: player.into(),
            slot: slot.into(),
            started,
        }
    }

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            managers: vec![
                Manager {
                    manager_id: "m1".into(),
                    team_name: "Gridiron Gang".into(),
                },
                Manager {
                    manager_id: "m2".into(),
                    team_name: "Fourth and Long".into(),
                },
            ],
            players: vec![Player {
                player_id: "p1".into(),
                name: "Rowan Hale".into(),
                position_type: "O".into(),
                eligible_positions: ["RB", "W/R/T"].iter().map(|s| s.to_string()).collect(),
            }],
            rosters: vec![
                roster(2, "m1", "p1", "RB", true),
                roster(1, "m1", "p1", "BN", false),
            ],
            player_stats: vec![
                PlayerStatLine {
                    week: 1,
                    player_id: "p1".into(),
                    total_points: 7.5,
                },
                PlayerStatLine {
                    week: 2,
                    player_id: "p1".into(),
                    total_points: 21.0,
                },
            ],
            matchups: vec![Matchup {
                week: 1,
                team_a: "m1".into(),
                team_b: "m2".into(),
                score_a: Some(101.5),
                score_b: None,
            }],
            transactions: vec![Transaction {
                tx_id: "tx1".into(),
                manager_id: "m1".into(),
                player_id: "p1".into(),
                tx_type: TransactionType::Add,
                faab_spent: Some(12),
                timestamp: Utc.with_ymd_and_hms(2025, 9, 10, 8, 0, 0).unwrap(),
            }],
            draft_picks: vec![DraftPick {
                manager_id: "m2".into(),
                player_id: "p1".into(),
                cost: 30,
            }],
            schedule: vec![ScheduledMatchup {
                week: 2,
                team_a: "m1".into(),
                team_b: "m2".into(),
            }],
        }
    }

    #[test]
    fn import_then_read_back_inputs() {
        let db = test_db();
        db.import_snapshot(&sample_snapshot()).unwrap();

        let managers = db.managers().unwrap();
        assert_eq!(managers.len(), 2);
        assert_eq!(managers[0].team_name, "Gridiron Gang");

        let players = db
            .players_by_id(&["p1".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(players.len(), 1);
        assert!(players[0].eligible_positions.contains("W/R/T"));

        assert_eq!(db.roster_weeks().unwrap(), vec![1, 2]);
        assert_eq!(db.roster_for(2, "m1").unwrap().len(), 1);
        assert!(db.roster_for(2, "m2").unwrap().is_empty());

        let history = db.roster_history("m1", "p1").unwrap();
        assert_eq!(history.iter().map(|r| r.week).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!history[0].started);

        let matchups = db.matchups().unwrap();
        assert_eq!(matchups[0].score_a, Some(101.5));
        assert_eq!(matchups[0].score_b, None);

        let adds = db.faab_adds().unwrap();
        assert_eq!(adds.len(), 1);
        assert_eq!(adds[0].faab_spent, Some(12));
        assert_eq!(adds[0].timestamp, Utc.with_ymd_and_hms(2025, 9, 10, 8, 0, 0).unwrap());

        assert_eq!(db.draft_picks().unwrap()[0].cost, 30);
        assert_eq!(db.schedule().unwrap().len(), 1);
    }

    #[test]
    fn player_points_only_returns_requested_weeks() {
        let db = test_db();
        db.import_snapshot(&sample_snapshot()).unwrap();

        let points = db.player_points("p1", &[2, 3]).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[&2], 21.0);
        assert!(db.player_points("p1", &[]).unwrap().is_empty());

        let week1 = db.week_points(1).unwrap();
        assert_eq!(week1["p1"], 7.5);
    }

    #[test]
    fn faab_adds_excludes_drops_and_free_adds() {
        let db = test_db();
        let mut snapshot = sample_snapshot();
        let base = snapshot.transactions[0].clone();
        snapshot.transactions.push(Transaction {
            tx_id: "tx2".into(),
            faab_spent: None,
            ..base.clone()
        });
        snapshot.transactions.push(Transaction {
            tx_id: "tx3".into(),
            tx_type: TransactionType::Drop,
            ..base
        });
        db.import_snapshot(&snapshot).unwrap();

        let adds = db.faab_adds().unwrap();
        assert_eq!(adds.len(), 1);
        assert_eq!(adds[0].tx_id, "tx1");
    }

    #[test]
    fn reimport_overwrites_by_natural_key() {
        let db = test_db();
        let mut snapshot = sample_snapshot();
        db.import_snapshot(&snapshot).unwrap();

        snapshot.matchups[0].score_b = Some(99.0);
        snapshot.managers[0].team_name = "Renamed".into();
        db.import_snapshot(&snapshot).unwrap();

        assert_eq!(db.matchups().unwrap().len(), 1);
        assert_eq!(db.matchups().unwrap()[0].score_b, Some(99.0));
        assert_eq!(db.managers().unwrap()[0].team_name, "Renamed");
    }

    fn efficiency(week: Week, actual: f64, optimal: f64) -> LineupEfficiency {
        LineupEfficiency {
            week,
            manager_id: "m1".into(),
            actual_pts: actual,
            optimal_pts: optimal,
            regret: optimal - actual,
            efficiency: actual / optimal,
        }
    }

    fn faab_roi(tx_id: &str) -> AcquisitionRoi {
        AcquisitionRoi {
            source: CostSource::Faab,
            tx_id: Some(tx_id.into()),
            manager_id: "m1".into(),
            player_id: "p1".into(),
            cost: 0,
            pts_all: 50.0,
            pts_starting: 30.0,
            pts_per_cost_all: 0.0,
            pts_per_cost_starting: 0.0,
            window_start: 2,
            window_end: 9,
        }
    }

    #[test]
    fn lineup_efficiency_replace_drops_stale_weeks() {
        let db = test_db();
        db.replace_lineup_efficiency(&[efficiency(3, 100.0, 120.0), efficiency(4, 90.0, 95.0)])
            .unwrap();
        db.replace_lineup_efficiency(&[efficiency(3, 110.0, 120.0)])
            .unwrap();

        let rows = db.load_lineup_efficiency().unwrap();
        assert_eq!(rows, vec![efficiency(3, 110.0, 120.0)]);
    }

    #[test]
    fn expected_wins_replace_drops_stale_weeks() {
        let db = test_db();
        let xw = |week: Week, cum: f64| ExpectedWin {
            week,
            manager_id: "m1".into(),
            p_win: 0.5,
            cum_xw: cum,
        };
        db.replace_expected_wins(&[xw(1, 0.5), xw(2, 1.0)]).unwrap();
        db.replace_expected_wins(&[xw(1, 0.5)]).unwrap();
        assert_eq!(db.load_expected_wins().unwrap(), vec![xw(1, 0.5)]);
    }

    #[test]
    fn roi_records_route_by_source() {
        let db = test_db();
        let faab = faab_roi("tx1");
        let draft = AcquisitionRoi {
            source: CostSource::Draft,
            tx_id: None,
            cost: 25,
            pts_per_cost_all: 2.0,
            pts_per_cost_starting: 1.2,
            window_start: 1,
            ..faab.clone()
        };
        db.replace_acquisition_roi(CostSource::Faab, &[faab.clone()])
            .unwrap();
        db.replace_acquisition_roi(CostSource::Draft, &[draft.clone()])
            .unwrap();

        let faab_rows = db.load_acquisition_roi(CostSource::Faab).unwrap();
        assert_eq!(faab_rows, vec![faab]);
        let draft_rows = db.load_acquisition_roi(CostSource::Draft).unwrap();
        assert_eq!(draft_rows, vec![draft]);
    }

    #[test]
    fn roi_replace_only_touches_its_own_source() {
        let db = test_db();
        db.replace_acquisition_roi(CostSource::Faab, &[faab_roi("tx1"), faab_roi("tx2")])
            .unwrap();
        let draft = AcquisitionRoi {
            source: CostSource::Draft,
            tx_id: None,
            ..faab_roi("unused")
        };
        db.replace_acquisition_roi(CostSource::Draft, &[draft])
            .unwrap();

        // A superseded add disappears on the next write.
        db.replace_acquisition_roi(CostSource::Faab, &[faab_roi("tx2")])
            .unwrap();
        assert_eq!(
            db.load_acquisition_roi(CostSource::Faab).unwrap(),
            vec![faab_roi("tx2")]
        );
        assert_eq!(db.load_acquisition_roi(CostSource::Draft).unwrap().len(), 1);
    }

    #[test]
    fn roi_record_for_the_wrong_table_is_rejected() {
        let db = test_db();
        db.replace_acquisition_roi(CostSource::Faab, &[faab_roi("tx1")])
            .unwrap();
        assert!(db
            .replace_acquisition_roi(CostSource::Draft, &[faab_roi("tx2")])
            .is_err());
        assert!(db.load_acquisition_roi(CostSource::Draft).unwrap().is_empty());
    }

    #[test]
    fn faab_roi_without_tx_id_is_rejected() {
        let db = test_db();
        db.replace_acquisition_roi(CostSource::Faab, &[faab_roi("tx1")])
            .unwrap();
        let record = AcquisitionRoi {
            tx_id: None,
            ..faab_roi("tx2")
        };
        assert!(db
            .replace_acquisition_roi(CostSource::Faab, &[record])
            .is_err());
        // The failed write rolls back, keeping the previous table.
        assert_eq!(
            db.load_acquisition_roi(CostSource::Faab).unwrap(),
            vec![faab_roi("tx1")]
        );
    }

    #[test]
    fn standings_replace_drops_stale_rows() {
        let db = test_db();
        let row = |week: Week, rank: u32| StandingsRow {
            week,
            manager_id: "m1".into(),
            cum_wins: 1.0,
            cum_losses: 0.0,
            cum_pf: 100.0,
            rank,
        };
        db.replace_standings(&[row(1, 2), row(2, 1)]).unwrap();
        db.replace_standings(&[row(1, 1)]).unwrap();
        assert_eq!(db.load_standings().unwrap(), vec![row(1, 1)]);
    }

    #[test]
    fn playoff_odds_are_replaced_wholesale() {
        let db = test_db();
        let odds = |id: &str, p: f64| PlayoffOdds {
            manager_id: id.into(),
            p_playoff: p,
            p_bye: p / 2.0,
        };
        db.replace_playoff_odds(&[odds("m1", 0.8), odds("m2", 0.4)])
            .unwrap();
        db.replace_playoff_odds(&[odds("m3", 0.6)]).unwrap();

        let rows = db.load_playoff_odds().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].manager_id, "m3");
    }

    #[test]
    fn save_and_load_state() {
        let db = test_db();
        let val = json!({"week": 4, "top_scorer": {"team": "m1", "points": 151.2}});
        db.save_state("highlights:week:4", &val).unwrap();
        assert_eq!(db.load_state("highlights:week:4").unwrap(), Some(val));

        db.save_state("current_week", &json!(5)).unwrap();
        db.save_state("current_week", &json!(6)).unwrap();
        assert_eq!(db.load_state("current_week").unwrap(), Some(json!(6)));
        assert_eq!(db.load_state("missing").unwrap(), None);
    }
}
