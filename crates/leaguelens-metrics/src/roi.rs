// Acquisition ROI: points produced per unit of FAAB or draft cost over the
// weeks a manager held the player.

use std::collections::{BTreeMap, HashMap, HashSet};

use leaguelens_core::config::LeagueConfig;
use leaguelens_core::model::{
    AcquisitionRoi, CostSource, ManagerId, PlayerId, RosterEntry, Transaction, Week,
};
use leaguelens_core::store::{LeagueStore, MetricsSink};
use tracing::{debug, info, warn};

use crate::error::{Cancellation, EngineResult};

/// A single acquisition to attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub source: CostSource,
    pub tx_id: Option<String>,
    pub manager_id: ManagerId,
    pub player_id: PlayerId,
    pub cost: i64,
    /// Earliest week the window may start (the transaction's week), when
    /// it can be placed in a week at all.
    pub from_week: Option<Week>,
}

/// `points / cost`, or 0 when the cost is not positive.
pub fn per_cost(points: f64, cost: i64) -> f64 {
    if cost > 0 {
        points / cost as f64
    } else {
        0.0
    }
}

/// First rostered week on or after `from_week` (or the first rostered week
/// when `from_week` is `None`).
pub fn window_start(history: &[RosterEntry], from_week: Option<Week>) -> Option<Week> {
    history
        .iter()
        .map(|r| r.week)
        .filter(|w| from_week.map_or(true, |from| *w >= from))
        .min()
}

/// Roster rows of `history` inside `[start, end]`.
pub fn window_rows(history: &[RosterEntry], start: Week, end: Week) -> Vec<&RosterEntry> {
    history
        .iter()
        .filter(|r| r.week >= start && r.week <= end)
        .collect()
}

/// Total the points of `rows` and build the ROI record. `points` maps week to
/// the player's points; weeks without a stat line count 0.
pub fn attribute(
    acquisition: &Acquisition,
    rows: &[&RosterEntry],
    points: &HashMap<Week, f64>,
    league: &LeagueConfig,
    (start, end): (Week, Week),
) -> AcquisitionRoi {
    let pts = |week: Week| points.get(&week).copied().unwrap_or(0.0);
    let pts_all: f64 = rows.iter().map(|r| pts(r.week)).sum();
    let pts_starting: f64 = rows
        .iter()
        .filter(|r| r.started && league.is_scoring_slot(&r.slot))
        .map(|r| pts(r.week))
        .sum();

    AcquisitionRoi {
        source: acquisition.source,
        tx_id: acquisition.tx_id.clone(),
        manager_id: acquisition.manager_id.clone(),
        player_id: acquisition.player_id.clone(),
        cost: acquisition.cost,
        pts_all,
        pts_starting,
        pts_per_cost_all: per_cost(pts_all, acquisition.cost),
        pts_per_cost_starting: per_cost(pts_starting, acquisition.cost),
        window_start: start,
        window_end: end,
    }
}

/// Turn FAAB adds into acquisitions, placing each in a week when the league
/// has a season start.
pub fn faab_acquisitions(adds: &[Transaction], league: &LeagueConfig) -> Vec<Acquisition> {
    adds.iter()
        .filter_map(|tx| {
            let cost = tx.faab_spent?;
            Some(Acquisition {
                source: CostSource::Faab,
                tx_id: Some(tx.tx_id.clone()),
                manager_id: tx.manager_id.clone(),
                player_id: tx.player_id.clone(),
                cost,
                from_week: league.week_of(tx.timestamp),
            })
        })
        .collect()
}

/// Drop acquisitions whose manager or player is not in the snapshot.
fn known_acquisitions(
    store: &dyn LeagueStore,
    acquisitions: Vec<Acquisition>,
) -> EngineResult<Vec<Acquisition>> {
    let managers: HashSet<ManagerId> =
        store.managers()?.into_iter().map(|m| m.manager_id).collect();
    let mut ids: Vec<PlayerId> = acquisitions.iter().map(|a| a.player_id.clone()).collect();
    ids.sort();
    ids.dedup();
    let players: HashSet<PlayerId> = store
        .players_by_id(&ids)?
        .into_iter()
        .map(|p| p.player_id)
        .collect();

    Ok(acquisitions
        .into_iter()
        .filter(|acq| {
            let known = managers.contains(&acq.manager_id) && players.contains(&acq.player_id);
            if !known {
                warn!(
                    "{} acquisition {}/{} names an unknown manager or player, skipping",
                    acq.source.as_str(),
                    acq.manager_id,
                    acq.player_id
                );
            }
            known
        })
        .collect())
}

fn attribute_source(
    store: &dyn LeagueStore,
    league: &LeagueConfig,
    acquisitions: Vec<Acquisition>,
    last_week: Week,
    cancel: &Cancellation,
) -> EngineResult<Vec<AcquisitionRoi>> {
    // Repeated acquisitions of one player by one manager are attributed in
    // order, each window ending the week before the next one starts.
    let mut grouped: BTreeMap<(ManagerId, PlayerId), Vec<Acquisition>> = BTreeMap::new();
    for acq in acquisitions {
        grouped
            .entry((acq.manager_id.clone(), acq.player_id.clone()))
            .or_default()
            .push(acq);
    }

    let mut records = Vec::new();
    for ((manager_id, player_id), group) in grouped {
        cancel.check()?;
        let history = store.roster_history(&manager_id, &player_id)?;

        let starts: Vec<Option<Week>> = group
            .iter()
            .map(|acq| window_start(&history, acq.from_week))
            .collect();

        for (i, acq) in group.iter().enumerate() {
            let Some(start) = starts[i] else {
                debug!(
                    "no roster rows for {manager_id}/{player_id} after acquisition, skipping"
                );
                continue;
            };
            let next_start = starts[i + 1..].iter().flatten().find(|s| **s > start);
            let end = match next_start {
                Some(next) => next - 1,
                None if starts[i + 1..].iter().flatten().any(|s| *s == start) => {
                    debug!(
                        "{manager_id}/{player_id}: acquisition {:?} superseded in week {start}",
                        acq.tx_id
                    );
                    continue;
                }
                None => last_week,
            };

            let rows = window_rows(&history, start, end);
            if rows.is_empty() {
                continue;
            }
            let weeks: Vec<Week> = rows.iter().map(|r| r.week).collect();
            let points = store.player_points(&player_id, &weeks)?;
            records.push(attribute(acq, &rows, &points, league, (start, end)));
        }
    }
    Ok(records)
}

/// Attribute every configured cost source, replacing each source's stored
/// table with the fresh records.
pub fn compute_acquisition_roi(
    store: &dyn LeagueStore,
    sink: &dyn MetricsSink,
    league: &LeagueConfig,
    sources: &[CostSource],
    cancel: &Cancellation,
) -> EngineResult<Vec<AcquisitionRoi>> {
    let Some(last_week) = store.roster_weeks()?.into_iter().max() else {
        info!("acquisition roi: no roster data, nothing to attribute");
        for source in sources {
            sink.replace_acquisition_roi(*source, &[])?;
        }
        return Ok(Vec::new());
    };

    let mut all = Vec::new();
    for source in sources {
        let acquisitions = match source {
            CostSource::Faab => faab_acquisitions(&store.faab_adds()?, league),
            CostSource::Draft => store
                .draft_picks()?
                .into_iter()
                .map(|pick| Acquisition {
                    source: CostSource::Draft,
                    tx_id: None,
                    manager_id: pick.manager_id,
                    player_id: pick.player_id,
                    cost: pick.cost,
                    from_week: None,
                })
                .collect(),
        };
        let count = acquisitions.len();
        let acquisitions = known_acquisitions(store, acquisitions)?;
        let records = attribute_source(store, league, acquisitions, last_week, cancel)?;
        sink.replace_acquisition_roi(*source, &records)?;
        info!(
            "{} roi: {} of {} acquisitions attributed through week {}",
            source.as_str(),
            records.len(),
            count,
            last_week
        );
        all.extend(records);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use leaguelens_core::config::LineupSlot;
    use leaguelens_core::db::Database;
    use leaguelens_core::model::{
        DraftPick, Manager, Player, PlayerStatLine, Snapshot, TransactionType,
    };
    use std::collections::BTreeSet;

    fn league(season_start: Option<NaiveDate>) -> LeagueConfig {
        LeagueConfig {
            name: "Test League".into(),
            num_teams: 2,
            lineup: vec![LineupSlot {
                slot: "WR".into(),
                count: 2,
            }],
            bench_slots: vec!["BN".into(), "IR".into()],
            flex: HashMap::new(),
            playoff_teams: 2,
            bye_teams: 1,
            season_start,
        }
    }

    fn row(week: Week, slot: &str, started: bool) -> RosterEntry {
        RosterEntry {
            week,
            manager_id: "m1".into(),
            player_id: "p1".into(),
            slot: slot.into(),
            started,
        }
    }

    fn add(tx_id: &str, faab: i64, day: u32) -> Transaction {
        Transaction {
            tx_id: tx_id.into(),
            manager_id: "m1".into(),
            player_id: "p1".into(),
            tx_type: TransactionType::Add,
            faab_spent: Some(faab),
            timestamp: Utc.with_ymd_and_hms(2025, 9, day, 12, 0, 0).unwrap(),
        }
    }

    fn stat(week: Week, points: f64) -> PlayerStatLine {
        PlayerStatLine {
            week,
            player_id: "p1".into(),
            total_points: points,
        }
    }

    fn seeded_db(rosters: Vec<RosterEntry>, transactions: Vec<Transaction>) -> Database {
        let db = Database::open(":memory:").unwrap();
        db.import_snapshot(&Snapshot {
            managers: vec![Manager {
                manager_id: "m1".into(),
                team_name: "One".into(),
            }],
            players: vec![Player {
                player_id: "p1".into(),
                name: "Player One".into(),
                position_type: "O".into(),
                eligible_positions: BTreeSet::from(["WR".to_string()]),
            }],
            rosters,
            player_stats: vec![stat(1, 5.0), stat(2, 12.0), stat(3, 20.0), stat(4, 18.0)],
            transactions,
            draft_picks: vec![DraftPick {
                manager_id: "m1".into(),
                player_id: "p1".into(),
                cost: 0,
            }],
            ..Snapshot::default()
        })
        .unwrap();
        db
    }

    #[test]
    fn zero_cost_reports_zero_ratio() {
        let acq = Acquisition {
            source: CostSource::Faab,
            tx_id: Some("t1".into()),
            manager_id: "m1".into(),
            player_id: "p1".into(),
            cost: 0,
            from_week: None,
        };
        let history = vec![row(1, "WR", true), row(2, "BN", false)];
        let rows = window_rows(&history, 1, 2);
        let points: HashMap<Week, f64> = [(1, 30.0), (2, 20.0)].into_iter().collect();

        let roi = attribute(&acq, &rows, &points, &league(None), (1, 2));
        assert_eq!(roi.pts_all, 50.0);
        assert_eq!(roi.pts_starting, 30.0);
        assert_eq!(roi.pts_per_cost_all, 0.0);
        assert_eq!(roi.pts_per_cost_starting, 0.0);
    }

    #[test]
    fn negative_cost_is_guarded_too() {
        assert_eq!(per_cost(40.0, -5), 0.0);
        assert_eq!(per_cost(40.0, 8), 5.0);
    }

    #[test]
    fn window_start_respects_transaction_week() {
        let history = vec![row(1, "BN", false), row(3, "WR", true), row(4, "WR", true)];
        assert_eq!(window_start(&history, None), Some(1));
        assert_eq!(window_start(&history, Some(2)), Some(3));
        assert_eq!(window_start(&history, Some(5)), None);
    }

    #[test]
    fn faab_add_without_season_start_uses_first_roster_week() {
        let db = seeded_db(
            vec![row(2, "BN", false), row(3, "WR", true), row(4, "IR", true)],
            vec![add("t1", 10, 20)],
        );
        let records = compute_acquisition_roi(
            &db,
            &db,
            &league(None),
            &[CostSource::Faab],
            &Cancellation::new(),
        )
        .unwrap();

        assert_eq!(records.len(), 1);
        let roi = &records[0];
        assert_eq!((roi.window_start, roi.window_end), (2, 4));
        assert_eq!(roi.pts_all, 50.0);
        // IR is not a scoring slot even when flagged as started.
        assert_eq!(roi.pts_starting, 20.0);
        assert_eq!(roi.pts_per_cost_all, 5.0);
        assert_eq!(db.load_acquisition_roi(CostSource::Faab).unwrap().len(), 1);
    }

    #[test]
    fn repeated_adds_do_not_double_count() {
        // Season starts Thu Sep 4: Sep 5 is week 1, Sep 19 is week 3.
        let start = NaiveDate::from_ymd_opt(2025, 9, 4);
        let db = seeded_db(
            vec![
                row(1, "WR", true),
                row(2, "WR", true),
                row(3, "WR", true),
                row(4, "WR", true),
            ],
            vec![add("t1", 4, 5), add("t2", 9, 19)],
        );
        let mut records = compute_acquisition_roi(
            &db,
            &db,
            &league(start),
            &[CostSource::Faab],
            &Cancellation::new(),
        )
        .unwrap();
        records.sort_by(|a, b| a.tx_id.cmp(&b.tx_id));

        assert_eq!(records.len(), 2);
        assert_eq!((records[0].window_start, records[0].window_end), (1, 2));
        assert_eq!(records[0].pts_all, 17.0);
        assert_eq!((records[1].window_start, records[1].window_end), (3, 4));
        assert_eq!(records[1].pts_all, 38.0);
        assert_eq!(records[1].pts_per_cost_all, 38.0 / 9.0);
    }

    #[test]
    fn zero_cost_draft_pick_still_totals_points() {
        let db = seeded_db(vec![row(1, "WR", true), row(2, "BN", false)], vec![]);
        let records = compute_acquisition_roi(
            &db,
            &db,
            &league(None),
            &[CostSource::Draft],
            &Cancellation::new(),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, CostSource::Draft);
        assert_eq!(records[0].pts_all, 17.0);
        assert_eq!(records[0].pts_starting, 5.0);
        assert_eq!(records[0].pts_per_cost_all, 0.0);
    }

    #[test]
    fn acquisition_without_roster_rows_is_skipped() {
        let db = seeded_db(vec![], vec![add("t1", 10, 20)]);
        let records = compute_acquisition_roi(
            &db,
            &db,
            &league(None),
            &[CostSource::Faab, CostSource::Draft],
            &Cancellation::new(),
        )
        .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn unknown_manager_or_player_is_skipped() {
        let mut ghost_row = row(1, "WR", true);
        ghost_row.manager_id = "ghost".into();
        ghost_row.player_id = "nobody".into();
        let mut stray_row = row(1, "WR", true);
        stray_row.player_id = "nobody".into();

        let db = seeded_db(vec![row(1, "WR", true), ghost_row, stray_row], vec![]);
        let pick = |manager: &str, player: &str| DraftPick {
            manager_id: manager.into(),
            player_id: player.into(),
            cost: 5,
        };
        db.import_snapshot(&Snapshot {
            draft_picks: vec![pick("ghost", "nobody"), pick("m1", "nobody")],
            ..Snapshot::default()
        })
        .unwrap();

        let records = compute_acquisition_roi(
            &db,
            &db,
            &league(None),
            &[CostSource::Draft],
            &Cancellation::new(),
        )
        .unwrap();
        let keys: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.manager_id.as_str(), r.player_id.as_str()))
            .collect();
        assert_eq!(keys, vec![("m1", "p1")]);
        assert_eq!(db.load_acquisition_roi(CostSource::Draft).unwrap(), records);
    }

    #[test]
    fn rerun_after_superseding_add_matches_fresh_results() {
        let db = seeded_db(vec![row(1, "WR", true), row(2, "WR", true)], vec![add("t1", 4, 5)]);
        let run = || {
            compute_acquisition_roi(
                &db,
                &db,
                &league(None),
                &[CostSource::Faab],
                &Cancellation::new(),
            )
            .unwrap()
        };
        let first = run();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].tx_id.as_deref(), Some("t1"));

        // A second add of the same player lands in the same week and
        // supersedes the first.
        db.import_snapshot(&Snapshot {
            transactions: vec![add("t1", 4, 5), add("t2", 7, 6)],
            ..Snapshot::default()
        })
        .unwrap();
        let fresh = run();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].tx_id.as_deref(), Some("t2"));
        assert_eq!(fresh[0].pts_all, 17.0);
        assert_eq!(db.load_acquisition_roi(CostSource::Faab).unwrap(), fresh);
    }
}
