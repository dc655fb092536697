// Week-by-week standings and the luck index (actual minus expected wins).

use std::collections::{BTreeSet, HashMap};

use leaguelens_core::model::{ExpectedWin, Manager, ManagerId, Matchup, StandingsRow, Week};
use leaguelens_core::store::{LeagueStore, MetricsSink};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Cancellation, EngineResult};
use crate::playoffs::final_order;

/// Cumulative standings after every completed week up to `max_week`, one
/// row per manager per week. Ties count half a win and half a loss.
pub fn standings(
    managers: &[Manager],
    matchups: &[Matchup],
    max_week: Week,
    cancel: &Cancellation,
) -> EngineResult<Vec<StandingsRow>> {
    let mut teams: Vec<&ManagerId> = managers.iter().map(|m| &m.manager_id).collect();
    teams.sort();
    teams.dedup();
    let index: HashMap<&str, usize> = teams
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let weeks: BTreeSet<Week> = matchups
        .iter()
        .filter(|m| m.week <= max_week && m.is_completed())
        .map(|m| m.week)
        .collect();

    let mut wins = vec![0.0; teams.len()];
    let mut losses = vec![0.0; teams.len()];
    let mut points_for = vec![0.0; teams.len()];
    let mut rows = Vec::with_capacity(weeks.len() * teams.len());

    for week in weeks {
        cancel.check()?;
        for m in matchups.iter().filter(|m| m.week == week) {
            let Some((sa, sb)) = m.scores() else {
                continue;
            };
            let (Some(&a), Some(&b)) = (index.get(m.team_a.as_str()), index.get(m.team_b.as_str()))
            else {
                warn!(
                    "week {week}: {} vs {} names an unknown manager, skipping",
                    m.team_a, m.team_b
                );
                continue;
            };
            points_for[a] += sa;
            points_for[b] += sb;
            if sa > sb {
                wins[a] += 1.0;
                losses[b] += 1.0;
            } else if sb > sa {
                wins[b] += 1.0;
                losses[a] += 1.0;
            } else {
                for t in [a, b] {
                    wins[t] += 0.5;
                    losses[t] += 0.5;
                }
            }
        }

        for (rank, t) in final_order(&wins, &points_for).into_iter().enumerate() {
            rows.push(StandingsRow {
                week,
                manager_id: teams[t].clone(),
                cum_wins: wins[t],
                cum_losses: losses[t],
                cum_pf: points_for[t],
                rank: rank as u32 + 1,
            });
        }
    }
    Ok(rows)
}

pub fn compute_standings(
    store: &dyn LeagueStore,
    sink: &dyn MetricsSink,
    max_week: Week,
    cancel: &Cancellation,
) -> EngineResult<Vec<StandingsRow>> {
    let rows = standings(&store.managers()?, &store.matchups()?, max_week, cancel)?;
    sink.replace_standings(&rows)?;
    info!("standings: {} rows written through week {}", rows.len(), max_week);
    Ok(rows)
}

/// Actual wins against the model's expected wins for one manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LuckRow {
    pub manager_id: ManagerId,
    pub actual_wins: f64,
    pub expected_wins: f64,
    /// Positive: won more than the scoring deserved.
    pub luck: f64,
}

/// Luck index from the latest standings row and the latest `cum_xw` of each
/// manager, sorted luckiest first.
pub fn luck_index(standings: &[StandingsRow], expected: &[ExpectedWin]) -> Vec<LuckRow> {
    let mut actual: HashMap<&str, (Week, f64)> = HashMap::new();
    for row in standings {
        let entry = actual.entry(row.manager_id.as_str()).or_insert((row.week, row.cum_wins));
        if row.week >= entry.0 {
            *entry = (row.week, row.cum_wins);
        }
    }
    let mut xw: HashMap<&str, (Week, f64)> = HashMap::new();
    for row in expected {
        let entry = xw.entry(row.manager_id.as_str()).or_insert((row.week, row.cum_xw));
        if row.week >= entry.0 {
            *entry = (row.week, row.cum_xw);
        }
    }

    let mut rows: Vec<LuckRow> = actual
        .into_iter()
        .map(|(manager_id, (_, wins))| {
            let expected_wins = xw.get(manager_id).map_or(0.0, |(_, x)| *x);
            LuckRow {
                manager_id: manager_id.to_string(),
                actual_wins: wins,
                expected_wins,
                luck: wins - expected_wins,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.luck
            .total_cmp(&a.luck)
            .then_with(|| a.manager_id.cmp(&b.manager_id))
    });
    rows
}
