// Lineup optimizer: best legal lineup per (week, manager) versus the lineup
// actually started.

use std::collections::{BTreeSet, HashMap};

use leaguelens_core::config::LeagueConfig;
use leaguelens_core::model::{LineupEfficiency, ManagerId, PlayerId, RosterEntry, Week};
use leaguelens_core::store::{LeagueStore, MetricsSink};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assignment::{AssignmentSolver, SolverError};
use crate::eligibility::SlotLayout;
use crate::error::{Cancellation, EngineResult};

/// One filled slot of the optimal lineup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineupPick {
    pub slot: String,
    pub player_id: PlayerId,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineupEvaluation {
    pub week: Week,
    pub manager_id: ManagerId,
    pub actual_pts: f64,
    pub optimal_pts: f64,
    pub regret: f64,
    pub efficiency: f64,
    /// Filled slots of the optimal lineup, in lineup order.
    pub optimal_lineup: Vec<LineupPick>,
}

impl LineupEvaluation {
    pub fn record(&self) -> LineupEfficiency {
        LineupEfficiency {
            week: self.week,
            manager_id: self.manager_id.clone(),
            actual_pts: self.actual_pts,
            optimal_pts: self.optimal_pts,
            regret: self.regret,
            efficiency: self.efficiency,
        }
    }
}

/// Evaluates single (week, manager) rosters against the league's lineup
/// format.
pub struct LineupOptimizer<'a, S: AssignmentSolver> {
    league: &'a LeagueConfig,
    layout: SlotLayout,
    solver: S,
}

impl<'a, S: AssignmentSolver> LineupOptimizer<'a, S> {
    pub fn new(league: &'a LeagueConfig, solver: S) -> Self {
        Self {
            league,
            layout: SlotLayout::from_league(league),
            solver,
        }
    }

    /// Score one manager's roster for one week.
    ///
    /// `eligible` maps player id to eligible slot labels (players missing
    /// from it can fill no slot); `points` maps player id to the week's
    /// points (missing counts as 0). The roster must be non-empty.
    pub fn evaluate(
        &self,
        week: Week,
        manager_id: &str,
        roster: &[RosterEntry],
        eligible: &HashMap<PlayerId, BTreeSet<String>>,
        points: &HashMap<PlayerId, f64>,
    ) -> Result<LineupEvaluation, SolverError> {
        let mut pool: Vec<&RosterEntry> = roster.iter().collect();
        pool.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        pool.dedup_by(|a, b| a.player_id == b.player_id);

        let pts_of = |player_id: &str| -> f64 {
            match points.get(player_id) {
                Some(p) if p.is_finite() => *p,
                Some(p) => {
                    warn!("week {week}: non-finite points {p} for {player_id}, counting 0");
                    0.0
                }
                None => 0.0,
            }
        };

        let actual: f64 = pool
            .iter()
            .filter(|r| r.started && self.league.is_scoring_slot(&r.slot))
            .map(|r| pts_of(&r.player_id))
            .sum();

        let empty = BTreeSet::new();
        let slots = self.layout.slots();
        let weights: Vec<Vec<Option<f64>>> = pool
            .iter()
            .map(|r| {
                let held = eligible.get(&r.player_id).unwrap_or(&empty);
                let pts = pts_of(&r.player_id);
                slots
                    .iter()
                    .map(|slot| self.layout.can_fill(held, slot).then_some(pts))
                    .collect()
            })
            .collect();

        let assignment = self.solver.solve(&weights, slots.len())?;

        let mut optimal_lineup: Vec<(usize, LineupPick)> = assignment
            .slot_of
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.map(|j| {
                    (
                        j,
                        LineupPick {
                            slot: slots[j].clone(),
                            player_id: pool[i].player_id.clone(),
                            points: pts_of(&pool[i].player_id),
                        },
                    )
                })
            })
            .collect();
        optimal_lineup.sort_by_key(|(j, _)| *j);

        let mut optimal = assignment.total;
        if actual > optimal + 1e-9 {
            // The started lineup broke the league format (stale eligibility
            // or an unknown slot label); it still bounds the optimum.
            warn!(
                "week {week}, manager {manager_id}: actual {actual:.2} exceeds solved optimum {optimal:.2}"
            );
            optimal = actual;
        }

        let regret = (optimal - actual).max(0.0);
        let efficiency = if optimal > 0.0 {
            (actual / optimal).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Ok(LineupEvaluation {
            week,
            manager_id: manager_id.to_string(),
            actual_pts: actual,
            optimal_pts: optimal,
            regret,
            efficiency,
            optimal_lineup: optimal_lineup.into_iter().map(|(_, pick)| pick).collect(),
        })
    }
}

/// Evaluate every (week, manager) with roster rows up to `max_week` and
/// replace the stored table with one `LineupEfficiency` record per unit.
///
/// Units without roster rows are skipped; a solver failure skips only its
/// own unit. Store failures abort the run.
pub fn compute_lineup_efficiency<S: AssignmentSolver>(
    store: &dyn LeagueStore,
    sink: &dyn MetricsSink,
    optimizer: &LineupOptimizer<'_, S>,
    max_week: Week,
    cancel: &Cancellation,
) -> EngineResult<Vec<LineupEvaluation>> {
    let weeks: Vec<Week> = store
        .roster_weeks()?
        .into_iter()
        .filter(|w| *w <= max_week)
        .collect();
    let managers = store.managers()?;
    let mut results = Vec::new();
    let mut skipped = 0usize;

    for week in weeks {
        cancel.check()?;
        let points = store.week_points(week)?;

        for manager in &managers {
            let roster = store.roster_for(week, &manager.manager_id)?;
            if roster.is_empty() {
                debug!("week {week}: no roster rows for {}, skipping", manager.manager_id);
                skipped += 1;
                continue;
            }

            let ids: Vec<PlayerId> = roster.iter().map(|r| r.player_id.clone()).collect();
            let eligible: HashMap<PlayerId, BTreeSet<String>> = store
                .players_by_id(&ids)?
                .into_iter()
                .map(|p| (p.player_id, p.eligible_positions))
                .collect();

            match optimizer.evaluate(week, &manager.manager_id, &roster, &eligible, &points) {
                Ok(eval) => results.push(eval),
                Err(e) => {
                    warn!(
                        "week {week}, manager {}: lineup solver failed, skipping: {e}",
                        manager.manager_id
                    );
                    skipped += 1;
                }
            }
        }
    }

    let records: Vec<LineupEfficiency> = results.iter().map(LineupEvaluation::record).collect();
    sink.replace_lineup_efficiency(&records)?;
    info!(
        "lineup efficiency: {} records written, {} units skipped",
        results.len(),
        skipped
    );
    Ok(results)
}
