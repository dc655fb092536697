// Playoff odds: Monte Carlo simulation of the remaining schedule with
// bootstrap-resampled team scores.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use leaguelens_core::config::{LeagueConfig, SimulationConfig};
use leaguelens_core::model::{Manager, ManagerId, Matchup, PlayoffOdds, ScheduledMatchup, Week};
use leaguelens_core::store::{LeagueStore, MetricsSink};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Cancellation, EngineResult};
use crate::history::ScoreHistory;

/// Score drawn for a team that has not completed a matchup yet.
pub const NEUTRAL_SCORE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "odds", rename_all = "snake_case")]
pub enum SimulationOutcome {
    /// No unplayed schedule to simulate.
    NotAvailable,
    /// One entry per manager, ordered by manager id.
    Odds(Vec<PlayoffOdds>),
}

/// Per-team trial counts. Merging is a plain sum, so batches can be combined
/// in any order.
#[derive(Debug, Clone, PartialEq)]
struct Tally {
    playoff: Vec<u64>,
    bye: Vec<u64>,
}

impl Tally {
    fn new(teams: usize) -> Self {
        Self {
            playoff: vec![0; teams],
            bye: vec![0; teams],
        }
    }

    fn merge(mut self, other: Tally) -> Tally {
        for (a, b) in self.playoff.iter_mut().zip(other.playoff) {
            *a += b;
        }
        for (a, b) in self.bye.iter_mut().zip(other.bye) {
            *a += b;
        }
        self
    }
}

/// Season state the simulation starts from.
#[derive(Debug, Clone)]
pub struct PlayoffSimulator {
    teams: Vec<ManagerId>,
    /// Empirical score distribution per team index.
    scores: Vec<Vec<f64>>,
    wins: Vec<f64>,
    points_for: Vec<f64>,
    remaining: Vec<(usize, usize)>,
    playoff_teams: usize,
    bye_teams: usize,
}

fn same_pair(m: &Matchup, s: &ScheduledMatchup) -> bool {
    m.week == s.week
        && ((m.team_a == s.team_a && m.team_b == s.team_b)
            || (m.team_a == s.team_b && m.team_b == s.team_a))
}

impl PlayoffSimulator {
    /// Build the starting state from completed results and the schedule.
    ///
    /// Returns `None` when nothing is left to play: no schedule, or every
    /// scheduled game already has a completed result. Schedule entries
    /// naming unknown teams are dropped.
    pub fn new(
        managers: &[Manager],
        matchups: &[Matchup],
        schedule: &[ScheduledMatchup],
        playoff_teams: usize,
        bye_teams: usize,
    ) -> Option<Self> {
        let mut teams: Vec<ManagerId> = managers.iter().map(|m| m.manager_id.clone()).collect();
        teams.sort();
        teams.dedup();
        let index: HashMap<&str, usize> = teams
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let mut remaining = Vec::new();
        let mut seen: HashSet<(Week, usize, usize)> = HashSet::new();
        for s in schedule {
            if matchups.iter().any(|m| m.is_completed() && same_pair(m, s)) {
                continue;
            }
            let (Some(&a), Some(&b)) = (index.get(s.team_a.as_str()), index.get(s.team_b.as_str()))
            else {
                warn!(
                    "week {}: scheduled {} vs {} names an unknown team, ignoring",
                    s.week, s.team_a, s.team_b
                );
                continue;
            };
            if a == b || !seen.insert((s.week, a.min(b), a.max(b))) {
                continue;
            }
            remaining.push((a, b));
        }
        if remaining.is_empty() {
            return None;
        }

        let history = ScoreHistory::from_matchups(matchups, None);
        let scores = teams
            .iter()
            .map(|t| {
                let all = history.all(t);
                if all.is_empty() {
                    vec![NEUTRAL_SCORE]
                } else {
                    all
                }
            })
            .collect();

        let mut wins = vec![0.0; teams.len()];
        let mut points_for = vec![0.0; teams.len()];
        for m in matchups {
            let Some((sa, sb)) = m.scores() else {
                continue;
            };
            let (Some(&a), Some(&b)) = (index.get(m.team_a.as_str()), index.get(m.team_b.as_str()))
            else {
                continue;
            };
            record_game(&mut wins, &mut points_for, (a, sa), (b, sb));
        }

        Some(Self {
            teams,
            scores,
            wins,
            points_for,
            remaining,
            playoff_teams,
            bye_teams,
        })
    }

    pub fn remaining_games(&self) -> usize {
        self.remaining.len()
    }

    /// Run `config.trials` trials in parallel batches of `config.batch_size`.
    /// With a seed, batch `i` uses `seed + i`, so results do not depend on
    /// thread scheduling.
    pub fn run(
        &self,
        config: &SimulationConfig,
        cancel: &Cancellation,
    ) -> EngineResult<Vec<PlayoffOdds>> {
        let trials = config.trials.max(1);
        let batch_size = config.batch_size.max(1);
        let batches = trials.div_ceil(batch_size);
        let n = self.teams.len();

        let tally = (0..batches)
            .into_par_iter()
            .map(|batch| -> EngineResult<Tally> {
                cancel.check()?;
                let mut rng = match config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(batch as u64)),
                    None => StdRng::from_entropy(),
                };
                let size = batch_size.min(trials - batch * batch_size);
                let mut tally = Tally::new(n);
                for _ in 0..size {
                    self.trial(&mut rng, &mut tally);
                }
                Ok(tally)
            })
            .try_reduce(|| Tally::new(n), |a, b| Ok(a.merge(b)))?;

        let total = trials as f64;
        Ok(self
            .teams
            .iter()
            .enumerate()
            .map(|(i, team)| PlayoffOdds {
                manager_id: team.clone(),
                p_playoff: tally.playoff[i] as f64 / total,
                p_bye: tally.bye[i] as f64 / total,
            })
            .collect())
    }

    fn trial<R: Rng>(&self, rng: &mut R, tally: &mut Tally) {
        let mut wins = self.wins.clone();
        let mut points_for = self.points_for.clone();
        for &(a, b) in &self.remaining {
            let sa = self.draw(rng, a);
            let sb = self.draw(rng, b);
            record_game(&mut wins, &mut points_for, (a, sa), (b, sb));
        }

        for (rank, team) in final_order(&wins, &points_for).into_iter().enumerate() {
            if rank < self.playoff_teams {
                tally.playoff[team] += 1;
            }
            if rank < self.bye_teams {
                tally.bye[team] += 1;
            }
        }
    }

    fn draw<R: Rng>(&self, rng: &mut R, team: usize) -> f64 {
        let dist = &self.scores[team];
        dist[rng.gen_range(0..dist.len())]
    }
}

/// Apply one result: winner +1, tie 0.5 each, both add to points-for.
fn record_game(
    wins: &mut [f64],
    points_for: &mut [f64],
    (a, sa): (usize, f64),
    (b, sb): (usize, f64),
) {
    points_for[a] += sa;
    points_for[b] += sb;
    match sa.partial_cmp(&sb) {
        Some(Ordering::Greater) => wins[a] += 1.0,
        Some(Ordering::Less) => wins[b] += 1.0,
        _ => {
            wins[a] += 0.5;
            wins[b] += 0.5;
        }
    }
}

/// Team indices ranked by wins, then points-for, both descending; equal
/// records fall back to index order (manager id, ascending).
pub fn final_order(wins: &[f64], points_for: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..wins.len()).collect();
    order.sort_by(|&x, &y| {
        wins[y]
            .total_cmp(&wins[x])
            .then(points_for[y].total_cmp(&points_for[x]))
            .then(x.cmp(&y))
    });
    order
}

/// Simulate the rest of the season and replace the stored odds. Returns
/// `NotAvailable` (and leaves stored odds untouched) when there is nothing
/// left to simulate.
pub fn compute_playoff_odds(
    store: &dyn LeagueStore,
    sink: &dyn MetricsSink,
    league: &LeagueConfig,
    config: &SimulationConfig,
    cancel: &Cancellation,
) -> EngineResult<SimulationOutcome> {
    let schedule = store.schedule()?;
    if schedule.is_empty() {
        info!("playoff odds: no schedule, not available");
        return Ok(SimulationOutcome::NotAvailable);
    }
    let managers = store.managers()?;
    let matchups = store.matchups()?;

    let Some(sim) = PlayoffSimulator::new(
        &managers,
        &matchups,
        &schedule,
        league.playoff_teams,
        league.bye_teams,
    ) else {
        info!("playoff odds: schedule fully played, not available");
        return Ok(SimulationOutcome::NotAvailable);
    };

    let odds = sim.run(config, cancel)?;
    sink.replace_playoff_odds(&odds)?;
    info!(
        "playoff odds: {} trials over {} remaining games for {} teams",
        config.trials,
        sim.remaining_games(),
        odds.len()
    );
    Ok(SimulationOutcome::Odds(odds))
}
