// Expected-win model: per-matchup win probabilities from prior scoring and
// the running expected-win total per manager.

use std::collections::{HashMap, HashSet};
use std::f64::consts::SQRT_2;

use leaguelens_core::model::{ExpectedWin, Manager, ManagerId, Matchup, Week};
use leaguelens_core::store::{LeagueStore, MetricsSink};
use statrs::function::erf::erfc;
use tracing::{debug, info, warn};

use crate::error::{Cancellation, EngineResult};
use crate::history::{mean, population_std, ScoreHistory};

/// Games of history needed before an estimate is used unshrunk.
const FULL_CONFIDENCE_GAMES: f64 = 3.0;
/// First week whose estimate is never shrunk toward 0.5.
const UNSHRUNK_FROM_WEEK: Week = 4;

/// Standard normal CDF.
pub fn phi(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// P(A beats B) when both sides' scores are normal with the sample mean and
/// population standard deviation of their histories.
///
/// Equal means give exactly 0.5. With zero spread on both sides the result
/// is a deterministic comparison (1.0 or 0.0).
pub fn win_probability(hist_a: &[f64], hist_b: &[f64]) -> f64 {
    let diff = mean(hist_a) - mean(hist_b);
    if diff == 0.0 {
        return 0.5;
    }
    let sd_a = population_std(hist_a);
    let sd_b = population_std(hist_b);
    let denom = (sd_a * sd_a + sd_b * sd_b).sqrt();
    if denom == 0.0 {
        return if diff > 0.0 { 1.0 } else { 0.0 };
    }
    phi(diff / denom)
}

/// Side A's win probability for a matchup in `week`, given both teams'
/// scores from earlier weeks and this week's actual scores.
///
/// Week 1 is always 0.5. A team with no earlier scores stands in with its
/// current score. In weeks 2 and 3 the estimate is blended toward 0.5 in
/// proportion to the shorter history (full weight at three games).
pub fn matchup_probability(
    week: Week,
    (score_a, score_b): (f64, f64),
    hist_a: &[f64],
    hist_b: &[f64],
) -> f64 {
    if week <= 1 {
        return 0.5;
    }
    let own_a = [score_a];
    let own_b = [score_b];
    let est_a: &[f64] = if hist_a.is_empty() { &own_a } else { hist_a };
    let est_b: &[f64] = if hist_b.is_empty() { &own_b } else { hist_b };
    let p_hist = win_probability(est_a, est_b);

    if week >= UNSHRUNK_FROM_WEEK {
        return p_hist;
    }
    let games = hist_a.len().min(hist_b.len()) as f64;
    let confidence = (games / FULL_CONFIDENCE_GAMES).min(1.0);
    (1.0 - confidence) * 0.5 + confidence * p_hist
}

/// Pure computation over a matchup list: one `ExpectedWin` per side of
/// every completed matchup with `week <= max_week`, in week order.
/// Matchups naming a team outside `managers` are skipped.
pub fn expected_wins(
    managers: &[Manager],
    matchups: &[Matchup],
    max_week: Week,
    cancel: &Cancellation,
) -> EngineResult<Vec<ExpectedWin>> {
    let known: HashSet<&str> = managers.iter().map(|m| m.manager_id.as_str()).collect();
    let history = ScoreHistory::from_matchups(matchups, Some(max_week));

    let mut by_week: Vec<&Matchup> = matchups
        .iter()
        .filter(|m| m.week <= max_week)
        .collect();
    by_week.sort_by_key(|m| m.week);

    let mut cum_xw: HashMap<ManagerId, f64> = HashMap::new();
    let mut records = Vec::with_capacity(by_week.len() * 2);
    let mut current_week = None;

    for m in by_week {
        if current_week != Some(m.week) {
            cancel.check()?;
            current_week = Some(m.week);
        }
        let Some(scores) = m.scores() else {
            debug!("week {}: {} vs {} not completed, skipping", m.week, m.team_a, m.team_b);
            continue;
        };
        if !known.contains(m.team_a.as_str()) || !known.contains(m.team_b.as_str()) {
            warn!(
                "week {}: {} vs {} names an unknown manager, skipping",
                m.week, m.team_a, m.team_b
            );
            continue;
        }

        let hist_a = history.before(&m.team_a, m.week);
        let hist_b = history.before(&m.team_b, m.week);
        let p_a = matchup_probability(m.week, scores, &hist_a, &hist_b);
        let p_b = 1.0 - p_a;

        for (manager_id, p) in [(&m.team_a, p_a), (&m.team_b, p_b)] {
            let total = cum_xw.entry(manager_id.clone()).or_insert(0.0);
            *total += p;
            records.push(ExpectedWin {
                week: m.week,
                manager_id: manager_id.clone(),
                p_win: p,
                cum_xw: *total,
            });
        }
    }
    Ok(records)
}

/// Compute expected wins through `max_week` and replace the stored table.
pub fn compute_expected_wins(
    store: &dyn LeagueStore,
    sink: &dyn MetricsSink,
    max_week: Week,
    cancel: &Cancellation,
) -> EngineResult<Vec<ExpectedWin>> {
    let records = expected_wins(&store.managers()?, &store.matchups()?, max_week, cancel)?;
    sink.replace_expected_wins(&records)?;
    info!(
        "expected wins: {} records written through week {}",
        records.len(),
        max_week
    );
    Ok(records)
}
