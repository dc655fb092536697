// Score history index: per-team chronological scores from completed matchups.

use std::collections::HashMap;

use leaguelens_core::model::{ManagerId, Matchup, Week};

/// Each team's completed-matchup scores, ordered by week.
#[derive(Debug, Clone, Default)]
pub struct ScoreHistory {
    by_team: HashMap<ManagerId, Vec<(Week, f64)>>,
}

impl ScoreHistory {
    /// Index every completed matchup with `week <= max_week` (all weeks when
    /// `max_week` is `None`). Incomplete matchups are ignored.
    pub fn from_matchups(matchups: &[Matchup], max_week: Option<Week>) -> Self {
        let mut by_team: HashMap<ManagerId, Vec<(Week, f64)>> = HashMap::new();
        for m in matchups {
            if max_week.is_some_and(|max| m.week > max) {
                continue;
            }
            let Some((a, b)) = m.scores() else {
                continue;
            };
            by_team.entry(m.team_a.clone()).or_default().push((m.week, a));
            by_team.entry(m.team_b.clone()).or_default().push((m.week, b));
        }
        for scores in by_team.values_mut() {
            scores.sort_by_key(|(week, _)| *week);
        }
        Self { by_team }
    }

    /// Scores a team posted in weeks strictly before `week`.
    pub fn before(&self, team: &str, week: Week) -> Vec<f64> {
        self.by_team
            .get(team)
            .map(|scores| {
                scores
                    .iter()
                    .take_while(|(w, _)| *w < week)
                    .map(|(_, s)| *s)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every indexed score for a team.
    pub fn all(&self, team: &str) -> Vec<f64> {
        self.by_team
            .get(team)
            .map(|scores| scores.iter().map(|(_, s)| *s).collect())
            .unwrap_or_default()
    }

    pub fn games_before(&self, team: &str, week: Week) -> usize {
        self.by_team
            .get(team)
            .map_or(0, |scores| scores.iter().take_while(|(w, _)| *w < week).count())
    }
}

/// Greatest week holding a completed matchup; 1 when nothing has been played.
pub fn latest_completed_week(matchups: &[Matchup]) -> Week {
    matchups
        .iter()
        .filter(|m| m.is_completed())
        .map(|m| m.week)
        .max()
        .unwrap_or(1)
}

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by n). Returns 0.0 for fewer than
/// two values.
pub fn population_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
