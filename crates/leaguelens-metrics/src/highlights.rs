// Weekly highlights: the structured facts a recap writer consumes for one
// week (top scorer, blowout, closest game, unluckiest loss, lineup regret
// leader, standings moves, best waiver pickup).

use std::collections::HashMap;

use leaguelens_core::config::LeagueConfig;
use leaguelens_core::model::{
    LineupEfficiency, Manager, ManagerId, Matchup, PlayerId, RosterEntry, StandingsRow,
    Transaction, Week,
};
use leaguelens_core::store::{LeagueStore, MetricsSink};
use serde::Serialize;
use tracing::info;

use crate::error::EngineResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamScore {
    pub manager_id: ManagerId,
    pub team: String,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameMargin {
    pub winner: String,
    pub loser: String,
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnluckyLoss {
    pub manager_id: ManagerId,
    pub team: String,
    pub actual: f64,
    /// Share of the rest of the league this score would have beaten.
    pub would_beat_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaiverPickup {
    pub manager_id: ManagerId,
    pub team: String,
    pub player: String,
    pub faab: i64,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegretLeader {
    pub manager_id: ManagerId,
    pub team: String,
    pub regret: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankChange {
    pub manager_id: ManagerId,
    pub team: String,
    /// Places gained since last week, signed (`"+2"`, `"-1"`).
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyHighlights {
    pub week: Week,
    pub standings_changes: Vec<RankChange>,
    pub top_scorer: Option<TeamScore>,
    pub biggest_blowout: Option<GameMargin>,
    pub closest_game: Option<GameMargin>,
    pub unluckiest_loss: Option<UnluckyLoss>,
    pub best_waiver: Option<WaiverPickup>,
    pub lineup_regret_leader: Option<RegretLeader>,
}

/// `app_state` key the highlights of `week` are stored under.
pub fn state_key(week: Week) -> String {
    format!("highlights:week:{week}")
}

/// Everything the highlight builders read, already narrowed to one week
/// where that applies.
pub struct HighlightInputs<'a> {
    pub managers: &'a [Manager],
    pub matchups: &'a [Matchup],
    pub lineup: &'a [LineupEfficiency],
    pub standings: &'a [StandingsRow],
    pub faab_adds: &'a [Transaction],
    /// Roster rows of every manager for the week.
    pub rosters: &'a [RosterEntry],
    pub points: &'a HashMap<PlayerId, f64>,
    pub player_names: &'a HashMap<PlayerId, String>,
}

struct Names<'a>(HashMap<&'a str, &'a str>);

impl<'a> Names<'a> {
    fn new(managers: &'a [Manager]) -> Self {
        Self(
            managers
                .iter()
                .map(|m| (m.manager_id.as_str(), m.team_name.as_str()))
                .collect(),
        )
    }

    fn team(&self, manager_id: &str) -> String {
        self.0.get(manager_id).copied().unwrap_or(manager_id).to_string()
    }
}

/// (winner, loser, margin) for each decided game of the week.
fn decided_games<'a>(matchups: &'a [Matchup], week: Week) -> Vec<(&'a str, &'a str, f64)> {
    matchups
        .iter()
        .filter(|m| m.week == week)
        .filter_map(|m| {
            let (sa, sb) = m.scores()?;
            if sa > sb {
                Some((m.team_a.as_str(), m.team_b.as_str(), sa - sb))
            } else if sb > sa {
                Some((m.team_b.as_str(), m.team_a.as_str(), sb - sa))
            } else {
                None
            }
        })
        .collect()
}

/// Every team's score in the week's completed matchups.
fn week_scores<'a>(matchups: &'a [Matchup], week: Week) -> Vec<(&'a str, f64)> {
    matchups
        .iter()
        .filter(|m| m.week == week)
        .filter_map(|m| {
            let (sa, sb) = m.scores()?;
            Some([(m.team_a.as_str(), sa), (m.team_b.as_str(), sb)])
        })
        .flatten()
        .collect()
}

fn rank_changes(
    standings: &[StandingsRow],
    week: Week,
    names: &Names<'_>,
) -> Vec<RankChange> {
    if week <= 1 {
        return Vec::new();
    }
    let previous: HashMap<&str, u32> = standings
        .iter()
        .filter(|r| r.week == week - 1)
        .map(|r| (r.manager_id.as_str(), r.rank))
        .collect();
    if previous.is_empty() {
        return Vec::new();
    }

    let mut current: Vec<&StandingsRow> = standings.iter().filter(|r| r.week == week).collect();
    current.sort_by_key(|r| r.rank);
    current
        .into_iter()
        .filter_map(|r| {
            let before = *previous.get(r.manager_id.as_str())?;
            let delta = before as i64 - r.rank as i64;
            (delta != 0).then(|| RankChange {
                manager_id: r.manager_id.clone(),
                team: names.team(&r.manager_id),
                delta: format!("{delta:+}"),
            })
        })
        .collect()
}

/// Build one week's highlights.
pub fn build_highlights(
    week: Week,
    input: &HighlightInputs<'_>,
    league: &LeagueConfig,
) -> WeeklyHighlights {
    let names = Names::new(input.managers);
    let scores = week_scores(input.matchups, week);
    let games = decided_games(input.matchups, week);

    let top_scorer = scores
        .iter()
        .fold(None::<(&str, f64)>, |best, &(team, pts)| match best {
            Some((_, b)) if b >= pts => best,
            _ => Some((team, pts)),
        })
        .map(|(team, points)| TeamScore {
            manager_id: team.to_string(),
            team: names.team(team),
            points,
        });

    let to_margin = |(winner, loser, margin): (&str, &str, f64)| GameMargin {
        winner: names.team(winner),
        loser: names.team(loser),
        margin,
    };
    let biggest_blowout = games
        .iter()
        .copied()
        .fold(None::<(&str, &str, f64)>, |best, game| match best {
            Some(b) if b.2 >= game.2 => best,
            _ => Some(game),
        })
        .map(to_margin);
    let closest_game = games
        .iter()
        .copied()
        .fold(None::<(&str, &str, f64)>, |best, game| match best {
            Some(b) if b.2 <= game.2 => best,
            _ => Some(game),
        })
        .map(to_margin);

    let others = scores.len().saturating_sub(1).max(1) as f64;
    let unluckiest_loss = games
        .iter()
        .filter_map(|(_, loser, _)| scores.iter().find(|(t, _)| t == loser).copied())
        .map(|(team, actual)| {
            let beaten = scores.iter().filter(|(_, s)| actual > *s).count() as f64;
            (team, actual, beaten / others)
        })
        .fold(None::<(&str, f64, f64)>, |best, cand| match best {
            Some(b) if b.2 >= cand.2 => best,
            _ => Some(cand),
        })
        .map(|(team, actual, pct)| UnluckyLoss {
            manager_id: team.to_string(),
            team: names.team(team),
            actual,
            would_beat_pct: (pct * 1000.0).round() / 1000.0,
        });

    let lineup_regret_leader = input
        .lineup
        .iter()
        .filter(|r| r.week == week)
        .fold(None::<&LineupEfficiency>, |best, r| match best {
            Some(b) if b.regret >= r.regret => best,
            _ => Some(r),
        })
        .map(|r| RegretLeader {
            manager_id: r.manager_id.clone(),
            team: names.team(&r.manager_id),
            regret: r.regret,
        });

    let started: HashMap<(&str, &str), &RosterEntry> = input
        .rosters
        .iter()
        .filter(|r| r.week == week && r.started && league.is_scoring_slot(&r.slot))
        .map(|r| ((r.manager_id.as_str(), r.player_id.as_str()), r))
        .collect();
    let best_waiver = input
        .faab_adds
        .iter()
        .filter(|tx| started.contains_key(&(tx.manager_id.as_str(), tx.player_id.as_str())))
        .map(|tx| (tx, input.points.get(&tx.player_id).copied().unwrap_or(0.0)))
        .fold(None::<(&Transaction, f64)>, |best, cand| match best {
            Some(b) if b.1 >= cand.1 => best,
            _ => Some(cand),
        })
        .map(|(tx, points)| WaiverPickup {
            manager_id: tx.manager_id.clone(),
            team: names.team(&tx.manager_id),
            player: input
                .player_names
                .get(&tx.player_id)
                .cloned()
                .unwrap_or_else(|| tx.player_id.clone()),
            faab: tx.faab_spent.unwrap_or(0),
            points,
        });

    WeeklyHighlights {
        week,
        standings_changes: rank_changes(input.standings, week, &names),
        top_scorer,
        biggest_blowout,
        closest_game,
        unluckiest_loss,
        best_waiver,
        lineup_regret_leader,
    }
}

/// Gather one week's inputs from the store, build the highlights and save
/// them under [`state_key`].
pub fn compute_highlights(
    store: &dyn LeagueStore,
    sink: &dyn MetricsSink,
    league: &LeagueConfig,
    week: Week,
    lineup: &[LineupEfficiency],
    standings: &[StandingsRow],
) -> EngineResult<WeeklyHighlights> {
    let managers = store.managers()?;
    let matchups = store.matchups()?;
    let faab_adds = store.faab_adds()?;
    let points = store.week_points(week)?;

    let mut rosters = Vec::new();
    for m in &managers {
        rosters.extend(store.roster_for(week, &m.manager_id)?);
    }
    let add_ids: Vec<PlayerId> = faab_adds.iter().map(|t| t.player_id.clone()).collect();
    let player_names: HashMap<PlayerId, String> = store
        .players_by_id(&add_ids)?
        .into_iter()
        .map(|p| (p.player_id, p.name))
        .collect();

    let highlights = build_highlights(
        week,
        &HighlightInputs {
            managers: &managers,
            matchups: &matchups,
            lineup,
            standings,
            faab_adds: &faab_adds,
            rosters: &rosters,
            points: &points,
            player_names: &player_names,
        },
        league,
    );

    let value = serde_json::to_value(&highlights).map_err(anyhow::Error::from)?;
    sink.save_state(&state_key(week), &value)?;
    info!("highlights for week {week} saved");
    Ok(highlights)
}
