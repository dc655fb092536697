// One computation cycle over the current league snapshot.

use leaguelens_core::config::{EngineConfig, LeagueConfig};
use leaguelens_core::model::{AcquisitionRoi, ExpectedWin, StandingsRow, Week};
use leaguelens_core::store::{LeagueStore, MetricsSink};
use serde::Serialize;
use tracing::info;

use crate::assignment::HungarianSolver;
use crate::error::{Cancellation, EngineResult};
use crate::expected_wins::compute_expected_wins;
use crate::highlights::{compute_highlights, WeeklyHighlights};
use crate::history::latest_completed_week;
use crate::lineup::{compute_lineup_efficiency, LineupEvaluation, LineupOptimizer};
use crate::playoffs::{compute_playoff_odds, SimulationOutcome};
use crate::roi::compute_acquisition_roi;
use crate::standings::{compute_standings, luck_index, LuckRow};

/// `app_state` key holding the latest completed week.
pub const CURRENT_WEEK_KEY: &str = "current_week";

/// Everything one cycle produced.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub current_week: Week,
    pub max_week: Week,
    pub lineup: Vec<LineupEvaluation>,
    pub expected_wins: Vec<ExpectedWin>,
    pub standings: Vec<StandingsRow>,
    pub roi: Vec<AcquisitionRoi>,
    pub playoffs: SimulationOutcome,
    pub luck: Vec<LuckRow>,
    pub highlights: WeeklyHighlights,
}

/// Runs the metric computations against a store that is both the snapshot
/// source and the metrics destination.
pub struct Engine<'a, S> {
    store: &'a S,
    league: &'a LeagueConfig,
    config: &'a EngineConfig,
    cancel: Cancellation,
}

impl<'a, S> Engine<'a, S>
where
    S: LeagueStore + MetricsSink + Sync,
{
    pub fn new(store: &'a S, league: &'a LeagueConfig, config: &'a EngineConfig) -> Self {
        Self {
            store,
            league,
            config,
            cancel: Cancellation::new(),
        }
    }

    /// Use an externally owned cancellation flag.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Record the latest completed week and resolve the effective max week.
    fn resolve_weeks(&self) -> EngineResult<(Week, Week)> {
        let current = latest_completed_week(&self.store.matchups()?);
        self.store
            .save_state(CURRENT_WEEK_KEY, &serde_json::json!(current))?;
        Ok((current, self.config.max_week.unwrap_or(current)))
    }

    /// Full cycle: lineup efficiency and expected wins, then standings, then
    /// acquisition ROI and playoff odds, then luck and the week's highlights.
    /// Independent computations run in parallel.
    pub fn run_cycle(&self) -> EngineResult<CycleReport> {
        let (current_week, max_week) = self.resolve_weeks()?;
        info!("starting cycle: current week {current_week}, max week {max_week}");

        let store = self.store;
        let cancel = &self.cancel;
        let optimizer = LineupOptimizer::new(self.league, HungarianSolver);

        let (lineup, expected_wins) = rayon::join(
            || compute_lineup_efficiency(store, store, &optimizer, max_week, cancel),
            || compute_expected_wins(store, store, max_week, cancel),
        );
        let lineup = lineup?;
        let expected_wins = expected_wins?;

        let standings = compute_standings(store, store, max_week, cancel)?;

        let (roi, playoffs) = rayon::join(
            || {
                compute_acquisition_roi(
                    store,
                    store,
                    self.league,
                    &self.config.roi_sources,
                    cancel,
                )
            },
            || compute_playoff_odds(store, store, self.league, &self.config.simulation, cancel),
        );
        let roi = roi?;
        let playoffs = playoffs?;

        let luck = luck_index(&standings, &expected_wins);
        let lineup_records: Vec<_> = lineup.iter().map(LineupEvaluation::record).collect();
        let highlights = compute_highlights(
            store,
            store,
            self.league,
            max_week,
            &lineup_records,
            &standings,
        )?;

        info!(
            "cycle complete: {} lineup, {} expected-win, {} standings, {} roi records",
            lineup.len(),
            expected_wins.len(),
            standings.len(),
            roi.len()
        );
        Ok(CycleReport {
            current_week,
            max_week,
            lineup,
            expected_wins,
            standings,
            roi,
            playoffs,
            luck,
            highlights,
        })
    }

    /// Playoff odds only.
    pub fn simulate_playoffs(&self) -> EngineResult<SimulationOutcome> {
        compute_playoff_odds(
            self.store,
            self.store,
            self.league,
            &self.config.simulation,
            &self.cancel,
        )
    }
}
