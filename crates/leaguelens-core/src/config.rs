// Configuration loading and parsing (league.toml, engine.toml).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::model::{CostSource, Week};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub engine: EngineConfig,
    pub db_path: String,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[league]` table in league.toml.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    pub num_teams: usize,
    /// Starting lineup format, in display order.
    pub lineup: Vec<LineupSlot>,
    /// Roster labels that never score (bench, injured reserve).
    #[serde(default = "default_bench_slots")]
    pub bench_slots: Vec<String>,
    /// Flex label -> base positions it accepts.
    #[serde(default)]
    pub flex: HashMap<String, Vec<String>>,
    #[serde(default = "default_playoff_teams")]
    pub playoff_teams: usize,
    #[serde(default = "default_bye_teams")]
    pub bye_teams: usize,
    /// First day of week 1. Needed to place transactions in a week.
    #[serde(default)]
    pub season_start: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineupSlot {
    pub slot: String,
    pub count: usize,
}

fn default_bench_slots() -> Vec<String> {
    vec!["BN".into(), "IR".into()]
}

fn default_playoff_teams() -> usize {
    6
}

fn default_bye_teams() -> usize {
    2
}

impl LeagueConfig {
    /// Expand the lineup format into one label per slot instance, preserving
    /// order: `[QB x1, RB x2]` becomes `["QB", "RB", "RB"]`.
    pub fn starting_slots(&self) -> Vec<String> {
        self.lineup
            .iter()
            .flat_map(|entry| std::iter::repeat(entry.slot.clone()).take(entry.count))
            .collect()
    }

    /// Whether a roster label counts toward a manager's score.
    pub fn is_scoring_slot(&self, slot: &str) -> bool {
        let slot = slot.trim();
        !slot.is_empty()
            && !self
                .bench_slots
                .iter()
                .any(|bench| bench.eq_ignore_ascii_case(slot))
    }

    /// Week containing `timestamp`, counting 7-day periods from
    /// `season_start`. Timestamps before the season map to week 1.
    /// Returns `None` when no season start is configured.
    pub fn week_of(&self, timestamp: DateTime<Utc>) -> Option<Week> {
        let start = self.season_start?;
        let days = (timestamp.date_naive() - start).num_days();
        if days < 0 {
            return Some(1);
        }
        Some((days / 7) as Week + 1)
    }
}

// ---------------------------------------------------------------------------
// engine.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire engine.toml file.
#[derive(Debug, Clone, Deserialize)]
struct EngineFile {
    #[serde(default)]
    metrics: MetricsSection,
    simulation: SimulationConfig,
    roi: RoiSection,
    database: DatabaseSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MetricsSection {
    max_week: Option<Week>,
}

#[derive(Debug, Clone, Deserialize)]
struct RoiSection {
    sources: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

/// The public engine config assembled from the engine.toml sections.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Last week included in lineup and expected-win computations. `None`
    /// means "latest completed week".
    pub max_week: Option<Week>,
    pub simulation: SimulationConfig,
    pub roi_sources: Vec<CostSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub trials: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_batch_size() -> usize {
    1000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            trials: 20_000,
            batch_size: default_batch_size(),
            seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `league.toml` and `engine.toml`
/// inside `config_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(config_dir: &Path) -> Result<Config, ConfigError> {
    // --- league.toml (required) ---
    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;
    let league = league_file.league;

    // --- engine.toml (required) ---
    let engine_path = config_dir.join("engine.toml");
    let engine_text = read_file(&engine_path)?;
    let engine_file: EngineFile =
        toml::from_str(&engine_text).map_err(|e| ConfigError::ParseError {
            path: engine_path.clone(),
            source: e,
        })?;

    let mut roi_sources = Vec::new();
    for label in &engine_file.roi.sources {
        let source =
            CostSource::from_str_source(label).ok_or_else(|| ConfigError::ValidationError {
                field: "roi.sources".into(),
                message: format!("unknown cost source `{label}` (expected `faab` or `draft`)"),
            })?;
        if !roi_sources.contains(&source) {
            roi_sources.push(source);
        }
    }

    let config = Config {
        league,
        engine: EngineConfig {
            max_week: engine_file.metrics.max_week,
            simulation: engine_file.simulation,
            roi_sources,
        },
        db_path: engine_file.database.path,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults_dir`
/// into `config_dir`. Returns the list of files that were copied. Skips
/// `.example` files and never overwrites an existing file.
pub fn ensure_config_files(
    defaults_dir: &Path,
    config_dir: &Path,
) -> Result<Vec<PathBuf>, ConfigError> {
    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither {} nor {} exists; run from the project root or pass --base-dir",
                    defaults_dir.display(),
                    config_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config from `<base_dir>/config`, first copying
/// any missing files from `<base_dir>/defaults`.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");
    ensure_config_files(&base_dir.join("defaults"), &config_dir)?;
    load_config_from(&config_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;

    if league.num_teams == 0 {
        return Err(invalid("league.num_teams", "must be greater than 0"));
    }

    if league.lineup.is_empty() {
        return Err(invalid("league.lineup", "must define at least one starting slot"));
    }

    for entry in &league.lineup {
        if entry.slot.trim().is_empty() {
            return Err(invalid("league.lineup.slot", "slot label must not be empty"));
        }
        if entry.count == 0 {
            return Err(invalid(
                "league.lineup.count",
                format!("slot `{}` must have count > 0", entry.slot),
            ));
        }
        if !league.is_scoring_slot(&entry.slot) {
            return Err(invalid(
                "league.lineup.slot",
                format!("slot `{}` is also listed in bench_slots", entry.slot),
            ));
        }
    }

    if league.playoff_teams > league.num_teams {
        return Err(invalid(
            "league.playoff_teams",
            format!(
                "must be <= num_teams ({}), got {}",
                league.num_teams, league.playoff_teams
            ),
        ));
    }

    if league.bye_teams > league.playoff_teams {
        return Err(invalid(
            "league.bye_teams",
            format!(
                "must be <= playoff_teams ({}), got {}",
                league.playoff_teams, league.bye_teams
            ),
        ));
    }

    let sim = &config.engine.simulation;
    if sim.trials == 0 {
        return Err(invalid("simulation.trials", "must be > 0"));
    }
    if sim.batch_size == 0 {
        return Err(invalid("simulation.batch_size", "must be > 0"));
    }

    if config.engine.max_week == Some(0) {
        return Err(invalid("metrics.max_week", "weeks start at 1"));
    }

    if config.db_path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    /// Helper: returns the workspace `defaults/` directory.
    fn defaults_dir() -> PathBuf {
        let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let dir = manifest.join("../../defaults");
        assert!(dir.exists(), "Cannot locate defaults/ from {:?}", manifest);
        dir
    }

    /// Helper: fresh temp dir containing copies of both default files.
    fn scratch_config(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        fs::copy(defaults_dir().join("league.toml"), tmp.join("league.toml")).unwrap();
        fs::copy(defaults_dir().join("engine.toml"), tmp.join("engine.toml")).unwrap();
        tmp
    }

    fn rewrite(path: &Path, from: &str, to: &str) {
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains(from), "{from:?} not found in {}", path.display());
        fs::write(path, text.replace(from, to)).unwrap();
    }

    fn expect_field(err: ConfigError, expected: &str) {
        match err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, expected),
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    #[test]
    fn load_default_config() {
        let config = load_config_from(&defaults_dir()).expect("defaults should load");

        assert_eq!(config.league.name, "Gridiron Analytics League");
        assert_eq!(config.league.num_teams, 12);
        assert_eq!(config.league.playoff_teams, 6);
        assert_eq!(config.league.bye_teams, 2);
        assert_eq!(
            config.league.starting_slots(),
            vec!["QB", "RB", "RB", "WR", "WR", "TE", "W/R/T", "Q/W/R/T", "DEF", "K"]
        );
        assert_eq!(config.league.flex["W/R/T"], vec!["WR", "RB", "TE"]);
        assert_eq!(
            config.league.season_start,
            NaiveDate::from_ymd_opt(2025, 9, 4)
        );

        assert_eq!(config.engine.max_week, None);
        assert_eq!(config.engine.simulation.trials, 20_000);
        assert_eq!(config.engine.simulation.batch_size, 1000);
        assert_eq!(config.engine.simulation.seed, None);
        assert_eq!(
            config.engine.roi_sources,
            vec![CostSource::Faab, CostSource::Draft]
        );
        assert_eq!(config.db_path, "leaguelens.db");
    }

    #[test]
    fn bench_labels_do_not_score() {
        let config = load_config_from(&defaults_dir()).unwrap();
        assert!(!config.league.is_scoring_slot("BN"));
        assert!(!config.league.is_scoring_slot("ir"));
        assert!(!config.league.is_scoring_slot(""));
        assert!(config.league.is_scoring_slot("W/R/T"));
        assert!(config.league.is_scoring_slot("QB"));
    }

    #[test]
    fn week_of_counts_seven_day_periods() {
        let config = load_config_from(&defaults_dir()).unwrap();
        let league = &config.league;
        let at = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 15, 0, 0).unwrap();

        assert_eq!(league.week_of(at(2025, 9, 4)), Some(1));
        assert_eq!(league.week_of(at(2025, 9, 10)), Some(1));
        assert_eq!(league.week_of(at(2025, 9, 11)), Some(2));
        assert_eq!(league.week_of(at(2025, 8, 20)), Some(1));

        let mut no_start = league.clone();
        no_start.season_start = None;
        assert_eq!(no_start.week_of(at(2025, 9, 11)), None);
    }

    #[test]
    fn max_week_and_seed_are_read_when_present() {
        let tmp = scratch_config("leaguelens_config_max_week");
        rewrite(&tmp.join("engine.toml"), "# max_week = 14", "max_week = 14");
        rewrite(&tmp.join("engine.toml"), "# seed = 42", "seed = 42");

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.engine.max_week, Some(14));
        assert_eq!(config.engine.simulation.seed, Some(42));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_num_teams_zero() {
        let tmp = scratch_config("leaguelens_config_num_teams_zero");
        rewrite(&tmp.join("league.toml"), "num_teams = 12", "num_teams = 0");
        expect_field(load_config_from(&tmp).unwrap_err(), "league.num_teams");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_slot_count() {
        let tmp = scratch_config("leaguelens_config_zero_slot");
        rewrite(
            &tmp.join("league.toml"),
            "slot = \"K\"\ncount = 1",
            "slot = \"K\"\ncount = 0",
        );
        expect_field(load_config_from(&tmp).unwrap_err(), "league.lineup.count");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_more_playoff_teams_than_teams() {
        let tmp = scratch_config("leaguelens_config_playoff_teams");
        rewrite(&tmp.join("league.toml"), "playoff_teams = 6", "playoff_teams = 13");
        expect_field(load_config_from(&tmp).unwrap_err(), "league.playoff_teams");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_more_byes_than_playoff_teams() {
        let tmp = scratch_config("leaguelens_config_bye_teams");
        rewrite(&tmp.join("league.toml"), "bye_teams = 2", "bye_teams = 7");
        expect_field(load_config_from(&tmp).unwrap_err(), "league.bye_teams");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_trials() {
        let tmp = scratch_config("leaguelens_config_zero_trials");
        rewrite(&tmp.join("engine.toml"), "trials = 20000", "trials = 0");
        expect_field(load_config_from(&tmp).unwrap_err(), "simulation.trials");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_unknown_roi_source() {
        let tmp = scratch_config("leaguelens_config_roi_source");
        rewrite(
            &tmp.join("engine.toml"),
            "sources = [\"faab\", \"draft\"]",
            "sources = [\"faab\", \"keeper\"]",
        );
        expect_field(load_config_from(&tmp).unwrap_err(), "roi.sources");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_engine_toml() {
        let tmp = scratch_config("leaguelens_config_missing_engine");
        fs::remove_file(tmp.join("engine.toml")).unwrap();

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("engine.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = scratch_config("leaguelens_config_invalid_toml");
        fs::write(tmp.join("league.toml"), "this is not valid [[[ toml").unwrap();

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ParseError { path, .. } => assert!(path.ends_with("league.toml")),
            other => panic!("expected ParseError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_missing_and_keeps_existing() {
        let tmp = std::env::temp_dir().join("leaguelens_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        let defaults = tmp.join("defaults");
        let config_dir = tmp.join("config");
        fs::create_dir_all(&defaults).unwrap();
        fs::create_dir_all(&config_dir).unwrap();

        fs::copy(defaults_dir().join("league.toml"), defaults.join("league.toml")).unwrap();
        fs::copy(defaults_dir().join("engine.toml"), defaults.join("engine.toml")).unwrap();
        fs::write(defaults.join("engine.toml.example"), "# sample\n").unwrap();
        fs::write(config_dir.join("league.toml"), "# custom\n").unwrap();

        let copied = ensure_config_files(&defaults, &config_dir).expect("should succeed");
        assert_eq!(copied.len(), 1);
        assert!(copied[0].ends_with("engine.toml"));
        assert!(!config_dir.join("engine.toml.example").exists());
        assert_eq!(
            fs::read_to_string(config_dir.join("league.toml")).unwrap(),
            "# custom\n"
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = std::env::temp_dir().join("leaguelens_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        match ensure_config_files(&tmp.join("defaults"), &tmp.join("config")).unwrap_err() {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("neither"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }
}
