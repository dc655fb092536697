// leaguelens entry point.
//
// Every command follows the same startup sequence:
// 1. Initialize tracing (stderr, so stdout stays clean for reports)
// 2. Load config, copying defaults into <base>/config on first run
// 3. Open the database
// 4. Dispatch the subcommand

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use leaguelens_core::config::{self, Config};
use leaguelens_core::db::Database;
use leaguelens_core::import::load_snapshot_dir;
use leaguelens_core::model::Week;
use leaguelens_core::store::LeagueStore;
use leaguelens_metrics::highlights::compute_highlights;
use leaguelens_metrics::history::latest_completed_week;
use leaguelens_metrics::standings::luck_index;
use leaguelens_metrics::{Engine, SimulationOutcome};
use tracing::info;

/// Derived fantasy-football metrics over a league snapshot
#[derive(Parser)]
#[command(name = "leaguelens")]
#[command(about = "Lineup efficiency, expected wins, acquisition ROI and playoff odds")]
struct Cli {
    /// Directory holding `config/` and `defaults/`
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    /// Override the database path from engine.toml
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a directory of snapshot CSV files, upserting rows by natural key
    Import {
        /// Directory containing managers.csv, players.csv, rosters.csv, ...
        dir: PathBuf,
    },
    /// Run a full computation cycle
    Compute {
        /// Last week to include in lineup and expected-win metrics
        #[arg(long)]
        max_week: Option<Week>,
        /// Number of playoff simulation trials
        #[arg(long)]
        trials: Option<usize>,
        /// Fixed RNG seed for reproducible playoff odds
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Simulate the rest of the season and print playoff odds
    Playoffs {
        #[arg(long)]
        trials: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print actual minus expected wins from the stored metrics
    Luck,
    /// Build and print one week's highlights as JSON
    Highlights {
        /// Defaults to the latest completed week
        #[arg(long)]
        week: Option<Week>,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let mut config = config::load_config(&cli.base_dir).context("failed to load configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    info!(
        "Config loaded: league={}, {} teams, {} playoff spots",
        config.league.name, config.league.num_teams, config.league.playoff_teams
    );

    let db = Database::open(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path))?;

    match cli.command {
        Commands::Import { dir } => import(&db, &dir),
        Commands::Compute {
            max_week,
            trials,
            seed,
        } => {
            if max_week.is_some() {
                config.engine.max_week = max_week;
            }
            apply_simulation_overrides(&mut config, trials, seed);
            compute(&db, &config)
        }
        Commands::Playoffs { trials, seed } => {
            apply_simulation_overrides(&mut config, trials, seed);
            playoffs(&db, &config)
        }
        Commands::Luck => luck(&db),
        Commands::Highlights { week } => highlights(&db, &config, week),
    }
}

fn apply_simulation_overrides(config: &mut Config, trials: Option<usize>, seed: Option<u64>) {
    if let Some(trials) = trials {
        config.engine.simulation.trials = trials;
    }
    if seed.is_some() {
        config.engine.simulation.seed = seed;
    }
}

fn import(db: &Database, dir: &Path) -> anyhow::Result<()> {
    let snapshot = load_snapshot_dir(dir)
        .with_context(|| format!("failed to load snapshot from {}", dir.display()))?;
    db.import_snapshot(&snapshot)
        .context("failed to store snapshot")?;
    println!(
        "Imported {} managers, {} players, {} roster rows, {} matchups, {} transactions",
        snapshot.managers.len(),
        snapshot.players.len(),
        snapshot.rosters.len(),
        snapshot.matchups.len(),
        snapshot.transactions.len()
    );
    Ok(())
}

fn compute(db: &Database, config: &Config) -> anyhow::Result<()> {
    let engine = Engine::new(db, &config.league, &config.engine);
    let report = engine.run_cycle().context("computation cycle failed")?;

    println!(
        "Week {} (metrics through week {})",
        report.current_week, report.max_week
    );
    println!("  lineup efficiency records: {}", report.lineup.len());
    println!("  expected-win records:      {}", report.expected_wins.len());
    println!("  standings records:         {}", report.standings.len());
    println!("  acquisition ROI records:   {}", report.roi.len());
    print_odds(&report.playoffs);
    Ok(())
}

fn playoffs(db: &Database, config: &Config) -> anyhow::Result<()> {
    let engine = Engine::new(db, &config.league, &config.engine);
    let outcome = engine
        .simulate_playoffs()
        .context("playoff simulation failed")?;
    print_odds(&outcome);
    Ok(())
}

fn print_odds(outcome: &SimulationOutcome) {
    match outcome {
        SimulationOutcome::NotAvailable => println!("Playoff odds: not available"),
        SimulationOutcome::Odds(odds) => {
            println!("Playoff odds:");
            for row in odds {
                println!(
                    "  {:<12} playoff {:>6.1}%  bye {:>6.1}%",
                    row.manager_id,
                    row.p_playoff * 100.0,
                    row.p_bye * 100.0
                );
            }
        }
    }
}

fn luck(db: &Database) -> anyhow::Result<()> {
    let standings = db.load_standings().context("failed to load standings")?;
    let expected = db
        .load_expected_wins()
        .context("failed to load expected wins")?;
    if standings.is_empty() {
        println!("No standings stored yet; run `leaguelens compute` first");
        return Ok(());
    }
    for row in luck_index(&standings, &expected) {
        println!(
            "  {:<12} actual {:>5.1}  expected {:>5.2}  luck {:>+5.2}",
            row.manager_id, row.actual_wins, row.expected_wins, row.luck
        );
    }
    Ok(())
}

fn highlights(db: &Database, config: &Config, week: Option<Week>) -> anyhow::Result<()> {
    let week = match week {
        Some(week) => week,
        None => latest_completed_week(&db.matchups().context("failed to load matchups")?),
    };
    let lineup = db
        .load_lineup_efficiency()
        .context("failed to load lineup efficiency")?;
    let standings = db.load_standings().context("failed to load standings")?;

    let highlights = compute_highlights(db, db, &config.league, week, &lineup, &standings)
        .with_context(|| format!("failed to build highlights for week {week}"))?;
    println!("{}", serde_json::to_string_pretty(&highlights)?);
    Ok(())
}

/// Initialize tracing to stderr. `RUST_LOG` overrides the default filter.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("leaguelens=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
