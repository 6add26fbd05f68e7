//! seguimiento - coach/student training tracker

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use seguimiento::config::{self, DEFAULT_ADDR, DEFAULT_DB_PATH, ServerConfig};
use seguimiento::db::Database;
use seguimiento::progress::{SortOrder, format_delta, trend};
use seguimiento::service::{self, LogRequest, WeightInput, WeightRequest};
use seguimiento::template::RoutineTemplate;

#[derive(Parser)]
#[command(name = "seguimiento")]
#[command(author, version, about = "Per-week weight tracking on coach routines")]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, env = "SEGUIMIENTO_DB", default_value = DEFAULT_DB_PATH)]
    database: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address
        #[arg(long, env = "SEGUIMIENTO_ADDR", default_value = DEFAULT_ADDR)]
        addr: String,
    },

    /// Create or rename a student
    Student { id: String, name: String },

    /// Assign a routine template (JSON file) to a student
    Assign { id: String, template: PathBuf },

    /// Set a weight, or clear it when no weight is given
    Weight {
        id: String,
        #[arg(short, long)]
        week: i64,
        day: i64,
        block: i64,
        exercise: i64,
        weight: Option<f64>,
    },

    /// Show the routine annotated with one week's weights
    Week { id: String, week: i64 },

    /// Log a performed exercise in the history
    Log {
        id: String,
        /// Exercise name
        exercise: String,
        #[arg(short, long)]
        week: i64,
        #[arg(long)]
        weight: f64,
        #[arg(short, long)]
        reps: u32,
        #[arg(short, long, default_value = "1")]
        series: u32,
        /// Defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Show logged history per exercise with week-over-week change
    Progress {
        id: String,
        #[arg(long)]
        latest_first: bool,
    },

    /// List recorded weights that no longer match the routine
    Orphans { id: String },

    /// Import a legacy weights document (JSON object "w-d-b-e" -> kg)
    Import { id: String, file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    config::init_logging();

    let cli = Cli::parse();
    // `serve` opens its own connection
    let open_db = || Database::open(&cli.database);

    match cli.command {
        Commands::Serve { addr } => {
            let config = ServerConfig::new(cli.database.clone(), &addr)?;
            seguimiento::server::run_server(config).await?;
        }

        Commands::Student { id, name } => {
            let db = open_db()?;
            db.upsert_student(&id, &name)?;
            println!("Student {} ({})", id, name);
        }

        Commands::Assign { id, template } => {
            let json = std::fs::read_to_string(&template)
                .with_context(|| format!("reading {}", template.display()))?;
            let routine: RoutineTemplate = serde_json::from_str(&json)?;
            let db = open_db()?;
            service::assign_template(&db, &id, &routine)?;
            println!("Assigned routine with {} exercises to {}", routine.slot_count(), id);
        }

        Commands::Weight { id, week, day, block, exercise, weight } => {
            let request = WeightRequest {
                weight: weight.map(WeightInput::Number),
                week,
            };
            let mut db = open_db()?;
            let response = service::record_weight(&mut db, &id, (day, block, exercise), &request)?;
            match response.exercise.weight {
                Some(kg) => println!("{} kg -> volume {}", kg, response.exercise.volume),
                None => println!("cleared"),
            }
        }

        Commands::Week { id, week } => {
            let db = open_db()?;
            let view = service::progress(&db, &id, Some(week), SortOrder::Ascending)?;
            let annotated = &view.template;
            println!("Week {}", annotated.week);
            println!("{:-<60}", "");
            for (d, day) in annotated.days.iter().enumerate() {
                println!("Day {} {}", d + 1, day.name.as_deref().unwrap_or(""));
                for block in &day.blocks {
                    for ex in &block.exercises {
                        let weight = ex
                            .weight
                            .map(|w| format!("{} kg", w))
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "  {:24} | {}x{} | {:>8} | {}",
                            ex.exercise.name, ex.exercise.series, ex.exercise.repetitions, weight, ex.volume
                        );
                    }
                }
                println!("  day volume: {}", day.volume);
            }
            println!("Week volume: {}", annotated.volume);
        }

        Commands::Log { id, exercise, week, weight, reps, series, date, notes } => {
            let request = LogRequest {
                week,
                date: date.unwrap_or_else(|| Local::now().date_naive()),
                exercise: exercise.clone(),
                weight,
                reps,
                series,
                observations: notes,
            };
            let mut db = open_db()?;
            let logged = service::log_history(&mut db, &id, &request)?;
            println!("Logged: {} - {} kg x {} (volume {})", exercise, weight, reps, logged);
        }

        Commands::Progress { id, latest_first } => {
            let order = if latest_first { SortOrder::Descending } else { SortOrder::Ascending };
            let db = open_db()?;
            let view = service::progress(&db, &id, None, order)?;
            println!("Progress (current week {})", view.week);
            for (exercise, points) in &view.history {
                println!("{:-<60}", "");
                println!("{}", exercise);
                let deltas: BTreeMap<_, _> = trend(points)
                    .into_iter()
                    .map(|t| ((t.point.week, t.point.date), t.weight_delta))
                    .collect();
                for p in points {
                    println!(
                        "  week {:>2} | {} | {} kg x {} | {:>10}",
                        p.week,
                        p.date,
                        p.weight,
                        p.reps,
                        format_delta(deltas.get(&(p.week, p.date)).copied().flatten())
                    );
                }
                if let Some(total) = view.totals.get(exercise) {
                    println!("  total volume: {}", total);
                }
            }
        }

        Commands::Orphans { id } => {
            let db = open_db()?;
            let keys = service::orphans(&db, &id)?;
            if keys.is_empty() {
                println!("No orphaned weights");
            }
            for key in keys {
                println!("{}", key);
            }
        }

        Commands::Import { id, file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let document: BTreeMap<String, f64> = serde_json::from_str(&json)?;
            let mut db = open_db()?;
            let skipped = db.import_legacy_overlay(&id, &document)?;
            println!("Imported {} weights ({} skipped)", document.len() - skipped.len(), skipped.len());
        }
    }

    Ok(())
}
