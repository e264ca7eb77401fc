use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod config;
mod db;
mod error;
mod models;
mod normalize;
mod report;
mod risk;
mod roster;
mod sensors;
mod session;
mod store;
mod wellness;

use crate::config::AppConfig;
use crate::error::WellnessError;
use crate::models::{MetricKind, MetricValue, Role, Student};
use crate::session::Session;
use crate::store::postgres::PgDocumentStore;
use crate::store::DocumentStore;

#[derive(Parser)]
#[command(name = "wellness-early-warning")]
#[command(about = "Student wellness scores and counselor risk alerts", long_about = None)]
struct Cli {
    /// Act as this student or counselor (defaults to WELLNESS_USER)
    #[arg(long = "as", global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import metric readings from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record one of your own metric readings
    Record {
        #[arg(long)]
        metric: MetricKind,
        /// Hours, steps, bpm, or systolic/diastolic such as 120/80
        #[arg(long)]
        value: String,
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Assign a student to yourself as counselor
    Claim {
        #[arg(long)]
        student: String,
    },
    /// Compute the wellness score for a day
    Score {
        /// Required when acting as a counselor
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show stored wellness scores
    History {
        #[arg(long)]
        student: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
    },
    /// Refresh and list at-risk students
    Alerts {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Refresh alerts and write a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

impl Commands {
    fn needs_user(&self) -> bool {
        !matches!(self, Commands::InitDb | Commands::Seed | Commands::Import { .. })
    }
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "wellness_early_warning=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// The student whose data the session may look at: yourself as a student,
/// or one of your assigned students as a counselor.
async fn target_student(
    store: &dyn DocumentStore,
    session: &Session,
    requested: Option<&str>,
) -> Result<Student, WellnessError> {
    match session::resolve_role(store, session).await? {
        Role::Student(me) => match requested {
            Some(other) if other != me.id => Err(WellnessError::NotACounselor(me.id)),
            _ => Ok(me),
        },
        Role::Counselor(counselor) => {
            let student_id = requested.ok_or_else(|| {
                WellnessError::InvalidInput("--student is required for counselors".into())
            })?;
            roster::ensure_assigned(store, &counselor, student_id).await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?.with_user_override(cli.user.clone());

    let session = if cli.command.needs_user() {
        Some(Session::from_user(config.current_user.as_deref())?)
    } else {
        None
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool.clone()));

    let now = Utc::now();
    let today = Local::now().date_naive();

    match (cli.command, session) {
        (Commands::InitDb, _) => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        (Commands::Seed, _) => {
            db::seed(store.as_ref(), now).await?;
            println!("Seed data inserted.");
        }
        (Commands::Import { csv }, _) => {
            let imported = db::import_csv(store.as_ref(), &csv).await?;
            println!("Imported {imported} readings from {}.", csv.display());
        }
        (Commands::Record { metric, value, at }, Some(session)) => {
            let student = session::require_student(store.as_ref(), &session).await?;
            let value = MetricValue::parse(metric, &value).map_err(WellnessError::InvalidInput)?;
            let reading = sensors::record_reading(
                store.as_ref(),
                &student.id,
                metric,
                value,
                at.unwrap_or(now),
            )
            .await?;
            println!(
                "Recorded {} {} (sub-score {:.0}) for {}.",
                metric, reading.value, reading.score, student.name
            );
        }
        (Commands::Claim { student }, Some(session)) => {
            let counselor = session::require_counselor(store.as_ref(), &session).await?;
            let student = roster::claim_student(store.as_ref(), &counselor, &student).await?;
            println!("{} is now assigned to {}.", student.name, counselor.name);
        }
        (Commands::Score { student, date }, Some(session)) => {
            let student = target_student(store.as_ref(), &session, student.as_deref()).await?;
            let date = date.unwrap_or(today);
            let day = wellness::daily_wellness(store.as_ref(), &student.id, date, today, now).await;

            println!("Wellness for {} on {}:", student.name, day.date);
            for kind in MetricKind::ALL {
                match day.readings.get(kind) {
                    Some(r) => println!("- {}: {} (sub-score {:.0})", kind, r.value, r.score),
                    None => println!("- {}: no reading", kind),
                }
            }
            match &day.entry {
                Some(entry) if day.persisted => {
                    println!("Final score {} (saved).", entry.final_score)
                }
                Some(entry) => println!("Final score {}.", entry.final_score),
                None => {
                    let missing: Vec<&str> = day
                        .aggregate
                        .missing
                        .iter()
                        .map(|k| k.display_name())
                        .collect();
                    println!("No final score; missing {}.", missing.join(", "));
                }
            }
        }
        (Commands::History { student, since_days }, Some(session)) => {
            let student = target_student(store.as_ref(), &session, student.as_deref()).await?;
            let since = risk::cutoff_date(since_days);
            let history = wellness::score_history(store.as_ref(), &student.id, since).await?;

            if history.is_empty() {
                println!("No wellness scores since {since}.");
                return Ok(());
            }
            println!("Wellness scores for {} since {since}:", student.name);
            for (date, entry) in history {
                println!(
                    "- {date}: {} (sleep {:.0}, steps {:.0}, heart rate {:.0}, blood pressure {:.0})",
                    entry.final_score,
                    entry.sleep_score,
                    entry.steps_score,
                    entry.heart_rate_score,
                    entry.blood_pressure_score
                );
            }
        }
        (Commands::Alerts { limit }, Some(session)) => {
            let counselor = session::require_counselor(store.as_ref(), &session).await?;
            let pass = risk::materialize(Arc::clone(&store), &counselor.id, now).await?;

            println!(
                "{} students, average score {}, {} at risk.",
                pass.stats.total_students,
                pass.stats.average_wellness_score,
                pass.stats.at_risk_students
            );
            for alert in pass.alerts.iter().take(limit) {
                println!(
                    "- {} ({}) score {} on {}",
                    alert.student_name, alert.email, alert.score, alert.score_date
                );
            }
            if !pass.cleared.is_empty() {
                println!("Cleared {} alerts for recovered students.", pass.cleared.len());
            }
            if pass.write_failures > 0 {
                println!(
                    "{} writes failed; they will be retried on the next refresh.",
                    pass.write_failures
                );
            }
        }
        (Commands::Report { out }, Some(session)) => {
            let counselor = session::require_counselor(store.as_ref(), &session).await?;
            let pass = risk::materialize(Arc::clone(&store), &counselor.id, now).await?;
            let report = report::build_report(&counselor, &pass);
            std::fs::write(&out, report)
                .with_context(|| format!("write report to {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        (_, None) => return Err(WellnessError::Unauthenticated.into()),
    }

    Ok(())
}
