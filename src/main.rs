use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;

use strainrs::config::EngineConfig;
use strainrs::decision::DecisionContext;
use strainrs::engine::StrainEngine;
use strainrs::logging::{init_logging, LogConfig, LogLevel};
use strainrs::models::{Baseline, ReadingSubmission};
use strainrs::storage::{AllowAllGate, MemorySessionStore, NullNotificationSink, SessionStore};

/// strainrs - Wearable strain and recovery analysis
///
/// Ingests physiological readings from wearable devices, fuses them across
/// sources, and computes strain, recovery, alerting and training-load
/// decisions.
#[derive(Parser)]
#[command(name = "strainrs")]
#[command(version = "0.1.0")]
#[command(about = "Wearable strain and recovery analysis", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit readings from a JSON file and report accept/reject counts
    Submit {
        /// JSON file holding an array of readings
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Run a daily assessment against a supplied baseline
    Assess {
        /// User to assess
        #[arg(short, long)]
        user: String,

        /// Assessment date (YYYY-MM-DD, default today)
        #[arg(short, long)]
        date: Option<String>,

        /// JSON file of today's readings
        #[arg(short, long)]
        file: PathBuf,

        /// 30-day baseline resting heart rate, bpm
        #[arg(long)]
        baseline_hr: f64,

        /// 30-day baseline SpO2, percent
        #[arg(long)]
        baseline_spo2: f64,
    },

    /// Compute live within-workout strain from buffered readings
    Live {
        #[arg(short, long)]
        user: String,

        /// JSON file of session readings
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Produce a training recommendation
    Recommend {
        #[arg(short, long)]
        user: String,

        /// JSON file of current readings
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Analyze progression for one exercise
    Progression {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        exercise: String,

        /// Lookback window in days
        #[arg(short, long)]
        lookback: Option<u32>,

        /// JSON file of workout session history
        #[arg(short = 'f', long)]
        sessions: PathBuf,
    },

    /// List or acknowledge alerts raised by submitted readings
    Alerts {
        #[arg(short, long)]
        user: String,

        /// JSON file of readings to evaluate
        #[arg(short, long)]
        file: PathBuf,

        /// Acknowledge this alert id after listing
        #[arg(short, long)]
        ack: Option<String>,
    },

    /// Manage configuration
    Config {
        /// Print the effective configuration as TOML
        #[arg(short, long)]
        show: bool,

        /// Write the default configuration to the config path
        #[arg(short, long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: LogLevel::from_verbosity(cli.verbose),
        ..Default::default()
    };
    init_logging(&log_config)?;

    let config = EngineConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Submit { file } => {
            let engine = build_engine(config);
            let (accepted, rejected) = submit_file(&engine, &file)?;
            println!(
                "{} {} accepted, {} rejected",
                "✓".green(),
                accepted.to_string().green().bold(),
                rejected.to_string().yellow()
            );
        }

        Commands::Assess {
            user,
            date,
            file,
            baseline_hr,
            baseline_spo2,
        } => {
            let store = Arc::new(MemorySessionStore::new());
            store.set_baseline(
                &user,
                Baseline {
                    resting_hr: baseline_hr,
                    spo2: baseline_spo2,
                },
            );
            let engine = build_engine_with_store(config, Arc::clone(&store));
            submit_file(&engine, &file)?;

            let date = parse_date(date)?;
            let assessment = engine.assess(&user, date)?;

            println!("{}", format!("Daily assessment for {}", user).bold());
            println!(
                "  HR delta: {:+.1} bpm ({})",
                assessment.hr_delta,
                paint_zone(&assessment.hr_zone.to_string())
            );
            println!(
                "  SpO2 delta: {:+.1} ({})",
                assessment.spo2_delta,
                paint_zone(&assessment.spo2_zone.to_string())
            );
            println!("  Status: {}", assessment.overall_status.to_string().bold());
            println!("  Composite score: {:.0}", assessment.composite_score);
            println!("  Confidence: {:.2}", assessment.confidence);
            for risk in &assessment.risk_factors {
                println!("  {} {}", "!".red(), risk);
            }
            println!("  {}", assessment.recommendation.cyan());
        }

        Commands::Live { user, file } => {
            let engine = build_engine(config);
            submit_file(&engine, &file)?;
            let result = engine.live_strain(&user);
            println!(
                "Live strain: {} ({})",
                format!("{:.0}", result.strain_score).bold(),
                paint_zone(&result.status.to_string())
            );
            println!("  HR rise: {:.0} bpm", result.hr_rise);
            println!("  SpO2 drop: {:.1}", result.spo2_drop);
            println!("  Recovery delay: {:.0}s", result.recovery_delay_secs);
        }

        Commands::Recommend { user, file } => {
            let engine = build_engine(config);
            submit_file(&engine, &file)?;
            let rec = engine.recommend(&user, None, &DecisionContext::default());
            println!(
                "Recommended intensity: {} (risk: {:?}, confidence {:.2})",
                rec.tier.to_string().bold(),
                rec.risk,
                rec.confidence
            );
            println!("  Rest multiplier: {:.1}x", rec.rest_multiplier);
            if let Some(ceiling) = rec.target_strain_ceiling {
                println!("  Target strain ceiling: {:.0}", ceiling);
            }
            if rec.hard_stop {
                println!("  {}", "HARD STOP advised".red().bold());
            }
            if rec.should_deload {
                println!(
                    "  {} {}",
                    "Deload:".yellow().bold(),
                    rec.deload_reason.as_deref().unwrap_or("recommended")
                );
            }
            for reason in &rec.reasons {
                println!("  - {}", reason);
            }
        }

        Commands::Progression {
            user,
            exercise,
            lookback,
            sessions,
        } => {
            let store = Arc::new(MemorySessionStore::new());
            let raw = std::fs::read_to_string(&sessions)
                .with_context(|| format!("reading {}", sessions.display()))?;
            let records: Vec<strainrs::models::WorkoutSessionRecord> =
                serde_json::from_str(&raw).context("parsing session history JSON")?;
            for record in records {
                store.append_session(record)?;
            }
            let engine = build_engine_with_store(config, store);
            let decision = engine.progression(&user, &exercise, lookback);
            println!(
                "Progression for {} / {}: {:?}",
                user,
                exercise,
                decision.action
            );
            println!("  {}", decision.reasoning);
            println!("  Confidence: {:.2}", decision.confidence);
            println!("  Next review: {}", decision.next_review);
        }

        Commands::Alerts { user, file, ack } => {
            let engine = build_engine(config);
            submit_file(&engine, &file)?;
            let alerts = engine.poll_alerts(&user);
            if alerts.is_empty() {
                println!("{}", "No unacknowledged alerts".green());
            }
            for alert in &alerts {
                println!(
                    "{} [{}] {} ({})",
                    alert.id.dimmed(),
                    alert.severity.to_string().to_uppercase().red(),
                    alert.message,
                    alert.triggered_at
                );
            }
            if let Some(alert_id) = ack {
                engine.ack(&alert_id)?;
                println!("{} acknowledged {}", "✓".green(), alert_id);
            }
        }

        Commands::Config { show, init } => {
            if init {
                let path = EngineConfig::default_path();
                config.save(&path)?;
                println!("{} wrote {}", "✓".green(), path.display());
            }
            if show || !init {
                let toml = toml::to_string_pretty(&config)?;
                println!("{}", toml);
            }
        }
    }

    Ok(())
}

fn build_engine(config: EngineConfig) -> StrainEngine {
    build_engine_with_store(config, Arc::new(MemorySessionStore::new()))
}

fn build_engine_with_store(config: EngineConfig, store: Arc<MemorySessionStore>) -> StrainEngine {
    StrainEngine::new(
        config,
        store,
        Arc::new(NullNotificationSink),
        Arc::new(AllowAllGate),
    )
}

/// Submit every reading in a JSON array file; returns (accepted, rejected)
fn submit_file(engine: &StrainEngine, file: &PathBuf) -> Result<(usize, usize)> {
    let raw =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let submissions: Vec<ReadingSubmission> =
        serde_json::from_str(&raw).context("parsing readings JSON")?;

    let mut accepted = 0;
    let mut rejected = 0;
    for submission in submissions {
        match engine.submit(submission) {
            Ok(()) => accepted += 1,
            Err(reason) => {
                rejected += 1;
                eprintln!("{} {}", "rejected:".yellow(), reason);
            }
        }
    }
    Ok((accepted, rejected))
}

fn paint_zone(zone: &str) -> ColoredString {
    match zone {
        "green" => zone.green(),
        "yellow" => zone.yellow(),
        _ => zone.red(),
    }
}

fn parse_date(date: Option<String>) -> Result<NaiveDate> {
    match date {
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .with_context(|| format!("invalid date: {}", s)),
        None => Ok(Utc::now().date_naive()),
    }
}
