//! pulse-resolve - run stalled conversations through the resolution pipeline
//!
//! Reads transcripts as JSON lines (one `{"conversation_id", "turns"}` object
//! per line), resolves each one, and records every decision in the pulse
//! database.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/pulse/pulse.db (~/.local/share/pulse/pulse.db)
//! - Logs: $XDG_STATE_HOME/pulse/pulse.YYYY-MM-DD.log, one file per day
//! - Config: $XDG_CONFIG_HOME/pulse/config.toml (~/.config/pulse/config.toml)

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pulse_core::{Action, Config, Database, Decision, Error, StallPipeline, Transcript};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "pulse-resolve")]
#[command(about = "Resolve stalled conversations into recorded decisions")]
#[command(version)]
struct Args {
    /// Transcript file (JSON lines). Reads stdin when omitted or `-`
    input: Option<PathBuf>,

    /// Conversations resolved at the same time
    #[arg(short, long, default_value = "4")]
    concurrency: usize,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Resolve without recording decisions
    #[arg(long)]
    dry_run: bool,

    /// Verbose output (print every decision, not just the summary)
    #[arg(short, long)]
    verbose: bool,
}

/// Outcome of one input line
enum LineOutcome {
    Resolved(Box<Decision>),
    Invalid(String),
    Cancelled,
    Failed(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        pulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(dry_run = args.dry_run, "pulse-resolve starting");

    let mut pipeline = StallPipeline::from_config(&config).context("invalid pipeline configuration")?;

    if !args.dry_run {
        let db_path = Config::database_path();
        tracing::info!(path = %db_path.display(), "Opening database");
        let db = Database::open(&db_path).context("failed to open database")?;
        db.migrate().context("failed to run database migrations")?;
        pipeline = pipeline.with_sink(Arc::new(db));
    }
    let pipeline = Arc::new(pipeline);

    let lines = read_lines(args.input.as_ref())?;
    if lines.is_empty() {
        println!("No transcripts to resolve.");
        return Ok(());
    }

    // Ctrl+C abandons runs that have not composed a message yet
    let cancel = CancellationToken::new();
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling...");
        c.cancel();
    })
    .context("failed to set Ctrl+C handler")?;

    let pb = if args.format == "json" {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(lines.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let permits = Arc::new(Semaphore::new(args.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (idx, line) in lines.into_iter().enumerate() {
        let pipeline = pipeline.clone();
        let permits = permits.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let transcript: Transcript = match serde_json::from_str(&line) {
                Ok(t) => t,
                Err(e) => return (idx, LineOutcome::Invalid(e.to_string())),
            };
            let Ok(_permit) = permits.acquire_owned().await else {
                return (idx, LineOutcome::Cancelled);
            };
            let outcome = match pipeline.resolve(&transcript, &cancel).await {
                Ok(decision) => LineOutcome::Resolved(Box::new(decision)),
                Err(Error::Cancelled(_)) => LineOutcome::Cancelled,
                Err(e) => LineOutcome::Failed(format!("{}: {}", transcript.conversation_id(), e)),
            };
            (idx, outcome)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (idx, outcome) = joined.context("resolution task panicked")?;
        if let LineOutcome::Resolved(decision) = &outcome {
            pb.set_message(decision.conversation_id().to_string());
        }
        pb.inc(1);
        outcomes.push((idx, outcome));
    }
    pb.finish_and_clear();

    // Report in input order
    outcomes.sort_by_key(|(idx, _)| *idx);

    let mut by_action: BTreeMap<Action, usize> = BTreeMap::new();
    let mut invalid = 0usize;
    let mut cancelled = 0usize;
    let mut failed = 0usize;

    for (idx, outcome) in &outcomes {
        match outcome {
            LineOutcome::Resolved(decision) => {
                *by_action.entry(decision.action()).or_insert(0) += 1;
                if args.format == "json" {
                    println!("{}", serde_json::to_string(decision.as_ref())?);
                } else if args.verbose {
                    print_decision(decision);
                }
            }
            LineOutcome::Invalid(e) => {
                invalid += 1;
                eprintln!("Line {}: invalid transcript: {}", idx + 1, e);
            }
            LineOutcome::Cancelled => cancelled += 1,
            LineOutcome::Failed(e) => {
                failed += 1;
                eprintln!("Line {}: {}", idx + 1, e);
            }
        }
    }

    let resolved: usize = by_action.values().sum();
    tracing::info!(resolved, invalid, cancelled, failed, "pulse-resolve complete");

    if args.format != "json" {
        println!("Resolved {} conversation(s)", resolved);
        for action in Action::ALL {
            let count = by_action.get(&action).copied().unwrap_or(0);
            if count > 0 {
                println!("  {:<20} {}", action.as_str(), count);
            }
        }
        if invalid > 0 {
            println!("Invalid lines: {}", invalid);
        }
        if cancelled > 0 {
            println!("Cancelled: {}", cancelled);
        }
        if args.dry_run {
            println!("\nDry run - no decisions recorded");
        }
    }

    if failed > 0 {
        anyhow::bail!("{} conversation(s) could not be recorded", failed);
    }
    Ok(())
}

/// Read non-empty input lines from a file or stdin
fn read_lines(input: Option<&PathBuf>) -> Result<Vec<String>> {
    let reader: Box<dyn Read> = match input {
        Some(path) if path.as_os_str() != "-" => Box::new(
            std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        _ => Box::new(std::io::stdin()),
    };

    let mut lines = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line.context("failed to read input")?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn print_decision(decision: &Decision) {
    let classification = decision
        .classification()
        .map(|c| format!("{} {:.2}", c.category, c.confidence))
        .unwrap_or_else(|| "unclassified".to_string());
    println!(
        "{:<24} {:<20} {}",
        decision.conversation_id(),
        decision.action().as_str(),
        classification
    );
    if let Some(message) = decision.message() {
        println!("    > {}", message.text);
    }
    if let Some(reason) = decision.gate().unavailable_reason() {
        println!("    gate: {}", reason);
    }
    if let Some(error) = decision.classification_error() {
        println!("    classifier: {}", error);
    }
    if let Some(error) = decision.composition_error() {
        println!("    composer: {}", error);
    }
}
