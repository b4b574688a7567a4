//! pulse-review - work the manual review queue
//!
//! Decisions with action `queue_for_review` wait here until a person
//! approves, edits, or rejects them. Reviews are appended, never changed.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use pulse_core::{
    Action, Config, Database, Decision, DecisionFilter, ReviewDisposition, ReviewRecord,
};

#[derive(Parser)]
#[command(name = "pulse-review")]
#[command(about = "Review queued nudges")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List queued decisions that have not been reviewed, oldest first
    Queue {
        /// Maximum decisions to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Approve the composed message as is
    Approve(Target),
    /// Replace the composed message with new text
    Edit {
        #[command(flatten)]
        target: Target,
        /// Replacement message (160 characters at most)
        #[arg(long)]
        text: String,
    },
    /// Reject the nudge; nothing is sent
    Reject(Target),
    /// Show decision and review statistics
    Stats {
        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(ClapArgs)]
struct Target {
    /// Decision ID (unique prefix accepted)
    decision_id: String,

    /// Who reviewed it
    #[arg(long)]
    reviewer: Option<String>,

    /// Free-form notes
    #[arg(long)]
    notes: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        pulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db = Database::open(&Config::database_path()).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    match args.command {
        Command::Queue { limit } => print_queue(&db, limit),
        Command::Approve(target) => record(&db, &target, ReviewDisposition::Approved, None),
        Command::Edit { target, text } => {
            record(&db, &target, ReviewDisposition::Edited, Some(text))
        }
        Command::Reject(target) => record(&db, &target, ReviewDisposition::Rejected, None),
        Command::Stats { format } => print_stats(&db, &format),
    }
}

fn print_queue(db: &Database, limit: usize) -> Result<()> {
    let queue = db.review_queue(limit).context("failed to load review queue")?;
    if queue.is_empty() {
        println!("Review queue is empty.");
        return Ok(());
    }

    println!("{} decision(s) awaiting review:\n", queue.len());
    for decision in &queue {
        let classification = decision
            .classification()
            .map(|c| format!("{} {:.2}", c.category, c.confidence))
            .unwrap_or_default();
        println!(
            "{}  {}  {}  {}",
            short_id(decision.decision_id()),
            decision.decided_at().format("%Y-%m-%d %H:%M"),
            decision.conversation_id(),
            classification
        );
        if let Some(prompt) = decision.origin_prompt() {
            println!("    bot: {}", prompt);
        }
        match (decision.message(), decision.composition_error()) {
            (Some(message), _) => println!("    > {}", message.text),
            (None, Some(error)) => println!("    (no message: {})", error),
            (None, None) => {}
        }
    }
    Ok(())
}

fn record(
    db: &Database,
    target: &Target,
    disposition: ReviewDisposition,
    edited_text: Option<String>,
) -> Result<()> {
    let decision = find_decision(db, &target.decision_id)?;
    let review = ReviewRecord::new(
        &decision,
        disposition,
        edited_text,
        target.reviewer.clone(),
        target.notes.clone(),
    )?;
    db.insert_review(&review).context("failed to record review")?;

    tracing::info!(
        decision_id = decision.decision_id(),
        review_id = %review.review_id,
        disposition = %disposition,
        "Review recorded"
    );
    println!(
        "{} {} ({})",
        disposition,
        short_id(decision.decision_id()),
        decision.conversation_id()
    );
    Ok(())
}

/// Exact ID first, then a unique prefix among queued decisions
fn find_decision(db: &Database, id: &str) -> Result<Decision> {
    if let Some(decision) = db.get_decision(id)? {
        return Ok(decision);
    }

    let queued = db.list_decisions(&DecisionFilter {
        action: Some(Action::QueueForReview),
        ..Default::default()
    })?;
    let mut matches: Vec<_> = queued
        .into_iter()
        .filter(|d| d.decision_id().starts_with(id))
        .collect();

    match matches.len() {
        0 => anyhow::bail!("No decision found matching '{}'", id),
        1 => Ok(matches.remove(0)),
        n => anyhow::bail!("'{}' matches {} decisions; use a longer prefix", id, n),
    }
}

fn print_stats(db: &Database, format: &str) -> Result<()> {
    let decisions = db.decision_stats()?;
    let reviews = db.review_stats()?;

    if format == "json" {
        let value = serde_json::json!({
            "decisions": decisions,
            "reviews": reviews,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Decisions: {}", decisions.total);
    for action in Action::ALL {
        println!("  {:<20} {}", action.as_str(), decisions.count(action));
    }
    if decisions.classification_failures > 0 || decisions.composition_failures > 0 {
        println!(
            "  classifier failures {}, composer failures {}",
            decisions.classification_failures, decisions.composition_failures
        );
    }
    if let Some(avg) = decisions.avg_confidence {
        println!("Average confidence: {:.2}", avg);
    }
    println!(
        "Non-benign rate: {:.1}%",
        decisions.non_benign_rate() * 100.0
    );

    println!("\nReviews: {}", reviews.total);
    if reviews.total > 0 {
        println!(
            "  approved {}, edited {}, rejected {}",
            reviews.approved, reviews.edited, reviews.rejected
        );
        println!(
            "  acceptance {:.1}%, rejection {:.1}%",
            reviews.acceptance_rate() * 100.0,
            reviews.rejection_rate() * 100.0
        );
    }
    Ok(())
}

fn short_id(id: &str) -> &str {
    &id[..8.min(id.len())]
}
