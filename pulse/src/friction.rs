//! pulse-friction - rank bot prompts by how often users stall on them
//!
//! Aggregates recorded classifications (or a JSON lines export of them) by
//! the bot prompt that preceded the stall.

use anyhow::{Context, Result};
use clap::Parser;
use pulse_core::{ClassifiedStall, Config, Database, FrictionReport, ReportOptions};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pulse-friction")]
#[command(about = "Rank bot prompts by stall friction")]
#[command(version)]
struct Args {
    /// Read classified stalls from a JSON lines file instead of the database
    #[arg(long)]
    stalls: Option<PathBuf>,

    /// Group by prompt type (VIN, license, address, ...) instead of exact prompt
    #[arg(long)]
    by_type: bool,

    /// Only show prompts with at least this many stalls
    #[arg(long, default_value = "2")]
    min_occurrences: usize,

    /// Number of prompts to show
    #[arg(short = 'n', long, default_value = "10")]
    top: usize,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        pulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let stalls = match args.stalls {
        Some(ref path) => load_stalls(path)?,
        None => {
            let db = Database::open(&Config::database_path()).context("failed to open database")?;
            db.migrate().context("failed to run database migrations")?;
            db.list_classified_stalls()
                .context("failed to load classified decisions")?
        }
    };

    if stalls.is_empty() && args.format != "json" {
        println!("No classified stalls found.");
        println!("Run 'pulse-resolve' first to record decisions.");
        return Ok(());
    }

    let options = ReportOptions {
        min_occurrences: args.min_occurrences,
        top_n: args.top,
        by_prompt_type: args.by_type,
    };
    let report = FrictionReport::build(&stalls, &options);

    tracing::info!(
        stalls = stalls.len(),
        rows = report.rows.len(),
        by_type = args.by_type,
        "Friction report built"
    );

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let heading = if args.by_type {
            "Friction by prompt type"
        } else {
            "Friction by prompt"
        };
        println!("{}\n", heading);
        print!("{}", report.render_text());
    }

    Ok(())
}

fn load_stalls(path: &PathBuf) -> Result<Vec<ClassifiedStall>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut stalls = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("failed to read stalls file")?;
        if line.trim().is_empty() {
            continue;
        }
        let stall: ClassifiedStall = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid stall record", path.display(), idx + 1))?;
        stalls.push(stall);
    }
    Ok(stalls)
}
