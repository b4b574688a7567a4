//! # pulse-core
//!
//! Core library for pulse - a stall resolution pipeline for SMS sales
//! conversations that went quiet.
//!
//! This library provides:
//! - Backend activity gate over a CRM/portal status source
//! - Stall classifier and nudge composer driven by a language oracle
//! - Confidence/action policy
//! - Immutable decision records, a SQLite record sink, and review records
//! - Friction analytics over recorded decisions
//! - Configuration and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use pulse_core::{Config, Database, StallPipeline, Transcript, Turn};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> pulse_core::Result<()> {
//! let config = Config::load()?;
//! let db = Arc::new(Database::open(&Config::database_path())?);
//! db.migrate()?;
//!
//! let pipeline = StallPipeline::from_config(&config)?.with_sink(db);
//! let transcript = Transcript::new(
//!     "chat-001",
//!     vec![Turn::bot("To get started I'll need your VIN.")],
//! )?;
//! let decision = pipeline.resolve(&transcript, &CancellationToken::new()).await?;
//! println!("{}", decision.action());
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{ClassifiedStall, DecisionStats, FrictionReport, FrictionRow, ReportOptions};
pub use classifier::{CategorySet, StallClassifier};
pub use composer::NudgeComposer;
pub use config::Config;
pub use db::{Database, DecisionFilter};
pub use decision::{Decision, DecisionParts};
pub use error::{ClassificationFailure, CompositionFailure, Error, Result};
pub use gate::{BackendActivityGate, StatusSource};
pub use oracle::{LanguageOracle, OracleRequest};
pub use pipeline::{aggregate_friction, StallPipeline};
pub use policy::{decide, PolicyConfig};
pub use review::{ReviewDisposition, ReviewRecord, ReviewStats};
pub use sink::{MemorySink, RecordSink};
pub use types::*;

// Public modules
pub mod analytics;
pub mod classifier;
pub mod composer;
pub mod config;
pub mod db;
pub mod decision;
pub mod error;
pub mod gate;
pub mod logging;
pub mod oracle;
pub mod pipeline;
pub mod policy;
pub mod review;
pub mod sink;
pub mod types;
