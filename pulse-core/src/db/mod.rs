//! Database layer for pulse
//!
//! SQLite storage for the decision trail:
//! - Schema migrations
//! - Append-only decisions and reviews
//! - Queries feeding the review queue and analytics

pub mod repo;
pub mod schema;

pub use repo::{Database, DecisionFilter};
