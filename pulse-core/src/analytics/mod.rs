//! Read-side analytics over recorded decisions
//!
//! - [`friction`]: which bot prompts users stall on, ranked by friction rate
//! - [`stats`]: action and category counts across decisions
//!
//! Everything here is recomputed from the record sink on demand; nothing is
//! stored as authoritative state.

pub mod friction;
pub mod stats;

pub use friction::{
    aggregate, aggregate_by_prompt_type, normalize_prompt, ClassifiedStall, FrictionReport,
    FrictionRow, PromptType, ReportOptions,
};
pub use stats::DecisionStats;
