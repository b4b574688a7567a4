//! Friction aggregation.
//!
//! Groups classified stalls by the bot prompt that preceded them and ranks
//! prompts by how often the stall was non-benign. The output is a pure
//! function of the input multiset: permuting the input never changes it.
//!
//! Ordering:
//! 1. friction rate, descending (compared exactly on integer counts)
//! 2. stall count, descending
//! 3. grouping key, ascending

use crate::types::StallCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Conversation ids kept per row as examples.
const SAMPLE_SIZE: usize = 5;

/// Prompt width in the text report.
const PROMPT_DISPLAY_CHARS: usize = 80;

/// One classification tied to the prompt it followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedStall {
    pub conversation_id: String,
    pub origin_prompt: String,
    pub category: StallCategory,
    pub confidence: f64,
}

/// One ranked prompt (or prompt type).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrictionRow {
    /// Display text
    pub prompt: String,
    /// Grouping key
    #[serde(skip)]
    pub key: String,
    pub stall_count: usize,
    pub friction_count: usize,
    pub benign_count: usize,
    pub friction_rate: f64,
    pub categories: BTreeMap<StallCategory, usize>,
    pub sample_conversation_ids: Vec<String>,
}

impl FrictionRow {
    fn cmp_rank(&self, other: &Self) -> Ordering {
        // a/b > c/d  <=>  a*d > c*b, with b, d > 0
        let lhs = self.friction_count as u128 * other.stall_count as u128;
        let rhs = other.friction_count as u128 * self.stall_count as u128;
        rhs.cmp(&lhs)
            .then_with(|| other.stall_count.cmp(&self.stall_count))
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// Lowercase and collapse whitespace.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rank prompts by friction rate.
pub fn aggregate(stalls: &[ClassifiedStall]) -> Vec<FrictionRow> {
    rank(stalls, |s| {
        let key = normalize_prompt(&s.origin_prompt);
        (key, s.origin_prompt.trim().to_string())
    })
}

/// Rank coarse prompt types by friction rate.
pub fn aggregate_by_prompt_type(stalls: &[ClassifiedStall]) -> Vec<FrictionRow> {
    rank(stalls, |s| {
        let kind = PromptType::identify(&s.origin_prompt);
        (kind.as_str().to_string(), kind.label().to_string())
    })
}

#[derive(Default)]
struct Group {
    display: BTreeSet<String>,
    stall_count: usize,
    friction_count: usize,
    categories: BTreeMap<StallCategory, usize>,
    conversations: BTreeSet<String>,
}

fn rank<F>(stalls: &[ClassifiedStall], key_of: F) -> Vec<FrictionRow>
where
    F: Fn(&ClassifiedStall) -> (String, String),
{
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    for stall in stalls {
        let (key, display) = key_of(stall);
        if key.is_empty() {
            continue;
        }
        let group = groups.entry(key).or_default();
        group.display.insert(display);
        group.stall_count += 1;
        if !stall.category.is_benign() {
            group.friction_count += 1;
        }
        *group.categories.entry(stall.category).or_insert(0) += 1;
        group.conversations.insert(stall.conversation_id.clone());
    }

    let mut rows: Vec<FrictionRow> = groups
        .into_iter()
        .filter(|(_, g)| g.stall_count > 0)
        .map(|(key, g)| {
            // Smallest variant keeps the display text independent of input order
            let prompt = g.display.into_iter().next().unwrap_or_else(|| key.clone());
            FrictionRow {
                prompt,
                key,
                stall_count: g.stall_count,
                friction_count: g.friction_count,
                benign_count: g.stall_count - g.friction_count,
                friction_rate: g.friction_count as f64 / g.stall_count as f64,
                categories: g.categories,
                sample_conversation_ids: g.conversations.into_iter().take(SAMPLE_SIZE).collect(),
            }
        })
        .collect();

    rows.sort_by(FrictionRow::cmp_rank);
    rows
}

/// Coarse type of a bot prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    VinRequest,
    LicenseRequest,
    DocumentUpload,
    SsnRequest,
    CoverageTerms,
    AddressRequest,
    DobRequest,
    SpouseInfo,
    Other,
}

impl PromptType {
    pub fn identify(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has_word = |w: &str| words.iter().any(|t| *t == w);
        let has_any = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));

        if has_word("vin") {
            PromptType::VinRequest
        } else if lower.contains("license") && (lower.contains("driver") || has_word("dl")) {
            PromptType::LicenseRequest
        } else if has_any(&["photo", "upload", "picture"]) {
            PromptType::DocumentUpload
        } else if has_word("ssn") || lower.contains("social security") {
            PromptType::SsnRequest
        } else if has_any(&["deductible", "coverage", "premium", "liability"]) {
            PromptType::CoverageTerms
        } else if lower.contains("address") {
            PromptType::AddressRequest
        } else if lower.contains("date") && lower.contains("birth") {
            PromptType::DobRequest
        } else if has_any(&["spouse", "husband", "wife"]) {
            PromptType::SpouseInfo
        } else {
            PromptType::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::VinRequest => "vin_request",
            PromptType::LicenseRequest => "license_request",
            PromptType::DocumentUpload => "document_upload",
            PromptType::SsnRequest => "ssn_request",
            PromptType::CoverageTerms => "coverage_terms",
            PromptType::AddressRequest => "address_request",
            PromptType::DobRequest => "dob_request",
            PromptType::SpouseInfo => "spouse_info",
            PromptType::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PromptType::VinRequest => "VIN Request",
            PromptType::LicenseRequest => "Driver's License Request",
            PromptType::DocumentUpload => "Photo/Document Upload",
            PromptType::SsnRequest => "SSN Request",
            PromptType::CoverageTerms => "Coverage/Insurance Terms",
            PromptType::AddressRequest => "Address Request",
            PromptType::DobRequest => "DOB Request",
            PromptType::SpouseInfo => "Spouse Information",
            PromptType::Other => "Other",
        }
    }
}

/// Filters applied when building a [`FrictionReport`].
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Drop rows with fewer stalls than this
    pub min_occurrences: usize,
    /// Keep at most this many rows
    pub top_n: usize,
    /// Group by prompt type instead of prompt text
    pub by_prompt_type: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            top_n: 10,
            by_prompt_type: false,
        }
    }
}

/// Ranked friction breakdown with totals.
#[derive(Debug, Clone, Serialize)]
pub struct FrictionReport {
    pub generated_at: DateTime<Utc>,
    pub total_conversations: usize,
    pub total_friction: usize,
    pub total_benign: usize,
    pub overall_friction_rate: f64,
    pub by_category: BTreeMap<StallCategory, usize>,
    pub rows: Vec<FrictionRow>,
}

impl FrictionReport {
    pub fn build(stalls: &[ClassifiedStall], options: &ReportOptions) -> Self {
        let rows = if options.by_prompt_type {
            aggregate_by_prompt_type(stalls)
        } else {
            aggregate(stalls)
        };
        let rows: Vec<FrictionRow> = rows
            .into_iter()
            .filter(|r| r.stall_count >= options.min_occurrences.max(1))
            .take(options.top_n)
            .collect();

        let mut by_category = BTreeMap::new();
        for stall in stalls {
            *by_category.entry(stall.category).or_insert(0) += 1;
        }
        let total_conversations = stalls.len();
        let total_friction = stalls.iter().filter(|s| !s.category.is_benign()).count();
        let overall_friction_rate = if total_conversations == 0 {
            0.0
        } else {
            total_friction as f64 / total_conversations as f64
        };

        Self {
            generated_at: Utc::now(),
            total_conversations,
            total_friction,
            total_benign: total_conversations - total_friction,
            overall_friction_rate,
            by_category,
            rows,
        }
    }

    /// Plain-text rendering for terminals.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Conversations: {}  Friction: {}  Benign: {}  Friction rate: {:.1}%\n",
            self.total_conversations,
            self.total_friction,
            self.total_benign,
            self.overall_friction_rate * 100.0
        ));
        if self.rows.is_empty() {
            out.push_str("\nNo prompts met the reporting threshold.\n");
            return out;
        }
        out.push('\n');
        for (i, row) in self.rows.iter().enumerate() {
            out.push_str(&format!(
                "{:>2}. {:>5.1}%  {:>4} stalls  {}\n",
                i + 1,
                row.friction_rate * 100.0,
                row.stall_count,
                ellipsize(&row.prompt, PROMPT_DISPLAY_CHARS)
            ));
        }
        out
    }
}

fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    shortened.push_str("...");
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stall(id: usize, prompt: &str, category: StallCategory) -> ClassifiedStall {
        ClassifiedStall {
            conversation_id: format!("c-{id:03}"),
            origin_prompt: prompt.to_string(),
            category,
            confidence: 0.8,
        }
    }

    /// 47 stalls on the VIN prompt (37 non-benign) and 50 on the address
    /// prompt (31 non-benign).
    fn scenario() -> Vec<ClassifiedStall> {
        let mut stalls = Vec::new();
        for i in 0..47 {
            let category = if i < 37 {
                StallCategory::HighFriction
            } else {
                StallCategory::Benign
            };
            stalls.push(stall(i, "I need your VIN", category));
        }
        for i in 0..50 {
            let category = if i < 31 {
                StallCategory::Confusion
            } else {
                StallCategory::Benign
            };
            stalls.push(stall(100 + i, "What's your home address?", category));
        }
        stalls
    }

    #[test]
    fn test_vin_prompt_outranks_lower_rate() {
        let rows = aggregate(&scenario());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].prompt, "I need your VIN");
        assert_eq!(rows[0].stall_count, 47);
        assert_eq!(rows[0].friction_count, 37);
        assert!((rows[0].friction_rate - 0.787).abs() < 0.001);
        assert!((rows[1].friction_rate - 0.62).abs() < 1e-9);
    }

    #[test]
    fn test_equal_rate_ranks_by_stall_count() {
        let mut stalls = Vec::new();
        // 1/2 on the small prompt, 2/4 on the large one
        stalls.push(stall(1, "small", StallCategory::Confusion));
        stalls.push(stall(2, "small", StallCategory::Benign));
        for i in 0..4 {
            let category = if i < 2 {
                StallCategory::HighFriction
            } else {
                StallCategory::Benign
            };
            stalls.push(stall(10 + i, "large", category));
        }
        let rows = aggregate(&stalls);
        assert_eq!(rows[0].prompt, "large");
        assert_eq!(rows[1].prompt, "small");
    }

    #[test]
    fn test_permuted_input_gives_identical_output() {
        let mut stalls = scenario();
        stalls.push(stall(500, "  I NEED your   VIN ", StallCategory::Benign));
        stalls.push(stall(501, "Upload a photo of your license", StallCategory::TrustPrivacy));
        let expected = aggregate(&stalls);

        let mut reversed = stalls.clone();
        reversed.reverse();
        assert_eq!(aggregate(&reversed), expected);

        // Deterministic interleave
        let mut shuffled = Vec::with_capacity(stalls.len());
        let (evens, odds): (Vec<_>, Vec<_>) =
            stalls.iter().cloned().enumerate().partition(|(i, _)| i % 2 == 0);
        shuffled.extend(odds.into_iter().map(|(_, s)| s));
        shuffled.extend(evens.into_iter().rev().map(|(_, s)| s));
        assert_eq!(aggregate(&shuffled), expected);
    }

    #[test]
    fn test_prompts_grouped_by_normalized_text() {
        let stalls = vec![
            stall(1, "I need your VIN", StallCategory::HighFriction),
            stall(2, "i need  your vin", StallCategory::Benign),
        ];
        let rows = aggregate(&stalls);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stall_count, 2);
        assert_eq!(rows[0].prompt, "I need your VIN");
    }

    #[test]
    fn test_empty_input_is_empty_output() {
        assert!(aggregate(&[]).is_empty());
        let report = FrictionReport::build(&[], &ReportOptions::default());
        assert_eq!(report.total_conversations, 0);
        assert_eq!(report.overall_friction_rate, 0.0);
        assert!(report.rows.is_empty());
    }

    #[test]
    fn test_blank_prompts_are_never_emitted() {
        let stalls = vec![stall(1, "   ", StallCategory::Confusion)];
        assert!(aggregate(&stalls).is_empty());
    }

    #[test]
    fn test_report_filters_and_totals() {
        let mut stalls = scenario();
        stalls.push(stall(900, "Just one of these", StallCategory::Confusion));
        let report = FrictionReport::build(
            &stalls,
            &ReportOptions {
                min_occurrences: 2,
                top_n: 1,
                by_prompt_type: false,
            },
        );
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].prompt, "I need your VIN");
        assert_eq!(report.total_conversations, 98);
        assert_eq!(report.total_friction, 37 + 31 + 1);
        assert_eq!(report.by_category[&StallCategory::Benign], 10 + 19);
        assert!(report.render_text().contains("I need your VIN"));
    }

    #[test]
    fn test_prompt_type_rollup() {
        let stalls = vec![
            stall(1, "What's your VIN?", StallCategory::HighFriction),
            stall(2, "Can you share the VIN number?", StallCategory::Benign),
            stall(3, "What's your driver's license number?", StallCategory::HighFriction),
            stall(4, "Tell me about your driving history", StallCategory::Benign),
        ];
        let rows = aggregate_by_prompt_type(&stalls);
        assert_eq!(rows[0].prompt, "Driver's License Request");
        assert_eq!(rows[0].friction_rate, 1.0);
        let vin = rows.iter().find(|r| r.prompt == "VIN Request").unwrap();
        assert_eq!(vin.stall_count, 2);
        // "driving" contains "vin" but is not a VIN request
        assert!(rows.iter().any(|r| r.prompt == "Other"));
    }

    #[test]
    fn test_identify_prompt_type() {
        assert_eq!(PromptType::identify("What's your SSN?"), PromptType::SsnRequest);
        assert_eq!(
            PromptType::identify("Which deductible would you like?"),
            PromptType::CoverageTerms
        );
        assert_eq!(
            PromptType::identify("What's your date of birth?"),
            PromptType::DobRequest
        );
        assert_eq!(
            PromptType::identify("Should we add your spouse?"),
            PromptType::SpouseInfo
        );
        assert_eq!(PromptType::identify("Anything else?"), PromptType::Other);
    }
}
