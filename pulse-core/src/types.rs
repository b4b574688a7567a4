//! Core domain types for pulse
//!
//! These types describe one stalled conversation as it moves through the
//! resolution pipeline.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Stall** | Last turn was bot-authored and the user has not replied within the window |
//! | **Gate** | Backend activity check that stops us acting on a stall resolved elsewhere |
//! | **Friction** | A blocker that made the user stop replying (as opposed to benign inactivity) |
//! | **Persona** | Named brand-voice configuration applied while composing a nudge |
//! | **Origin prompt** | The bot turn that immediately preceded the stall |

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hard character ceiling of the outbound SMS channel.
pub const MAX_NUDGE_CHARS: usize = 160;

// ============================================
// Transcript
// ============================================

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    Bot,
    User,
}

impl SpeakerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Bot => "bot",
            SpeakerRole::User => "user",
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: SpeakerRole,
    pub text: String,
    /// When the turn was sent, if the channel reported it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: SpeakerRole::Bot,
            text: text.into(),
            at: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: SpeakerRole::User,
            text: text.into(),
            at: None,
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}

/// An immutable, validated conversation transcript.
///
/// Always holds at least one turn, and turns that carry timestamps are in
/// chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TranscriptRecord")]
pub struct Transcript {
    conversation_id: String,
    turns: Vec<Turn>,
    last_bot_message_at: Option<DateTime<Utc>>,
}

/// Wire shape of a transcript before validation.
#[derive(Debug, Deserialize)]
struct TranscriptRecord {
    conversation_id: String,
    turns: Vec<Turn>,
    #[serde(default)]
    last_bot_message_at: Option<DateTime<Utc>>,
}

impl TryFrom<TranscriptRecord> for Transcript {
    type Error = Error;

    fn try_from(record: TranscriptRecord) -> Result<Self> {
        let mut transcript = Transcript::new(record.conversation_id, record.turns)?;
        if record.last_bot_message_at.is_some() {
            transcript.last_bot_message_at = record.last_bot_message_at;
        }
        Ok(transcript)
    }
}

impl Transcript {
    /// Build a transcript, rejecting empty or out-of-order input.
    pub fn new(conversation_id: impl Into<String>, turns: Vec<Turn>) -> Result<Self> {
        let conversation_id = conversation_id.into();
        if conversation_id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "transcript conversation_id must not be empty".to_string(),
            ));
        }
        if turns.is_empty() {
            return Err(Error::InvalidInput(format!(
                "transcript {conversation_id} has no turns"
            )));
        }

        let mut previous: Option<DateTime<Utc>> = None;
        for (idx, turn) in turns.iter().enumerate() {
            if let Some(at) = turn.at {
                if previous.is_some_and(|prev| at < prev) {
                    return Err(Error::InvalidInput(format!(
                        "transcript {conversation_id} turn {idx} is earlier than the turn before it"
                    )));
                }
                previous = Some(at);
            }
        }

        let last_bot_message_at = turns
            .iter()
            .rev()
            .find(|t| t.role == SpeakerRole::Bot)
            .and_then(|t| t.at);

        Ok(Self {
            conversation_id,
            turns,
            last_bot_message_at,
        })
    }

    /// Override the last-bot-message timestamp reported by the scheduler.
    pub fn with_last_bot_message_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_bot_message_at = Some(at);
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_bot_message_at(&self) -> Option<DateTime<Utc>> {
        self.last_bot_message_at
    }

    /// Last turn authored by the bot.
    pub fn last_bot_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == SpeakerRole::Bot)
    }

    /// Last turn authored by the user.
    pub fn last_user_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == SpeakerRole::User)
    }

    /// The bot prompt that immediately preceded the stall.
    pub fn origin_prompt(&self) -> Option<&str> {
        self.last_bot_turn().map(|t| t.text.as_str())
    }
}

// ============================================
// Backend status
// ============================================

/// What the status source reported for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// User acted on another channel (portal, email, phone)
    #[serde(default)]
    pub active_elsewhere: bool,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Requested documents already arrived
    #[serde(default)]
    pub documents_received: bool,
}

/// Point-in-time gate result for one conversation.
///
/// `safe_to_engage` is derived from the other fields and cannot be set
/// directly; deserializing recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BackendStatusRecord")]
pub struct BackendStatus {
    conversation_id: String,
    active_elsewhere: bool,
    last_activity_at: Option<DateTime<Utc>>,
    documents_received: bool,
    /// Set when the status source could not be read
    unavailable: Option<String>,
    safe_to_engage: bool,
    checked_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct BackendStatusRecord {
    conversation_id: String,
    #[serde(default)]
    active_elsewhere: bool,
    #[serde(default)]
    last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    documents_received: bool,
    #[serde(default)]
    unavailable: Option<String>,
    checked_at: DateTime<Utc>,
}

impl From<BackendStatusRecord> for BackendStatus {
    fn from(r: BackendStatusRecord) -> Self {
        match r.unavailable {
            Some(reason) => BackendStatus::unavailable(r.conversation_id, reason, r.checked_at),
            None => BackendStatus::observed(
                r.conversation_id,
                StatusSnapshot {
                    active_elsewhere: r.active_elsewhere,
                    last_activity_at: r.last_activity_at,
                    documents_received: r.documents_received,
                },
                r.checked_at,
            ),
        }
    }
}

impl BackendStatus {
    /// Status built from a successful status-source read.
    pub fn observed(
        conversation_id: impl Into<String>,
        snapshot: StatusSnapshot,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let safe_to_engage = !snapshot.active_elsewhere && !snapshot.documents_received;
        Self {
            conversation_id: conversation_id.into(),
            active_elsewhere: snapshot.active_elsewhere,
            last_activity_at: snapshot.last_activity_at,
            documents_received: snapshot.documents_received,
            unavailable: None,
            safe_to_engage,
            checked_at,
        }
    }

    /// Fail-closed status used when the status source could not be read.
    pub fn unavailable(
        conversation_id: impl Into<String>,
        reason: impl Into<String>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            active_elsewhere: false,
            last_activity_at: None,
            documents_received: false,
            unavailable: Some(reason.into()),
            safe_to_engage: false,
            checked_at,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn active_elsewhere(&self) -> bool {
        self.active_elsewhere
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at
    }

    pub fn documents_received(&self) -> bool {
        self.documents_received
    }

    /// Reason the status source could not be read, if it failed.
    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    pub fn safe_to_engage(&self) -> bool {
        self.safe_to_engage
    }

    pub fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }
}

// ============================================
// Classification
// ============================================

/// Why the user went silent. Closed set; the configured category list picks
/// which of these the classifier may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallCategory {
    Benign,
    Confusion,
    HighFriction,
    PricingShock,
    TrustPrivacy,
}

impl StallCategory {
    pub const ALL: [StallCategory; 5] = [
        StallCategory::Benign,
        StallCategory::Confusion,
        StallCategory::HighFriction,
        StallCategory::PricingShock,
        StallCategory::TrustPrivacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StallCategory::Benign => "benign",
            StallCategory::Confusion => "confusion",
            StallCategory::HighFriction => "high_friction",
            StallCategory::PricingShock => "pricing_shock",
            StallCategory::TrustPrivacy => "trust_privacy",
        }
    }

    /// Guidance shown to the oracle for this category.
    pub fn description(&self) -> &'static str {
        match self {
            StallCategory::Benign => {
                "User is likely busy, distracted, or naturally paused. No clear friction or confusion signals."
            }
            StallCategory::Confusion => {
                "Bot used jargon or unclear instructions, or the user said they did not understand what was asked."
            }
            StallCategory::HighFriction => {
                "Bot asked for something hard to get (VIN, license number, documents, photos) and the user expressed difficulty or inability."
            }
            StallCategory::PricingShock => {
                "User reacted to a quoted price or premium with surprise or objection."
            }
            StallCategory::TrustPrivacy => {
                "User hesitated to share personal or sensitive data, or questioned why it is needed."
            }
        }
    }

    pub fn is_benign(&self) -> bool {
        matches!(self, StallCategory::Benign)
    }
}

impl std::fmt::Display for StallCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StallCategory {
    type Err = String;

    /// Accepts both `high_friction` and the oracle's `HIGH_FRICTION` spelling.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "benign" => Ok(StallCategory::Benign),
            "confusion" => Ok(StallCategory::Confusion),
            "high_friction" => Ok(StallCategory::HighFriction),
            "pricing_shock" => Ok(StallCategory::PricingShock),
            "trust_privacy" => Ok(StallCategory::TrustPrivacy),
            _ => Err(format!("unknown stall category: {}", s)),
        }
    }
}

/// Finer-grained blocker for high-friction stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrictionDetail {
    VinRequest,
    LicenseRequest,
    DocumentUpload,
    General,
}

impl FrictionDetail {
    /// Derive the blocker from the evidence quote.
    pub fn from_evidence(evidence: &str) -> Self {
        let lower = evidence.to_lowercase();
        let has_word = |w: &str| {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| token == w)
        };
        if has_word("vin") {
            FrictionDetail::VinRequest
        } else if lower.contains("license") || has_word("dl") {
            FrictionDetail::LicenseRequest
        } else if lower.contains("photo") || lower.contains("picture") || lower.contains("upload") {
            FrictionDetail::DocumentUpload
        } else {
            FrictionDetail::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrictionDetail::VinRequest => "vin_request",
            FrictionDetail::LicenseRequest => "license_request",
            FrictionDetail::DocumentUpload => "document_upload",
            FrictionDetail::General => "general",
        }
    }

    /// Noun phrase naming the blocked item, used as a template slot.
    pub fn item(&self) -> &'static str {
        match self {
            FrictionDetail::VinRequest => "VIN",
            FrictionDetail::LicenseRequest => "license number",
            FrictionDetail::DocumentUpload => "document",
            FrictionDetail::General => "info",
        }
    }
}

/// Informational risk tier attached by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    StalledHighRisk,
    StalledLowRisk,
    Benign,
}

impl RiskTier {
    pub fn for_category(category: StallCategory, confidence: f64) -> Self {
        match category {
            StallCategory::HighFriction if confidence >= 0.7 => RiskTier::StalledHighRisk,
            c if !c.is_benign() && confidence >= 0.5 => RiskTier::StalledLowRisk,
            _ => RiskTier::Benign,
        }
    }
}

/// Output of the stall classifier for one transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: StallCategory,
    /// Always within [0, 1]
    pub confidence: f64,
    /// Literal quote from the transcript the judgment rests on
    pub evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<FrictionDetail>,
    pub risk: RiskTier,
    /// Unparsed oracle output, kept for audit
    #[serde(default)]
    pub raw_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    pub classified_at: DateTime<Utc>,
}

impl Classification {
    /// Build a classification, enforcing the confidence range.
    pub fn new(
        category: StallCategory,
        confidence: f64,
        evidence: impl Into<String>,
    ) -> Result<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(crate::error::ClassificationFailure::OutOfRange(confidence).into());
        }
        let evidence = evidence.into();
        let detail = match category {
            StallCategory::HighFriction => Some(FrictionDetail::from_evidence(&evidence)),
            _ => None,
        };
        Ok(Self {
            category,
            confidence,
            evidence,
            detail,
            risk: RiskTier::for_category(category, confidence),
            raw_output: String::new(),
            model: None,
            prompt_hash: None,
            latency_ms: None,
            classified_at: Utc::now(),
        })
    }
}

// ============================================
// Personas and nudges
// ============================================

/// Brand-voice personas. Closed set; profiles are configured per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaId {
    /// Casual, friendly, like texting a neighbor
    HelpfulNeighbor,
    /// Warm but professional advisor
    ProfessionalAdvisor,
}

impl PersonaId {
    pub const ALL: [PersonaId; 2] = [PersonaId::HelpfulNeighbor, PersonaId::ProfessionalAdvisor];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaId::HelpfulNeighbor => "helpful_neighbor",
            PersonaId::ProfessionalAdvisor => "professional_advisor",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PersonaId::HelpfulNeighbor => "Helpful Neighbor",
            PersonaId::ProfessionalAdvisor => "Professional Advisor",
        }
    }
}

impl std::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PersonaId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "helpful_neighbor" => Ok(PersonaId::HelpfulNeighbor),
            "professional_advisor" => Ok(PersonaId::ProfessionalAdvisor),
            _ => Err(format!("unknown persona: {}", s)),
        }
    }
}

/// Style description for one persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandVoiceProfile {
    pub description: String,
    pub rules: Vec<String>,
    /// Canonical example message in this voice
    pub example: String,
}

impl BrandVoiceProfile {
    /// Built-in profile for a persona.
    pub fn builtin(persona: PersonaId) -> Self {
        match persona {
            PersonaId::HelpfulNeighbor => Self {
                description: "Casual, friendly, like texting a neighbor".to_string(),
                rules: vec![
                    "Use contractions".to_string(),
                    "Keep it breezy".to_string(),
                    "OK to be slightly informal".to_string(),
                ],
                example: "No stress on the VIN, a photo of your registration works too!"
                    .to_string(),
            },
            PersonaId::ProfessionalAdvisor => Self {
                description: "Warm but professional, trustworthy advisor".to_string(),
                rules: vec![
                    "No slang".to_string(),
                    "Complete sentences".to_string(),
                    "Empathetic but not casual".to_string(),
                ],
                example: "I understand the VIN can be inconvenient. A photo of your registration would work just as well."
                    .to_string(),
            },
        }
    }
}

/// A composed re-engagement message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NudgeMessage {
    pub persona: PersonaId,
    /// Blocker the message addresses
    pub category: StallCategory,
    pub text: String,
    /// Length in characters, never above [`MAX_NUDGE_CHARS`]
    pub length: usize,
}

// ============================================
// Actions
// ============================================

/// Terminal action chosen for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SkipUnsafe,
    SkipBenign,
    SkipLowConfidence,
    QueueForReview,
    AutoSend,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::SkipUnsafe,
        Action::SkipBenign,
        Action::SkipLowConfidence,
        Action::QueueForReview,
        Action::AutoSend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SkipUnsafe => "skip_unsafe",
            Action::SkipBenign => "skip_benign",
            Action::SkipLowConfidence => "skip_low_confidence",
            Action::QueueForReview => "queue_for_review",
            Action::AutoSend => "auto_send",
        }
    }

    /// Whether this action needs a composed message.
    pub fn engages(&self) -> bool {
        matches!(self, Action::QueueForReview | Action::AutoSend)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_transcript_rejects_empty() {
        assert!(Transcript::new("c-1", vec![]).is_err());
        assert!(Transcript::new("  ", vec![Turn::bot("hi")]).is_err());
    }

    #[test]
    fn test_transcript_rejects_out_of_order_turns() {
        let now = Utc::now();
        let turns = vec![
            Turn::bot("What's your VIN?").at(now),
            Turn::user("hang on").at(now - Duration::minutes(5)),
        ];
        assert!(Transcript::new("c-1", turns).is_err());
    }

    #[test]
    fn test_transcript_origin_prompt_is_last_bot_turn() {
        let now = Utc::now();
        let t = Transcript::new(
            "c-1",
            vec![
                Turn::bot("Hi there").at(now - Duration::minutes(3)),
                Turn::user("hey").at(now - Duration::minutes(2)),
                Turn::bot("I need your VIN").at(now),
            ],
        )
        .unwrap();
        assert_eq!(t.origin_prompt(), Some("I need your VIN"));
        assert_eq!(t.last_user_turn().map(|t| t.text.as_str()), Some("hey"));
        assert_eq!(t.last_bot_message_at(), Some(now));
    }

    #[test]
    fn test_transcript_deserialize_validates() {
        let ok = r#"{"conversation_id":"c-9","turns":[{"role":"bot","text":"hi"}]}"#;
        assert!(serde_json::from_str::<Transcript>(ok).is_ok());

        let empty = r#"{"conversation_id":"c-9","turns":[]}"#;
        assert!(serde_json::from_str::<Transcript>(empty).is_err());
    }

    #[test]
    fn test_backend_status_safe_is_derived() {
        let now = Utc::now();
        let clear = BackendStatus::observed("c", StatusSnapshot::default(), now);
        assert!(clear.safe_to_engage());

        let active = BackendStatus::observed(
            "c",
            StatusSnapshot {
                active_elsewhere: true,
                ..Default::default()
            },
            now,
        );
        assert!(!active.safe_to_engage());

        let docs = BackendStatus::observed(
            "c",
            StatusSnapshot {
                documents_received: true,
                ..Default::default()
            },
            now,
        );
        assert!(!docs.safe_to_engage());

        let down = BackendStatus::unavailable("c", "timeout", now);
        assert!(!down.safe_to_engage());
        assert_eq!(down.unavailable_reason(), Some("timeout"));
    }

    #[test]
    fn test_backend_status_deserialize_recomputes_safe() {
        let forged = r#"{
            "conversation_id": "c",
            "active_elsewhere": true,
            "documents_received": false,
            "safe_to_engage": true,
            "checked_at": "2025-01-01T00:00:00Z"
        }"#;
        let status: BackendStatus = serde_json::from_str(forged).unwrap();
        assert!(!status.safe_to_engage());
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(
            "HIGH_FRICTION".parse::<StallCategory>().unwrap(),
            StallCategory::HighFriction
        );
        assert_eq!(
            "trust-privacy".parse::<StallCategory>().unwrap(),
            StallCategory::TrustPrivacy
        );
        assert!("spam".parse::<StallCategory>().is_err());
    }

    #[test]
    fn test_friction_detail_from_evidence() {
        assert_eq!(
            FrictionDetail::from_evidence("I don't have my VIN on me"),
            FrictionDetail::VinRequest
        );
        assert_eq!(
            FrictionDetail::from_evidence("where's my driver's license?"),
            FrictionDetail::LicenseRequest
        );
        assert_eq!(
            FrictionDetail::from_evidence("can't take a photo right now"),
            FrictionDetail::DocumentUpload
        );
        // "vine" must not match "vin"
        assert_eq!(
            FrictionDetail::from_evidence("stuck at the vineyard"),
            FrictionDetail::General
        );
    }

    #[test]
    fn test_classification_confidence_range() {
        assert!(Classification::new(StallCategory::Confusion, 1.2, "huh?").is_err());
        assert!(Classification::new(StallCategory::Confusion, f64::NAN, "huh?").is_err());
        let c = Classification::new(StallCategory::HighFriction, 0.8, "no VIN").unwrap();
        assert_eq!(c.detail, Some(FrictionDetail::VinRequest));
        assert_eq!(c.risk, RiskTier::StalledHighRisk);
    }

    #[test]
    fn test_risk_tier() {
        assert_eq!(
            RiskTier::for_category(StallCategory::Confusion, 0.6),
            RiskTier::StalledLowRisk
        );
        assert_eq!(
            RiskTier::for_category(StallCategory::HighFriction, 0.4),
            RiskTier::Benign
        );
        assert_eq!(
            RiskTier::for_category(StallCategory::Benign, 0.99),
            RiskTier::Benign
        );
    }

    #[test]
    fn test_action_roundtrip_names() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!(Action::AutoSend.engages());
        assert!(!Action::SkipBenign.engages());
    }
}
