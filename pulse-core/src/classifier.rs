//! Stall classifier.
//!
//! Asks the language oracle why the user went silent and validates the
//! answer against the configured category set. Anything the oracle returns
//! that does not fit the schema is a [`ClassificationFailure`], never a
//! guess.

use crate::error::{ClassificationFailure, Error, Result};
use crate::oracle::{parse_json_object, LanguageOracle, OracleRequest};
use crate::types::{Classification, SpeakerRole, StallCategory, Transcript};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MAX_TRANSCRIPT_CHARS: usize = 16_000;
const SYSTEM_PROMPT: &str = "You are a senior insurance sales coach reviewing a stalled SMS conversation. The customer has stopped replying. Analyze why and return strict JSON only.";

/// Closed, ordered set of categories the classifier may return.
///
/// Always contains `benign`, which is the default when the oracle is unsure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    categories: Vec<StallCategory>,
}

impl CategorySet {
    /// Resolve configured names, rejecting unknown or duplicate entries.
    pub fn from_names(names: &[String]) -> Result<Self> {
        let mut categories = Vec::with_capacity(names.len());
        for name in names {
            let category: StallCategory = name
                .parse()
                .map_err(|e: String| Error::Config(format!("categories: {e}")))?;
            if categories.contains(&category) {
                return Err(Error::Config(format!(
                    "categories: `{name}` is listed more than once"
                )));
            }
            categories.push(category);
        }
        Self::new(categories)
    }

    pub fn new(categories: Vec<StallCategory>) -> Result<Self> {
        if !categories.contains(&StallCategory::Benign) {
            return Err(Error::Config(
                "categories must include `benign`".to_string(),
            ));
        }
        Ok(Self { categories })
    }

    pub fn contains(&self, category: StallCategory) -> bool {
        self.categories.contains(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = StallCategory> + '_ {
        self.categories.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            categories: vec![
                StallCategory::Benign,
                StallCategory::Confusion,
                StallCategory::HighFriction,
            ],
        }
    }
}

/// Oracle-backed classifier for stalled transcripts.
pub struct StallClassifier {
    oracle: Arc<dyn LanguageOracle>,
    categories: CategorySet,
    timeout: Duration,
}

impl StallClassifier {
    pub fn new(oracle: Arc<dyn LanguageOracle>, categories: CategorySet, timeout: Duration) -> Self {
        Self {
            oracle,
            categories,
            timeout: timeout.max(Duration::from_millis(1)),
        }
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    /// Classify one transcript.
    pub async fn classify(
        &self,
        transcript: &Transcript,
    ) -> std::result::Result<Classification, ClassificationFailure> {
        let prompt = build_prompt(&self.categories, transcript);
        let prompt_hash = hash_prompt(&prompt);
        let request = OracleRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            temperature: 0.1,
            max_tokens: 256,
        };

        let started = Instant::now();
        let raw = match tokio::time::timeout(self.timeout, self.oracle.complete(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(ClassificationFailure::Oracle(e.to_string())),
            Err(_elapsed) => return Err(ClassificationFailure::Timeout(self.timeout.as_secs())),
        };
        let latency_ms = started.elapsed().as_millis() as i64;

        let mut classification = parse_classification(&self.categories, transcript, &raw)?;
        classification.raw_output = raw;
        classification.model = self.oracle.model().map(ToString::to_string);
        classification.prompt_hash = Some(prompt_hash);
        classification.latency_ms = Some(latency_ms);
        classification.classified_at = Utc::now();

        tracing::debug!(
            conversation_id = transcript.conversation_id(),
            category = %classification.category,
            confidence = classification.confidence,
            latency_ms,
            "Transcript classified"
        );
        Ok(classification)
    }
}

fn hash_prompt(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

fn build_prompt(categories: &CategorySet, transcript: &Transcript) -> String {
    let mut category_lines = String::new();
    for category in categories.iter() {
        category_lines.push_str(&format!(
            "- {}: {}\n",
            category.as_str().to_uppercase(),
            category.description()
        ));
    }
    let allowed = categories
        .iter()
        .map(|c| format!("\"{}\"", c.as_str().to_uppercase()))
        .collect::<Vec<_>>()
        .join(" | ");

    format!(
        "Categories:\n{category_lines}\n\
         Rules:\n\
         1. Default to BENIGN if unsure. Under-nudging is better than over-nudging.\n\
         2. Non-benign categories need clear evidence in the user's words or the bot's last question.\n\
         3. Focus on the LAST exchange: what did the bot ask, and how did the user respond (or not)?\n\
         4. The evidence must be an exact quote from the transcript.\n\n\
         Respond ONLY with JSON in this format:\n\
         {{\"category\": {allowed}, \"confidence\": 0.0-1.0, \"evidence\": \"exact quote from transcript\"}}\n\n\
         Transcript:\n{}",
        format_transcript(transcript)
    )
}

/// Render turns as `BOT:`/`USER:` lines, keeping the most recent turns when
/// the transcript is too long.
fn format_transcript(transcript: &Transcript) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut total = 0usize;
    for turn in transcript.turns().iter().rev() {
        let label = match turn.role {
            SpeakerRole::Bot => "BOT",
            SpeakerRole::User => "USER",
        };
        let line = format!("{label}: {}", turn.text.replace('\n', " "));
        total += line.len() + 1;
        if total > MAX_TRANSCRIPT_CHARS && !lines.is_empty() {
            lines.push("...[earlier turns truncated]".to_string());
            break;
        }
        lines.push(line);
    }
    lines.reverse();
    lines.join("\n")
}

fn parse_classification(
    categories: &CategorySet,
    transcript: &Transcript,
    raw: &str,
) -> std::result::Result<Classification, ClassificationFailure> {
    let value = parse_json_object(raw).map_err(ClassificationFailure::Malformed)?;

    let category_name = value
        .get("category")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ClassificationFailure::Malformed("missing string field `category`".to_string()))?;
    let category: StallCategory = category_name
        .parse()
        .map_err(|_| ClassificationFailure::UnknownCategory(category_name.to_string()))?;
    if !categories.contains(category) {
        return Err(ClassificationFailure::UnknownCategory(category_name.to_string()));
    }

    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| {
            ClassificationFailure::Malformed("missing numeric field `confidence`".to_string())
        })?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ClassificationFailure::OutOfRange(confidence));
    }

    let evidence = value
        .get("evidence")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ClassificationFailure::MissingEvidence)?;
    if !quoted_in(transcript, evidence) {
        return Err(ClassificationFailure::EvidenceNotInTranscript(
            evidence.to_string(),
        ));
    }

    Classification::new(category, confidence, evidence).map_err(|e| match e {
        Error::Classification(failure) => failure,
        other => ClassificationFailure::Malformed(other.to_string()),
    })
}

/// Whether `evidence` is a literal span of some turn, ignoring case and
/// runs of whitespace. Surrounding quote marks are not part of the span.
fn quoted_in(transcript: &Transcript, evidence: &str) -> bool {
    let quote_marks: &[char] = &['"', '\'', '\u{201c}', '\u{201d}'];
    let needle = normalize(evidence.trim_matches(quote_marks));
    if needle.is_empty() {
        return false;
    }
    transcript
        .turns()
        .iter()
        .any(|turn| normalize(&turn.text).contains(&needle))
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FrictionDetail, Turn};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedOracle {
        reply: String,
        seen: Mutex<Vec<OracleRequest>>,
    }

    impl ScriptedOracle {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageOracle for ScriptedOracle {
        async fn complete(&self, request: &OracleRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }

        fn model(&self) -> Option<&str> {
            Some("scripted")
        }
    }

    struct HangingOracle;

    #[async_trait]
    impl LanguageOracle for HangingOracle {
        async fn complete(&self, _request: &OracleRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    fn transcript() -> Transcript {
        Transcript::new(
            "c-1",
            vec![
                Turn::bot("To get started, I'll need your VIN number."),
                Turn::user("Ugh, I'm at work. I don't have my VIN on me."),
                Turn::bot("You can find it on your registration card."),
            ],
        )
        .unwrap()
    }

    fn classifier(oracle: Arc<dyn LanguageOracle>) -> StallClassifier {
        StallClassifier::new(oracle, CategorySet::default(), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_classify_valid_response() {
        let oracle = ScriptedOracle::new(
            r#"{"category": "HIGH_FRICTION", "confidence": 0.92, "evidence": "I don't have my VIN on me"}"#,
        );
        let c = classifier(oracle.clone())
            .classify(&transcript())
            .await
            .unwrap();

        assert_eq!(c.category, StallCategory::HighFriction);
        assert_eq!(c.confidence, 0.92);
        assert_eq!(c.evidence, "I don't have my VIN on me");
        assert_eq!(c.detail, Some(FrictionDetail::VinRequest));
        assert_eq!(c.model.as_deref(), Some("scripted"));
        assert!(c.raw_output.contains("HIGH_FRICTION"));
        assert_eq!(c.prompt_hash.as_ref().map(|h| h.len()), Some(64));

        let seen = oracle.seen.lock().unwrap();
        assert!(seen[0].prompt.contains("USER: Ugh, I'm at work."));
        assert!(seen[0].prompt.contains("Default to BENIGN"));
        assert!(!seen[0].prompt.contains("PRICING_SHOCK"));
    }

    #[tokio::test]
    async fn test_same_transcript_same_prompt_hash() {
        let reply = r#"{"category": "BENIGN", "confidence": 0.4, "evidence": "You can find it"}"#;
        let a = classifier(ScriptedOracle::new(reply))
            .classify(&transcript())
            .await
            .unwrap();
        let b = classifier(ScriptedOracle::new(reply))
            .classify(&transcript())
            .await
            .unwrap();
        assert_eq!(a.prompt_hash, b.prompt_hash);
    }

    #[tokio::test]
    async fn test_category_outside_configured_set_fails() {
        let oracle = ScriptedOracle::new(
            r#"{"category": "PRICING_SHOCK", "confidence": 0.9, "evidence": "too expensive"}"#,
        );
        let err = classifier(oracle).classify(&transcript()).await.unwrap_err();
        assert_eq!(
            err,
            ClassificationFailure::UnknownCategory("PRICING_SHOCK".to_string())
        );

        let oracle = ScriptedOracle::new(
            r#"{"category": "ANGRY", "confidence": 0.9, "evidence": "ugh"}"#,
        );
        let err = classifier(oracle).classify(&transcript()).await.unwrap_err();
        assert!(matches!(err, ClassificationFailure::UnknownCategory(_)));
    }

    #[tokio::test]
    async fn test_schema_violations_fail() {
        let cases = [
            ("no json here", "malformed"),
            (r#"{"category": "BENIGN", "evidence": "x"}"#, "malformed"),
            (r#"{"category": "BENIGN", "confidence": 1.4, "evidence": "x"}"#, "range"),
            (r#"{"category": "BENIGN", "confidence": 0.5, "evidence": "  "}"#, "evidence"),
        ];
        for (reply, kind) in cases {
            let err = classifier(ScriptedOracle::new(reply))
                .classify(&transcript())
                .await
                .unwrap_err();
            match kind {
                "malformed" => assert!(matches!(err, ClassificationFailure::Malformed(_))),
                "range" => assert!(matches!(err, ClassificationFailure::OutOfRange(_))),
                _ => assert_eq!(err, ClassificationFailure::MissingEvidence),
            }
        }
    }

    #[tokio::test]
    async fn test_fenced_response_is_accepted() {
        let oracle = ScriptedOracle::new(
            "Here you go:\n```json\n{\"category\": \"confusion\", \"confidence\": 0.8, \"evidence\": \"You can find it on your registration card\"}\n```",
        );
        let c = classifier(oracle).classify(&transcript()).await.unwrap();
        assert_eq!(c.category, StallCategory::Confusion);
        assert!(c.detail.is_none());
    }

    #[tokio::test]
    async fn test_evidence_missing_from_transcript_fails() {
        let t = Transcript::new(
            "c-2",
            vec![Turn::bot("What's your address?"), Turn::user("123 Main St")],
        )
        .unwrap();
        let oracle = ScriptedOracle::new(
            r#"{"category": "HIGH_FRICTION", "confidence": 0.95, "evidence": "I refuse to give you my VIN"}"#,
        );
        let err = classifier(oracle).classify(&t).await.unwrap_err();
        assert_eq!(
            err,
            ClassificationFailure::EvidenceNotInTranscript(
                "I refuse to give you my VIN".to_string()
            )
        );

        // A quote stitched across two turns is not a span of either
        let oracle = ScriptedOracle::new(
            r#"{"category": "BENIGN", "confidence": 0.5, "evidence": "address? 123 Main St"}"#,
        );
        let err = classifier(oracle).classify(&t).await.unwrap_err();
        assert!(matches!(err, ClassificationFailure::EvidenceNotInTranscript(_)));
    }

    #[tokio::test]
    async fn test_evidence_match_ignores_case_and_spacing() {
        let oracle = ScriptedOracle::new(
            r#"{"category": "HIGH_FRICTION", "confidence": 0.9, "evidence": "\"i DON'T have   my vin\""}"#,
        );
        let c = classifier(oracle).classify(&transcript()).await.unwrap();
        assert_eq!(c.category, StallCategory::HighFriction);
        assert_eq!(c.evidence, "\"i DON'T have   my vin\"");
    }

    #[tokio::test]
    async fn test_oracle_timeout_fails() {
        let err = classifier(Arc::new(HangingOracle))
            .classify(&transcript())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationFailure::Timeout(_)));
    }

    #[test]
    fn test_category_set_requires_benign() {
        let names = vec!["confusion".to_string(), "high_friction".to_string()];
        assert!(matches!(
            CategorySet::from_names(&names),
            Err(Error::Config(_))
        ));

        let dup = vec!["benign".to_string(), "benign".to_string()];
        assert!(CategorySet::from_names(&dup).is_err());

        let ok = vec!["benign".to_string(), "trust_privacy".to_string()];
        let set = CategorySet::from_names(&ok).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(StallCategory::TrustPrivacy));
        assert!(!set.contains(StallCategory::Confusion));
    }

    #[test]
    fn test_long_transcript_keeps_latest_turns() {
        let mut turns = Vec::new();
        for i in 0..2_000 {
            turns.push(Turn::bot(format!("question number {i}")));
        }
        let t = Transcript::new("c-long", turns).unwrap();
        let rendered = format_transcript(&t);
        assert!(rendered.starts_with("...[earlier turns truncated]"));
        assert!(rendered.ends_with("BOT: question number 1999"));
        assert!(rendered.len() <= MAX_TRANSCRIPT_CHARS + 64);
    }
}
