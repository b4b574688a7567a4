//! Nudge composer.
//!
//! Messages are always rendered from the template library below. When a
//! language oracle is available it only picks which template to use and
//! fills the single slot; it never writes freeform text. Without an oracle
//! the template is chosen from a hash of the conversation id.
//!
//! A rendered message longer than [`MAX_NUDGE_CHARS`] is a
//! [`CompositionFailure::TooLong`]. Messages are never truncated.

use crate::error::CompositionFailure;
use crate::oracle::{parse_json_object, LanguageOracle, OracleRequest};
use crate::types::{
    BrandVoiceProfile, Classification, NudgeMessage, PersonaId, StallCategory, Transcript,
    MAX_NUDGE_CHARS,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const ITEM_SLOT: &str = "{item}";
const EXPLANATION_SLOT: &str = "{explanation}";
const MAX_SLOT_CHARS: usize = 100;

/// Slot filled when a confusion template is rendered without an oracle.
const DEFAULT_EXPLANATION: &str = "we just need a couple of basics to finish your quote.";

type Templates = &'static [&'static str];

/// Templates for a (category, persona) pair. Benign has none.
pub fn templates(category: StallCategory, persona: PersonaId) -> Templates {
    use PersonaId::*;
    use StallCategory::*;
    match (category, persona) {
        (HighFriction, HelpfulNeighbor) => &[
            "No stress on the {item}, a photo of your registration works too!",
            "Hey, if the {item} is hard to find, we can work with your registration instead.",
            "Totally get it! You can send the {item} later, or try a photo of your insurance card.",
        ],
        (HighFriction, ProfessionalAdvisor) => &[
            "I understand the {item} can be inconvenient to locate. A photo of your registration document would work just as well.",
            "No rush on the {item}. When you have a moment, a copy of your registration is an acceptable alternative.",
            "I can see the {item} is difficult to access right now. Feel free to send it when convenient, or we can use your registration.",
        ],
        (Confusion, HelpfulNeighbor) => &[
            "Sorry if that was confusing! In simple terms: {explanation}",
            "Let me break that down differently: {explanation}",
            "Good question! Basically, {explanation}",
        ],
        (Confusion, ProfessionalAdvisor) => &[
            "I apologize for the confusion. To clarify: {explanation}",
            "Allow me to explain that more clearly: {explanation}",
            "That's a common question. Simply put: {explanation}",
        ],
        (PricingShock, HelpfulNeighbor) => &[
            "Totally fair, that number can sting! Want me to check a few options that could bring it down?",
            "Prices can swing a lot with coverage. Happy to tweak a few things and see if we can get it lower!",
        ],
        (PricingShock, ProfessionalAdvisor) => &[
            "I understand the premium may be higher than expected. I would be glad to review coverage options that could lower it.",
            "Premiums vary with coverage choices. If helpful, I can walk you through adjustments that may reduce your cost.",
        ],
        (TrustPrivacy, HelpfulNeighbor) => &[
            "Totally fair to ask! We only use your info to build your quote, and we never sell it.",
            "Good call checking! Your details stay private and are only used for your quote.",
        ],
        (TrustPrivacy, ProfessionalAdvisor) => &[
            "Your privacy matters. The information you share is used only to prepare your quote and is never sold.",
            "That is a reasonable question. Your details are kept confidential and used solely to prepare your quote.",
        ],
        (Benign, _) => &[],
    }
}

/// Template-constrained nudge composer.
pub struct NudgeComposer {
    personas: BTreeMap<PersonaId, BrandVoiceProfile>,
    oracle: Option<Arc<dyn LanguageOracle>>,
    timeout: Duration,
}

impl NudgeComposer {
    pub fn new(personas: BTreeMap<PersonaId, BrandVoiceProfile>) -> Self {
        Self {
            personas,
            oracle: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Let the oracle choose templates and fill slots.
    pub fn with_oracle(mut self, oracle: Arc<dyn LanguageOracle>, timeout: Duration) -> Self {
        self.oracle = Some(oracle);
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn has_persona(&self, persona: PersonaId) -> bool {
        self.personas.contains_key(&persona)
    }

    /// Compose a nudge for a classified transcript in the given persona.
    pub async fn compose(
        &self,
        transcript: &Transcript,
        classification: &Classification,
        persona: PersonaId,
    ) -> std::result::Result<NudgeMessage, CompositionFailure> {
        let profile = self
            .personas
            .get(&persona)
            .ok_or_else(|| CompositionFailure::UnknownPersona(persona.to_string()))?;
        let category = classification.category;
        let options = templates(category, persona);
        if options.is_empty() {
            return Err(CompositionFailure::UnsupportedCategory(
                category.to_string(),
            ));
        }

        let default_item = classification
            .detail
            .map(|d| d.item())
            .unwrap_or("info");

        let (index, slot) = match &self.oracle {
            Some(oracle) => {
                self.choose_with_oracle(oracle.as_ref(), transcript, classification, profile, options)
                    .await?
            }
            None => (deterministic_index(transcript.conversation_id(), options.len()), None),
        };

        let template = options[index];
        let text = render(template, slot.as_deref(), default_item)?;
        let message = validate(persona, category, text)?;

        tracing::debug!(
            conversation_id = transcript.conversation_id(),
            persona = %persona,
            category = %category,
            template = index,
            length = message.length,
            "Nudge composed"
        );
        Ok(message)
    }

    async fn choose_with_oracle(
        &self,
        oracle: &dyn LanguageOracle,
        transcript: &Transcript,
        classification: &Classification,
        profile: &BrandVoiceProfile,
        options: Templates,
    ) -> std::result::Result<(usize, Option<String>), CompositionFailure> {
        let request = OracleRequest {
            system: "You pick SMS follow-up templates for insurance leads who got stuck. Return strict JSON only.".to_string(),
            prompt: build_prompt(transcript, classification, profile, options),
            temperature: 0.7,
            max_tokens: 200,
        };

        let raw = match tokio::time::timeout(self.timeout, oracle.complete(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(CompositionFailure::Oracle(e.to_string())),
            Err(_elapsed) => {
                return Err(CompositionFailure::Oracle(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        let value = parse_json_object(&raw).map_err(CompositionFailure::InvalidSlot)?;
        let index = value
            .get("template")
            .and_then(|v| v.as_u64())
            .map(|i| i as usize)
            .filter(|i| *i < options.len())
            .ok_or_else(|| {
                CompositionFailure::InvalidSlot(format!(
                    "`template` must be an index below {}",
                    options.len()
                ))
            })?;
        let slot = value
            .get("slot")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok((index, slot))
    }
}

fn build_prompt(
    transcript: &Transcript,
    classification: &Classification,
    profile: &BrandVoiceProfile,
    options: Templates,
) -> String {
    let numbered = options
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{i}: {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    let blocker = match classification.detail {
        Some(detail) => format!("{}:{}", classification.category, detail.as_str()),
        None => classification.category.to_string(),
    };

    format!(
        "Brand voice: {}\nStyle rules: {}\nExample of this voice: \"{}\"\n\n\
         Blocker: {blocker}\nEvidence: \"{}\"\nLast bot message: \"{}\"\nUser's last reply: \"{}\"\n\n\
         Templates:\n{numbered}\n\n\
         Pick the template that best removes the blocker. If it contains {ITEM_SLOT} or \
         {EXPLANATION_SLOT}, supply a short plain-text slot value with no newlines. \
         The rendered message must be at most {MAX_NUDGE_CHARS} characters. No emojis.\n\n\
         Respond ONLY with JSON: {{\"template\": <index>, \"slot\": \"<text or empty>\"}}",
        profile.description,
        profile.rules.join(", "),
        profile.example,
        classification.evidence,
        transcript.origin_prompt().unwrap_or("No bot message"),
        transcript
            .last_user_turn()
            .map(|t| t.text.as_str())
            .unwrap_or("No user response"),
    )
}

fn deterministic_index(conversation_id: &str, len: usize) -> usize {
    let digest = Sha256::digest(conversation_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) % len as u64) as usize
}

fn render(
    template: &str,
    slot: Option<&str>,
    default_item: &str,
) -> std::result::Result<String, CompositionFailure> {
    if let Some(value) = slot {
        if value.contains(['\n', '\r']) {
            return Err(CompositionFailure::InvalidSlot(
                "slot value contains a newline".to_string(),
            ));
        }
        if value.chars().count() > MAX_SLOT_CHARS {
            return Err(CompositionFailure::InvalidSlot(format!(
                "slot value is longer than {MAX_SLOT_CHARS} characters"
            )));
        }
    }

    if template.contains(ITEM_SLOT) {
        Ok(template.replace(ITEM_SLOT, slot.unwrap_or(default_item)))
    } else if template.contains(EXPLANATION_SLOT) {
        Ok(template.replace(EXPLANATION_SLOT, slot.unwrap_or(DEFAULT_EXPLANATION)))
    } else {
        Ok(template.to_string())
    }
}

fn validate(
    persona: PersonaId,
    category: StallCategory,
    text: String,
) -> std::result::Result<NudgeMessage, CompositionFailure> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(CompositionFailure::InvalidSlot("rendered message is empty".to_string()));
    }
    let length = text.chars().count();
    if length > MAX_NUDGE_CHARS {
        return Err(CompositionFailure::TooLong {
            len: length,
            limit: MAX_NUDGE_CHARS,
        });
    }
    Ok(NudgeMessage {
        persona,
        category,
        text,
        length,
    })
}
