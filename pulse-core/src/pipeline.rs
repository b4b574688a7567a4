//! Stall resolution pipeline
//!
//! One call to [`StallPipeline::resolve`] takes a stalled transcript through
//!
//! ```text
//! gate ──unsafe──────────────────────────────▶ skip_unsafe
//!   │ safe
//!   ▼
//! classify ──failed──────────────────────────▶ skip_unsafe
//!   │
//!   ▼
//! policy ──skip_benign / skip_low_confidence─▶ (no message)
//!   │ queue_for_review / auto_send
//!   ▼
//! compose ──failed───────────────────────────▶ queue_for_review, no message
//!   │
//!   ▼
//! Decision ──▶ record sink
//! ```
//!
//! Gate and classifier failures are recovered into skip decisions. The only
//! errors surfaced to the caller are cancellation and a failing record sink.

use crate::analytics::{self, ClassifiedStall, FrictionRow};
use crate::classifier::StallClassifier;
use crate::composer::NudgeComposer;
use crate::config::Config;
use crate::decision::{emit, Decision, DecisionParts};
use crate::error::{Error, Result};
use crate::gate::{create_status_source, BackendActivityGate};
use crate::oracle::{create_oracle, LanguageOracle, UnconfiguredOracle};
use crate::policy::{decide, PolicyConfig};
use crate::sink::RecordSink;
use crate::types::{Action, PersonaId, Transcript};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// The stall resolution pipeline for one tenant.
///
/// Holds no per-conversation state; share it across tasks with `Arc`.
pub struct StallPipeline {
    gate: BackendActivityGate,
    classifier: StallClassifier,
    composer: NudgeComposer,
    policy: PolicyConfig,
    persona: PersonaId,
    sink: Option<Arc<dyn RecordSink>>,
}

impl StallPipeline {
    /// Assemble a pipeline, rejecting invalid thresholds or a persona the
    /// composer does not know.
    pub fn new(
        gate: BackendActivityGate,
        classifier: StallClassifier,
        composer: NudgeComposer,
        policy: PolicyConfig,
        persona: PersonaId,
    ) -> Result<Self> {
        policy.validate()?;
        if !composer.has_persona(persona) {
            return Err(Error::Config(format!(
                "persona `{}` is not configured under [personas]",
                persona
            )));
        }
        Ok(Self {
            gate,
            classifier,
            composer,
            policy,
            persona,
            sink: None,
        })
    }

    /// Build the pipeline described by configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let source = create_status_source(&config.status_source)?;
        let gate = BackendActivityGate::new(
            source,
            Duration::from_secs(config.status_source.timeout_secs),
        );

        let (oracle, oracle_timeout, compose_with_oracle): (Arc<dyn LanguageOracle>, _, _) =
            match &config.llm {
                Some(llm) => (
                    create_oracle(llm)?,
                    Duration::from_secs(llm.timeout_secs),
                    llm.compose_with_oracle,
                ),
                None => {
                    tracing::warn!("No [llm] section configured; classification will fail closed");
                    let oracle: Arc<dyn LanguageOracle> = Arc::new(UnconfiguredOracle);
                    (oracle, Duration::from_secs(30), false)
                }
            };

        let classifier = StallClassifier::new(oracle.clone(), config.category_set()?, oracle_timeout);
        let mut composer = NudgeComposer::new(config.personas.clone());
        if compose_with_oracle {
            composer = composer.with_oracle(oracle, oracle_timeout);
        }

        Self::new(
            gate,
            classifier,
            composer,
            config.policy.clone(),
            config.tenant.persona,
        )
    }

    /// Send every decision to `sink` before returning it.
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn persona(&self) -> PersonaId {
        self.persona
    }

    /// Resolve one stalled conversation.
    ///
    /// Cancelling `cancel` before a message has been composed abandons the
    /// run with [`Error::Cancelled`] and emits nothing. Once a message
    /// exists the run completes regardless.
    pub async fn resolve(
        &self,
        transcript: &Transcript,
        cancel: &CancellationToken,
    ) -> Result<Decision> {
        let span = tracing::info_span!(
            "resolve",
            conversation_id = transcript.conversation_id()
        );
        self.resolve_inner(transcript, cancel).instrument(span).await
    }

    async fn resolve_inner(
        &self,
        transcript: &Transcript,
        cancel: &CancellationToken,
    ) -> Result<Decision> {
        let conversation_id = transcript.conversation_id();
        if cancel.is_cancelled() {
            return Err(cancelled(conversation_id, "before gate"));
        }

        let gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(conversation_id, "during gate")),
            status = self.gate.check(conversation_id) => status,
        };

        let mut parts = DecisionParts {
            conversation_id: conversation_id.to_string(),
            origin_prompt: transcript.origin_prompt().map(ToString::to_string),
            gate,
            classification: None,
            classification_error: None,
            action: Action::SkipUnsafe,
            message: None,
            composition_error: None,
        };

        if parts.gate.safe_to_engage() {
            let classified = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(cancelled(conversation_id, "during classification"))
                }
                result = self.classifier.classify(transcript) => result,
            };
            match classified {
                Ok(classification) => parts.classification = Some(classification),
                Err(failure) => {
                    tracing::warn!(error = %failure, "Classification failed, skipping");
                    parts.classification_error = Some(failure.to_string());
                }
            }

            parts.action = decide(&parts.gate, parts.classification.as_ref(), &self.policy);

            if parts.action.engages() {
                if let Some(classification) = parts.classification.as_ref() {
                    let composed = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(cancelled(conversation_id, "during composition"))
                        }
                        result = self.composer.compose(transcript, classification, self.persona) => result,
                    };
                    match composed {
                        Ok(message) => parts.message = Some(message),
                        Err(failure) => {
                            tracing::warn!(
                                error = %failure,
                                "Composition failed, queueing for manual review"
                            );
                            parts.action = Action::QueueForReview;
                            parts.composition_error = Some(failure.to_string());
                        }
                    }
                }
            }
        }

        let decision = emit(parts)?;
        tracing::info!(
            decision_id = decision.decision_id(),
            action = %decision.action(),
            safe_to_engage = decision.gate().safe_to_engage(),
            category = decision.classification().map(|c| c.category.as_str()),
            confidence = decision.classification().map(|c| c.confidence),
            has_message = decision.message().is_some(),
            "Decision emitted"
        );

        if let Some(sink) = &self.sink {
            sink.append(&decision).await?;
        }
        Ok(decision)
    }
}

fn cancelled(conversation_id: &str, stage: &str) -> Error {
    tracing::info!(conversation_id, stage, "Resolution cancelled");
    Error::Cancelled(format!("{conversation_id} cancelled {stage}"))
}

/// Rank origin prompts by friction rate. Callable without a pipeline.
pub fn aggregate_friction(stalls: &[ClassifiedStall]) -> Vec<FrictionRow> {
    analytics::aggregate(stalls)
}
