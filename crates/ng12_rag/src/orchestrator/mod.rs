//! Per-request pipeline shared by the chat and assessment paths.
//!
//! `START -> REFINE_QUERY -> RETRIEVE -> GATE -> {FALLBACK | EXTRACT_CITATIONS -> CALL_REASONER
//! -> RECORD_TURN} -> DONE`
//!
//! Every path ends in a well-formed outcome. Embedding and reasoning failures, weak evidence and
//! untrustworthy replies all end in the same fixed refusal text with no citations.

use std::sync::Arc;

use ng12_core::config::GroundingConfig;
use ng12_core::domain::{normalize_label, Classification, PatientRecord};
use ng12_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::citations::{self, Citation};
use crate::conversation::{ConversationStore, Turn};
use crate::embeddings::Embedder;
use crate::gate::GroundingGate;
use crate::index::{ScoredPassage, VectorIndex};
use crate::llm::Llm;
use crate::reasoner::{self, prompts, AssessVerdict};
use crate::retrieve::Retriever;

/// Returned verbatim whenever an answer cannot be grounded.
pub const FALLBACK_TEXT: &str = "I couldn't find support in the reference text for that.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    InsufficientEvidence,
    EmbeddingFailed,
    ReasonerFailed,
    GroundingViolation,
    ReasonerDeclined,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatOutcome {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub history: Vec<Turn>,
    pub fallback: Option<FallbackReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessOutcome {
    pub classification: Classification,
    pub rationale: String,
    pub recommended_action: Option<String>,
    pub citations: Vec<Citation>,
    pub fallback: Option<FallbackReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClearAck {
    pub status: String,
    pub key: String,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    RefineQuery,
    Retrieve,
    Gate,
    Fallback,
    ExtractCitations,
    CallReasoner,
    RecordTurn,
    Done,
}

/// Evidence that passed the gate, ready for the reasoning call.
struct Grounding {
    refined_query: String,
    accepted: Vec<ScoredPassage>,
    offered: Vec<Citation>,
}

pub struct Orchestrator {
    retriever: Retriever,
    gate: GroundingGate,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
    conversations: Arc<dyn ConversationStore>,
    top_k: usize,
    max_excerpt_len: usize,
}

impl Orchestrator {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn Llm>,
        conversations: Arc<dyn ConversationStore>,
        config: &GroundingConfig,
    ) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            retriever: Retriever::new(index, config.conversation_window),
            gate: GroundingGate::new(
                config.min_score,
                config.min_count,
                config.max_evidence_passages,
            ),
            embedder,
            llm,
            conversations,
            top_k: config.top_k,
            max_excerpt_len: config.max_excerpt_len,
        })
    }

    pub fn index(&self) -> &VectorIndex {
        self.retriever.index()
    }

    /// One chat turn for `key`. Both the question and the answer (or refusal) are recorded.
    pub fn chat(&self, key: &str, message: &str, patient: Option<&PatientRecord>) -> ChatOutcome {
        debug!(key, stage = ?Stage::RefineQuery, "chat turn started");
        let context = self.conversations.history(key);

        let (answer, citations, fallback) = match self.ground(message, &context) {
            Err(reason) => fallback_answer(reason),
            Ok(grounding) => {
                let prompt = prompts::chat_prompt(
                    patient,
                    &grounding.refined_query,
                    &prompts::evidence_blocks(&grounding.accepted),
                );
                match self
                    .call_reasoner(&prompt)
                    .and_then(|raw| reasoner::parse_chat_reply(&raw, &grounding.offered))
                {
                    Ok(reply) => (reply.answer, reply.citations, None),
                    Err(e) => fallback_answer(reasoner_failure(&e)),
                }
            }
        };

        debug!(key, stage = ?Stage::RecordTurn, "recording turn");
        let turns = vec![
            Turn::user(message),
            Turn::assistant(answer.clone(), citations.clone()),
        ];
        if let Err(e) = self.conversations.append_all(key, turns) {
            warn!(key, error = %e, "failed to record chat turn");
        }
        let history = self.conversations.history(key);

        info!(
            key,
            citations = citations.len(),
            fallback = ?fallback,
            history = history.len(),
            stage = ?Stage::Done,
            "chat turn complete"
        );
        ChatOutcome {
            answer,
            citations,
            history,
            fallback,
        }
    }

    /// One-shot referral assessment. Does not touch conversation history.
    pub fn assess(&self, patient: &PatientRecord, query_context: Option<&str>) -> AssessOutcome {
        let query = assessment_query(patient, query_context);
        debug!(patient_id = %patient.patient_id, stage = ?Stage::RefineQuery, "assessment started");

        let outcome = match self.ground(&query, &[]) {
            Err(reason) => fallback_assessment(reason),
            Ok(grounding) => {
                let prompt = prompts::assess_prompt(
                    patient,
                    &grounding.refined_query,
                    &prompts::evidence_blocks(&grounding.accepted),
                );
                match self
                    .call_reasoner(&prompt)
                    .and_then(|raw| reasoner::parse_assess_reply(&raw, &grounding.offered))
                {
                    Ok(reply) => match reply.verdict {
                        AssessVerdict::Classified(classification) => AssessOutcome {
                            classification,
                            rationale: reply.rationale,
                            recommended_action: reply.recommended_action,
                            citations: reply.citations,
                            fallback: None,
                        },
                        AssessVerdict::Declined => {
                            fallback_assessment(FallbackReason::ReasonerDeclined)
                        }
                    },
                    Err(e) => fallback_assessment(reasoner_failure(&e)),
                }
            }
        };

        info!(
            patient_id = %patient.patient_id,
            classification = outcome.classification.as_str(),
            citations = outcome.citations.len(),
            fallback = ?outcome.fallback,
            stage = ?Stage::Done,
            "assessment complete"
        );
        outcome
    }

    pub fn history(&self, key: &str) -> Vec<Turn> {
        self.conversations.history(key)
    }

    pub fn clear_history(&self, key: &str) -> Result<ClearAck, AppError> {
        self.conversations.clear(key)?;
        info!(key, "conversation history cleared");
        Ok(ClearAck {
            status: "cleared".to_string(),
            key: key.to_string(),
        })
    }

    /// REFINE_QUERY -> RETRIEVE -> GATE -> EXTRACT_CITATIONS, shared by both call sites.
    fn ground(&self, query: &str, context: &[Turn]) -> Result<Grounding, FallbackReason> {
        debug!(stage = ?Stage::Retrieve, top_k = self.top_k, "retrieving");
        let retrieval = with_one_retry("embedding", || {
            self.retriever
                .retrieve(query, self.embedder.as_ref(), context, self.top_k)
        })
        .map_err(|e| {
            warn!(error = %e, "retrieval failed; falling back");
            FallbackReason::EmbeddingFailed
        })?;

        let result = self.gate.evaluate(retrieval.passages);
        debug!(
            stage = ?Stage::Gate,
            hits = result.passages.len(),
            top_score = result.passages.first().map(|p| p.score),
            sufficient = result.sufficient,
            "gate evaluated"
        );
        if !result.sufficient {
            debug!(stage = ?Stage::Fallback, "insufficient evidence");
            return Err(FallbackReason::InsufficientEvidence);
        }

        let accepted = self.gate.accepted(&result);
        if accepted.is_empty() {
            debug!(stage = ?Stage::Fallback, "no passage accepted as evidence");
            return Err(FallbackReason::InsufficientEvidence);
        }
        let offered = citations::extract(&accepted, self.max_excerpt_len);
        debug!(
            stage = ?Stage::ExtractCitations,
            offered = offered.len(),
            "citations extracted"
        );
        Ok(Grounding {
            refined_query: retrieval.refined_query,
            accepted,
            offered,
        })
    }

    fn call_reasoner(&self, prompt: &str) -> Result<String, AppError> {
        debug!(
            stage = ?Stage::CallReasoner,
            template = prompts::PROMPT_TEMPLATE_VERSION,
            "calling reasoning service"
        );
        with_one_retry("reasoner", || self.llm.generate(prompt))
    }
}

/// Run `call`, retrying once if the first failure is retryable.
fn with_one_retry<T, F>(what: &str, mut call: F) -> Result<T, AppError>
where
    F: FnMut() -> Result<T, AppError>,
{
    match call() {
        Err(e) if e.retryable => {
            warn!(call = what, error = %e, "retryable failure; retrying once");
            call()
        }
        other => other,
    }
}

fn reasoner_failure(e: &AppError) -> FallbackReason {
    if e.is(ng12_core::error::codes::GROUNDING_VIOLATION) {
        warn!(error = %e, "reasoner reply rejected; falling back");
        FallbackReason::GroundingViolation
    } else {
        warn!(error = %e, "reasoner call failed; falling back");
        FallbackReason::ReasonerFailed
    }
}

fn fallback_answer(reason: FallbackReason) -> (String, Vec<Citation>, Option<FallbackReason>) {
    (FALLBACK_TEXT.to_string(), Vec::new(), Some(reason))
}

fn fallback_assessment(reason: FallbackReason) -> AssessOutcome {
    AssessOutcome {
        classification: Classification::NotMet,
        rationale: FALLBACK_TEXT.to_string(),
        recommended_action: None,
        citations: Vec::new(),
        fallback: Some(reason),
    }
}

/// Stable retrieval query for an assessment: normalised, sorted symptoms and findings so the
/// same record always embeds the same text.
pub fn assessment_query(patient: &PatientRecord, query_context: Option<&str>) -> String {
    let sorted = |items: &[String]| {
        let mut v: Vec<String> = items
            .iter()
            .map(|s| normalize_label(s))
            .filter(|s| !s.is_empty())
            .collect();
        v.sort();
        v.dedup();
        v.join(", ")
    };
    let age = patient.age.map(|a| a.to_string()).unwrap_or_default();
    let question = query_context
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or("Based on NG12, what is the recommended next action and urgency category?");

    format!(
        "NICE NG12 suspected cancer recognition and referral.\n\
         Patient: age={age}, sex={sex}, duration={duration}\n\
         Symptoms: {symptoms}\n\
         Findings: {findings}\n\
         Question: {question}",
        sex = patient.sex.as_deref().map(normalize_label).unwrap_or_default(),
        duration = patient.duration.as_deref().unwrap_or_default(),
        symptoms = sorted(&patient.symptoms),
        findings = sorted(&patient.findings),
    )
}
