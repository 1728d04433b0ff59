//! Boundary with the reasoning service.
//!
//! Model output is untrusted structured data: it is parsed as JSON, schema-checked, and every
//! cited chunk id is cross-checked against the citations that were offered for the request.
//! Anything that fails those checks is an `AI_GROUNDING_VIOLATION`.

use std::collections::BTreeSet;

use ng12_core::domain::{normalize_label, Classification};
use ng12_core::error::{codes, AppError};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::citations::Citation;

pub mod prompts;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub answer: String,
    /// Offered citations the reply relied on, in offered order.
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessVerdict {
    Classified(Classification),
    /// The model reported that the evidence does not support a decision.
    Declined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessReply {
    pub verdict: AssessVerdict,
    pub rationale: String,
    pub recommended_action: Option<String>,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CitedRef {
    Id(String),
    Object { chunk_id: String },
}

impl CitedRef {
    fn into_id(self) -> String {
        match self {
            CitedRef::Id(id) => id,
            CitedRef::Object { chunk_id } => chunk_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawChatReply {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    citations: Vec<CitedRef>,
}

#[derive(Debug, Deserialize)]
struct RawAssessReply {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    recommended_action: Option<String>,
    #[serde(default)]
    citations: Vec<CitedRef>,
}

pub fn parse_chat_reply(raw: &str, offered: &[Citation]) -> Result<ChatReply, AppError> {
    let reply: RawChatReply = decode(raw)?;
    let answer = reply
        .answer
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| violation("Reply is missing an answer"))?;

    let mut cited: BTreeSet<String> = reply
        .citations
        .into_iter()
        .map(|c| c.into_id().trim().to_string())
        .collect();
    cited.extend(extract_cited_chunk_ids(&answer));

    let citations = resolve_citations(&cited, offered)?;
    Ok(ChatReply { answer, citations })
}

pub fn parse_assess_reply(raw: &str, offered: &[Citation]) -> Result<AssessReply, AppError> {
    let reply: RawAssessReply = decode(raw)?;
    let label = reply
        .category
        .ok_or_else(|| violation("Reply is missing a category"))?;

    let verdict = match Classification::from_label(&label) {
        Some(c) => AssessVerdict::Classified(c),
        None if is_declined_label(&label) => AssessVerdict::Declined,
        None => {
            return Err(violation("Reply category is not recognised")
                .with_details(format!("category={label}")))
        }
    };

    let rationale = reply
        .rationale
        .map(|r| r.trim().to_string())
        .unwrap_or_default();
    let recommended_action = reply
        .recommended_action
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    if verdict == AssessVerdict::Declined {
        return Ok(AssessReply {
            verdict,
            rationale,
            recommended_action,
            citations: Vec::new(),
        });
    }
    if rationale.is_empty() {
        return Err(violation("Reply is missing a rationale"));
    }

    let mut cited: BTreeSet<String> = reply
        .citations
        .into_iter()
        .map(|c| c.into_id().trim().to_string())
        .collect();
    cited.extend(extract_cited_chunk_ids(&rationale));
    if let Some(action) = &recommended_action {
        cited.extend(extract_cited_chunk_ids(action));
    }

    let citations = resolve_citations(&cited, offered)?;
    Ok(AssessReply {
        verdict,
        rationale,
        recommended_action,
        citations,
    })
}

fn is_declined_label(label: &str) -> bool {
    matches!(
        normalize_label(label).as_str(),
        "insufficient_evidence" | "insufficient evidence" | "uncertain"
    )
}

/// Map cited ids onto offered citations. Empty or unoffered citations are violations.
pub fn resolve_citations(
    cited: &BTreeSet<String>,
    offered: &[Citation],
) -> Result<Vec<Citation>, AppError> {
    let cited: BTreeSet<&str> = cited
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    if cited.is_empty() {
        return Err(violation("Reply cites no evidence"));
    }

    let allowed: BTreeSet<&str> = offered.iter().map(|c| c.chunk_id.as_str()).collect();
    for cid in cited.iter() {
        if !allowed.contains(cid) {
            return Err(violation("Reply cited a chunk_id that was not offered")
                .with_details(format!("chunk_id={cid}")));
        }
    }

    Ok(offered
        .iter()
        .filter(|c| cited.contains(c.chunk_id.as_str()))
        .cloned()
        .collect())
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, AppError> {
    let value = extract_json_object(raw)
        .ok_or_else(|| violation("Reply is not a JSON object"))?;
    serde_json::from_value(value).map_err(|e| {
        violation("Reply does not match the expected schema").with_details(e.to_string())
    })
}

/// The reply as a JSON object, or the outermost `{...}` span inside it.
fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    let text = raw.trim();
    if let Ok(v @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(text) {
        return Some(v);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(&text[start..=end]) {
        Ok(v @ serde_json::Value::Object(_)) => Some(v),
        _ => None,
    }
}

/// Ids from inline `[[chunk:<id>]]` markers.
pub fn extract_cited_chunk_ids(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut rest = text;
    while let Some(pos) = rest.find("[[chunk:") {
        let after = &rest[pos + 8..];
        match after.find("]]") {
            Some(end) => {
                let id = after[..end].trim();
                if !id.is_empty() && !id.contains('[') {
                    out.insert(id.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    out
}

fn violation(message: &str) -> AppError {
    AppError::new(codes::GROUNDING_VIOLATION, message)
}
