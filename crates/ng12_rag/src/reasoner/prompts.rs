use ng12_core::domain::PatientRecord;

use crate::index::ScoredPassage;

pub const PROMPT_TEMPLATE_VERSION: &str = "ng12-grounded-v1";

pub fn evidence_blocks(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .map(|sp| {
            format!(
                "[[chunk:{}]] page={}\n{}",
                sp.passage.chunk_id, sp.passage.page, sp.passage.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub fn render_patient(patient: &PatientRecord) -> String {
    serde_json::to_string_pretty(patient).unwrap_or_else(|_| patient.patient_id.clone())
}

pub fn chat_prompt(patient: Option<&PatientRecord>, question: &str, evidence_blocks: &str) -> String {
    let patient_block = match patient {
        Some(p) => format!("Patient:\n{}\n\n", render_patient(p)),
        None => String::new(),
    };
    format!(
        r#"You are a clinical decision support assistant answering questions about NICE NG12 (suspected cancer: recognition and referral).

Rules (non-negotiable):
1) Use ONLY the evidence chunks provided below. Do not invent findings, thresholds or criteria.
2) Every criterion or threshold you state MUST come from a chunk, and that chunk's id MUST appear in "citations".
3) Only cite chunk ids that appear below, written exactly as given.
4) If the evidence does not answer the question, return an empty "citations" list.
5) Keep the answer concise and specific to the question.

{patient_block}User question:
{question}

Evidence chunks:
{evidence_blocks}

Return ONLY a JSON object:
{{"answer": "string", "citations": ["<chunk_id>", ...]}}
"#
    )
}

pub fn assess_prompt(patient: &PatientRecord, query: &str, evidence_blocks: &str) -> String {
    let patient_json = render_patient(patient);
    format!(
        r#"You are a clinical decision support assistant applying NICE NG12 (suspected cancer: recognition and referral) to one patient.

Rules (non-negotiable):
1) Ground your decision ONLY in the evidence chunks provided below. Do not invent criteria.
2) Choose "urgent_referral" or "urgent_investigation" only when a cited chunk states that recommendation for this patient's presentation.
3) Choose "not_met" when the cited chunks show the patient does not meet those criteria.
4) Choose "insufficient_evidence" when the chunks do not let you decide.
5) Every chunk you rely on MUST appear in "citations", using the ids exactly as given.

Patient JSON:
{patient_json}

Retrieval query:
{query}

Evidence chunks:
{evidence_blocks}

Return ONLY a JSON object with these keys:
- "category": one of ["urgent_referral", "urgent_investigation", "not_met", "insufficient_evidence"]
- "rationale": short, quoting or pointing to the chunk wording
- "recommended_action": short, actionable, aligned with the chunk
- "citations": list of chunk ids relied on
"#
    )
}
