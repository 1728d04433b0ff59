use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Structured patient data as held by the patient directory.
///
/// Notes:
/// - Only the fields used to build retrieval queries and prompts are typed; anything else the
///   source file carries is kept verbatim in `extra` so prompts see the full record.
/// - `sex` also accepts `gender` on input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PatientRecord {
    pub patient_id: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default, alias = "gender")]
    pub sex: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub investigations: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PatientRecord {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            ..Self::default()
        }
    }
}

/// Referral outcome of an assessment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    UrgentReferral,
    UrgentInvestigation,
    NotMet,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::UrgentReferral => "urgent_referral",
            Classification::UrgentInvestigation => "urgent_investigation",
            Classification::NotMet => "not_met",
        }
    }

    /// Lenient parse of a model-produced label. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let norm = normalize_label(label);
        match norm.as_str() {
            "urgent_referral" | "urgent referral" | "suspected cancer pathway referral" => {
                Some(Self::UrgentReferral)
            }
            "urgent_investigation" | "urgent investigation" => Some(Self::UrgentInvestigation),
            "not_met" | "not met" | "no_urgent_action" | "no urgent action" | "routine" => {
                Some(Self::NotMet)
            }
            _ => None,
        }
    }
}

/// Lowercase and collapse internal whitespace.
pub fn normalize_label(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
