use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::domain::PatientRecord;
use crate::error::AppError;

/// Read-only lookup of structured patient data, loaded once from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct PatientDirectory {
    patients: BTreeMap<String, PatientRecord>,
}

impl PatientDirectory {
    /// Accepts either `{"PT-101": {...}}` or `[{"patient_id": "PT-101", ...}]`.
    ///
    /// A missing or empty file yields an empty directory; malformed JSON is an error.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            warn!(path = %path.display(), "patient file not found; directory is empty");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::new("PATIENTS_LOAD_FAILED", "Failed to read patient file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::from_json(&raw).map_err(|e| {
            let details = format!(
                "path={}; err={}",
                path.display(),
                e.details.clone().unwrap_or_default()
            );
            e.with_details(details)
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            AppError::new("PATIENTS_LOAD_FAILED", "Failed to decode patient file")
                .with_details(e.to_string())
        })?;

        let mut patients = BTreeMap::new();
        match value {
            serde_json::Value::Object(map) => {
                for (id, v) in map {
                    let mut rec = decode_record(v)?;
                    if rec.patient_id.is_empty() {
                        rec.patient_id = id.clone();
                    }
                    patients.insert(id, rec);
                }
            }
            serde_json::Value::Array(items) => {
                for v in items {
                    let rec = decode_record(v)?;
                    if rec.patient_id.is_empty() {
                        return Err(AppError::new(
                            "PATIENTS_LOAD_FAILED",
                            "Patient record in list is missing patient_id",
                        ));
                    }
                    patients.insert(rec.patient_id.clone(), rec);
                }
            }
            _ => {
                return Err(AppError::new(
                    "PATIENTS_LOAD_FAILED",
                    "Patient file must be a JSON object or array",
                ))
            }
        }
        Ok(Self { patients })
    }

    pub fn from_records(records: impl IntoIterator<Item = PatientRecord>) -> Self {
        Self {
            patients: records
                .into_iter()
                .map(|r| (r.patient_id.clone(), r))
                .collect(),
        }
    }

    pub fn get(&self, patient_id: &str) -> Option<&PatientRecord> {
        self.patients.get(patient_id)
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

fn decode_record(mut v: serde_json::Value) -> Result<PatientRecord, AppError> {
    // Records keyed by id may omit patient_id entirely.
    if let serde_json::Value::Object(map) = &mut v {
        map.entry("patient_id")
            .or_insert_with(|| serde_json::Value::String(String::new()));
    }
    serde_json::from_value(v).map_err(|e| {
        AppError::new("PATIENTS_LOAD_FAILED", "Failed to decode patient record")
            .with_details(e.to_string())
    })
}
