//! Application facade: loads configuration, the vector index and the patient directory, wires the
//! orchestrator, and exposes the request operations keyed by patient id.

use std::sync::Arc;
use std::time::Duration;

use ng12_core::config::AppConfig;
use ng12_core::domain::PatientRecord;
use ng12_core::error::{codes, AppError};
use ng12_core::patients::PatientDirectory;
use ng12_rag::conversation::{InMemoryConversationStore, Turn};
use ng12_rag::embeddings::ollama_embed::OllamaEmbedder;
use ng12_rag::index::load_index;
use ng12_rag::llm::ollama_llm::OllamaLlm;
use ng12_rag::ollama::OllamaClient;
use ng12_rag::orchestrator::{AssessOutcome, ChatOutcome, ClearAck, Orchestrator};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Filter comes from `NG12_LOG` (default `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("NG12_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct HealthStatus {
    pub ok: bool,
    pub message: String,
    pub passages: usize,
    pub patients: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct AssessResponse {
    pub patient_id: String,
    #[serde(flatten)]
    pub outcome: AssessOutcome,
}

pub struct Ng12Service {
    orchestrator: Orchestrator,
    patients: PatientDirectory,
    ollama: Option<OllamaClient>,
}

impl Ng12Service {
    pub fn new(orchestrator: Orchestrator, patients: PatientDirectory) -> Self {
        Self {
            orchestrator,
            patients,
            ollama: None,
        }
    }

    /// Build the service from disk and the local Ollama server described by `config`.
    pub fn open(config: &AppConfig) -> Result<Self, AppError> {
        let services = &config.services;
        let client = OllamaClient::new(&services.ollama_base_url)?;
        let embedder = OllamaEmbedder::new(
            client.clone(),
            services.embedding_model.clone(),
            Duration::from_millis(services.embed_timeout_ms),
        );
        let llm = OllamaLlm::new(
            client.clone(),
            services.reasoning_model.clone(),
            Duration::from_millis(services.reasoner_timeout_ms),
        );

        let index = load_index(&config.data.index_path, Some(services.embedding_model.as_str()))?;
        let patients = PatientDirectory::load(&config.data.patients_path)?;

        let orchestrator = Orchestrator::new(
            Arc::new(index),
            Arc::new(embedder),
            Arc::new(llm),
            Arc::new(InMemoryConversationStore::new()),
            &config.grounding,
        )?;
        info!(
            base_url = client.base_url(),
            embedding_model = %services.embedding_model,
            reasoning_model = %services.reasoning_model,
            patients = patients.len(),
            "service ready"
        );

        Ok(Self {
            orchestrator,
            patients,
            ollama: Some(client),
        })
    }

    pub fn health(&self) -> Result<HealthStatus, AppError> {
        let message = match &self.ollama {
            Some(client) => {
                client.health_check()?;
                "Ollama reachable on 127.0.0.1".to_string()
            }
            None => "No model server configured".to_string(),
        };
        Ok(HealthStatus {
            ok: true,
            message,
            passages: self.orchestrator.index().len(),
            patients: self.patients.len(),
        })
    }

    pub fn assess(&self, patient_id: &str) -> Result<AssessResponse, AppError> {
        let patient = self.patient(patient_id)?;
        Ok(AssessResponse {
            patient_id: patient.patient_id.clone(),
            outcome: self.orchestrator.assess(patient, None),
        })
    }

    /// One chat turn about a known patient. History is keyed by patient id.
    pub fn chat(&self, patient_id: &str, message: &str) -> Result<ChatOutcome, AppError> {
        let patient = self.patient(patient_id)?;
        Ok(self.orchestrator.chat(patient_id, message, Some(patient)))
    }

    pub fn history(&self, patient_id: &str) -> Vec<Turn> {
        self.orchestrator.history(patient_id)
    }

    pub fn clear_history(&self, patient_id: &str) -> Result<ClearAck, AppError> {
        self.orchestrator.clear_history(patient_id)
    }

    fn patient(&self, patient_id: &str) -> Result<&PatientRecord, AppError> {
        self.patients.get(patient_id).ok_or_else(|| {
            AppError::new(codes::PATIENT_NOT_FOUND, "Patient not found")
                .with_details(format!("patient_id={patient_id}"))
        })
    }
}
