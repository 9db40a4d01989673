//! 医疗专家：基于病历论证医疗必要性

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::prompt::{ask_json, format_instructions, render};
use crate::case::{CaseState, MedicalAnalysis, StateField, StatePatch};
use crate::llm::LlmClient;
use crate::workflow::{CapabilityNode, NodeError, NodeOutcome};

const SYSTEM: &str = "You are a Senior Medical Appeals Specialist. \
Your goal is to prove MEDICAL NECESSITY for the denied service.";

pub struct MedicalAgent {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl MedicalAgent {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    fn prompt(state: &CaseState) -> String {
        let denial_reason = state
            .documents()
            .denial_letter()
            .and_then(|d| d.denial_reason.as_deref())
            .unwrap_or("Not specified");
        format!(
            "PATIENT DOCUMENTATION:\n{docs}\n\n\
             DENIAL REASON (if known):\n{denial_reason}\n\n\
             Task:\n\
             1. Identify the patient's condition and symptoms (Subjective/Objective).\n\
             2. Explain why the procedure was standard of care and necessary.\n\
             3. Specifically address why conservative treatment failed or wasn't appropriate if related to the denial.\n\n\
             Return the analysis in valid JSON format matching this schema:\n{schema}",
            docs = render(state.documents().clinical_notes(), "No clinical notes provided"),
            schema = format_instructions::<MedicalAnalysis>(),
        )
    }
}

#[async_trait]
impl CapabilityNode for MedicalAgent {
    fn owns(&self) -> &'static [StateField] {
        &[StateField::MedicalAnalysis]
    }

    async fn run(&self, state: &CaseState) -> Result<NodeOutcome, NodeError> {
        match ask_json::<MedicalAnalysis>(&self.llm, SYSTEM, Self::prompt(state), self.timeout).await {
            Ok(analysis) => {
                tracing::info!(
                    "Medical Agent justification: {}",
                    analysis.medical_necessity_found
                );
                Ok(NodeOutcome::Success(StatePatch::new().medical(analysis)))
            }
            Err(e) => Ok(NodeOutcome::Degraded(
                StatePatch::new().medical(MedicalAnalysis::default()),
                format!("medical agent: {}", e),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{CaseDocuments, PolicyRules};
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_prompt_carries_denial_reason_and_notes() {
        let docs: CaseDocuments = serde_json::from_value(serde_json::json!({
            "denial": {"structured": {"denial_reason": "Not medically necessary"}},
            "doctor": {"structured": {"symptoms": "radiating leg pain"}}
        }))
        .unwrap();
        let state = CaseState::new("s", docs, PolicyRules::default());
        let llm = Arc::new(MockLlmClient::repeating(
            r#"{"medical_necessity_found": true, "key_evidence": [{"evidence": "EMG positive", "relevance": "radiculopathy"}]}"#,
        ));

        let outcome = MedicalAgent::new(llm.clone(), Duration::from_secs(5))
            .run(&state)
            .await
            .unwrap();

        let analysis = outcome.patch().medical_analysis.clone().unwrap();
        assert!(analysis.medical_necessity_found);
        assert_eq!(analysis.key_evidence.len(), 1);
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Not medically necessary"));
        assert!(prompt.contains("radiating leg pain"));
    }
}
