//! 申诉撰写（修订节点）：综合各专家结论与审核意见，产出申诉信全文
//!
//! 每执行一次即为一轮修订；轮数由引擎在本节点执行后递增。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::prompt::{ask_text, render};
use crate::case::{CaseState, StateField, StatePatch};
use crate::llm::LlmClient;
use crate::workflow::{CapabilityNode, NodeError, NodeOutcome};

const SYSTEM: &str = "You are the Lead Negotiator for Medical Appeals. \
Write a final, high-impact appeal letter.";

pub struct NegotiatorAgent {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl NegotiatorAgent {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    fn prompt(state: &CaseState) -> Result<String, NodeError> {
        let legal = state
            .legal_analysis()
            .ok_or_else(|| NodeError::MissingInput("legal analysis".into()))?;
        let simulation = state
            .simulation_result()
            .ok_or_else(|| NodeError::MissingInput("simulation result".into()))?;

        let denial = state.documents().denial_letter();
        let patient = denial
            .and_then(|d| d.patient_name.as_deref())
            .unwrap_or("Valued Member");
        let reason = denial
            .and_then(|d| d.denial_reason.as_deref())
            .unwrap_or("Unspecified");

        let feedback = if state.audit_feedback().is_empty() {
            "None".to_string()
        } else {
            state
                .audit_feedback()
                .iter()
                .map(|w| format!("- {}", w))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let history = match state.past_pattern() {
            Some(hint) => format!(
                "\nPAST CASES (denial memory):\n{}\nCommonly missing documents: {}\n",
                hint.message,
                if hint.common_missing_docs.is_empty() {
                    "none recorded".to_string()
                } else {
                    hint.common_missing_docs.join(", ")
                }
            ),
            None => String::new(),
        };

        Ok(format!(
            "CONTEXT:\n\
             - Patient Name: {patient}\n\
             - Denial Reason: {reason}\n\n\
             MEDICAL ARGUMENTS:\n{medical}\n\n\
             LEGAL ARGUMENTS:\n{legal}\n\n\
             OUTCOME SIMULATION:\n{simulation}\n\
             {history}\n\
             AUDITOR FEEDBACK (Address these weaknesses if present):\n{feedback}\n\n\
             INSTRUCTIONS:\n\
             - Write a formal 1-2 page appeal letter.\n\
             - Use a professional tone (Firm but polite).\n\
             - Structure: Header, Case Summary, Medical Necessity (Detailed), Legal/Policy Basis, Conclusion.\n\
             - Do NOT include placeholders like [Date] or [Address]; use real data or leave blank if unknown.\n\n\
             OUTPUT:\nReturn ONLY the full text of the letter.",
            medical = render(state.medical_analysis(), "Medical analysis unavailable"),
            legal = render(Some(legal), "{}"),
            simulation = render(Some(simulation), "{}"),
        ))
    }
}

#[async_trait]
impl CapabilityNode for NegotiatorAgent {
    fn owns(&self) -> &'static [StateField] {
        &[StateField::AppealDraft]
    }

    async fn run(&self, state: &CaseState) -> Result<NodeOutcome, NodeError> {
        let prompt = Self::prompt(state)?;
        match ask_text(&self.llm, SYSTEM, prompt, self.timeout).await {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!(
                    "Negotiator drafted appeal ({} chars, revision {})",
                    text.len(),
                    state.iteration_count() + 1
                );
                Ok(NodeOutcome::Success(StatePatch::new().draft(text.trim())))
            }
            Ok(_) => Ok(NodeOutcome::Degraded(
                StatePatch::new(),
                "negotiator agent: empty draft".into(),
            )),
            // 草稿保持不变
            Err(e) => Ok(NodeOutcome::Degraded(
                StatePatch::new(),
                format!("negotiator agent: {}", e),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{CaseDocuments, LegalAnalysis, PolicyRules, SimulationResult};
    use crate::llm::MockLlmClient;
    use crate::memory::PatternHint;

    fn ready_state() -> CaseState {
        let docs: CaseDocuments = serde_json::from_value(serde_json::json!({
            "denial": {"structured": {"patient_name": "Jane Roe", "denial_reason": "Experimental"}}
        }))
        .unwrap();
        let mut state = CaseState::new("s", docs, PolicyRules::default());
        state.apply(
            StatePatch::new()
                .legal(LegalAnalysis::default())
                .simulation(SimulationResult::default())
                .feedback(vec!["Cite the MRI".into()]),
        );
        state
    }

    #[tokio::test]
    async fn test_drafts_with_feedback_and_context() {
        let llm = Arc::new(MockLlmClient::repeating("Dear Reviewer, ..."));
        let agent = NegotiatorAgent::new(llm.clone(), Duration::from_secs(5));
        let outcome = agent.run(&ready_state()).await.unwrap();

        assert_eq!(outcome.patch().appeal_draft.as_deref(), Some("Dear Reviewer, ..."));
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Jane Roe"));
        assert!(prompt.contains("Experimental"));
        assert!(prompt.contains("- Cite the MRI"));
        assert!(!prompt.contains("PAST CASES"));
    }

    #[tokio::test]
    async fn test_prompt_includes_past_pattern() {
        let hint = PatternHint {
            occurrence_count: 4,
            suggested_solution: vec!["Clinical Justification".into()],
            common_missing_docs: vec!["Missing PT Notes".into()],
            message: "This denial pattern has occurred 4 times.".into(),
        };
        let state = ready_state().with_past_pattern(Some(hint));
        let llm = Arc::new(MockLlmClient::repeating("letter"));
        NegotiatorAgent::new(llm.clone(), Duration::from_secs(5))
            .run(&state)
            .await
            .unwrap();

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("occurred 4 times"));
        assert!(prompt.contains("Missing PT Notes"));
    }

    #[tokio::test]
    async fn test_missing_upstream_findings_is_an_error() {
        let state = CaseState::new("s", CaseDocuments::default(), PolicyRules::default());
        let llm = Arc::new(MockLlmClient::repeating("letter"));
        let err = NegotiatorAgent::new(llm.clone(), Duration::from_secs(5))
            .run(&state)
            .await
            .unwrap_err();

        assert!(matches!(err, NodeError::MissingInput(_)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_leaves_draft_unchanged() {
        let agent = NegotiatorAgent::new(Arc::new(MockLlmClient::failing("timeout")), Duration::from_secs(5));
        let outcome = agent.run(&ready_state()).await.unwrap();

        assert!(outcome.is_degraded());
        assert!(outcome.patch().is_empty());
    }
}
