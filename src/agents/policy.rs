//! 保单专家：对照保单规则检查理赔（事前授权、除外责任与限额、缺失材料）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::prompt::{ask_json, format_instructions, render};
use crate::case::{CaseState, PolicyAnalysis, StateField, StatePatch};
use crate::llm::LlmClient;
use crate::workflow::{CapabilityNode, NodeError, NodeOutcome};

const SYSTEM: &str = "You are an expert Insurance Policy Compliance Analyst. \
Your job is to check if a medical claim adheres to the insurance policy rules.";

pub struct PolicyAgent {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl PolicyAgent {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    fn prompt(state: &CaseState) -> String {
        let rules = if state.policy_rules().is_empty() {
            "No insurance rules provided".to_string()
        } else {
            render(Some(state.policy_rules()), "")
        };
        format!(
            "INSURANCE RULES:\n{rules}\n\n\
             CLAIM DATA:\n{claim}\n\n\
             Analyze the claim for:\n\
             1. Prior authorization requirements (Was it required? Was it obtained?)\n\
             2. Policy exclusions or limits\n\
             3. Missing documentation (start the issue with \"Missing\")\n\n\
             Return the analysis in valid JSON format matching this schema:\n{schema}",
            claim = render(Some(state.documents()), "{}"),
            schema = format_instructions::<PolicyAnalysis>(),
        )
    }
}

#[async_trait]
impl CapabilityNode for PolicyAgent {
    fn owns(&self) -> &'static [StateField] {
        &[StateField::PolicyAnalysis]
    }

    async fn run(&self, state: &CaseState) -> Result<NodeOutcome, NodeError> {
        match ask_json::<PolicyAnalysis>(&self.llm, SYSTEM, Self::prompt(state), self.timeout).await {
            Ok(analysis) => {
                tracing::info!("Policy Agent findings: {}", analysis.findings.len());
                Ok(NodeOutcome::Success(StatePatch::new().policy(analysis)))
            }
            Err(e) => Ok(NodeOutcome::Degraded(
                StatePatch::new().policy(PolicyAnalysis::default()),
                format!("policy agent: {}", e),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{CaseDocuments, PolicyRules};
    use crate::llm::MockLlmClient;

    fn state() -> CaseState {
        CaseState::new(
            "s",
            CaseDocuments::default(),
            PolicyRules(serde_json::json!({"prior_auth": ["MRI"]})),
        )
    }

    #[tokio::test]
    async fn test_parses_findings() {
        let llm = Arc::new(MockLlmClient::repeating(
            r#"{"findings":[{"issue":"Missing PT Notes","status":"VIOLATION","details":"6 weeks required"}],
                "prior_auth_required":true,"policy_limit_issues":false}"#,
        ));
        let agent = PolicyAgent::new(llm.clone(), Duration::from_secs(5));
        let outcome = agent.run(&state()).await.unwrap();

        assert!(!outcome.is_degraded());
        let analysis = outcome.patch().policy_analysis.clone().unwrap();
        assert!(analysis.prior_auth_required);
        assert_eq!(analysis.missing_documents(), vec!["Missing PT Notes".to_string()]);
        assert!(llm.prompts()[0].contains("prior_auth"));
    }

    #[tokio::test]
    async fn test_collaborator_failure_degrades() {
        let agent = PolicyAgent::new(Arc::new(MockLlmClient::failing("503")), Duration::from_secs(5));
        let outcome = agent.run(&state()).await.unwrap();

        assert!(outcome.is_degraded());
        assert_eq!(outcome.patch().policy_analysis, Some(PolicyAnalysis::default()));
    }
}
