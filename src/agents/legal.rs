//! 法律专家：把保单与医疗分析转成申诉用的法律论点

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::prompt::{ask_json, format_instructions, render};
use crate::case::{CaseState, LegalAnalysis, StateField, StatePatch};
use crate::llm::LlmClient;
use crate::workflow::{CapabilityNode, NodeError, NodeOutcome};

const SYSTEM: &str = "You are an Attorney specializing in Healthcare Denials. \
Frame the legal arguments for an appeal based on the medical and policy analysis.";

pub struct LegalAgent {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl LegalAgent {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    fn prompt(state: &CaseState) -> String {
        format!(
            "MEDICAL EVIDENCE:\n{medical}\n\n\
             POLICY ANALYSIS:\n{policy}\n\n\
             DENIAL INFO:\n{denial}\n\n\
             Task:\n\
             1. Frame the argument using professional, firm legal language.\n\
             2. Cite \"Standard of Care\" obligations.\n\
             3. If denial was \"Medical Necessity\", argue that the insurer is interfering with clinical judgment.\n\n\
             Return JSON:\n{schema}",
            medical = render(state.medical_analysis(), "Medical analysis unavailable"),
            policy = render(state.policy_analysis(), "Policy analysis unavailable"),
            denial = render(state.documents().denial_letter(), "{}"),
            schema = format_instructions::<LegalAnalysis>(),
        )
    }
}

#[async_trait]
impl CapabilityNode for LegalAgent {
    fn owns(&self) -> &'static [StateField] {
        &[StateField::LegalAnalysis]
    }

    async fn run(&self, state: &CaseState) -> Result<NodeOutcome, NodeError> {
        match ask_json::<LegalAnalysis>(&self.llm, SYSTEM, Self::prompt(state), self.timeout).await {
            Ok(analysis) => {
                tracing::info!("Legal Agent arguments: {}", analysis.arguments.len());
                Ok(NodeOutcome::Success(StatePatch::new().legal(analysis)))
            }
            Err(e) => Ok(NodeOutcome::Degraded(
                StatePatch::new().legal(LegalAnalysis::default()),
                format!("legal agent: {}", e),
            )),
        }
    }
}
