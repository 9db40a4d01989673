//! 审核（质量门）：以保险公司医疗主任的视角挑刺，给出风险分与弱点清单

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::prompt::{ask_json, format_instructions};
use crate::case::{AuditResult, CaseState, StateField, StatePatch};
use crate::llm::LlmClient;
use crate::workflow::{CapabilityNode, NodeError, NodeOutcome};

const SYSTEM: &str = "You are a Senior Insurance Medical Director (The 'Auditor'). \
Your job is to REJECT appeals that are weak, vague, or emotional.";

pub struct AuditorAgent {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl AuditorAgent {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    fn prompt(draft: &str) -> String {
        format!(
            "REVIEW THIS APPEAL DRAFT:\n{draft}\n\n\
             CRITERIA FOR PASSING:\n\
             1. Explicitly references the denial reason.\n\
             2. Cites clinical evidence (lab results, symptoms).\n\
             3. Uses firm, non-emotional language.\n\
             4. References policy/legal rights.\n\n\
             Return an empty weaknesses list only if every criterion is met.\n\
             Return analysis in JSON:\n{schema}",
            schema = format_instructions::<AuditResult>(),
        )
    }
}

#[async_trait]
impl CapabilityNode for AuditorAgent {
    fn owns(&self) -> &'static [StateField] {
        &[StateField::AuditFeedback, StateField::RiskScore]
    }

    async fn run(&self, state: &CaseState) -> Result<NodeOutcome, NodeError> {
        let draft = state
            .appeal_draft()
            .ok_or_else(|| NodeError::MissingInput("appeal draft".into()))?;

        match ask_json::<AuditResult>(&self.llm, SYSTEM, Self::prompt(draft), self.timeout).await {
            Ok(result) => {
                tracing::info!(
                    "Auditor Decision: Sufficient={}, Risks={:?}",
                    result.is_sufficient,
                    result.weaknesses
                );
                Ok(NodeOutcome::Success(
                    StatePatch::new()
                        .risk(result.risk_score)
                        .feedback(result.weaknesses),
                ))
            }
            Err(e) => Ok(NodeOutcome::Degraded(
                StatePatch::new().risk(0).feedback(Vec::new()),
                format!("auditor agent: {}", e),
            )),
        }
    }
}
