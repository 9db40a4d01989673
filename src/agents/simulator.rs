//! 结果模拟专家：反事实分析，估计当前批准概率并给出改进场景

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::prompt::{ask_json, format_instructions, render};
use crate::case::{CaseState, SimulationResult, StateField, StatePatch};
use crate::llm::LlmClient;
use crate::workflow::{CapabilityNode, NodeError, NodeOutcome};

const SYSTEM: &str = "You are a Strategic Insurance Claim Adjuster (The 'Simulator'). \
Your goal is to perform COUNTERFACTUAL ANALYSIS on this denied claim. Be realistic. Insurers are strict.";

pub struct SimulatorAgent {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl SimulatorAgent {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    fn prompt(state: &CaseState) -> String {
        format!(
            "1. Estimate the CURRENT probability of approval (0-100) based on existing evidence.\n\
             2. Identify KEY MISSING EVIDENCE that would flip the decision.\n\
             3. Generate 3 specific \"What-If\" scenarios, e.g. \
             \"If MRI report confirming stenosis is added -> 95\".\n\n\
             CURRENT CLAIM CONTEXT:\n\
             Documents: {docs}\n\
             Medical Analysis: {medical}\n\n\
             Return analysis in valid JSON matching this schema:\n{schema}",
            docs = render(Some(state.documents()), "{}"),
            medical = render(state.medical_analysis(), "Medical analysis pending or failed."),
            schema = format_instructions::<SimulationResult>(),
        )
    }
}

#[async_trait]
impl CapabilityNode for SimulatorAgent {
    fn owns(&self) -> &'static [StateField] {
        &[StateField::SimulationResult]
    }

    async fn run(&self, state: &CaseState) -> Result<NodeOutcome, NodeError> {
        match ask_json::<SimulationResult>(&self.llm, SYSTEM, Self::prompt(state), self.timeout).await
        {
            Ok(result) => {
                tracing::info!(
                    "Simulation complete. Current probability: {}%",
                    result.current_approval_probability
                );
                Ok(NodeOutcome::Success(StatePatch::new().simulation(result)))
            }
            Err(e) => Ok(NodeOutcome::Degraded(
                StatePatch::new().simulation(SimulationResult::default()),
                format!("simulator agent: {}", e),
            )),
        }
    }
}
