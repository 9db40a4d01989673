//! 领域专家节点：保单、医疗、法律、结果模拟、申诉撰写、审核
//!
//! 每个专家实现 [`CapabilityNode`](crate::workflow::CapabilityNode)，只写自己拥有的字段；
//! 推理服务失败时返回中性补丁。

pub mod auditor;
pub mod legal;
pub mod medical;
pub mod negotiator;
pub mod policy;
pub mod prompt;
pub mod simulator;

use std::sync::Arc;
use std::time::Duration;

pub use auditor::AuditorAgent;
pub use legal::LegalAgent;
pub use medical::MedicalAgent;
pub use negotiator::NegotiatorAgent;
pub use policy::PolicyAgent;
pub use simulator::SimulatorAgent;

use crate::llm::LlmClient;
use crate::workflow::CapabilityNode;

pub const POLICY_NODE: &str = "policy_agent";
pub const MEDICAL_NODE: &str = "medical_agent";
pub const LEGAL_NODE: &str = "legal_agent";
pub const SIMULATOR_NODE: &str = "simulator_agent";
pub const NEGOTIATOR_NODE: &str = "negotiator_agent";
pub const AUDITOR_NODE: &str = "auditor_agent";

/// 一次申诉流程所需的全部专家节点
///
/// 字段可单独替换，测试里常给每个专家配一个独立的 Mock。
#[derive(Clone)]
pub struct AppealExperts {
    pub policy: Arc<dyn CapabilityNode>,
    pub medical: Arc<dyn CapabilityNode>,
    pub legal: Arc<dyn CapabilityNode>,
    pub simulator: Arc<dyn CapabilityNode>,
    pub negotiator: Arc<dyn CapabilityNode>,
    pub auditor: Arc<dyn CapabilityNode>,
}

impl AppealExperts {
    /// 所有专家共用同一推理客户端与超时
    pub fn with_llm(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            policy: Arc::new(PolicyAgent::new(llm.clone(), timeout)),
            medical: Arc::new(MedicalAgent::new(llm.clone(), timeout)),
            legal: Arc::new(LegalAgent::new(llm.clone(), timeout)),
            simulator: Arc::new(SimulatorAgent::new(llm.clone(), timeout)),
            negotiator: Arc::new(NegotiatorAgent::new(llm.clone(), timeout)),
            auditor: Arc::new(AuditorAgent::new(llm, timeout)),
        }
    }
}
