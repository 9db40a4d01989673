//! 案件层：输入文档、专家输出类型、在图中流转的案件状态

pub mod documents;
pub mod findings;
pub mod state;

pub use documents::{CaseDocuments, DenialKeyParts, DenialLetter, Extracted, MedicalBill, PolicyRules};
pub use findings::{
    AuditResult, ClinicalPoint, LegalAnalysis, LegalArgument, MedicalAnalysis, PolicyAnalysis,
    PolicyFinding, Scenario, SimulationResult,
};
pub use state::{CaseState, StateField, StatePatch, MAX_RISK_SCORE};
