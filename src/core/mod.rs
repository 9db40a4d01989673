//! 核心编排层：顶层错误、申诉图组装与运行编排

pub mod error;
pub mod orchestrator;

pub use error::AppealError;
pub use orchestrator::{
    build_appeal_graph, create_llm_from_config, AppealOrchestrator, LlmBackend, WorkflowHandle,
    CLINICAL_JUSTIFICATION, DEFAULT_OPENAI_MODEL,
};
